//! Viewer-specific redacted views of a [`Room`].
//!
//! No view ever carries a question's answer key or comment; those only leave the server through
//! the correct-answer demo once a question is over.

use indexmap::IndexMap;
use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    pack::{Attachment, PackPreview, QuestionType},
    room::{
        AnsweringPlayer, CurrentQuestion, CurrentRoundQuestions, FinalRoundState, PrivacyType,
        Room, RoomOptions, RoomState,
    },
    user::{Host, Player},
};

/// Projection chosen for a caller by [`Room::project`].
#[derive(Debug, Clone, Serialize, PartialEq, ToSchema)]
#[serde(untagged)]
pub enum RoomView {
    /// Host or player of the room.
    Member(Box<MemberRoomView>),
    /// Anyone else.
    Lobby(LobbyRoomView),
}

/// Whose eyes a member view is prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Viewer {
    Host,
    Player,
}

/// Room as seen by its host or one of its players.
#[derive(Debug, Clone, Serialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberRoomView {
    /// Room identifier.
    pub id: Uuid,
    /// Room name.
    pub name: String,
    /// Pack being played.
    pub pack_preview: PackPreview,
    /// Settings, password left out.
    pub options: OptionsView,
    /// User who created the room.
    pub created_by: String,
    /// Host seat, empty until someone takes it.
    pub host: Option<Host>,
    /// Seated players in join order.
    pub players: Vec<Player>,
    /// Current phase.
    pub state: RoomState,
    /// Round in play.
    pub current_round_name: Option<String>,
    /// Board of the round in play.
    pub current_round_questions: CurrentRoundQuestions,
    /// Player choosing the next question.
    pub current_player: Option<String>,
    /// Question on screen, without its answers.
    pub current_question: Option<QuestionView>,
    /// Player whose answer is being judged.
    pub answering_player: Option<AnsweringPlayer>,
    /// Players who may still buzz in.
    pub allowed_to_answer: Vec<String>,
    /// Final round progress, redacted for players.
    pub final_round_state: Option<FinalRoundView>,
}

/// Room options without the password.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OptionsView {
    /// Player seats.
    pub max_players: usize,
    /// Whether joining needs a password.
    #[serde(rename = "type")]
    pub privacy: PrivacyType,
    /// Seconds to buzz in.
    pub question_thinking_time: u64,
    /// Seconds to answer once buzzed in.
    pub answer_thinking_time: u64,
    /// Seconds to write the final answer.
    pub question_thinking_time_final: u64,
    /// Whether buzzing during the reveal is allowed.
    pub false_start_allowed: bool,
}

impl From<&RoomOptions> for OptionsView {
    fn from(options: &RoomOptions) -> Self {
        Self {
            max_players: options.max_players,
            privacy: options.privacy,
            question_thinking_time: options.question_thinking_time,
            answer_thinking_time: options.answer_thinking_time,
            question_thinking_time_final: options.question_thinking_time_final,
            false_start_allowed: options.false_start_allowed,
        }
    }
}

/// Current question stripped down to what can be shown on screen.
#[derive(Debug, Clone, Serialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    /// Position within its category.
    pub index: usize,
    /// Points at stake.
    pub value: i64,
    /// Media played during the reveal.
    pub attachment: Option<Attachment>,
    /// Question routing.
    #[serde(rename = "type")]
    pub kind: QuestionType,
    /// Question text.
    pub text: String,
    /// Share of the show window left when it last resumed, from 0 to 1.
    pub timer_last_progress: f64,
    /// Start of the running window.
    #[serde(with = "time::serde::rfc3339::option")]
    pub timer_starts_at: Option<OffsetDateTime>,
    /// End of the running window.
    #[serde(with = "time::serde::rfc3339::option")]
    pub timer_ends_at: Option<OffsetDateTime>,
}

impl From<&CurrentQuestion> for QuestionView {
    fn from(current: &CurrentQuestion) -> Self {
        Self {
            index: current.question.index,
            value: current.question.value,
            attachment: current.question.attachment.clone(),
            kind: current.question.kind,
            text: current.question.text.clone(),
            timer_last_progress: current.timer_last_progress,
            timer_starts_at: current.timer_starts_at,
            timer_ends_at: current.timer_ends_at,
        }
    }
}

/// Final question without its answers.
#[derive(Debug, Clone, Serialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinalQuestionView {
    /// Question text.
    pub text: String,
    /// Media shown with the question.
    pub attachment: Option<Attachment>,
}

/// Submitted final answers: full text for the host, presence only for players.
#[derive(Debug, Clone, Serialize, PartialEq, ToSchema)]
#[serde(untagged)]
pub enum PlayersAnswersView {
    /// Host view: answer text by player.
    Revealed(IndexMap<String, String>),
    /// Player view: who has answered.
    Hidden(IndexMap<String, bool>),
}

/// Final round progress as seen by one viewer.
#[derive(Debug, Clone, Serialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinalRoundView {
    /// Categories with `false` once struck.
    pub available_categories: IndexMap<String, bool>,
    /// Question once a single category is left.
    pub question: Option<FinalQuestionView>,
    /// Finalists.
    pub players: Vec<String>,
    /// Submitted answers, redacted for players.
    pub players_answers: PlayersAnswersView,
    /// Deadline of the running final phase.
    #[serde(with = "time::serde::rfc3339::option")]
    pub timer_ends_at: Option<OffsetDateTime>,
}

impl FinalRoundView {
    fn new(state: &FinalRoundState, viewer: Viewer) -> Self {
        let players_answers = match viewer {
            Viewer::Host => PlayersAnswersView::Revealed(state.players_answers.clone()),
            Viewer::Player => PlayersAnswersView::Hidden(
                state
                    .players_answers
                    .keys()
                    .map(|id| (id.clone(), true))
                    .collect(),
            ),
        };
        Self {
            available_categories: state.available_categories.clone(),
            question: state.question.as_ref().map(|question| FinalQuestionView {
                text: question.text.clone(),
                attachment: question.attachment.clone(),
            }),
            players: state.players.clone(),
            players_answers,
            timer_ends_at: state.timer_ends_at,
        }
    }
}

/// Summary shown to users browsing the lobby.
#[derive(Debug, Clone, Serialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LobbyRoomView {
    /// Room identifier.
    pub id: Uuid,
    /// Room name.
    pub name: String,
    /// Pack being played.
    pub pack_preview: PackPreview,
    /// Host seat.
    pub host: Option<Host>,
    /// Seated players.
    pub players: Vec<Player>,
    /// Player seats.
    pub max_players: usize,
    /// Whether joining needs a password.
    #[serde(rename = "type")]
    pub privacy: PrivacyType,
    /// Coarse phase, see [`Room::status`].
    #[schema(value_type = String)]
    pub status: &'static str,
}

impl Room {
    /// Pick the projection matching the caller's seat in the room.
    pub fn project(&self, user_id: &str) -> RoomView {
        if self.is_user_host(user_id) {
            RoomView::Member(Box::new(self.host_view()))
        } else if self.is_user_player(user_id) {
            RoomView::Member(Box::new(self.player_view()))
        } else {
            RoomView::Lobby(self.lobby_view())
        }
    }

    /// View with final answers revealed.
    pub fn host_view(&self) -> MemberRoomView {
        self.member_view(Viewer::Host)
    }

    /// View with final answers hidden.
    pub fn player_view(&self) -> MemberRoomView {
        self.member_view(Viewer::Player)
    }

    fn member_view(&self, viewer: Viewer) -> MemberRoomView {
        MemberRoomView {
            id: self.id,
            name: self.name.clone(),
            pack_preview: self.pack_preview.clone(),
            options: OptionsView::from(&self.options),
            created_by: self.created_by.clone(),
            host: self.host.clone(),
            players: self.players.clone(),
            state: self.state,
            current_round_name: self.current_round_name.clone(),
            current_round_questions: self.current_round_questions.clone(),
            current_player: self.current_player.clone(),
            current_question: self.current_question.as_ref().map(QuestionView::from),
            answering_player: self.answering_player.clone(),
            allowed_to_answer: self.allowed_to_answer.clone(),
            final_round_state: self
                .final_round_state
                .as_ref()
                .map(|state| FinalRoundView::new(state, viewer)),
        }
    }

    /// Summary for the lobby listing.
    pub fn lobby_view(&self) -> LobbyRoomView {
        LobbyRoomView {
            id: self.id,
            name: self.name.clone(),
            pack_preview: self.pack_preview.clone(),
            host: self.host.clone(),
            players: self.players.clone(),
            max_players: self.options.max_players,
            privacy: self.options.privacy,
            status: self.status(),
        }
    }

    /// Coarse status for the lobby.
    pub fn status(&self) -> &'static str {
        match self.state {
            RoomState::WaitingForStart => "Waiting for start",
            RoomState::GameOver => "Game ended",
            _ => "Playing",
        }
    }
}

//! Room aggregate and the game state machine driving it.
//!
//! Every mutation validates the current [`RoomState`] and the caller before touching anything, so
//! a method returning [`RoomError`] leaves the room exactly as it found it. Methods that start a
//! timer take `now` explicitly; the room never reads the clock itself.

use std::time::Duration;

use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    pack::{FinalRoundQuestion, Pack, PackPreview, Question, QuestionType},
    user::{Host, Player, SYSTEM},
};

/// Domain failure returned by room mutations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoomError {
    /// Wrong phase for the action, or the action was already performed.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The caller lacks the role or eligibility required.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// A referenced category, question or player does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Who may join a room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyType {
    /// Anyone.
    Public,
    /// Only callers who know the password.
    Private,
}

/// Options chosen when the room was created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomOptions {
    /// Player seats, the host not included.
    pub max_players: usize,
    /// Whether joining needs a password.
    #[serde(rename = "type")]
    pub privacy: PrivacyType,
    /// Set only for private rooms.
    #[serde(default)]
    pub password: Option<String>,
    /// Seconds players have to buzz once a regular question is shown.
    pub question_thinking_time: u64,
    /// Seconds the answering player has to answer.
    pub answer_thinking_time: u64,
    /// Seconds players have to write their final round answer.
    pub question_thinking_time_final: u64,
    /// Whether players may buzz while the question is still being revealed.
    pub false_start_allowed: bool,
}

impl RoomOptions {
    fn question_thinking(&self) -> Duration {
        Duration::from_secs(self.question_thinking_time)
    }

    fn answer_thinking(&self) -> Duration {
        Duration::from_secs(self.answer_thinking_time)
    }

    fn final_thinking(&self) -> Duration {
        Duration::from_secs(self.question_thinking_time_final)
    }
}

/// Phase of the game state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    /// Lobby phase before the host starts the game.
    WaitingForStart,
    /// The current player picks from the board.
    SelectingQuestion,
    /// Question text and media are being presented.
    RevealingQuestion,
    /// Players may buzz in.
    ShowingQuestion,
    /// One player answers while the host judges.
    Answering,
    /// Auction bids are open.
    Betting,
    /// A cat-in-bag question waits for its recipient.
    Passing,
    /// Players strike final categories in turn.
    SelectingFinalRoundCategory,
    /// Finalists place their bets.
    FinalRoundBetting,
    /// Finalists write their answers.
    ShowingFinalRoundQuestion,
    /// The host judges final answers one by one.
    ValidatingFinalRoundAnswers,
    /// Scores are final.
    GameOver,
}

impl RoomState {
    /// Phases that carry a [`CurrentQuestion`].
    pub fn has_current_question(self) -> bool {
        matches!(
            self,
            RoomState::RevealingQuestion
                | RoomState::ShowingQuestion
                | RoomState::Answering
                | RoomState::Passing
                | RoomState::Betting
        )
    }

    fn is_final_round(self) -> bool {
        matches!(
            self,
            RoomState::SelectingFinalRoundCategory
                | RoomState::FinalRoundBetting
                | RoomState::ShowingFinalRoundQuestion
                | RoomState::ValidatingFinalRoundAnswers
                | RoomState::GameOver
        )
    }
}

/// Board of the current round keyed by category name, in pack order.
pub type CurrentRoundQuestions = IndexMap<String, Vec<BoardQuestion>>;

/// Board stub of a question: never carries the question text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoardQuestion {
    /// Position within its category.
    pub index: usize,
    /// Points at stake.
    pub value: i64,
    /// Whether the question is off the board.
    pub has_been_played: bool,
}

/// Question being played together with its reveal/show timer bounds.
///
/// `timer_starts_at` is the instant the reveal window closes and the show window opens;
/// `timer_ends_at` is the instant the show window closes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentQuestion {
    /// Question in play, answer key included.
    #[serde(flatten)]
    pub question: Question,
    /// Fraction of the show window still remaining when it was last resumed.
    pub timer_last_progress: f64,
    /// End of the reveal window.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timer_starts_at: Option<OffsetDateTime>,
    /// End of the show window.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timer_ends_at: Option<OffsetDateTime>,
}

impl CurrentQuestion {
    fn new(question: Question) -> Self {
        Self {
            question,
            timer_last_progress: 0.0,
            timer_starts_at: None,
            timer_ends_at: None,
        }
    }
}

/// Player currently answering and their deadline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnsweringPlayer {
    /// Answering player.
    pub id: String,
    /// When they buzzed in or were handed the question.
    #[serde(with = "time::serde::rfc3339")]
    pub timer_starts_at: OffsetDateTime,
    /// When their time runs out.
    #[serde(with = "time::serde::rfc3339")]
    pub timer_ends_at: OffsetDateTime,
}

/// Progress of the final round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinalRoundState {
    /// Final categories and whether each is still in play.
    pub available_categories: IndexMap<String, bool>,
    /// Question of the last category standing.
    pub question: Option<FinalRoundQuestion>,
    /// Final round participants, in seating order.
    pub players: Vec<String>,
    /// Answers by player, in submission order.
    #[serde(default)]
    pub players_answers: IndexMap<String, String>,
    /// Deadline of the running final phase.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timer_ends_at: Option<OffsetDateTime>,
}

/// One game session's full mutable state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Room identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Pack being played.
    pub pack_preview: PackPreview,
    /// Settings fixed at creation.
    pub options: RoomOptions,
    /// User who created the room.
    pub created_by: String,
    /// Host seat.
    pub host: Option<Host>,
    /// Seated players in join order.
    pub players: Vec<Player>,
    /// Users who may not come back.
    #[serde(default)]
    pub ban_list: Vec<String>,
    /// Current phase.
    pub state: RoomState,
    /// Regular round in play.
    pub current_round_name: Option<String>,
    /// Board of the round in play.
    #[serde(default)]
    pub current_round_questions: CurrentRoundQuestions,
    /// Player choosing the next question.
    pub current_player: Option<String>,
    /// Question in play.
    pub current_question: Option<CurrentQuestion>,
    /// Player answering right now.
    pub answering_player: Option<AnsweringPlayer>,
    /// Players who may still buzz in on the current question.
    #[serde(default)]
    pub allowed_to_answer: Vec<String>,
    /// Set once the final round begins.
    pub final_round_state: Option<FinalRoundState>,
}

impl Room {
    /// Fresh room waiting for its host to start the game.
    pub fn new(
        id: Uuid,
        name: String,
        pack_preview: PackPreview,
        options: RoomOptions,
        created_by: String,
    ) -> Self {
        Self {
            id,
            name,
            pack_preview,
            options,
            created_by,
            host: None,
            players: Vec::new(),
            ban_list: Vec::new(),
            state: RoomState::WaitingForStart,
            current_round_name: None,
            current_round_questions: CurrentRoundQuestions::new(),
            current_player: None,
            current_question: None,
            answering_player: None,
            allowed_to_answer: Vec::new(),
            final_round_state: None,
        }
    }

    /// Whether `user_id` holds the host seat.
    pub fn is_user_host(&self, user_id: &str) -> bool {
        self.host.as_ref().is_some_and(|host| host.user.id == user_id)
    }

    /// Whether `user_id` holds a player seat.
    pub fn is_user_player(&self, user_id: &str) -> bool {
        self.players.iter().any(|player| player.id() == user_id)
    }

    /// Whether `user_id` holds any seat.
    pub fn is_user_in(&self, user_id: &str) -> bool {
        self.is_user_host(user_id) || self.is_user_player(user_id)
    }

    /// Whether `user_id` was kicked for good.
    pub fn is_user_banned(&self, user_id: &str) -> bool {
        self.ban_list.iter().any(|id| id == user_id)
    }

    /// Seat of player `user_id`.
    pub fn player(&self, user_id: &str) -> Option<&Player> {
        self.players.iter().find(|player| player.id() == user_id)
    }

    fn player_mut(&mut self, user_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.id() == user_id)
    }

    fn is_current_player(&self, user_id: &str) -> bool {
        self.current_player.as_deref() == Some(user_id)
    }

    /// Whether the host or at least one player has a live connection.
    pub fn anyone_connected(&self) -> bool {
        self.host.as_ref().is_some_and(|host| host.is_connected)
            || self.players.iter().any(|player| player.is_connected)
    }

    /// Flip the liveness flag of the host or player seat. Returns `false` if the user is not seated.
    pub fn set_connected(&mut self, user_id: &str, connected: bool) -> bool {
        if let Some(host) = self.host.as_mut().filter(|host| host.user.id == user_id) {
            host.is_connected = connected;
            return true;
        }
        match self.player_mut(user_id) {
            Some(player) => {
                player.is_connected = connected;
                true
            }
            None => false,
        }
    }

    /// Whether `current_question`, `answering_player` and `final_round_state` agree with `state`.
    pub fn is_consistent(&self) -> bool {
        let question_matches = self.current_question.is_some() == self.state.has_current_question();
        let answering_matches =
            self.answering_player.is_some() == (self.state == RoomState::Answering);
        let final_matches = match self.state {
            RoomState::GameOver => true,
            state if state.is_final_round() => self.final_round_state.is_some(),
            _ => self.final_round_state.is_none(),
        };
        question_matches && answering_matches && final_matches
    }

    /// Host-only: begin the first round with a random player choosing.
    pub fn start_game(&mut self, user_id: &str, pack: &Pack) -> Result<(), RoomError> {
        if self.state != RoomState::WaitingForStart {
            return Err(RoomError::Conflict("game has already started".into()));
        }
        if !self.is_user_host(user_id) {
            return Err(RoomError::Forbidden("not allowed to start game".into()));
        }
        if !self.players.iter().any(|player| player.is_connected) {
            return Err(RoomError::Conflict(
                "can not start game without connected players".into(),
            ));
        }
        if pack.rounds.is_empty() {
            return Err(RoomError::Conflict("pack has no rounds".into()));
        }

        self.start_next_regular_round(pack);
        let index = rand::rng().random_range(0..self.players.len());
        self.current_player = Some(self.players[index].id().to_owned());
        Ok(())
    }

    /// Move to the next regular round. Returns `false` when every round has been played.
    pub fn start_next_regular_round(&mut self, pack: &Pack) -> bool {
        let next_index = match (&self.state, &self.current_round_name) {
            (RoomState::WaitingForStart, _) | (_, None) => 0,
            (_, Some(name)) => pack.round_index(name).map_or(pack.rounds.len(), |i| i + 1),
        };
        let Some(round) = pack.rounds.get(next_index) else {
            return false;
        };

        self.current_round_name = Some(round.name.clone());
        self.current_round_questions = round.board();
        self.state = RoomState::SelectingQuestion;
        true
    }

    /// Pick a question from the board and route it by its type.
    pub fn select_question(
        &mut self,
        user_id: &str,
        pack: &Pack,
        category: &str,
        index: usize,
        now: OffsetDateTime,
    ) -> Result<(), RoomError> {
        if self.state != RoomState::SelectingQuestion {
            return Err(RoomError::Conflict("can not select question now".into()));
        }
        if !self.is_current_player(user_id) && !self.is_user_host(user_id) {
            return Err(RoomError::Forbidden("not allowed to select question".into()));
        }
        let board_question = self
            .current_round_questions
            .get(category)
            .ok_or_else(|| RoomError::NotFound(format!("no category \"{category}\" on the board")))?
            .iter()
            .find(|question| question.index == index)
            .ok_or_else(|| {
                RoomError::NotFound(format!("no question with index \"{index}\" in \"{category}\""))
            })?;
        if board_question.has_been_played {
            return Err(RoomError::Conflict("question has already been played".into()));
        }
        let round_name = self
            .current_round_name
            .as_deref()
            .ok_or_else(|| RoomError::Conflict("no round in progress".into()))?;
        let question = pack.question(round_name, category, index)?.clone();
        let cat_in_bag_recipient = match question.kind {
            QuestionType::CatInBag => self.cat_in_bag_recipient(user_id)?,
            _ => None,
        };

        if let Some(played) = self
            .current_round_questions
            .get_mut(category)
            .and_then(|questions| questions.iter_mut().find(|q| q.index == index))
        {
            played.has_been_played = true;
        }
        let kind = question.kind;
        self.current_question = Some(CurrentQuestion::new(question));

        match kind {
            QuestionType::Regular => self.reveal_regular_question(now),
            QuestionType::CatInBag => match cat_in_bag_recipient {
                Some(recipient) => self.start_non_regular_question(recipient, now),
                None => self.state = RoomState::Passing,
            },
            QuestionType::Auction => {
                if self.players.iter().any(|player| player.score > 0) {
                    self.state = RoomState::Betting;
                } else {
                    self.reveal_regular_question(now);
                }
            }
        }
        Ok(())
    }

    /// Player a cat-in-bag question goes to right away, or `None` when it has to be passed by hand.
    ///
    /// With nobody else connected the picker keeps it; a host picking falls back to the current
    /// player, since only seated players can answer.
    fn cat_in_bag_recipient(&self, picker: &str) -> Result<Option<String>, RoomError> {
        let can_pass_to: Vec<&str> = self
            .players
            .iter()
            .filter(|player| player.id() != picker && player.is_connected)
            .map(Player::id)
            .collect();
        match can_pass_to.as_slice() {
            [] => {
                let keeper = if self.is_user_player(picker) {
                    Some(picker)
                } else {
                    self.current_player
                        .as_deref()
                        .filter(|id| self.is_user_player(id))
                };
                keeper
                    .map(|id| Some(id.to_owned()))
                    .ok_or_else(|| RoomError::Conflict("nobody can answer the question".into()))
            }
            [only] => Ok(Some((*only).to_owned())),
            _ => Ok(None),
        }
    }

    fn reveal_regular_question(&mut self, now: OffsetDateTime) {
        self.allowed_to_answer = self
            .players
            .iter()
            .map(|player| player.id().to_owned())
            .collect();
        if let Some(current) = self.current_question.as_mut() {
            current.timer_starts_at = Some(now + current.question.revealing_duration());
        }
        self.state = RoomState::RevealingQuestion;
    }

    /// Close the reveal window and open the show window.
    pub fn start_regular_question(&mut self) -> Result<(), RoomError> {
        if self.state != RoomState::RevealingQuestion {
            return Err(RoomError::Conflict("question is not being revealed".into()));
        }
        let thinking = self.options.question_thinking();
        let current = self
            .current_question
            .as_mut()
            .ok_or_else(|| RoomError::Conflict("no question in progress".into()))?;
        let reveal_ends = current
            .timer_starts_at
            .ok_or_else(|| RoomError::Conflict("question has no reveal window".into()))?;
        current.timer_ends_at = Some(reveal_ends + thinking);
        current.timer_last_progress = 1.0;
        self.state = RoomState::ShowingQuestion;
        Ok(())
    }

    fn start_non_regular_question(&mut self, player_id: String, now: OffsetDateTime) {
        let revealing = self
            .current_question
            .as_ref()
            .map(|current| current.question.revealing_duration())
            .unwrap_or_default();
        self.answering_player = Some(AnsweringPlayer {
            id: player_id.clone(),
            timer_starts_at: now,
            timer_ends_at: now + revealing + self.options.answer_thinking(),
        });
        self.current_player = Some(player_id);
        self.state = RoomState::Answering;
    }

    /// A player buzzes in to answer the current regular question.
    pub fn submit_answer(&mut self, user_id: &str, now: OffsetDateTime) -> Result<(), RoomError> {
        if !matches!(
            self.state,
            RoomState::RevealingQuestion | RoomState::ShowingQuestion
        ) {
            return Err(RoomError::Conflict("can not submit answer now".into()));
        }
        if !self.allowed_to_answer.iter().any(|id| id == user_id) {
            return Err(RoomError::Conflict("not allowed to submit answer".into()));
        }
        if self.state == RoomState::RevealingQuestion && !self.options.false_start_allowed {
            return Err(RoomError::Conflict("can not submit answer now".into()));
        }

        self.answering_player = Some(AnsweringPlayer {
            id: user_id.to_owned(),
            timer_starts_at: now,
            timer_ends_at: now + self.options.answer_thinking(),
        });
        self.current_player = Some(user_id.to_owned());
        self.allowed_to_answer.retain(|id| id != user_id);
        self.state = RoomState::Answering;
        Ok(())
    }

    /// Host (or [`SYSTEM`] on timeout) rules on the pending answer.
    ///
    /// The answerer's score moves by their bet if one is set, otherwise by the question value. A
    /// correct answer, or nobody left to answer, ends the question; otherwise the reveal/show
    /// timer resumes with the time spent answering spliced out.
    pub fn validate_answer(
        &mut self,
        user_id: &str,
        is_correct: bool,
        now: OffsetDateTime,
    ) -> Result<(), RoomError> {
        if self.state != RoomState::Answering {
            return Err(RoomError::Conflict("can not validate answer now".into()));
        }
        if !self.is_user_host(user_id) && user_id != SYSTEM {
            return Err(RoomError::Forbidden("not allowed to validate answer".into()));
        }
        let answering_id = self
            .answering_player
            .as_ref()
            .map(|answering| answering.id.clone())
            .ok_or_else(|| RoomError::Conflict("nobody is answering".into()))?;
        let question_value = self
            .current_question
            .as_ref()
            .map(|current| current.question.value)
            .ok_or_else(|| RoomError::Conflict("no question in progress".into()))?;
        let player = self.player_mut(&answering_id).ok_or_else(|| {
            RoomError::NotFound(format!("no player with id \"{answering_id}\" in room"))
        })?;

        let value = player.bet_amount.unwrap_or(question_value);
        if is_correct {
            player.score += value;
        } else {
            player.score -= value;
        }

        if is_correct || self.allowed_to_answer.is_empty() {
            self.end_question();
        } else {
            self.continue_regular_question(now);
        }
        Ok(())
    }

    fn continue_regular_question(&mut self, now: OffsetDateTime) {
        let thinking = self.options.question_thinking();
        let Some(answering) = self.answering_player.take() else {
            self.end_question();
            return;
        };
        let Some(current) = self.current_question.as_mut() else {
            self.end_question();
            return;
        };
        let Some(reveal_ends) = current.timer_starts_at else {
            self.end_question();
            return;
        };

        let answer_duration = now - answering.timer_starts_at;
        if answering.timer_starts_at < reveal_ends {
            current.timer_starts_at = Some(reveal_ends + answer_duration);
            self.state = RoomState::RevealingQuestion;
        } else {
            let show_ends = current.timer_ends_at.unwrap_or(reveal_ends + thinking) + answer_duration;
            current.timer_ends_at = Some(show_ends);
            let remaining = (show_ends - now).as_seconds_f64();
            current.timer_last_progress = (remaining / thinking.as_secs_f64()).clamp(0.0, 1.0);
            self.state = RoomState::ShowingQuestion;
        }
    }

    /// Hand a cat-in-bag question to another connected player.
    pub fn pass_question(
        &mut self,
        from_user_id: &str,
        to_user_id: &str,
        now: OffsetDateTime,
    ) -> Result<(), RoomError> {
        if self.state != RoomState::Passing {
            return Err(RoomError::Conflict("can not pass question now".into()));
        }
        let target = self.player(to_user_id).ok_or_else(|| {
            RoomError::NotFound(format!("no player with id \"{to_user_id}\" in room"))
        })?;
        let target_connected = target.is_connected;
        if !self.is_current_player(from_user_id) && !self.is_user_host(from_user_id) {
            return Err(RoomError::Forbidden("not allowed to pass question".into()));
        }
        if self.is_current_player(to_user_id) {
            return Err(RoomError::Conflict(
                "can not pass question to current player".into(),
            ));
        }
        if !target_connected {
            return Err(RoomError::Conflict(
                "can not pass question to disconnected player".into(),
            ));
        }

        self.start_non_regular_question(to_user_id.to_owned(), now);
        Ok(())
    }

    /// Passing timed out: hand the question to a random connected player, or keep it.
    pub fn pass_question_auto(&mut self, now: OffsetDateTime) {
        let current = self.current_player.clone().unwrap_or_default();
        let candidates: Vec<&Player> = self
            .players
            .iter()
            .filter(|player| player.id() != current && player.is_connected)
            .collect();
        let pass_to = if candidates.is_empty() {
            current
        } else {
            let index = rand::rng().random_range(0..candidates.len());
            candidates[index].id().to_owned()
        };
        self.start_non_regular_question(pass_to, now);
    }

    fn bettors(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|player| player.score > 0)
    }

    /// Bet on the auction question currently up for bidding.
    pub fn place_bet(
        &mut self,
        user_id: &str,
        amount: i64,
        now: OffsetDateTime,
    ) -> Result<(), RoomError> {
        if self.state != RoomState::Betting {
            return Err(RoomError::Conflict("can not place bet now".into()));
        }
        let player = self
            .player_mut(user_id)
            .ok_or_else(|| RoomError::Forbidden("not allowed to place bet".into()))?;
        if player.bet_amount.is_some() {
            return Err(RoomError::Conflict("can not place bet again".into()));
        }
        if amount > player.score || amount < 0 {
            return Err(RoomError::Conflict("insufficient bet size".into()));
        }
        player.bet_amount = Some(amount);

        if self.bettors().all(|player| player.bet_amount.is_some()) {
            self.resolve_bets(now);
        }
        Ok(())
    }

    /// Betting timed out: missing bets count as zero.
    pub fn place_bets_auto(&mut self, now: OffsetDateTime) {
        for player in self.players.iter_mut().filter(|player| player.score > 0) {
            player.bet_amount.get_or_insert(0);
        }
        self.resolve_bets(now);
    }

    fn resolve_bets(&mut self, now: OffsetDateTime) {
        let mut top: Option<(String, i64)> = None;
        for player in self.bettors() {
            let bet = player.bet_amount.unwrap_or(0);
            if top.as_ref().is_none_or(|(_, best)| *best < bet) {
                top = Some((player.id().to_owned(), bet));
            }
        }
        match top {
            Some((id, bet)) if bet > 0 => self.start_non_regular_question(id, now),
            _ => self.end_question(),
        }
    }

    /// Clear every per-question field and go back to the board.
    pub fn end_question(&mut self) {
        self.current_question = None;
        self.answering_player = None;
        self.allowed_to_answer.clear();
        for player in &mut self.players {
            player.bet_amount = None;
        }
        self.state = RoomState::SelectingQuestion;
    }

    /// Whether the board still has unplayed questions.
    pub fn any_available_questions(&self) -> bool {
        self.current_round_questions
            .values()
            .flatten()
            .any(|question| !question.has_been_played)
    }

    /// Enter the final round with every player holding a positive score.
    ///
    /// Returns `false` when nobody qualifies; the caller then ends the game.
    pub fn start_final_round(&mut self, pack: &Pack) -> bool {
        self.current_round_name = None;
        self.current_round_questions.clear();
        self.current_player = None;
        self.current_question = None;
        self.answering_player = None;
        self.allowed_to_answer.clear();

        let finalists: Vec<String> = self
            .bettors()
            .map(|player| player.id().to_owned())
            .collect();
        if finalists.is_empty() || pack.final_round.categories.is_empty() {
            return false;
        }

        let index = rand::rng().random_range(0..finalists.len());
        self.current_player = Some(finalists[index].clone());
        self.final_round_state = Some(FinalRoundState {
            available_categories: pack.final_round.available_categories(),
            question: None,
            players: finalists,
            players_answers: IndexMap::new(),
            timer_ends_at: None,
        });
        self.state = RoomState::SelectingFinalRoundCategory;

        if let [last] = self.available_final_round_categories().as_slice() {
            let last = last.clone();
            self.choose_final_round_category(pack, &last);
        }
        true
    }

    /// Final categories not struck yet.
    pub fn available_final_round_categories(&self) -> Vec<String> {
        self.final_round_state
            .as_ref()
            .map(|state| {
                state
                    .available_categories
                    .iter()
                    .filter(|(_, available)| **available)
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Veto a final category; the turn passes to the next finalist, wrapping around.
    pub fn remove_final_round_category(
        &mut self,
        pack: &Pack,
        user_id: &str,
        category: &str,
    ) -> Result<(), RoomError> {
        if self.state != RoomState::SelectingFinalRoundCategory {
            return Err(RoomError::Conflict(
                "cannot remove final round category now".into(),
            ));
        }
        if !self.is_current_player(user_id) && !self.is_user_host(user_id) {
            return Err(RoomError::Forbidden(
                "not allowed to remove final round category".into(),
            ));
        }
        let current = self.current_player.clone();
        let final_state = self
            .final_round_state
            .as_mut()
            .ok_or_else(|| RoomError::Conflict("final round has not started".into()))?;
        match final_state.available_categories.get_mut(category) {
            None => {
                return Err(RoomError::NotFound(format!(
                    "no final round category \"{category}\""
                )));
            }
            Some(false) => {
                return Err(RoomError::Conflict(format!(
                    "final round category \"{category}\" has already been removed"
                )));
            }
            Some(available) => *available = false,
        }

        let position = current
            .and_then(|id| final_state.players.iter().position(|player| *player == id))
            .map_or(0, |index| (index + 1) % final_state.players.len());
        self.current_player = final_state.players.get(position).cloned();

        if let [last] = self.available_final_round_categories().as_slice() {
            let last = last.clone();
            self.choose_final_round_category(pack, &last);
        }
        Ok(())
    }

    fn choose_final_round_category(&mut self, pack: &Pack, category: &str) {
        if let Some(state) = self.final_round_state.as_mut() {
            state.question = pack.final_round.question(category).cloned();
        }
        self.current_player = None;
        self.state = RoomState::FinalRoundBetting;
    }

    fn is_finalist(&self, user_id: &str) -> bool {
        self.final_round_state
            .as_ref()
            .is_some_and(|state| state.players.iter().any(|id| id == user_id))
    }

    /// A finalist bets part of their score on the final question.
    pub fn place_final_round_bet(
        &mut self,
        user_id: &str,
        amount: i64,
        now: OffsetDateTime,
    ) -> Result<(), RoomError> {
        if self.state != RoomState::FinalRoundBetting {
            return Err(RoomError::Conflict(
                "can not place final round bet now".into(),
            ));
        }
        if !self.is_finalist(user_id) {
            return Err(RoomError::Forbidden("not allowed to place bet".into()));
        }
        let player = self
            .player_mut(user_id)
            .ok_or_else(|| RoomError::NotFound(format!("no player with id \"{user_id}\" in room")))?;
        if player.bet_amount.is_some() {
            return Err(RoomError::Conflict("can not place bet again".into()));
        }
        if amount > player.score || amount < 0 {
            return Err(RoomError::Conflict("insufficient score".into()));
        }
        player.bet_amount = Some(amount);

        let all_bet = self
            .players
            .iter()
            .filter(|player| self.is_finalist(player.id()))
            .all(|player| player.bet_amount.is_some());
        if all_bet {
            self.start_final_round_question(now);
        }
        Ok(())
    }

    /// Final betting timed out: missing finalist bets count as zero.
    pub fn place_final_round_bets_auto(&mut self, now: OffsetDateTime) {
        let finalists = self
            .final_round_state
            .as_ref()
            .map(|state| state.players.clone())
            .unwrap_or_default();
        for player in self
            .players
            .iter_mut()
            .filter(|player| finalists.iter().any(|id| id == player.id()))
        {
            player.bet_amount.get_or_insert(0);
        }
        self.start_final_round_question(now);
    }

    fn start_final_round_question(&mut self, now: OffsetDateTime) {
        let remaining: Vec<String> = self
            .players
            .iter()
            .filter(|player| self.is_finalist(player.id()) && player.bet_amount.unwrap_or(0) > 0)
            .map(|player| player.id().to_owned())
            .collect();
        if remaining.is_empty() {
            self.end_game();
            return;
        }

        let deadline = now + self.options.final_thinking();
        self.allowed_to_answer = remaining.clone();
        if let Some(state) = self.final_round_state.as_mut() {
            state.players = remaining;
            state.players_answers = IndexMap::new();
            state.timer_ends_at = Some(deadline);
        }
        self.state = RoomState::ShowingFinalRoundQuestion;
    }

    /// Record a finalist's free-text answer; the last one closes the question.
    pub fn submit_final_round_answer(
        &mut self,
        user_id: &str,
        answer: String,
    ) -> Result<(), RoomError> {
        if self.state != RoomState::ShowingFinalRoundQuestion {
            return Err(RoomError::Conflict(
                "can not submit final round answer now".into(),
            ));
        }
        if !self.allowed_to_answer.iter().any(|id| id == user_id) {
            return Err(RoomError::Conflict(
                "not allowed to submit final round answer".into(),
            ));
        }
        if let Some(state) = self.final_round_state.as_mut() {
            state.players_answers.insert(user_id.to_owned(), answer);
        }
        self.allowed_to_answer.retain(|id| id != user_id);

        if self.allowed_to_answer.is_empty() {
            self.end_final_round_question();
        }
        Ok(())
    }

    /// Stop collecting final answers and start validating them in seating order.
    pub fn end_final_round_question(&mut self) {
        self.current_player = self
            .final_round_state
            .as_ref()
            .and_then(|state| state.players.first().cloned());
        self.allowed_to_answer.clear();
        self.state = RoomState::ValidatingFinalRoundAnswers;
    }

    /// Host rules on the current finalist's answer, moving their score by their bet.
    pub fn validate_final_round_answer(
        &mut self,
        user_id: &str,
        is_correct: bool,
    ) -> Result<(), RoomError> {
        if self.state != RoomState::ValidatingFinalRoundAnswers {
            return Err(RoomError::Conflict(
                "can not validate final round answer now".into(),
            ));
        }
        if !self.is_user_host(user_id) {
            return Err(RoomError::Forbidden(
                "not allowed to validate final round answer".into(),
            ));
        }
        let current = self
            .current_player
            .clone()
            .ok_or_else(|| RoomError::Conflict("no final answer to validate".into()))?;
        let player = self
            .player_mut(&current)
            .ok_or_else(|| RoomError::NotFound(format!("no player with id \"{current}\" in room")))?;
        let bet = player.bet_amount.unwrap_or(0);
        if is_correct {
            player.score += bet;
        } else {
            player.score -= bet;
        }

        let next = self.final_round_state.as_ref().and_then(|state| {
            state
                .players
                .iter()
                .position(|id| *id == current)
                .and_then(|index| state.players.get(index + 1).cloned())
        });
        match next {
            Some(next) => self.current_player = Some(next),
            None => self.end_game(),
        }
        Ok(())
    }

    /// Terminal transition.
    pub fn end_game(&mut self) {
        self.current_player = None;
        self.current_question = None;
        self.answering_player = None;
        self.allowed_to_answer.clear();
        if let Some(state) = self.final_round_state.as_mut() {
            state.timer_ends_at = None;
        }
        self.state = RoomState::GameOver;
    }
}

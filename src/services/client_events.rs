//! Actions a room member sends over their socket.

use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

use crate::{
    dto::message::{
        Event, IncomingChat, Message, PassQuestionPayload, PlaceBetPayload,
        RemoveFinalRoundCategoryPayload, SelectQuestionPayload, SubmitFinalRoundAnswerPayload,
        ValidateAnswerPayload,
    },
    error::ServiceError,
    services::{
        continuations::publish_transition,
        room_broadcasts::{to_lobby, to_room},
    },
    state::{
        SharedState,
        pack::Pack,
        room::{Room, RoomError, RoomState},
        user::User,
    },
};

/// Game action decoded from a client message.
#[derive(Debug, Clone, PartialEq)]
enum Action {
    StartGame,
    SelectQuestion { category: String, index: usize },
    SubmitAnswer,
    ValidateAnswer { is_correct: bool },
    PassQuestion { to: String },
    PlaceBet { amount: i64 },
    RemoveFinalRoundCategory { category: String },
    PlaceFinalRoundBet { amount: i64 },
    SubmitFinalRoundAnswer { answer: String },
    ValidateFinalRoundAnswer { is_correct: bool },
}

fn decode<T: DeserializeOwned>(message: &Message) -> Result<T, ServiceError> {
    message.payload().map_err(|err| {
        ServiceError::InvalidInput(format!("invalid {:?} payload: {err}", message.event))
    })
}

impl TryFrom<&Message> for Action {
    type Error = ServiceError;

    fn try_from(message: &Message) -> Result<Self, Self::Error> {
        let action = match message.event {
            Event::StartGame => Action::StartGame,
            Event::SelectQuestion => {
                let SelectQuestionPayload { category, index } = decode(message)?;
                Action::SelectQuestion { category, index }
            }
            Event::SubmitAnswer => Action::SubmitAnswer,
            Event::ValidateAnswer => {
                let ValidateAnswerPayload { is_correct } = decode(message)?;
                Action::ValidateAnswer { is_correct }
            }
            Event::PassQuestion => {
                let PassQuestionPayload { pass_to } = decode(message)?;
                Action::PassQuestion { to: pass_to }
            }
            Event::PlaceBet => {
                let PlaceBetPayload { amount } = decode(message)?;
                Action::PlaceBet { amount }
            }
            Event::RemoveFinalRoundCategory => {
                let RemoveFinalRoundCategoryPayload { category } = decode(message)?;
                Action::RemoveFinalRoundCategory { category }
            }
            Event::PlaceFinalRoundBet => {
                let PlaceBetPayload { amount } = decode(message)?;
                Action::PlaceFinalRoundBet { amount }
            }
            Event::SubmitFinalRoundAnswer => {
                let SubmitFinalRoundAnswerPayload { answer } = decode(message)?;
                Action::SubmitFinalRoundAnswer { answer }
            }
            Event::ValidateFinalRoundAnswer => {
                let ValidateAnswerPayload { is_correct } = decode(message)?;
                Action::ValidateFinalRoundAnswer { is_correct }
            }
            other => {
                return Err(ServiceError::InvalidInput(format!(
                    "unsupported event {other:?}"
                )));
            }
        };
        Ok(action)
    }
}

impl Action {
    fn apply(
        &self,
        room: &mut Room,
        user_id: &str,
        pack: &Pack,
        now: OffsetDateTime,
    ) -> Result<(), RoomError> {
        match self {
            Action::StartGame => room.start_game(user_id, pack),
            Action::SelectQuestion { category, index } => {
                room.select_question(user_id, pack, category, *index, now)
            }
            Action::SubmitAnswer => room.submit_answer(user_id, now),
            Action::ValidateAnswer { is_correct } => room.validate_answer(user_id, *is_correct, now),
            Action::PassQuestion { to } => room.pass_question(user_id, to, now),
            Action::PlaceBet { amount } => room.place_bet(user_id, *amount, now),
            Action::RemoveFinalRoundCategory { category } => {
                room.remove_final_round_category(pack, user_id, category)
            }
            Action::PlaceFinalRoundBet { amount } => {
                room.place_final_round_bet(user_id, *amount, now)
            }
            Action::SubmitFinalRoundAnswer { answer } => {
                room.submit_final_round_answer(user_id, answer.clone())
            }
            Action::ValidateFinalRoundAnswer { is_correct } => {
                room.validate_final_round_answer(user_id, *is_correct)
            }
        }
    }
}

/// Handle one message from a room member.
///
/// Chat is relayed to the room. Game actions run under the room lock, then the new state is
/// announced and the matching scheduling signal is published.
pub async fn handle(
    state: &SharedState,
    room_id: Uuid,
    user: &User,
    pack: &Pack,
    message: Message,
) -> Result<(), ServiceError> {
    if message.event == Event::Chat {
        let IncomingChat { text } = decode(&message)?;
        to_room(state, room_id, Message::chat(user.clone(), text));
        return Ok(());
    }

    let action = Action::try_from(&message)?;
    debug!(room_id = %room_id, user_id = %user.id, ?action, "client action");
    match timeout(
        state.config().continuation_timeout,
        apply(state, room_id, user, pack, action),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout),
    }
}

async fn apply(
    state: &SharedState,
    room_id: Uuid,
    user: &User,
    pack: &Pack,
    action: Action,
) -> Result<(), ServiceError> {
    let now = state.now();
    let mut before = RoomState::WaitingForStart;
    let mut ended = None;
    let room = state
        .rooms()
        .safe_set(room_id, |room| {
            before = room.state;
            ended = room
                .current_question
                .as_ref()
                .map(|current| current.question.clone());
            action.apply(room, &user.id, pack, now)?;
            Ok::<_, ServiceError>(())
        })
        .await?;

    publish_transition(state, before, &room, ended);
    if action == Action::StartGame {
        to_lobby(state, Message::room_updated(room_id));
    }
    if before == RoomState::ValidatingFinalRoundAnswers && room.state == RoomState::GameOver {
        if let Some(question) = room
            .final_round_state
            .as_ref()
            .and_then(|final_round| final_round.question.as_ref())
        {
            to_room(
                state,
                room_id,
                Message::correct_answer_demo(
                    question.correct_answer(),
                    state.config().correct_answer_demo.as_secs(),
                ),
            );
        }
    }
    Ok(())
}

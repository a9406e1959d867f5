//! Envelope exchanged over every channel and the payloads it carries.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use uuid::Uuid;

use crate::state::{
    pack::{CorrectAnswer, Question, Round},
    user::User,
};

/// Tag identifying what a [`Message`] is about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    /// Chat line, typed by a client or relayed to one.
    Chat,
    /// Client: host starts the game.
    StartGame,
    /// Internal: a regular round has begun.
    RoundStarted,
    /// Round name and categories to present.
    RoundDemo,
    /// Client: pick a question from the board.
    SelectQuestion,
    /// Internal: the reveal window is running.
    RevealingStarted,
    /// Internal: the show window is running.
    QuestionStarted,
    /// Client: buzz in.
    SubmitAnswer,
    /// Internal: a cat-in-bag question waits to be passed.
    PassingStarted,
    /// Client: hand a cat-in-bag question to another player.
    PassQuestion,
    /// Internal: an auction is open.
    BettingStarted,
    /// Client: bid on the auction question.
    PlaceBet,
    /// Internal: someone is answering.
    AnswerStarted,
    /// Client: host rules on the answer.
    ValidateAnswer,
    /// Internal: the question is over; carries its answer key.
    QuestionEnded,
    /// Answers and comment of the question that just ended.
    CorrectAnswerDemo,
    /// Client: strike a final round category.
    RemoveFinalRoundCategory,
    /// Internal: finalists are betting.
    FinalRoundBettingStarted,
    /// Client: bet on the final question.
    PlaceFinalRoundBet,
    /// Internal: the final question is on screen.
    FinalRoundQuestionStarted,
    /// Client: write the final answer.
    SubmitFinalRoundAnswer,
    /// Client: host rules on the next final answer.
    ValidateFinalRoundAnswer,
    /// Internal: the game is over.
    GameEnded,
    /// The room changed; clients get their own projection.
    RoomUpdated,
    /// The room is gone.
    RoomDeleted,
    /// Internal: a member's socket closed.
    UserDisconnected,
    /// A client action was refused.
    Error,
}

impl Event {
    /// Whether a message with this tag may be relayed from a server topic to a client.
    pub fn is_client_facing(self) -> bool {
        matches!(
            self,
            Event::Chat
                | Event::RoomUpdated
                | Event::RoundDemo
                | Event::CorrectAnswerDemo
                | Event::RoomDeleted
                | Event::Error
        )
    }
}

/// `{id, event, payload}` envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique per message.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// What the message is about.
    pub event: Event,
    /// Event-specific data, `null` for plain signals.
    #[serde(default)]
    pub payload: Value,
}

impl Message {
    /// Message without payload.
    pub fn signal(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            payload: Value::Null,
        }
    }

    /// Message carrying `payload` serialized to JSON.
    pub fn new<T: Serialize>(event: Event, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            event,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Decode the payload into the structure expected for this event.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }

    /// Ask processors to re-project room `id` for their viewer.
    pub fn room_updated(id: Uuid) -> Self {
        Self::from_payload(Event::RoomUpdated, RoomRef { id })
    }

    /// Room `id` no longer exists.
    pub fn room_deleted(id: Uuid) -> Self {
        Self::from_payload(Event::RoomDeleted, RoomRef { id })
    }

    /// Refusal sent back to the client whose action failed.
    pub fn error(error: impl ToString) -> Self {
        Self::from_payload(
            Event::Error,
            ErrorPayload {
                error: error.to_string(),
            },
        )
    }

    /// Chat line from `from`.
    pub fn chat(from: User, text: String) -> Self {
        Self::from_payload(
            Event::Chat,
            ChatPayload {
                from: Some(from),
                text,
            },
        )
    }

    /// Chat line authored by the server itself.
    pub fn system_chat(text: String) -> Self {
        Self::from_payload(Event::Chat, ChatPayload { from: None, text })
    }

    /// Presentation of a round that just started.
    pub fn round_demo(round: &Round) -> Self {
        Self::from_payload(
            Event::RoundDemo,
            RoundDemoPayload {
                name: round.name.clone(),
                categories: round.category_names(),
            },
        )
    }

    /// Reveal of an answer, on screen for `duration` seconds.
    pub fn correct_answer_demo(answer: CorrectAnswer, duration: u64) -> Self {
        Self::from_payload(
            Event::CorrectAnswerDemo,
            CorrectAnswerDemoPayload {
                answers: answer.answers,
                comment: answer.comment,
                duration,
            },
        )
    }

    /// Scheduling signal for a finished question.
    pub fn question_ended(question: Question) -> Self {
        Self::from_payload(Event::QuestionEnded, QuestionEndedPayload { question })
    }

    /// Scheduling signal for a closed member socket.
    pub fn user_disconnected(user_id: String) -> Self {
        Self::from_payload(Event::UserDisconnected, UserDisconnectedPayload { user_id })
    }

    /// Build from a payload type whose serialization cannot fail.
    fn from_payload<T: Serialize>(event: Event, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }
}

/// Payload naming a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomRef {
    /// Room identifier.
    pub id: Uuid,
}

/// Payload of [`Event::Error`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    /// Reason the action was refused.
    pub error: String,
}

/// Payload of a chat line sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatPayload {
    /// `None` for system messages.
    pub from: Option<User>,
    /// Message body.
    pub text: String,
}

/// Chat line as typed by a client; the sender is attached by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingChat {
    /// Message body.
    pub text: String,
}

/// Payload of [`Event::RoundDemo`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundDemoPayload {
    /// Round name.
    pub name: String,
    /// Category names in board order.
    pub categories: Vec<String>,
}

/// Payload of [`Event::CorrectAnswerDemo`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorrectAnswerDemoPayload {
    /// Accepted answers.
    pub answers: Vec<String>,
    /// Trivia shown with the answer.
    pub comment: Option<String>,
    /// Seconds the answer stays on screen.
    pub duration: u64,
}

/// Internal only: carries the answer key of the question that just ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionEndedPayload {
    /// The question, answer key included.
    pub question: Question,
}

/// Payload of [`Event::UserDisconnected`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserDisconnectedPayload {
    /// Member whose socket closed.
    pub user_id: String,
}

/// Payload of [`Event::SelectQuestion`].
#[derive(Debug, Clone, Deserialize)]
pub struct SelectQuestionPayload {
    /// Category on the current board.
    pub category: String,
    /// Question index within the category.
    pub index: usize,
}

/// Payload of [`Event::ValidateAnswer`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateAnswerPayload {
    /// Host's verdict.
    pub is_correct: bool,
}

/// Payload of [`Event::PassQuestion`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassQuestionPayload {
    /// Player receiving the question.
    pub pass_to: String,
}

/// Payload of [`Event::PlaceBet`] and [`Event::PlaceFinalRoundBet`].
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceBetPayload {
    /// Points at stake.
    pub amount: i64,
}

/// Payload of [`Event::RemoveFinalRoundCategory`].
#[derive(Debug, Clone, Deserialize)]
pub struct RemoveFinalRoundCategoryPayload {
    /// Category to strike.
    pub category: String,
}

/// Payload of [`Event::SubmitFinalRoundAnswer`].
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitFinalRoundAnswerPayload {
    /// Free-text answer.
    pub answer: String,
}

//! Room creation, listing and join bodies.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use crate::state::room::{PrivacyType, RoomOptions};

/// Payload used to open a new room.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_private_password"))]
pub struct CreateRoomRequest {
    /// Display name shown in the lobby.
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    /// Pack the game is played with.
    #[validate(length(min = 1))]
    pub pack_id: String,
    /// Game settings.
    #[validate(nested)]
    pub options: RoomOptionsInput,
}

/// Room settings as submitted by the creator.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomOptionsInput {
    /// Seats for players, the host not included.
    #[validate(range(min = 1, max = 10))]
    pub max_players: usize,
    /// Whether joining needs a password.
    #[serde(rename = "type")]
    pub privacy: PrivacyType,
    /// Required when the room is private.
    #[validate(length(min = 4, max = 16))]
    #[serde(default)]
    pub password: Option<String>,
    /// Seconds to buzz in once a question is shown.
    #[validate(range(min = 1, max = 30))]
    pub question_thinking_time: u64,
    /// Seconds to answer after buzzing in.
    #[validate(range(min = 1, max = 30))]
    pub answer_thinking_time: u64,
    /// Seconds to write the final round answer.
    #[validate(range(min = 1, max = 120))]
    pub question_thinking_time_final: u64,
    /// Allow buzzing in while the question is still being revealed.
    #[serde(default)]
    pub false_start_allowed: bool,
}

fn validate_private_password(request: &CreateRoomRequest) -> Result<(), ValidationError> {
    if request.options.privacy == PrivacyType::Private && request.options.password.is_none() {
        let mut err = ValidationError::new("password_required");
        err.message = Some("Private rooms need a password".into());
        return Err(err);
    }
    Ok(())
}

impl From<RoomOptionsInput> for RoomOptions {
    fn from(input: RoomOptionsInput) -> Self {
        Self {
            max_players: input.max_players,
            privacy: input.privacy,
            // Public rooms never carry a password.
            password: input
                .password
                .filter(|_| input.privacy == PrivacyType::Private),
            question_thinking_time: input.question_thinking_time,
            answer_thinking_time: input.answer_thinking_time,
            question_thinking_time_final: input.question_thinking_time_final,
            false_start_allowed: input.false_start_allowed,
        }
    }
}

/// Optional password presented when joining or viewing a private room.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PasswordInput {
    /// Password of the room, if it has one.
    #[serde(default)]
    pub password: Option<String>,
}

/// Acknowledgement returned by actions without a meaningful body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    /// Human-readable outcome.
    pub message: String,
}

impl ActionResponse {
    /// Wrap a confirmation message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

//! Users and the seats they take in a room.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Actor id used when the server itself drives a transition (timeouts, auto-validation).
pub const SYSTEM: &str = "SYSTEM";

/// Identity resolved by the transport layer for every connected caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct User {
    /// Opaque identifier issued by the session layer.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional avatar URL.
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Host seat of a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    /// Seated user.
    #[serde(flatten)]
    pub user: User,
    /// Whether the host socket is attached.
    pub is_connected: bool,
}

impl Host {
    /// Seat a user as host, disconnected until their socket attaches.
    pub fn new(user: User) -> Self {
        Self {
            user,
            is_connected: false,
        }
    }
}

/// Player seat of a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Seated user.
    #[serde(flatten)]
    pub user: User,
    /// Signed score, never clamped.
    pub score: i64,
    /// Bet for the current auction question or the final round; cleared when a question ends.
    pub bet_amount: Option<i64>,
    /// Whether the player socket is attached.
    pub is_connected: bool,
}

impl Player {
    /// Seat a user as player with a zero score.
    pub fn new(user: User) -> Self {
        Self {
            user,
            score: 0,
            bet_amount: None,
            is_connected: false,
        }
    }

    /// Id of the seated user.
    pub fn id(&self) -> &str {
        &self.user.id
    }
}

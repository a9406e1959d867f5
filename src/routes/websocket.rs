use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::message::Message,
    error::ServiceError,
    realtime::{Channel, WsChannel},
    routes::caller::Caller,
    services::{lobby_events, room_events},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/ws/lobby",
    tag = "sockets",
    responses((status = 101, description = "Switching protocols to the lobby socket"))
)]
/// Upgrade into a lobby session: room list updates and lobby chat.
pub async fn lobby_socket(
    State(state): State<SharedState>,
    Caller(user): Caller,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let channel = Arc::new(WsChannel::new(socket));
        let result = lobby_events::serve(state, user, channel.clone()).await;
        finish(channel, result).await;
    })
}

#[utoipa::path(
    get,
    path = "/ws/rooms/{id}",
    tag = "sockets",
    params(("id" = Uuid, Path, description = "Room identifier")),
    responses((status = 101, description = "Switching protocols to the room socket"))
)]
/// Upgrade into a room session for a seated member.
pub async fn room_socket(
    State(state): State<SharedState>,
    Caller(user): Caller,
    Path(id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let channel = Arc::new(WsChannel::new(socket));
        let result = room_events::serve(state, id, user, channel.clone()).await;
        finish(channel, result).await;
    })
}

/// Report a refused session to the client, then flush and close the socket.
async fn finish(channel: Arc<WsChannel>, result: Result<(), ServiceError>) {
    if let Err(err) = result {
        warn!(error = %err, "socket session refused");
        if let Err(send_err) = channel.send(Message::error(&err)).await {
            debug!(error = %send_err, "could not report refusal to the client");
        }
    }
    channel.finalize().await;
}

/// Configure the WebSocket endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/ws/lobby", get(lobby_socket))
        .route("/ws/rooms/{id}", get(room_socket))
}

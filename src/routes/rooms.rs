use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::room::{ActionResponse, CreateRoomRequest, PasswordInput},
    error::AppError,
    routes::caller::Caller,
    services::room_service,
    state::{
        SharedState,
        projection::{LobbyRoomView, RoomView},
    },
};

/// Room lifecycle endpoints. Game actions go through the room socket.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/archived", get(archived_rooms))
        .route("/rooms/{id}", get(get_room))
        .route("/rooms/{id}/join", post(join_room))
        .route("/rooms/{id}/leave", post(leave_room))
}

/// Lobby summaries of every live room.
#[utoipa::path(
    get,
    path = "/rooms",
    tag = "rooms",
    responses((status = 200, description = "Live rooms", body = [LobbyRoomView]))
)]
pub async fn list_rooms(
    State(state): State<SharedState>,
    _caller: Caller,
) -> Result<Json<Vec<LobbyRoomView>>, AppError> {
    Ok(Json(room_service::list(&state).await?))
}

/// Open a new room; the caller becomes its creator and may take the host seat.
#[utoipa::path(
    post,
    path = "/rooms",
    tag = "rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 200, description = "Room created", body = RoomView),
        (status = 400, description = "Invalid room settings"),
        (status = 404, description = "Unknown pack")
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    Caller(user): Caller,
    Valid(Json(payload)): Valid<Json<CreateRoomRequest>>,
) -> Result<Json<RoomView>, AppError> {
    Ok(Json(room_service::create(&state, &user, payload).await?))
}

/// Rooms the caller created that have been archived.
#[utoipa::path(
    get,
    path = "/rooms/archived",
    tag = "rooms",
    responses(
        (status = 200, description = "Archived rooms", body = [RoomView]),
        (status = 503, description = "Archive unavailable")
    )
)]
pub async fn archived_rooms(
    State(state): State<SharedState>,
    Caller(user): Caller,
) -> Result<Json<Vec<RoomView>>, AppError> {
    Ok(Json(room_service::archived_by(&state, &user).await?))
}

/// Room projected for the caller; outsiders need the password of a private room.
#[utoipa::path(
    get,
    path = "/rooms/{id}",
    tag = "rooms",
    params(("id" = Uuid, Path, description = "Room identifier"), PasswordInput),
    responses(
        (status = 200, description = "Room", body = RoomView),
        (status = 403, description = "Wrong password"),
        (status = 404, description = "Unknown room")
    )
)]
pub async fn get_room(
    State(state): State<SharedState>,
    Caller(user): Caller,
    Path(id): Path<Uuid>,
    Query(input): Query<PasswordInput>,
) -> Result<Json<RoomView>, AppError> {
    let room = room_service::projection(&state, &user, id, input.password.as_deref()).await?;
    Ok(Json(room))
}

/// Take a seat in the room.
#[utoipa::path(
    post,
    path = "/rooms/{id}/join",
    tag = "rooms",
    params(("id" = Uuid, Path, description = "Room identifier"), PasswordInput),
    responses(
        (status = 200, description = "Seated", body = RoomView),
        (status = 403, description = "Banned or wrong password"),
        (status = 409, description = "Room is full")
    )
)]
pub async fn join_room(
    State(state): State<SharedState>,
    Caller(user): Caller,
    Path(id): Path<Uuid>,
    Query(input): Query<PasswordInput>,
) -> Result<Json<RoomView>, AppError> {
    let room = room_service::join(&state, &user, id, input.password.as_deref()).await?;
    Ok(Json(room))
}

/// Give the seat back before the game starts.
#[utoipa::path(
    post,
    path = "/rooms/{id}/leave",
    tag = "rooms",
    params(("id" = Uuid, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Left the room", body = ActionResponse),
        (status = 409, description = "Game already started")
    )
)]
pub async fn leave_room(
    State(state): State<SharedState>,
    Caller(user): Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>, AppError> {
    room_service::leave(&state, &user, id).await?;
    Ok(Json(ActionResponse::new("left the room")))
}

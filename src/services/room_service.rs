//! Room lifecycle outside of the game itself: creation, seats and listings.

use tracing::info;
use uuid::Uuid;

use crate::{
    dto::room::CreateRoomRequest,
    error::ServiceError,
    services::{
        room_broadcasts::broadcast_room_updated_everywhere, room_events::spawn_scheduler,
    },
    state::{
        SharedState,
        projection::{LobbyRoomView, RoomView},
        room::{PrivacyType, Room, RoomState},
        user::{Host, Player, User},
    },
};

/// Open a room waiting for its host and spawn its scheduler.
pub async fn create(
    state: &SharedState,
    user: &User,
    request: CreateRoomRequest,
) -> Result<RoomView, ServiceError> {
    let pack = state.packs().get(request.pack_id).await?;
    let room = Room::new(
        Uuid::new_v4(),
        request.name,
        pack.preview(),
        request.options.into(),
        user.id.clone(),
    );
    state.rooms().set(&room).await?;
    spawn_scheduler(state.clone(), room.id);

    info!(room_id = %room.id, user_id = %user.id, pack_id = %pack.id, "room created");
    broadcast_room_updated_everywhere(state, room.id);
    Ok(room.project(&user.id))
}

fn check_password(room: &Room, password: Option<&str>) -> Result<(), ServiceError> {
    if room.options.privacy == PrivacyType::Private
        && room.options.password.as_deref() != password
    {
        return Err(ServiceError::Forbidden("wrong room password".into()));
    }
    Ok(())
}

/// Room as the caller is allowed to see it.
pub async fn projection(
    state: &SharedState,
    user: &User,
    room_id: Uuid,
    password: Option<&str>,
) -> Result<RoomView, ServiceError> {
    let room = state.rooms().get_by_id(room_id).await?;
    if !room.is_user_in(&user.id) {
        check_password(&room, password)?;
    }
    Ok(room.project(&user.id))
}

/// Take a seat: the creator gets the empty host seat, everyone else a player seat.
pub async fn join(
    state: &SharedState,
    user: &User,
    room_id: Uuid,
    password: Option<&str>,
) -> Result<RoomView, ServiceError> {
    let mut joined = false;
    let room = state
        .rooms()
        .safe_set(room_id, |room| {
            if room.is_user_in(&user.id) {
                return Ok(());
            }
            if room.is_user_banned(&user.id) {
                return Err(ServiceError::Forbidden("user is banned".into()));
            }
            check_password(room, password)?;

            let full = room.players.len() >= room.options.max_players;
            let can_be_host = room.created_by == user.id && room.host.is_none();
            if full && !can_be_host {
                return Err(ServiceError::Conflict("the room is already full".into()));
            }
            if can_be_host {
                room.host = Some(Host::new(user.clone()));
            } else {
                room.players.push(Player::new(user.clone()));
            }
            joined = true;
            Ok(())
        })
        .await?;

    if joined {
        info!(room_id = %room_id, user_id = %user.id, "user joined room");
        broadcast_room_updated_everywhere(state, room_id);
    }
    Ok(room.project(&user.id))
}

/// Give the seat back; only possible before the game starts.
pub async fn leave(state: &SharedState, user: &User, room_id: Uuid) -> Result<(), ServiceError> {
    state
        .rooms()
        .safe_set(room_id, |room| {
            if !room.is_user_in(&user.id) {
                return Err(ServiceError::Forbidden("user is not in the room".into()));
            }
            if room.state != RoomState::WaitingForStart {
                return Err(ServiceError::Conflict(
                    "can not leave a room once the game has started".into(),
                ));
            }
            if room.is_user_host(&user.id) {
                room.host = None;
            } else {
                room.players.retain(|player| player.id() != user.id);
            }
            Ok(())
        })
        .await?;

    info!(room_id = %room_id, user_id = %user.id, "user left room");
    broadcast_room_updated_everywhere(state, room_id);
    Ok(())
}

/// Attach a live socket: cancel any pending idle expiry and mark the seat connected.
pub async fn connect(state: &SharedState, user: &User, room_id: Uuid) -> Result<Room, ServiceError> {
    state.rooms().persist(room_id).await?;
    state
        .rooms()
        .safe_set(room_id, |room| {
            if room.set_connected(&user.id, true) {
                Ok(())
            } else {
                Err(ServiceError::Forbidden("user is not in the room".into()))
            }
        })
        .await
}

/// Lobby view of every public room.
pub async fn list(state: &SharedState) -> Result<Vec<LobbyRoomView>, ServiceError> {
    Ok(state.rooms().list().await?)
}

/// Archived rooms the caller created.
pub async fn archived_by(state: &SharedState, user: &User) -> Result<Vec<RoomView>, ServiceError> {
    let archive = state.require_archive().await?;
    let rooms = archive.list_created_by(user.id.clone()).await?;
    Ok(rooms.iter().map(|room| room.project(&user.id)).collect())
}

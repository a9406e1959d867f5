use uuid::Uuid;

use crate::{
    dto::message::Message,
    realtime::topics::{LOBBY_TOPIC, internal_topic, room_topic},
    state::SharedState,
};

/// Publish to everyone connected to the room.
pub fn to_room(state: &SharedState, room_id: Uuid, message: Message) {
    state.topics().publish(&room_topic(room_id), message);
}

/// Publish a scheduling signal to the room's internal topic.
pub fn to_internal(state: &SharedState, room_id: Uuid, message: Message) {
    state.topics().publish(&internal_topic(room_id), message);
}

/// Publish on the lobby topic.
pub fn to_lobby(state: &SharedState, message: Message) {
    state.topics().publish(LOBBY_TOPIC, message);
}

/// Tell room members the room changed; each processor re-projects it for its viewer.
pub fn broadcast_room_updated(state: &SharedState, room_id: Uuid) {
    to_room(state, room_id, Message::room_updated(room_id));
}

/// Same as [`broadcast_room_updated`], also refreshing the lobby listing.
pub fn broadcast_room_updated_everywhere(state: &SharedState, room_id: Uuid) {
    broadcast_room_updated(state, room_id);
    to_lobby(state, Message::room_updated(room_id));
}

/// Announce the room is gone to the lobby, its members and its scheduler.
pub fn broadcast_room_deleted(state: &SharedState, room_id: Uuid) {
    to_lobby(state, Message::room_deleted(room_id));
    to_room(state, room_id, Message::room_deleted(room_id));
    to_internal(state, room_id, Message::room_deleted(room_id));
}

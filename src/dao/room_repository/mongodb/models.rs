use mongodb::bson::{DateTime, doc, Document};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::room::Room;

/// Archived room as stored in the `rooms` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoRoomDocument {
    #[serde(rename = "_id")]
    id: String,
    created_by: String,
    archived_at: DateTime,
    room: Room,
}

impl From<Room> for MongoRoomDocument {
    fn from(room: Room) -> Self {
        Self {
            id: room.id.to_string(),
            created_by: room.created_by.clone(),
            archived_at: DateTime::now(),
            room,
        }
    }
}

impl From<MongoRoomDocument> for Room {
    fn from(document: MongoRoomDocument) -> Self {
        document.room
    }
}

/// Filter matching the document of room `id`.
pub fn doc_id(id: Uuid) -> Document {
    doc! { "_id": id.to_string() }
}

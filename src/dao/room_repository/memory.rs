use std::sync::Arc;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::RoomRepository;
use crate::{dao::storage::StorageResult, state::room::Room};

/// In-process archive used when no MongoDB URI is configured.
#[derive(Clone, Default)]
pub struct MemoryRoomRepository {
    rooms: Arc<RwLock<IndexMap<Uuid, Room>>>,
}

impl MemoryRoomRepository {
    /// Empty archive.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoomRepository for MemoryRoomRepository {
    fn archive(&self, room: Room) -> BoxFuture<'static, StorageResult<()>> {
        let rooms = self.rooms.clone();
        Box::pin(async move {
            rooms.write().await.insert(room.id, room);
            Ok(())
        })
    }

    fn list_created_by(&self, user_id: String) -> BoxFuture<'static, StorageResult<Vec<Room>>> {
        let rooms = self.rooms.clone();
        Box::pin(async move {
            Ok(rooms
                .read()
                .await
                .values()
                .filter(|room| room.created_by == user_id)
                .cloned()
                .collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::fixtures::room_with_players;

    #[tokio::test]
    async fn archive_upserts_by_id() {
        let repository = MemoryRoomRepository::new();
        let mut room = room_with_players(1);
        repository.archive(room.clone()).await.unwrap();
        room.players[0].score = 500;
        repository.archive(room.clone()).await.unwrap();
        repository.archive(room_with_players(2)).await.unwrap();

        let archived = repository.list_created_by("host".into()).await.unwrap();
        assert_eq!(archived.len(), 2);
        assert_eq!(archived[0], room);
        assert!(repository
            .list_created_by("someone".into())
            .await
            .unwrap()
            .is_empty());
    }
}

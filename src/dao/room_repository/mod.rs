//! Durable archive of finished or abandoned rooms.

mod memory;
/// MongoDB-backed archive.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

pub use memory::MemoryRoomRepository;

use crate::{dao::storage::StorageResult, state::room::Room};

/// Abstraction over the document database rooms are archived to.
pub trait RoomRepository: Send + Sync {
    /// Upsert the room document keyed by its id.
    fn archive(&self, room: Room) -> BoxFuture<'static, StorageResult<()>>;
    /// Archived rooms created by the given user, oldest first.
    fn list_created_by(&self, user_id: String) -> BoxFuture<'static, StorageResult<Vec<Room>>>;
    /// Check the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

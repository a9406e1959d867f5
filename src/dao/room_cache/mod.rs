//! Contract of the shared key/value cache holding live rooms.
//!
//! Every server instance talks to the same cache, so the per-key lock offered here is the only
//! thing serializing room mutations across processes.

mod memory;

use std::time::Duration;

use futures::future::BoxFuture;
use uuid::Uuid;

pub use memory::MemoryRoomCache;

use crate::{dao::storage::StorageResult, state::room::Room};

/// Key/value store with TTLs and an advisory lock primitive.
pub trait RoomCache: Send + Sync {
    /// Value under `key`, if present and not expired.
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<Room>>>;
    /// Write the room, keeping any TTL already set on the key.
    fn put(&self, key: &str, room: Room) -> BoxFuture<'static, StorageResult<()>>;
    /// Write the room and drop any TTL.
    fn insert(&self, key: &str, room: Room) -> BoxFuture<'static, StorageResult<()>>;
    /// Every live room whose key starts with `prefix`.
    fn scan(&self, prefix: &str) -> BoxFuture<'static, StorageResult<Vec<Room>>>;
    /// Remove `key`; `true` when something was removed.
    fn delete(&self, key: &str) -> BoxFuture<'static, StorageResult<bool>>;
    /// Make the key disappear once `ttl` elapses. Returns `false` if the key does not exist.
    fn expire(&self, key: &str, ttl: Duration) -> BoxFuture<'static, StorageResult<bool>>;
    /// Clear a pending TTL. Returns `false` if the key does not exist.
    fn persist(&self, key: &str) -> BoxFuture<'static, StorageResult<bool>>;
    /// Take the lock named `key` for `ttl` unless someone else holds it.
    fn try_lock(
        &self,
        key: &str,
        token: Uuid,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Release the lock if `token` still owns it.
    fn unlock(&self, key: &str, token: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
}

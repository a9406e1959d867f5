//! Locked read-modify-write access to live rooms.

use std::{sync::Arc, time::Duration};

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::{
        room_cache::RoomCache,
        storage::{StorageError, StorageResult},
    },
    state::{projection::LobbyRoomView, room::Room},
};

const ROOM_KEY_PREFIX: &str = "room:";

fn room_key(id: Uuid) -> String {
    format!("{ROOM_KEY_PREFIX}{id}")
}

fn lock_key(id: Uuid) -> String {
    format!("lock:{ROOM_KEY_PREFIX}{id}")
}

/// Timings of the per-room lock.
#[derive(Debug, Clone, Copy)]
pub struct LockSettings {
    /// How long a lock survives a crashed holder.
    pub ttl: Duration,
    /// Pause between acquisition attempts while the lock is contended.
    pub poll_interval: Duration,
    /// Give up waiting after this long.
    pub wait_timeout: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
            wait_timeout: Duration::from_secs(5),
        }
    }
}

/// Room access on top of a shared [`RoomCache`].
#[derive(Clone)]
pub struct RoomStore {
    cache: Arc<dyn RoomCache>,
    lock: LockSettings,
}

impl RoomStore {
    /// Store over `cache`, locking rooms per `lock`.
    pub fn new(cache: Arc<dyn RoomCache>, lock: LockSettings) -> Self {
        Self { cache, lock }
    }

    /// Fetch a live room.
    pub async fn get_by_id(&self, id: Uuid) -> StorageResult<Room> {
        let key = room_key(id);
        self.cache
            .get(&key)
            .await?
            .ok_or_else(|| StorageError::not_found(key))
    }

    /// Lobby summaries of every live room.
    pub async fn list(&self) -> StorageResult<Vec<LobbyRoomView>> {
        let rooms = self.cache.scan(ROOM_KEY_PREFIX).await?;
        Ok(rooms.iter().map(Room::lobby_view).collect())
    }

    /// Unconditional overwrite; only used when the room is created.
    pub async fn set(&self, room: &Room) -> StorageResult<()> {
        self.cache.insert(&room_key(room.id), room.clone()).await
    }

    /// Apply `mutate` to the stored room while holding its lock and return the result.
    ///
    /// A mutation error aborts the write and is returned unchanged. Dropping the returned future
    /// while it waits for the lock abandons the attempt.
    pub async fn safe_set<E, F>(&self, id: Uuid, mutate: F) -> Result<Room, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut Room) -> Result<(), E>,
    {
        let lock = lock_key(id);
        let token = Uuid::new_v4();
        self.acquire(&lock, token).await?;

        let outcome = self.mutate(id, mutate).await;

        match self.cache.unlock(&lock, token).await {
            Ok(true) => {}
            Ok(false) => warn!(room_id = %id, "room lock expired before release"),
            Err(err) => warn!(room_id = %id, error = %err, "failed to release room lock"),
        }
        outcome
    }

    async fn acquire(&self, lock: &str, token: Uuid) -> StorageResult<()> {
        let attempt = async {
            loop {
                if self.cache.try_lock(lock, token, self.lock.ttl).await? {
                    return Ok::<(), StorageError>(());
                }
                sleep(self.lock.poll_interval).await;
            }
        };
        match timeout(self.lock.wait_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => {
                debug!(lock, "gave up waiting for room lock");
                Err(StorageError::LockTimeout {
                    key: lock.to_owned(),
                })
            }
        }
    }

    async fn mutate<E, F>(&self, id: Uuid, mutate: F) -> Result<Room, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut Room) -> Result<(), E>,
    {
        let mut room = self.get_by_id(id).await?;
        mutate(&mut room)?;
        debug_assert!(
            room.is_consistent(),
            "room {id} left in {:?} with mismatched phase data",
            room.state
        );
        self.cache.put(&room_key(id), room.clone()).await?;
        Ok(room)
    }

    /// Drop a live room; `false` when it was already gone.
    pub async fn delete(&self, id: Uuid) -> StorageResult<bool> {
        self.cache.delete(&room_key(id)).await
    }

    /// Schedule the room for removal unless [`RoomStore::persist`] is called first.
    pub async fn expire(&self, id: Uuid, ttl: Duration) -> StorageResult<bool> {
        self.cache.expire(&room_key(id), ttl).await
    }

    /// Clear the expiry of a live room. `false` when it is missing.
    pub async fn persist(&self, id: Uuid) -> StorageResult<bool> {
        self.cache.persist(&room_key(id)).await
    }
}

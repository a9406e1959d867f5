use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use tokio::time::Instant;
use uuid::Uuid;

use super::RoomCache;
use crate::{dao::storage::StorageResult, state::room::Room};

struct CachedRoom {
    room: Room,
    expires_at: Option<Instant>,
}

impl CachedRoom {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

struct HeldLock {
    token: Uuid,
    expires_at: Instant,
}

/// Process-local [`RoomCache`] backed by [`DashMap`]; expired keys are reaped lazily on access.
#[derive(Clone, Default)]
pub struct MemoryRoomCache {
    rooms: Arc<DashMap<String, CachedRoom>>,
    locks: Arc<DashMap<String, HeldLock>>,
}

impl MemoryRoomCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn live_entry(&self, key: &str) -> Option<Room> {
        let now = Instant::now();
        let entry = self.rooms.get(key)?;
        if entry.is_live(now) {
            return Some(entry.room.clone());
        }
        drop(entry);
        self.rooms.remove_if(key, |_, cached| !cached.is_live(now));
        None
    }

    fn write(&self, key: &str, room: Room, keep_ttl: bool) {
        let now = Instant::now();
        match self.rooms.entry(key.to_owned()) {
            Entry::Occupied(mut entry) => {
                let expires_at = entry
                    .get()
                    .expires_at
                    .filter(|_| keep_ttl && entry.get().is_live(now));
                entry.insert(CachedRoom { room, expires_at });
            }
            Entry::Vacant(entry) => {
                entry.insert(CachedRoom {
                    room,
                    expires_at: None,
                });
            }
        }
    }

    fn set_ttl(&self, key: &str, expires_at: Option<Instant>) -> bool {
        let now = Instant::now();
        match self.rooms.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => {
                entry.expires_at = expires_at;
                true
            }
            _ => false,
        }
    }
}

impl RoomCache for MemoryRoomCache {
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<Room>>> {
        let room = self.live_entry(key);
        Box::pin(async move { Ok(room) })
    }

    fn put(&self, key: &str, room: Room) -> BoxFuture<'static, StorageResult<()>> {
        self.write(key, room, true);
        Box::pin(async { Ok(()) })
    }

    fn insert(&self, key: &str, room: Room) -> BoxFuture<'static, StorageResult<()>> {
        self.write(key, room, false);
        Box::pin(async { Ok(()) })
    }

    fn scan(&self, prefix: &str) -> BoxFuture<'static, StorageResult<Vec<Room>>> {
        let now = Instant::now();
        self.rooms.retain(|_, cached| cached.is_live(now));
        let rooms = self
            .rooms
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.room.clone())
            .collect();
        Box::pin(async move { Ok(rooms) })
    }

    fn delete(&self, key: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let now = Instant::now();
        let removed = self
            .rooms
            .remove(key)
            .is_some_and(|(_, cached)| cached.is_live(now));
        Box::pin(async move { Ok(removed) })
    }

    fn expire(&self, key: &str, ttl: Duration) -> BoxFuture<'static, StorageResult<bool>> {
        let updated = self.set_ttl(key, Some(Instant::now() + ttl));
        Box::pin(async move { Ok(updated) })
    }

    fn persist(&self, key: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let updated = self.set_ttl(key, None);
        Box::pin(async move { Ok(updated) })
    }

    fn try_lock(
        &self,
        key: &str,
        token: Uuid,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let now = Instant::now();
        let lock = HeldLock {
            token,
            expires_at: now + ttl,
        };
        let acquired = match self.locks.entry(key.to_owned()) {
            Entry::Occupied(mut entry) if entry.get().expires_at <= now => {
                entry.insert(lock);
                true
            }
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(lock);
                true
            }
        };
        Box::pin(async move { Ok(acquired) })
    }

    fn unlock(&self, key: &str, token: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let released = self
            .locks
            .remove_if(key, |_, held| held.token == token)
            .is_some();
        Box::pin(async move { Ok(released) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::fixtures::room_with_players;

    #[tokio::test(start_paused = true)]
    async fn expired_keys_disappear_and_persist_cancels_expiry() {
        let cache = MemoryRoomCache::new();
        cache.insert("room:a", room_with_players(1)).await.unwrap();
        cache.insert("room:b", room_with_players(1)).await.unwrap();

        assert!(cache.expire("room:a", Duration::from_secs(5)).await.unwrap());
        assert!(cache.expire("room:b", Duration::from_secs(5)).await.unwrap());
        assert!(cache.persist("room:b").await.unwrap());
        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(cache.get("room:a").await.unwrap().is_none());
        assert!(cache.get("room:b").await.unwrap().is_some());
        assert!(!cache.persist("room:a").await.unwrap());
        assert_eq!(cache.scan("room:").await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn put_keeps_ttl_and_insert_clears_it() {
        let cache = MemoryRoomCache::new();
        let room = room_with_players(1);
        cache.insert("room:a", room.clone()).await.unwrap();
        cache.expire("room:a", Duration::from_secs(5)).await.unwrap();
        cache.put("room:a", room.clone()).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.get("room:a").await.unwrap().is_none());

        cache.insert("room:a", room.clone()).await.unwrap();
        cache.expire("room:a", Duration::from_secs(5)).await.unwrap();
        cache.insert("room:a", room).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.get("room:a").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn lock_is_exclusive_until_released_or_expired() {
        let cache = MemoryRoomCache::new();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        let ttl = Duration::from_secs(1);

        assert!(cache.try_lock("lock", first, ttl).await.unwrap());
        assert!(!cache.try_lock("lock", second, ttl).await.unwrap());
        assert!(!cache.unlock("lock", second).await.unwrap());
        assert!(cache.unlock("lock", first).await.unwrap());
        assert!(cache.try_lock("lock", second, ttl).await.unwrap());

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert!(cache.try_lock("lock", first, ttl).await.unwrap());
    }
}

//! Shared application state and the room domain.

#[cfg(test)]
pub(crate) mod fixtures;
pub mod pack;
pub mod projection;
pub mod room;
pub mod user;

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::{
    sync::{RwLock, watch},
    time::Instant,
};

use crate::{
    config::AppConfig,
    dao::{
        pack_store::PackStore, room_cache::RoomCache, room_repository::RoomRepository,
        room_store::RoomStore,
    },
    error::ServiceError,
    realtime::TopicHub,
};

/// Handle shared by every handler and task.
pub type SharedState = Arc<AppState>;

/// Central application state: live rooms, topics, packs and the archive handle.
pub struct AppState {
    rooms: RoomStore,
    topics: TopicHub,
    packs: Arc<dyn PackStore>,
    archive: RwLock<Option<Arc<dyn RoomRepository>>>,
    degraded: watch::Sender<bool>,
    config: AppConfig,
    started_at: OffsetDateTime,
    started: Instant,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until an archive backend is installed.
    pub fn new(
        config: AppConfig,
        cache: Arc<dyn RoomCache>,
        packs: Arc<dyn PackStore>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            rooms: RoomStore::new(cache, config.lock),
            topics: TopicHub::default(),
            packs,
            archive: RwLock::new(None),
            degraded: degraded_tx,
            config,
            started_at: OffsetDateTime::now_utc(),
            started: Instant::now(),
        })
    }

    /// Live room storage.
    pub fn rooms(&self) -> &RoomStore {
        &self.rooms
    }

    /// Broadcast topics.
    pub fn topics(&self) -> &TopicHub {
        &self.topics
    }

    /// Question packs.
    pub fn packs(&self) -> &Arc<dyn PackStore> {
        &self.packs
    }

    /// Loaded configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Wall-clock time advanced by the runtime's monotonic clock, so room deadlines and the
    /// timers sleeping until them share one time base.
    pub fn now(&self) -> OffsetDateTime {
        self.started_at + self.started.elapsed()
    }

    /// Obtain a handle to the archive, if one is installed.
    pub async fn archive(&self) -> Option<Arc<dyn RoomRepository>> {
        let guard = self.archive.read().await;
        guard.as_ref().cloned()
    }

    /// Archive handle or [`ServiceError::Degraded`].
    pub async fn require_archive(&self) -> Result<Arc<dyn RoomRepository>, ServiceError> {
        self.archive().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new archive implementation and leave degraded mode.
    pub async fn install_archive(&self, archive: Arc<dyn RoomRepository>) {
        {
            let mut guard = self.archive.write().await;
            *guard = Some(archive);
        }
        self.update_degraded(false);
    }

    /// Remove the current archive and enter degraded mode.
    pub async fn clear_archive(&self) {
        {
            let mut guard = self.archive.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}

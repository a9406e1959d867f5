use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{room_repository::RoomRepository, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the room archive and keep the shared state in degraded mode while it is unavailable.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn RoomRepository>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(archive) => {
                state.install_archive(archive.clone()).await;
                info!("archive connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                if !watch_archive(&state, archive.as_ref()).await {
                    warn!("exhausted archive reconnect attempts; staying in degraded mode");
                    state.clear_archive().await;
                }
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "archive connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Poll the archive's health until it fails and cannot be revived. Returns `false` at that point.
async fn watch_archive(state: &SharedState, archive: &dyn RoomRepository) -> bool {
    loop {
        if archive.health_check().await.is_ok() {
            if state.is_degraded() {
                info!("archive healthy again; leaving degraded mode");
                state.update_degraded(false);
            }
            sleep(HEALTH_POLL_INTERVAL).await;
            continue;
        }

        let mut reconnect_delay = INITIAL_DELAY;
        let mut reconnected = false;
        for attempt in 0..MAX_RECONNECT_ATTEMPTS {
            match archive.try_reconnect().await {
                Ok(()) => {
                    info!("archive reconnection succeeded after health check failure");
                    reconnected = true;
                    break;
                }
                Err(err) => {
                    if attempt == 0 {
                        warn!(
                            attempt, error = %err,
                            "archive reconnect first attempt failed; entering degraded mode"
                        );
                        state.update_degraded(true);
                    } else {
                        warn!(attempt, error = %err, "archive reconnect attempt failed");
                    }
                    sleep(reconnect_delay).await;
                    reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
                }
            }
        }

        if !reconnected {
            return false;
        }
        state.update_degraded(false);
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            pack_store::MemoryPackStore, room_cache::MemoryRoomCache,
            room_repository::MemoryRoomRepository,
        },
        state::AppState,
    };

    #[tokio::test(start_paused = true)]
    async fn leaves_degraded_mode_once_the_archive_connects() {
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(MemoryRoomCache::default()),
            Arc::new(MemoryPackStore::new([])),
        );
        assert!(state.is_degraded());
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        tokio::spawn(run(state.clone(), move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(StorageError::unavailable(
                        "archive offline".into(),
                        std::io::Error::other("refused"),
                    ))
                } else {
                    Ok(Arc::new(MemoryRoomRepository::default()) as Arc<dyn RoomRepository>)
                }
            }
        }));
        sleep(Duration::from_millis(1_500)).await;

        assert!(!state.is_degraded());
        assert!(state.archive().await.is_some());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}

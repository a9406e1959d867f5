//! Application-level configuration loading: game timings, lock tuning and the packs location.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use tracing::{info, warn};

use crate::dao::room_store::LockSettings;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SGAME_BACK_CONFIG_PATH";
const DEFAULT_PACKS_PATH: &str = "config/packs.json";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// How long players get to bet on an auction question.
    pub bet_timeout: Duration,
    /// How long the selector gets to hand a cat-in-bag question over.
    pub pass_timeout: Duration,
    /// How long finalists get to bet once the final category is chosen.
    pub final_bet_timeout: Duration,
    /// Lifetime of a room nobody is connected to, and of a finished room before deletion.
    pub idle_room_ttl: Duration,
    /// Extra wait after the idle TTL before checking whether the room was reaped.
    pub expire_grace_period: Duration,
    /// Bound on the work done by one timer continuation or client action.
    pub continuation_timeout: Duration,
    /// Per-room lock timings used by the room store.
    pub lock: LockSettings,
    /// How long clients keep the correct answer on screen.
    pub correct_answer_demo: Duration,
    /// JSON file holding the question packs.
    pub packs_path: PathBuf,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        packs = %app_config.packs_path.display(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde_as(as = "DurationSeconds<u64>")]
    bet_timeout_secs: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pass_timeout_secs: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    final_bet_timeout_secs: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    idle_room_ttl_secs: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    expire_grace_period_secs: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    continuation_timeout_secs: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    lock_ttl_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    lock_poll_interval_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    lock_wait_timeout_ms: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    correct_answer_demo_secs: Duration,
    packs_path: PathBuf,
}

impl Default for RawConfig {
    fn default() -> Self {
        let lock = LockSettings::default();
        Self {
            bet_timeout_secs: Duration::from_secs(30),
            pass_timeout_secs: Duration::from_secs(30),
            final_bet_timeout_secs: Duration::from_secs(30),
            idle_room_ttl_secs: Duration::from_secs(300),
            expire_grace_period_secs: Duration::from_secs(1),
            continuation_timeout_secs: Duration::from_secs(5),
            lock_ttl_ms: lock.ttl,
            lock_poll_interval_ms: lock.poll_interval,
            lock_wait_timeout_ms: lock.wait_timeout,
            correct_answer_demo_secs: Duration::from_secs(5),
            packs_path: PathBuf::from(DEFAULT_PACKS_PATH),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            bet_timeout: value.bet_timeout_secs,
            pass_timeout: value.pass_timeout_secs,
            final_bet_timeout: value.final_bet_timeout_secs,
            idle_room_ttl: value.idle_room_ttl_secs,
            expire_grace_period: value.expire_grace_period_secs,
            continuation_timeout: value.continuation_timeout_secs,
            lock: LockSettings {
                ttl: value.lock_ttl_ms,
                poll_interval: value.lock_poll_interval_ms,
                wait_timeout: value.lock_wait_timeout_ms,
            },
            correct_answer_demo: value.correct_answer_demo_secs,
            packs_path: value.packs_path,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let raw: RawConfig =
            serde_json::from_str(r#"{ "bet_timeout_secs": 12, "lock_ttl_ms": 250 }"#).unwrap();
        let config = AppConfig::from(raw);

        assert_eq!(config.bet_timeout, Duration::from_secs(12));
        assert_eq!(config.lock.ttl, Duration::from_millis(250));
        assert_eq!(config.pass_timeout, Duration::from_secs(30));
        assert_eq!(config.idle_room_ttl, Duration::from_secs(300));
        assert_eq!(config.lock.poll_interval, Duration::from_millis(100));
        assert_eq!(config.packs_path, PathBuf::from(DEFAULT_PACKS_PATH));
    }
}

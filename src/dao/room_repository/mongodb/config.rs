//! Settings for the MongoDB room archive.

use std::{iter, time::Duration};

use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DATABASE: &str = "sgame";
const DEFAULT_ROOMS_COLLECTION: &str = "rooms";
const APP_NAME: &str = "sgame-back";

/// How long to keep pinging an archive that is still starting up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingRetry {
    /// Pings sent before giving up, the first one included.
    pub attempts: u32,
    /// Wait before the second attempt; doubles after each failure.
    pub first_delay: Duration,
    /// Cap on the doubling delay.
    pub max_delay: Duration,
}

impl Default for PingRetry {
    fn default() -> Self {
        Self {
            attempts: 10,
            first_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl PingRetry {
    /// Pauses between consecutive failed pings.
    pub fn delays(self) -> impl Iterator<Item = Duration> {
        iter::successors(Some(self.first_delay), move |delay| {
            Some((*delay * 2).min(self.max_delay))
        })
        .take(self.attempts.saturating_sub(1) as usize)
    }
}

/// Where archived rooms are written and how to reach the server.
#[derive(Clone)]
pub struct MongoConfig {
    /// Driver options parsed from the URI.
    pub options: ClientOptions,
    /// Database holding the archive.
    pub database_name: String,
    /// Collection of archived rooms.
    pub rooms_collection: String,
    /// Startup ping policy.
    pub ping_retry: PingRetry,
}

impl MongoConfig {
    /// Parse `uri`; an absent or empty `db_name` falls back to the default archive database.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let mut options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: redact_credentials(uri),
                    source,
                })?;
        options.app_name.get_or_insert_with(|| APP_NAME.to_owned());

        Ok(Self {
            options,
            database_name: db_name
                .filter(|name| !name.is_empty())
                .unwrap_or(DEFAULT_DATABASE)
                .to_owned(),
            rooms_collection: DEFAULT_ROOMS_COLLECTION.to_owned(),
            ping_retry: PingRetry::default(),
        })
    }
}

/// Hide the user info of a connection string so it can appear in logs and errors.
fn redact_credentials(uri: &str) -> String {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return uri.to_owned();
    };
    let hosts_end = rest.find('/').unwrap_or(rest.len());
    match rest[..hosts_end].rfind('@') {
        Some(at) => format!("{scheme}://***{}", &rest[at..]),
        None => uri.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_never_reach_the_error() {
        assert_eq!(
            redact_credentials("mongodb://quiz:hunter2@db:27017/sgame?authSource=admin"),
            "mongodb://***@db:27017/sgame?authSource=admin"
        );
        assert_eq!(redact_credentials("mongodb://db:27017"), "mongodb://db:27017");
        assert_eq!(redact_credentials("not a uri"), "not a uri");
    }

    #[test]
    fn ping_delays_double_up_to_the_cap() {
        let delays: Vec<_> = PingRetry::default().delays().collect();

        assert_eq!(delays.len(), 9);
        assert_eq!(delays[0], Duration::from_millis(250));
        assert_eq!(delays[4], Duration::from_secs(4));
        assert!(delays[5..].iter().all(|delay| *delay == Duration::from_secs(5)));
        let single = PingRetry {
            attempts: 1,
            ..PingRetry::default()
        };
        assert_eq!(single.delays().count(), 0);
    }

    #[tokio::test]
    async fn uri_defaults_name_the_archive() {
        let config = MongoConfig::from_uri("mongodb://localhost:27017", Some(""))
            .await
            .unwrap();

        assert_eq!(config.database_name, "sgame");
        assert_eq!(config.rooms_collection, "rooms");
        assert_eq!(config.options.app_name.as_deref(), Some("sgame-back"));
    }
}

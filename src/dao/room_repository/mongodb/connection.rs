use mongodb::{Client, Database, bson::doc, error::Error as MongoError};
use tokio::time::sleep;
use tracing::{debug, info};

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};

pub(super) async fn ping(database: &Database) -> Result<(), MongoError> {
    database.run_command(doc! { "ping": 1 }).await.map(drop)
}

/// Open the archive database once it answers a ping, retrying per [`MongoConfig::ping_retry`].
pub async fn open_archive(config: &MongoConfig) -> MongoResult<Database> {
    let client = Client::with_options(config.options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(&config.database_name);

    let mut delays = config.ping_retry.delays();
    let mut attempts = 0;
    loop {
        attempts += 1;
        let Err(source) = ping(&database).await else {
            info!(database = %config.database_name, attempts, "room archive reachable");
            return Ok(database);
        };
        let Some(delay) = delays.next() else {
            return Err(MongoDaoError::Unreachable {
                database: config.database_name.clone(),
                attempts,
                source,
            });
        };
        debug!(attempts, ?delay, error = %source, "room archive not reachable yet");
        sleep(delay).await;
    }
}

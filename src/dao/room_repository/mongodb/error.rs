use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

/// Result alias of the MongoDB archive.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures of the MongoDB room archive.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// Connection string rejected; `uri` has its credentials masked.
    #[error("invalid room archive URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("could not build the room archive client")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    /// Pings kept failing after every retry.
    #[error("room archive `{database}` unreachable after {attempts} attempt(s)")]
    Unreachable {
        database: String,
        attempts: u32,
        #[source]
        source: MongoError,
    },
    /// A health check ping failed.
    #[error("room archive stopped answering pings")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    /// Index creation failed at startup.
    #[error("failed to index `{collection}` by `{field}`")]
    EnsureIndex {
        collection: String,
        field: &'static str,
        #[source]
        source: MongoError,
    },
    /// Writing a room document failed.
    #[error("failed to archive room `{id}`")]
    ArchiveRoom {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    /// Querying rooms by creator failed.
    #[error("failed to list rooms created by `{user_id}`")]
    ListRooms {
        user_id: String,
        #[source]
        source: MongoError,
    },
}

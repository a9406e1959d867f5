use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{Collection, Database, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::{open_archive, ping},
    error::{MongoDaoError, MongoResult},
    models::{MongoRoomDocument, doc_id},
};
use crate::{
    dao::{room_repository::RoomRepository, storage::StorageResult},
    state::room::Room,
};

/// Room archive stored in a MongoDB collection.
#[derive(Clone)]
pub struct MongoRoomRepository {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        ping(&database)
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let database = open_archive(&self.config).await?;
        self.state.write().await.database = database;
        Ok(())
    }
}

impl MongoRoomRepository {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = open_archive(&config).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { database }),
            config,
        });

        let repository = Self { inner };
        repository.ensure_indexes().await?;
        Ok(repository)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.collection().await;
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"createdBy": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("room_created_by_idx".to_owned()))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: self.inner.config.rooms_collection.clone(),
                field: "createdBy",
                source,
            })?;
        Ok(())
    }

    async fn collection(&self) -> Collection<MongoRoomDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoRoomDocument>(&self.inner.config.rooms_collection)
    }

    async fn archive(&self, room: Room) -> MongoResult<()> {
        let id = room.id;
        let document = MongoRoomDocument::from(room);
        self.collection()
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::ArchiveRoom { id, source })?;
        Ok(())
    }

    async fn list_created_by(&self, user_id: String) -> MongoResult<Vec<Room>> {
        let documents: Vec<MongoRoomDocument> = self
            .collection()
            .await
            .find(doc! { "createdBy": &user_id })
            .sort(doc! { "archivedAt": 1 })
            .await
            .map_err(|source| MongoDaoError::ListRooms {
                user_id: user_id.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListRooms {
                user_id: user_id.clone(),
                source,
            })?;

        Ok(documents.into_iter().map(Room::from).collect())
    }
}

impl RoomRepository for MongoRoomRepository {
    fn archive(&self, room: Room) -> BoxFuture<'static, StorageResult<()>> {
        let repository = self.clone();
        Box::pin(async move { repository.archive(room).await.map_err(Into::into) })
    }

    fn list_created_by(&self, user_id: String) -> BoxFuture<'static, StorageResult<Vec<Room>>> {
        let repository = self.clone();
        Box::pin(async move {
            repository
                .list_created_by(user_id)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let repository = self.clone();
        Box::pin(async move { repository.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let repository = self.clone();
        Box::pin(async move { repository.inner.reconnect().await.map_err(Into::into) })
    }
}

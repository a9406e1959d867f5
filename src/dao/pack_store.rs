//! Read-only access to question packs.

use std::{fs, io, path::Path, sync::Arc};

use dashmap::DashMap;
use futures::future::BoxFuture;
use thiserror::Error;
use tracing::info;

use crate::{
    dao::storage::{StorageError, StorageResult},
    state::pack::{Pack, PackPreview},
};

/// Source of the packs rooms are created from.
pub trait PackStore: Send + Sync {
    /// Full pack, answers included.
    fn get(&self, id: String) -> BoxFuture<'static, StorageResult<Pack>>;
    /// Previews of every known pack.
    fn list(&self) -> BoxFuture<'static, StorageResult<Vec<PackPreview>>>;
}

/// Failure loading packs from disk.
#[derive(Debug, Error)]
pub enum PackLoadError {
    /// The pack file could not be read.
    #[error("failed to read packs file `{path}`")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    /// The pack file is not a valid JSON array of packs.
    #[error("failed to parse packs file `{path}`")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Packs held in memory, optionally seeded from a JSON array on disk.
#[derive(Clone, Default)]
pub struct MemoryPackStore {
    packs: Arc<DashMap<String, Pack>>,
}

impl MemoryPackStore {
    /// Store seeded with `packs`.
    pub fn new(packs: impl IntoIterator<Item = Pack>) -> Self {
        let store = Self::default();
        for pack in packs {
            store.insert(pack);
        }
        store
    }

    /// Load the JSON array of packs at `path`.
    pub fn from_file(path: &Path) -> Result<Self, PackLoadError> {
        let shown = path.display().to_string();
        let contents = fs::read_to_string(path).map_err(|source| PackLoadError::Read {
            path: shown.clone(),
            source,
        })?;
        let packs: Vec<Pack> =
            serde_json::from_str(&contents).map_err(|source| PackLoadError::Parse {
                path: shown.clone(),
                source,
            })?;
        info!(path = %shown, count = packs.len(), "loaded question packs");
        Ok(Self::new(packs))
    }

    /// Add or replace a pack.
    pub fn insert(&self, pack: Pack) {
        self.packs.insert(pack.id.clone(), pack);
    }
}

impl PackStore for MemoryPackStore {
    fn get(&self, id: String) -> BoxFuture<'static, StorageResult<Pack>> {
        let pack = self
            .packs
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::not_found(format!("pack:{id}")));
        Box::pin(async move { pack })
    }

    fn list(&self) -> BoxFuture<'static, StorageResult<Vec<PackPreview>>> {
        let previews = self
            .packs
            .iter()
            .map(|entry| entry.value().preview())
            .collect();
        Box::pin(async move { Ok(previews) })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::state::fixtures::sample_pack;

    #[tokio::test]
    async fn packs_load_from_json_file() {
        let path = std::env::temp_dir().join(format!("packs-{}.json", uuid::Uuid::new_v4()));
        let mut file = fs::File::create(&path).unwrap();
        write!(file, "{}", serde_json::to_string(&vec![sample_pack()]).unwrap()).unwrap();

        let store = MemoryPackStore::from_file(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(store.get("pack-1".into()).await.unwrap(), sample_pack());
        assert_eq!(store.list().await.unwrap(), vec![sample_pack().preview()]);
        assert!(matches!(
            store.get("missing".into()).await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn bundled_packs_parse() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/packs.json");

        let store = MemoryPackStore::from_file(&path).unwrap();

        assert!(store.packs.contains_key("starter"));
    }
}

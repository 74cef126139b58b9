use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
        MutexGuard,
        PoisonError,
    },
};

use async_trait::async_trait;

use super::{
    AssetQuery,
    AssetStore,
    AssetStoreError,
    AssetUpdate,
    CollectionRecord,
    RemoteFolder,
    TagMode,
};
use crate::data_model::{normalize_asset_id, MediaKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryAsset {
    pub kind: MediaKind,
    pub tags: BTreeSet<String>,
    pub folder: Option<String>,
    pub context: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct State {
    folders: BTreeSet<String>,
    failing_folders: BTreeSet<String>,
    assets: BTreeMap<String, MemoryAsset>,
    collections: BTreeMap<String, Vec<String>>,
}

/// Process-local asset store. Every trait call is counted so callers can
/// assert how many remote round trips an operation would have made.
#[derive(Debug, Default)]
pub struct InMemoryAssetStore {
    state: Mutex<State>,
    calls: AtomicUsize,
}

fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

fn leaf_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    /// Registers a folder and every ancestor of it.
    pub fn with_folder(self, path: &str) -> Self {
        {
            let mut state = self.state();
            let mut current = path.trim_matches('/');
            while !current.is_empty() {
                state.folders.insert(current.to_string());
                current = parent_of(current).unwrap_or("");
            }
        }
        self
    }

    pub fn with_asset(self, id: &str, kind: MediaKind) -> Self {
        self.state().assets.insert(
            normalize_asset_id(id),
            MemoryAsset {
                kind,
                tags: BTreeSet::new(),
                folder: None,
                context: BTreeMap::new(),
            },
        );
        self
    }

    pub fn with_tagged_asset(self, id: &str, kind: MediaKind, tags: &[&str]) -> Self {
        let store = self.with_asset(id, kind);
        if let Some(asset) = store.state().assets.get_mut(&normalize_asset_id(id)) {
            asset.tags = tags.iter().map(|t| t.to_string()).collect();
        }
        store
    }

    /// Listing the children of `path` fails with an upstream 500.
    pub fn fail_subfolders_of(self, path: &str) -> Self {
        self.state()
            .failing_folders
            .insert(path.trim_matches('/').to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn asset(&self, id: &str) -> Option<MemoryAsset> {
        self.state().assets.get(&normalize_asset_id(id)).cloned()
    }

    pub fn collection(&self, name: &str) -> Option<Vec<String>> {
        self.state().collections.get(name).cloned()
    }

    fn children(state: &State, parent: Option<&str>) -> Vec<RemoteFolder> {
        state
            .folders
            .iter()
            .filter(|path| parent_of(path) == parent)
            .map(|path| RemoteFolder {
                name: leaf_of(path).to_string(),
                path: path.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn root_folders(&self) -> Result<Vec<RemoteFolder>, AssetStoreError> {
        self.record_call();
        Ok(Self::children(&self.state(), None))
    }

    async fn subfolders(&self, path: &str) -> Result<Vec<RemoteFolder>, AssetStoreError> {
        self.record_call();
        let path = path.trim_matches('/');
        let state = self.state();
        if state.failing_folders.contains(path) {
            return Err(AssetStoreError::upstream(
                "list subfolders",
                500,
                format!("simulated failure listing {}", path),
            ));
        }
        if !state.folders.contains(path) {
            return Err(AssetStoreError::upstream(
                "list subfolders",
                404,
                format!("folder {} not found", path),
            ));
        }
        Ok(Self::children(&state, Some(path)))
    }

    async fn update_asset(&self, update: &AssetUpdate) -> Result<(), AssetStoreError> {
        self.record_call();
        let mut state = self.state();
        if let Some(folder) = &update.folder {
            let mut current = folder.trim_matches('/');
            while !current.is_empty() {
                state.folders.insert(current.to_string());
                current = parent_of(current).unwrap_or("");
            }
        }
        let asset = state.assets.get_mut(&update.asset_id).ok_or_else(|| {
            AssetStoreError::upstream(
                "update asset",
                404,
                format!("resource not found - {}", update.asset_id),
            )
        })?;
        if let Some(tags) = &update.tags {
            match tags.mode {
                TagMode::Add => asset.tags.extend(tags.tags.iter().cloned()),
                TagMode::Replace => asset.tags = tags.tags.clone(),
            }
        }
        if let Some(folder) = &update.folder {
            asset.folder = Some(folder.trim_matches('/').to_string());
        }
        if let Some(context) = &update.context {
            asset
                .context
                .extend(context.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(())
    }

    async fn list_assets(&self, query: &AssetQuery) -> Result<Vec<String>, AssetStoreError> {
        self.record_call();
        let state = self.state();
        let ids = state
            .assets
            .iter()
            .filter(|(_, asset)| match query {
                AssetQuery::Tag(tag) => asset.tags.contains(tag),
                AssetQuery::Folder(folder) => {
                    asset.folder.as_deref() == Some(folder.trim_matches('/'))
                }
            })
            .map(|(id, _)| id.clone())
            .collect();
        Ok(ids)
    }

    async fn list_tags(&self, kind: MediaKind) -> Result<Vec<String>, AssetStoreError> {
        self.record_call();
        let state = self.state();
        let tags: BTreeSet<String> = state
            .assets
            .values()
            .filter(|asset| asset.kind == kind)
            .flat_map(|asset| asset.tags.iter().cloned())
            .collect();
        Ok(tags.into_iter().collect())
    }

    async fn get_collection(
        &self,
        name: &str,
    ) -> Result<Option<CollectionRecord>, AssetStoreError> {
        self.record_call();
        Ok(self
            .state()
            .collections
            .get(name)
            .map(|asset_ids| CollectionRecord {
                name: name.to_string(),
                asset_ids: asset_ids.clone(),
            }))
    }

    async fn create_collection(
        &self,
        name: &str,
        asset_ids: &[String],
    ) -> Result<CollectionRecord, AssetStoreError> {
        self.record_call();
        let mut state = self.state();
        if state.collections.contains_key(name) {
            return Err(AssetStoreError::upstream(
                "create collection",
                409,
                format!("collection {} already exists", name),
            ));
        }
        state.collections.insert(name.to_string(), asset_ids.to_vec());
        Ok(CollectionRecord {
            name: name.to_string(),
            asset_ids: asset_ids.to_vec(),
        })
    }

    async fn update_collection(
        &self,
        name: &str,
        asset_ids: &[String],
    ) -> Result<CollectionRecord, AssetStoreError> {
        self.record_call();
        let mut state = self.state();
        let entry = state.collections.get_mut(name).ok_or_else(|| {
            AssetStoreError::upstream(
                "update collection",
                404,
                format!("collection {} not found", name),
            )
        })?;
        *entry = asset_ids.to_vec();
        Ok(CollectionRecord {
            name: name.to_string(),
            asset_ids: asset_ids.to_vec(),
        })
    }
}

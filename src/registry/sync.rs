use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::{marker::MarkerSpliceSynchronizer, RegistryMap};
use crate::data_model::AssetDescriptor;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("marker `{marker}` not found in {}", path.display())]
    MarkerNotFound { path: PathBuf, marker: String },
    #[error("generated region after `{marker}` in {} is not terminated", path.display())]
    UnterminatedRegion { path: PathBuf, marker: String },
    #[error("unable to parse registry in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Reads and writes the whole registry to its backing file.
#[async_trait]
pub trait ConfigSynchronizer: Send + Sync {
    async fn load(&self) -> Result<RegistryMap, SyncError>;

    /// Rewrites the backing file from a full snapshot, never partially.
    async fn persist(&self, snapshot: &RegistryMap) -> Result<(), SyncError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistryFormat {
    #[default]
    Json,
    /// Generated region inside a hand-maintained TypeScript source file.
    Marker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub format: RegistryFormat,
    #[serde(default = "default_marker")]
    pub marker: String,
}

pub fn default_marker() -> String {
    "export const mediaRegistry: MediaRegistry = ".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("media-registry.json"),
            format: RegistryFormat::default(),
            marker: default_marker(),
        }
    }
}

pub fn synchronizer_from_config(config: &RegistryConfig) -> Arc<dyn ConfigSynchronizer> {
    match config.format {
        RegistryFormat::Json => Arc::new(JsonFileSynchronizer::new(&config.path)),
        RegistryFormat::Marker => {
            Arc::new(MarkerSpliceSynchronizer::new(&config.path, &config.marker))
        }
    }
}

pub(crate) fn sorted(snapshot: &RegistryMap) -> BTreeMap<&String, &AssetDescriptor> {
    snapshot.iter().collect()
}

/// Rejects the whole file when any entry would be refused by `update`.
pub(crate) fn validated_entries(
    path: &Path,
    entries: BTreeMap<String, AssetDescriptor>,
) -> Result<RegistryMap, SyncError> {
    entries
        .into_iter()
        .map(|(placeholder, descriptor)| match descriptor.validate() {
            Ok(()) => Ok((placeholder, descriptor)),
            Err(err) => Err(SyncError::Parse {
                path: path.to_path_buf(),
                message: format!("entry `{}`: {}", placeholder, err),
            }),
        })
        .collect()
}

/// Writes next to the target and renames over it, so readers never see a
/// half-written file.
pub(crate) async fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), SyncError> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    tokio::fs::write(&temp, contents).await?;
    if let Err(err) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(err.into());
    }
    Ok(())
}

/// Pretty-printed JSON object keyed by placeholder, sorted for stable diffs.
pub struct JsonFileSynchronizer {
    path: PathBuf,
}

impl JsonFileSynchronizer {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

#[async_trait]
impl ConfigSynchronizer for JsonFileSynchronizer {
    async fn load(&self) -> Result<RegistryMap, SyncError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "registry file missing, starting empty");
                return Ok(RegistryMap::new());
            }
            Err(err) => return Err(err.into()),
        };
        let entries: BTreeMap<String, AssetDescriptor> =
            serde_json::from_str(&text).map_err(|e| SyncError::Parse {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        validated_entries(&self.path, entries)
    }

    async fn persist(&self, snapshot: &RegistryMap) -> Result<(), SyncError> {
        let mut contents = serde_json::to_vec_pretty(&sorted(snapshot))?;
        contents.push(b'\n');
        write_atomically(&self.path, &contents).await
    }
}

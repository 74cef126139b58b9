use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data_model::MediaKind;

pub mod delivery;
pub mod http;
pub mod memory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssetStoreBackend {
    #[default]
    Http,
    /// Process-local store, useful for local development without credentials.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetStoreConfig {
    #[serde(default)]
    pub backend: AssetStoreBackend,
    #[serde(default)]
    pub cloud_name: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_delivery_base_url")]
    pub delivery_base_url: String,
    /// Unset keeps the HTTP client's default, which never times out.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for AssetStoreConfig {
    fn default() -> Self {
        Self {
            backend: AssetStoreBackend::default(),
            cloud_name: String::new(),
            api_key: None,
            api_secret: None,
            api_base_url: default_api_base_url(),
            delivery_base_url: default_delivery_base_url(),
            request_timeout_secs: None,
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.cloudinary.com/v1_1".to_string()
}

fn default_delivery_base_url() -> String {
    "https://res.cloudinary.com".to_string()
}

#[derive(Debug, Error)]
pub enum AssetStoreError {
    #[error("asset store returned status {status} for {operation}: {message}")]
    Upstream {
        operation: &'static str,
        status: u16,
        message: String,
    },
    #[error("asset store request for {operation} failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("unable to decode asset store response for {operation}: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },
}

impl AssetStoreError {
    pub fn upstream(operation: &'static str, status: u16, message: impl Into<String>) -> Self {
        AssetStoreError::Upstream {
            operation,
            status,
            message: message.into(),
        }
    }

    /// The upstream HTTP status, when the store answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            AssetStoreError::Upstream { status, .. } => Some(*status),
            AssetStoreError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            AssetStoreError::Decode { .. } => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFolder {
    pub name: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMode {
    Add,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagUpdate {
    pub tags: BTreeSet<String>,
    pub mode: TagMode,
}

/// One metadata-update call against a single asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetUpdate {
    pub asset_id: String,
    pub kind: MediaKind,
    pub tags: Option<TagUpdate>,
    pub folder: Option<String>,
    pub context: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetQuery {
    Tag(String),
    Folder(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub name: String,
    #[serde(default)]
    pub asset_ids: Vec<String>,
}

/// Management API of the remote asset store.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn root_folders(&self) -> Result<Vec<RemoteFolder>, AssetStoreError>;

    async fn subfolders(&self, path: &str) -> Result<Vec<RemoteFolder>, AssetStoreError>;

    async fn update_asset(&self, update: &AssetUpdate) -> Result<(), AssetStoreError>;

    /// Ids of every asset matching the query, across pages.
    async fn list_assets(&self, query: &AssetQuery) -> Result<Vec<String>, AssetStoreError>;

    async fn list_tags(&self, kind: MediaKind) -> Result<Vec<String>, AssetStoreError>;

    async fn get_collection(&self, name: &str)
        -> Result<Option<CollectionRecord>, AssetStoreError>;

    async fn create_collection(
        &self,
        name: &str,
        asset_ids: &[String],
    ) -> Result<CollectionRecord, AssetStoreError>;

    async fn update_collection(
        &self,
        name: &str,
        asset_ids: &[String],
    ) -> Result<CollectionRecord, AssetStoreError>;
}

pub mod marker;
pub mod sync;

use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;
use tracing::{info, warn};

pub use self::sync::{ConfigSynchronizer, RegistryConfig, RegistryFormat, SyncError};
use crate::data_model::AssetDescriptor;

pub type RegistryMap = im::HashMap<String, AssetDescriptor>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid descriptor for {placeholder}: {message}")]
    Validation { placeholder: String, message: String },
    #[error("placeholder {0} is not registered")]
    NotFound(String),
    #[error("unable to persist registry: {0}")]
    Persistence(#[from] SyncError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Registered {
        placeholder: String,
        descriptor: AssetDescriptor,
    },
    /// No placeholder matched; the input was taken as a literal remote id.
    Synthesized(AssetDescriptor),
}

impl Resolution {
    pub fn descriptor(&self) -> &AssetDescriptor {
        match self {
            Resolution::Registered { descriptor, .. } => descriptor,
            Resolution::Synthesized(descriptor) => descriptor,
        }
    }

    pub fn into_descriptor(self) -> AssetDescriptor {
        match self {
            Resolution::Registered { descriptor, .. } => descriptor,
            Resolution::Synthesized(descriptor) => descriptor,
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(self, Resolution::Registered { .. })
    }
}

/// Placeholder to descriptor mapping. Readers load an immutable snapshot;
/// a mutation persists a new map first and only then publishes it, so a
/// failed write leaves the visible registry unchanged.
///
/// Writers are not serialized against each other: two concurrent
/// mutations both start from the snapshot they loaded and the last one to
/// publish wins.
pub struct Registry {
    snapshot: ArcSwap<RegistryMap>,
    synchronizer: Arc<dyn ConfigSynchronizer>,
}

impl Registry {
    pub async fn load(synchronizer: Arc<dyn ConfigSynchronizer>) -> Result<Self, RegistryError> {
        let entries = synchronizer.load().await?;
        info!(entries = entries.len(), "loaded media registry");
        Ok(Self {
            snapshot: ArcSwap::from_pointee(entries),
            synchronizer,
        })
    }

    pub fn snapshot(&self) -> Arc<RegistryMap> {
        self.snapshot.load_full()
    }

    pub fn get(&self, placeholder: &str) -> Option<AssetDescriptor> {
        self.snapshot.load().get(placeholder.trim()).cloned()
    }

    /// Never fails: unknown inputs resolve to a descriptor synthesized from
    /// the literal id.
    pub fn resolve(&self, id_or_placeholder: &str) -> Resolution {
        let key = id_or_placeholder.trim();
        match self.snapshot.load().get(key) {
            Some(descriptor) => Resolution::Registered {
                placeholder: key.to_string(),
                descriptor: descriptor.clone(),
            },
            None => Resolution::Synthesized(AssetDescriptor::synthesized(key)),
        }
    }

    pub async fn update(
        &self,
        placeholder: &str,
        descriptor: AssetDescriptor,
    ) -> Result<AssetDescriptor, RegistryError> {
        let placeholder = placeholder.trim();
        if placeholder.is_empty() {
            return Err(RegistryError::Validation {
                placeholder: placeholder.to_string(),
                message: "placeholder id must not be empty".to_string(),
            });
        }
        let descriptor = descriptor.normalized();
        descriptor
            .validate()
            .map_err(|e| RegistryError::Validation {
                placeholder: placeholder.to_string(),
                message: e.to_string(),
            })?;

        let next = self
            .snapshot
            .load()
            .update(placeholder.to_string(), descriptor.clone());
        self.publish(next).await?;
        info!(placeholder, asset_id = %descriptor.id, "registry entry updated");
        Ok(descriptor)
    }

    pub async fn delete(&self, placeholder: &str) -> Result<AssetDescriptor, RegistryError> {
        let placeholder = placeholder.trim();
        let current = self.snapshot.load_full();
        let (removed, next) = current
            .extract(placeholder)
            .ok_or_else(|| RegistryError::NotFound(placeholder.to_string()))?;
        self.publish(next).await?;
        info!(placeholder, "registry entry deleted");
        Ok(removed)
    }

    async fn publish(&self, next: RegistryMap) -> Result<(), RegistryError> {
        if let Err(err) = self.synchronizer.persist(&next).await {
            warn!(error = %err, "registry persist failed, keeping previous snapshot");
            return Err(err.into());
        }
        self.snapshot.store(Arc::new(next));
        Ok(())
    }
}

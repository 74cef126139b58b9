use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{error, instrument};

use crate::{
    asset_store::{delivery::DeliveryClient, AssetStoreError},
    registry::Registry,
    transform::DeliveryUrlBuilder,
};

/// Delivery URLs embed the asset id, and a given id is expected to always
/// carry the same bytes.
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("media id is required")]
    MissingId,
    #[error("upstream returned status {status} for {url}")]
    Upstream { status: u16, url: String },
    #[error("unable to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: AssetStoreError,
    },
}

impl ProxyError {
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            ProxyError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProxiedMedia {
    pub bytes: Bytes,
    pub content_type: String,
    pub cache_control: &'static str,
    pub source_url: String,
}

pub struct ProxyCache {
    registry: Arc<Registry>,
    urls: DeliveryUrlBuilder,
    delivery: Arc<dyn DeliveryClient>,
}

impl ProxyCache {
    pub fn new(
        registry: Arc<Registry>,
        urls: DeliveryUrlBuilder,
        delivery: Arc<dyn DeliveryClient>,
    ) -> Self {
        Self {
            registry,
            urls,
            delivery,
        }
    }

    /// Resolves `id` as a placeholder or literal id and fetches the stored
    /// original. Descriptor defaults and area presets are not applied.
    #[instrument(skip(self))]
    pub async fn serve(&self, id: &str) -> Result<ProxiedMedia, ProxyError> {
        if id.trim().is_empty() {
            return Err(ProxyError::MissingId);
        }
        let resolution = self.registry.resolve(id);
        let url = self.urls.canonical_url(resolution.descriptor());

        let media = self.delivery.fetch(&url).await.map_err(|err| {
            error!(url = %url, error = %err, "proxy fetch failed");
            match err {
                AssetStoreError::Upstream { status, .. } => ProxyError::Upstream {
                    status,
                    url: url.clone(),
                },
                source => ProxyError::Fetch {
                    url: url.clone(),
                    source,
                },
            }
        })?;

        Ok(ProxiedMedia {
            bytes: media.bytes,
            content_type: media
                .content_type
                .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string()),
            cache_control: IMMUTABLE_CACHE_CONTROL,
            source_url: url,
        })
    }
}

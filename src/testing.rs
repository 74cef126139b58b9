use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;
use tracing::subscriber;
use tracing_subscriber::{layer::SubscriberExt, Layer};

use crate::{
    asset_store::{
        delivery::{DeliveryClient, FetchedMedia},
        memory::InMemoryAssetStore,
        AssetStoreBackend,
        AssetStoreConfig,
        AssetStoreError,
    },
    config::ServerConfig,
    data_model::test_objects::tests::{TEST_CLOUD_NAME, TEST_DELIVERY_BASE_URL},
    registry::RegistryConfig,
    service::Service,
};

/// Delivery endpoint double answering every URL with the same response.
#[derive(Default)]
pub struct StaticDeliveryClient {
    pub status: Mutex<Option<u16>>,
    pub requested: Mutex<Vec<String>>,
}

impl StaticDeliveryClient {
    pub fn fail_with(&self, status: u16) {
        *self.status.lock().unwrap() = Some(status);
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryClient for StaticDeliveryClient {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, AssetStoreError> {
        self.requested.lock().unwrap().push(url.to_string());
        if let Some(status) = *self.status.lock().unwrap() {
            return Err(AssetStoreError::upstream("fetch media", status, "upstream failure"));
        }
        Ok(FetchedMedia {
            bytes: Bytes::from_static(b"\x89PNG"),
            content_type: Some("image/png".to_string()),
        })
    }
}

pub struct TestService {
    pub service: Service,
    pub store: Arc<InMemoryAssetStore>,
    pub delivery: Arc<StaticDeliveryClient>,
    pub temp_dir: TempDir,
}

impl TestService {
    pub async fn new() -> Result<Self> {
        Self::with_store(InMemoryAssetStore::new()).await
    }

    pub async fn with_store(store: InMemoryAssetStore) -> Result<Self> {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
        let _ = subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_filter(env_filter)),
        );

        let temp_dir = tempfile::tempdir()?;
        let cfg = ServerConfig {
            registry: RegistryConfig {
                path: temp_dir.path().join("media-registry.json"),
                ..Default::default()
            },
            asset_store: AssetStoreConfig {
                backend: AssetStoreBackend::Memory,
                cloud_name: TEST_CLOUD_NAME.to_string(),
                delivery_base_url: TEST_DELIVERY_BASE_URL.to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        cfg.validate()?;

        let store = Arc::new(store);
        let delivery = Arc::new(StaticDeliveryClient::default());
        let service = Service::with_clients(Arc::new(cfg), store.clone(), delivery.clone()).await?;

        Ok(Self {
            service,
            store,
            delivery,
            temp_dir,
        })
    }
}

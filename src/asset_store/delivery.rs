use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, Client};
use tracing::instrument;

use super::{http::build_client, AssetStoreError};

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMedia {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Fetches rendered media from the public delivery endpoint.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, AssetStoreError>;
}

pub struct HttpDeliveryClient {
    client: Client,
}

impl HttpDeliveryClient {
    pub fn new(timeout_secs: Option<u64>) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl DeliveryClient for HttpDeliveryClient {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, AssetStoreError> {
        let operation = "fetch media";
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| AssetStoreError::Transport { operation, source })?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssetStoreError::upstream(
                operation,
                status.as_u16(),
                status.canonical_reason().unwrap_or("delivery failed"),
            ));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|source| AssetStoreError::Transport { operation, source })?;
        Ok(FetchedMedia {
            bytes,
            content_type,
        })
    }
}

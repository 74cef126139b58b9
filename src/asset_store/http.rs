use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use super::{
    AssetQuery,
    AssetStore,
    AssetStoreConfig,
    AssetStoreError,
    AssetUpdate,
    CollectionRecord,
    RemoteFolder,
    TagMode,
};
use crate::data_model::MediaKind;

const PAGE_SIZE: &str = "500";

pub fn build_client(timeout_secs: Option<u64>) -> Result<Client> {
    let mut builder = Client::builder();
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    Ok(builder.build()?)
}

#[derive(Debug, Deserialize)]
struct FoldersResponse {
    #[serde(default)]
    folders: Vec<RemoteFolder>,
}

#[derive(Debug, Deserialize)]
struct ResourceEntry {
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct ResourcesPage {
    #[serde(default)]
    resources: Vec<ResourceEntry>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsPage {
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
struct UpdateAssetBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<&'a BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags_mode: Option<TagMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    asset_folder: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a BTreeMap<String, String>>,
}

#[derive(Debug, Serialize)]
struct CollectionBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    asset_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

fn error_message(body: &str, status: StatusCode) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.error.message;
    }
    if body.trim().is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string();
    }
    body.chars().take(512).collect()
}

/// Fails with the upstream status and message on any non-success response.
pub async fn check_status(
    operation: &'static str,
    response: Response,
) -> Result<Response, AssetStoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AssetStoreError::upstream(
        operation,
        status.as_u16(),
        error_message(&body, status),
    ))
}

/// Management API client authenticated with the key/secret pair as basic
/// auth. All calls are sequential request/response.
pub struct HttpAssetStore {
    client: Client,
    api_url: Url,
    api_key: String,
    api_secret: String,
}

impl HttpAssetStore {
    pub fn new(config: &AssetStoreConfig) -> Result<Self> {
        if config.cloud_name.trim().is_empty() {
            return Err(anyhow!("asset_store.cloud_name is required"));
        }
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("asset_store.api_key is required"))?;
        let api_secret = config
            .api_secret
            .clone()
            .ok_or_else(|| anyhow!("asset_store.api_secret is required"))?;

        let mut api_url = Url::parse(&config.api_base_url)?;
        api_url
            .path_segments_mut()
            .map_err(|_| anyhow!("invalid api base url: {}", config.api_base_url))?
            .pop_if_empty()
            .push(config.cloud_name.trim());

        Ok(Self {
            client: build_client(config.request_timeout_secs)?,
            api_url,
            api_key,
            api_secret,
        })
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(segments.into_iter().filter(|s| !s.is_empty()));
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.api_key, Some(&self.api_secret))
    }

    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, AssetStoreError> {
        let response = request
            .send()
            .await
            .map_err(|source| AssetStoreError::Transport { operation, source })?;
        check_status(operation, response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, AssetStoreError> {
        self.send(operation, request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| AssetStoreError::Decode {
                operation,
                message: e.to_string(),
            })
    }

    async fn list_resource_pages(
        &self,
        operation: &'static str,
        url: Url,
    ) -> Result<Vec<String>, AssetStoreError> {
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut page_url = url.clone();
            {
                let mut query = page_url.query_pairs_mut();
                query.append_pair("max_results", PAGE_SIZE);
                if let Some(cursor) = &cursor {
                    query.append_pair("next_cursor", cursor);
                }
            }
            let page: ResourcesPage = self
                .send_json(operation, self.request(Method::GET, page_url))
                .await?;
            ids.extend(page.resources.into_iter().map(|r| r.public_id));
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(ids),
            }
        }
    }
}

#[async_trait]
impl AssetStore for HttpAssetStore {
    #[instrument(skip(self))]
    async fn root_folders(&self) -> Result<Vec<RemoteFolder>, AssetStoreError> {
        let url = self.endpoint(["folders"]);
        let response: FoldersResponse = self
            .send_json("list root folders", self.request(Method::GET, url))
            .await?;
        Ok(response.folders)
    }

    #[instrument(skip(self))]
    async fn subfolders(&self, path: &str) -> Result<Vec<RemoteFolder>, AssetStoreError> {
        let url = self.endpoint(std::iter::once("folders").chain(path.split('/')));
        let response: FoldersResponse = self
            .send_json("list subfolders", self.request(Method::GET, url))
            .await?;
        Ok(response.folders)
    }

    #[instrument(skip(self, update), fields(asset_id = %update.asset_id))]
    async fn update_asset(&self, update: &AssetUpdate) -> Result<(), AssetStoreError> {
        let url = self.endpoint(
            ["resources", update.kind.as_ref(), "upload"]
                .into_iter()
                .chain(update.asset_id.split('/')),
        );
        let body = UpdateAssetBody {
            tags: update.tags.as_ref().map(|t| &t.tags),
            tags_mode: update.tags.as_ref().map(|t| t.mode),
            asset_folder: update.folder.as_deref(),
            context: update.context.as_ref(),
        };
        self.send("update asset", self.request(Method::POST, url).json(&body))
            .await?;
        debug!("updated asset metadata");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_assets(&self, query: &AssetQuery) -> Result<Vec<String>, AssetStoreError> {
        match query {
            AssetQuery::Tag(tag) => {
                let mut ids = Vec::new();
                for kind in [MediaKind::Image, MediaKind::Video] {
                    let url = self.endpoint(["resources", kind.as_ref(), "tags", tag.as_str()]);
                    ids.extend(self.list_resource_pages("list assets by tag", url).await?);
                }
                Ok(ids)
            }
            AssetQuery::Folder(folder) => {
                let mut url = self.endpoint(["resources", "by_asset_folder"]);
                url.query_pairs_mut().append_pair("asset_folder", folder);
                self.list_resource_pages("list assets by folder", url).await
            }
        }
    }

    #[instrument(skip(self))]
    async fn list_tags(&self, kind: MediaKind) -> Result<Vec<String>, AssetStoreError> {
        let mut tags = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut url = self.endpoint(["tags", kind.as_ref()]);
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("max_results", PAGE_SIZE);
                if let Some(cursor) = &cursor {
                    query.append_pair("next_cursor", cursor);
                }
            }
            let page: TagsPage = self
                .send_json("list tags", self.request(Method::GET, url))
                .await?;
            tags.extend(page.tags);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tags),
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_collection(
        &self,
        name: &str,
    ) -> Result<Option<CollectionRecord>, AssetStoreError> {
        let url = self.endpoint(["collections", name]);
        match self
            .send_json::<CollectionRecord>("get collection", self.request(Method::GET, url))
            .await
        {
            Ok(record) => Ok(Some(record)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self, asset_ids), fields(assets = asset_ids.len()))]
    async fn create_collection(
        &self,
        name: &str,
        asset_ids: &[String],
    ) -> Result<CollectionRecord, AssetStoreError> {
        let url = self.endpoint(["collections"]);
        let body = CollectionBody {
            name: Some(name),
            asset_ids,
        };
        self.send_json(
            "create collection",
            self.request(Method::POST, url).json(&body),
        )
        .await
    }

    #[instrument(skip(self, asset_ids), fields(assets = asset_ids.len()))]
    async fn update_collection(
        &self,
        name: &str,
        asset_ids: &[String],
    ) -> Result<CollectionRecord, AssetStoreError> {
        let url = self.endpoint(["collections", name]);
        let body = CollectionBody {
            name: None,
            asset_ids,
        };
        self.send_json(
            "update collection",
            self.request(Method::PUT, url).json(&body),
        )
        .await
    }
}

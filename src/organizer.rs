use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::{
    asset_store::{AssetQuery, AssetStore, AssetStoreError, AssetUpdate, TagMode, TagUpdate},
    data_model::{
        AssetOperationResult,
        CollectionDescriptor,
        CollectionSource,
        OrganizeRequest,
    },
    transform::classify_media_type,
};

#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Remote(#[from] AssetStoreError),
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

pub struct AssetOrganizer {
    store: Arc<dyn AssetStore>,
}

impl AssetOrganizer {
    pub fn new(store: Arc<dyn AssetStore>) -> Self {
        Self { store }
    }

    /// One metadata update per asset, in id order. A failed asset is
    /// reported in its result entry and does not stop the others.
    #[instrument(skip(self, request), fields(assets = request.asset_ids.len()))]
    pub async fn organize_assets(
        &self,
        request: &OrganizeRequest,
    ) -> Result<Vec<AssetOperationResult>, OrganizeError> {
        request
            .validate()
            .map_err(|e| OrganizeError::Validation(e.to_string()))?;

        let tags = request.tags.as_ref().map(|tags| TagUpdate {
            tags: tags.iter().map(|t| t.trim().to_string()).collect(),
            mode: if request.add_tags_additively {
                TagMode::Add
            } else {
                TagMode::Replace
            },
        });
        let folder = request
            .destination_folder
            .as_ref()
            .map(|f| f.trim_matches('/').to_string());

        let mut results = Vec::with_capacity(request.asset_ids.len());
        for asset_id in &request.asset_ids {
            let update = AssetUpdate {
                asset_id: asset_id.clone(),
                kind: classify_media_type(asset_id),
                tags: tags.clone(),
                folder: folder.clone(),
                context: request.context.clone(),
            };
            match self.store.update_asset(&update).await {
                Ok(()) => results.push(AssetOperationResult::succeeded(asset_id)),
                Err(err) => {
                    warn!(asset_id = %asset_id, error = %err, "asset update failed");
                    results.push(AssetOperationResult::failed(asset_id, err.to_string()));
                }
            }
        }
        let failed = results.iter().filter(|r| !r.success).count();
        info!(succeeded = results.len() - failed, failed, "organized assets");
        Ok(results)
    }

    /// Gathers the assets of a tag (preferred) or folder into a named
    /// collection, updating it in place when the name already exists.
    #[instrument(skip(self))]
    pub async fn create_collection(
        &self,
        name: &str,
        source_tag: Option<&str>,
        source_folder: Option<&str>,
    ) -> Result<CollectionDescriptor, OrganizeError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(OrganizeError::Validation(
                "collection name must not be empty".to_string(),
            ));
        }
        let source = match (non_empty(source_tag), non_empty(source_folder)) {
            (Some(tag), _) => CollectionSource::Tag(tag.to_string()),
            (None, Some(folder)) => CollectionSource::Folder(folder.trim_matches('/').to_string()),
            (None, None) => {
                return Err(OrganizeError::Validation(
                    "either a tag or a folder is required".to_string(),
                ))
            }
        };
        let query = match &source {
            CollectionSource::Tag(tag) => AssetQuery::Tag(tag.clone()),
            CollectionSource::Folder(folder) => AssetQuery::Folder(folder.clone()),
        };
        let asset_ids = self.store.list_assets(&query).await?;

        let created = match self.store.get_collection(name).await? {
            Some(_) => {
                self.store.update_collection(name, &asset_ids).await?;
                false
            }
            None => match self.store.create_collection(name, &asset_ids).await {
                Ok(_) => true,
                // Created concurrently between the lookup and the create.
                Err(err) if err.status() == Some(409) => {
                    self.store.update_collection(name, &asset_ids).await?;
                    false
                }
                Err(err) => return Err(err.into()),
            },
        };
        info!(name, assets = asset_ids.len(), created, "collection synced");
        Ok(CollectionDescriptor {
            name: name.to_string(),
            source,
            asset_ids,
            created,
        })
    }
}

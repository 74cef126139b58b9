use axum::{extract::State, Json};
use tracing::info;

use super::RouteState;
use crate::{
    data_model::OrganizeRequest,
    http_objects::{
        CreateCollection,
        CreateCollectionResponse,
        JsonBody,
        MediaAPIError,
        OrganizeAssets,
        OrganizeAssetsResponse,
    },
};

/// Tag, move and annotate assets in bulk
#[utoipa::path(
    post,
    path = "/media/organize",
    tag = "media",
    request_body = OrganizeAssets,
    responses(
        (status = 200, description = "Per-asset results; a partial batch is not an error", body = OrganizeAssetsResponse),
        (status = BAD_REQUEST, description = "Invalid or malformed request", body = MediaAPIError)
    ),
)]
pub async fn organize_assets(
    State(state): State<RouteState>,
    JsonBody(payload): JsonBody<OrganizeAssets>,
) -> Result<Json<OrganizeAssetsResponse>, MediaAPIError> {
    let request: OrganizeRequest = payload.into();
    let results = state.organizer.organize_assets(&request).await?;
    let succeeded = results.iter().filter(|r| r.success).count();
    let message = format!("Organized {} of {} assets", succeeded, results.len());
    info!("{}", message);
    Ok(Json(OrganizeAssetsResponse {
        success: true,
        message,
        results: results.into_iter().map(Into::into).collect(),
    }))
}

/// Create or update a collection from a tag or folder
#[utoipa::path(
    put,
    path = "/media/organize",
    tag = "media",
    request_body = CreateCollection,
    responses(
        (status = 200, description = "Collection created or updated", body = CreateCollectionResponse),
        (status = BAD_REQUEST, description = "Missing name or source", body = MediaAPIError)
    ),
)]
pub async fn create_collection(
    State(state): State<RouteState>,
    JsonBody(payload): JsonBody<CreateCollection>,
) -> Result<Json<CreateCollectionResponse>, MediaAPIError> {
    let collection = state
        .organizer
        .create_collection(
            &payload.name,
            payload.tag.as_deref(),
            payload.folder.as_deref(),
        )
        .await?;
    let message = format!(
        "Collection {} {} with {} assets",
        collection.name,
        if collection.created { "created" } else { "updated" },
        collection.asset_ids.len()
    );
    Ok(Json(CreateCollectionResponse {
        success: true,
        message,
        result: collection,
    }))
}

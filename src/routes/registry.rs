use axum::{
    extract::{Path, State},
    Json,
};

use super::RouteState;
use crate::{
    data_model::AssetDescriptor,
    http_objects::{JsonBody, MediaAPIError, RegistryEntries, ResolvedPlaceholder},
    transform::TransformOptions,
};

/// All registered placeholders
#[utoipa::path(
    get,
    path = "/media/registry",
    tag = "registry",
    responses(
        (status = 200, description = "Registry snapshot", body = RegistryEntries),
    ),
)]
pub async fn list_entries(State(state): State<RouteState>) -> Json<RegistryEntries> {
    let snapshot = state.registry.snapshot();
    Json(RegistryEntries {
        entries: snapshot
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    })
}

/// Resolve a placeholder, falling back to the literal asset id
#[utoipa::path(
    get,
    path = "/media/registry/{placeholder}",
    tag = "registry",
    params(("placeholder" = String, Path, description = "Placeholder or asset id")),
    responses(
        (status = 200, description = "Resolved descriptor and its default URL", body = ResolvedPlaceholder),
    ),
)]
pub async fn resolve_entry(
    Path(placeholder): Path<String>,
    State(state): State<RouteState>,
) -> Json<ResolvedPlaceholder> {
    let resolution = state.registry.resolve(&placeholder);
    let url = state
        .urls
        .build_url(resolution.descriptor(), &TransformOptions::default());
    Json(ResolvedPlaceholder {
        registered: resolution.is_registered(),
        descriptor: resolution.into_descriptor(),
        url,
    })
}

/// Register or replace a placeholder
#[utoipa::path(
    put,
    path = "/media/registry/{placeholder}",
    tag = "registry",
    params(("placeholder" = String, Path, description = "Placeholder id")),
    request_body = AssetDescriptor,
    responses(
        (status = 200, description = "Stored descriptor", body = AssetDescriptor),
        (status = BAD_REQUEST, description = "Invalid descriptor", body = MediaAPIError),
        (status = INTERNAL_SERVER_ERROR, description = "Registry file could not be written", body = MediaAPIError)
    ),
)]
pub async fn update_entry(
    Path(placeholder): Path<String>,
    State(state): State<RouteState>,
    JsonBody(descriptor): JsonBody<AssetDescriptor>,
) -> Result<Json<AssetDescriptor>, MediaAPIError> {
    let stored = state.registry.update(&placeholder, descriptor).await?;
    Ok(Json(stored))
}

/// Remove a placeholder
#[utoipa::path(
    delete,
    path = "/media/registry/{placeholder}",
    tag = "registry",
    params(("placeholder" = String, Path, description = "Placeholder id")),
    responses(
        (status = 200, description = "Removed descriptor", body = AssetDescriptor),
        (status = NOT_FOUND, description = "Placeholder not registered", body = MediaAPIError),
        (status = INTERNAL_SERVER_ERROR, description = "Registry file could not be written", body = MediaAPIError)
    ),
)]
pub async fn delete_entry(
    Path(placeholder): Path<String>,
    State(state): State<RouteState>,
) -> Result<Json<AssetDescriptor>, MediaAPIError> {
    let removed = state.registry.delete(&placeholder).await?;
    Ok(Json(removed))
}

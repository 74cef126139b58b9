use axum::{
    body::Body,
    extract::{Query, State},
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    response::Response,
};

use super::RouteState;
use crate::http_objects::{MediaAPIError, ProxyParams};

/// Fetch media through the server
#[utoipa::path(
    get,
    path = "/media/proxy",
    tag = "media",
    params(ProxyParams),
    responses(
        (status = 200, description = "Media bytes with immutable cache headers"),
        (status = BAD_REQUEST, description = "Missing id", body = MediaAPIError),
        (status = NOT_FOUND, description = "Upstream has no such asset", body = MediaAPIError),
        (status = BAD_GATEWAY, description = "Upstream unavailable", body = MediaAPIError)
    ),
)]
pub async fn proxy_media(
    State(state): State<RouteState>,
    Query(params): Query<ProxyParams>,
) -> Result<Response<Body>, MediaAPIError> {
    let id = params.id.unwrap_or_default();
    let media = state.proxy.serve(&id).await?;
    Response::builder()
        .header(CONTENT_TYPE, media.content_type)
        .header(CACHE_CONTROL, media.cache_control)
        .body(Body::from(media.bytes))
        .map_err(|e| MediaAPIError::internal_error(e.into()))
}

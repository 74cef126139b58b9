use std::collections::BTreeSet;

use axum::{
    extract::{MatchedPath, Request, State},
    http::Method,
    routing::{get, post},
    Json,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

pub mod organize;
pub mod proxy;
pub mod registry;
pub mod routes_state;

pub use routes_state::RouteState;

use crate::{
    data_model::{AssetDescriptor, FolderNode, MediaKind},
    http_objects::{
        AssetResult,
        CreateCollection,
        CreateCollectionResponse,
        JsonBody,
        MediaAPIError,
        OrganizeAssets,
        OrganizeAssetsResponse,
        RegistryEntries,
        ResolvedPlaceholder,
        TagList,
        TransformRequest,
        TransformResponse,
    },
    transform::{effective_image_options, effective_video_options},
};

#[derive(OpenApi)]
#[openapi(
        paths(
            health,
            proxy::proxy_media,
            organize::organize_assets,
            organize::create_collection,
            list_folders,
            transform_url,
            list_tags,
            registry::list_entries,
            registry::resolve_entry,
            registry::update_entry,
            registry::delete_entry,
        ),
        components(
            schemas(
                MediaAPIError,
                AssetDescriptor,
                OrganizeAssets,
                OrganizeAssetsResponse,
                AssetResult,
                CreateCollection,
                CreateCollectionResponse,
                TransformRequest,
                TransformResponse,
                RegistryEntries,
                ResolvedPlaceholder,
                TagList,
            )
        ),
        tags(
            (name = "media", description = "Media resolution and organization API")
        )
    )]
pub struct ApiDoc;

pub fn create_routes(route_state: RouteState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/docs/openapi.json", get(openapi_json))
        .route("/media/proxy", get(proxy::proxy_media))
        .route(
            "/media/organize",
            post(organize::organize_assets).put(organize::create_collection),
        )
        .route("/media/folders", get(list_folders))
        .route("/media/transform", post(transform_url))
        .route("/media/tags", get(list_tags))
        .route("/media/registry", get(registry::list_entries))
        .route(
            "/media/registry/{placeholder}",
            get(registry::resolve_entry)
                .put(registry::update_entry)
                .delete(registry::delete_entry),
        )
        .with_state(route_state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    let method = req.method();
                    let uri = req.uri();

                    let matched_path = req
                        .extensions()
                        .get::<MatchedPath>()
                        .map(|matched_path| matched_path.as_str());

                    tracing::debug_span!("request", %method, %uri, matched_path)
                })
                .on_failure(()),
        )
        .layer(cors)
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    tag = "operations",
    responses(
        (status = 200, description = "Server is up"),
    ),
)]
async fn health() -> &'static str {
    "ok"
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Folder hierarchy of the asset store
#[utoipa::path(
    get,
    path = "/media/folders",
    tag = "media",
    responses(
        (status = 200, description = "Folder tree; nodes whose children failed to list carry an error"),
        (status = BAD_GATEWAY, description = "Unable to list root folders", body = MediaAPIError)
    ),
)]
pub async fn list_folders(
    State(state): State<RouteState>,
) -> Result<Json<Vec<FolderNode>>, MediaAPIError> {
    let tree = state.folders.fetch_tree().await?;
    Ok(Json(tree))
}

/// Build a delivery URL for a placeholder or asset id
#[utoipa::path(
    post,
    path = "/media/transform",
    tag = "media",
    request_body = TransformRequest,
    responses(
        (status = 200, description = "Delivery URL", body = TransformResponse),
        (status = BAD_REQUEST, description = "Missing public id or malformed body", body = MediaAPIError)
    ),
)]
pub async fn transform_url(
    State(state): State<RouteState>,
    JsonBody(request): JsonBody<TransformRequest>,
) -> Result<Json<TransformResponse>, MediaAPIError> {
    if request.public_id.trim().is_empty() {
        return Err(MediaAPIError::bad_request("publicId is required"));
    }
    let resolution = state.registry.resolve(&request.public_id);
    let descriptor = resolution.descriptor();
    let transformations = match descriptor.kind {
        MediaKind::Image => effective_image_options(descriptor, &request.transformations),
        MediaKind::Video => effective_video_options(descriptor, &request.transformations),
    };
    let url = state.urls.build_url(descriptor, &request.transformations);
    Ok(Json(TransformResponse {
        url,
        public_id: descriptor.id.clone(),
        transformations,
        media_type: descriptor.kind,
    }))
}

/// Tags known to the asset store across images and videos
#[utoipa::path(
    get,
    path = "/media/tags",
    tag = "media",
    responses(
        (status = 200, description = "Sorted tag list", body = TagList),
        (status = BAD_GATEWAY, description = "Asset store unavailable", body = MediaAPIError)
    ),
)]
pub async fn list_tags(State(state): State<RouteState>) -> Result<Json<TagList>, MediaAPIError> {
    let mut tags = BTreeSet::new();
    for kind in [MediaKind::Image, MediaKind::Video] {
        tags.extend(state.asset_store.list_tags(kind).await?);
    }
    Ok(Json(TagList {
        tags: tags.into_iter().collect(),
    }))
}

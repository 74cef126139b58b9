use std::collections::BTreeMap;

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::{IntoParams, ToSchema};

use crate::{
    asset_store::AssetStoreError,
    data_model::{
        AssetDescriptor,
        AssetOperationResult,
        CollectionDescriptor,
        MediaKind,
        OrganizeRequest,
    },
    organizer::OrganizeError,
    proxy::ProxyError,
    registry::RegistryError,
    transform::TransformOptions,
};

#[derive(Debug, ToSchema, Serialize, Deserialize)]
pub struct MediaAPIError {
    #[serde(skip)]
    status_code: StatusCode,
    #[serde(rename = "error")]
    message: String,
}

impl MediaAPIError {
    pub fn new(status_code: StatusCode, message: &str) -> Self {
        Self {
            status_code,
            message: message.to_string(),
        }
    }

    pub fn internal_error(e: anyhow::Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string().as_str())
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Keeps an upstream error status when it is one; anything else is a
    /// bad gateway.
    pub fn upstream(status: Option<u16>, message: &str) -> Self {
        let status_code = status
            .and_then(|s| StatusCode::from_u16(s).ok())
            .filter(|s| s.is_client_error() || s.is_server_error())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        Self::new(status_code, message)
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for MediaAPIError {
    fn into_response(self) -> Response {
        error!("API Error: {} - {}", self.status_code, self.message);
        (self.status_code, Json(self)).into_response()
    }
}

/// Malformed or incomplete bodies are client errors.
impl From<JsonRejection> for MediaAPIError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(&rejection.body_text())
    }
}

/// JSON request body whose rejections render as `MediaAPIError`.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(MediaAPIError))]
pub struct JsonBody<T>(pub T);

impl From<AssetStoreError> for MediaAPIError {
    fn from(e: AssetStoreError) -> Self {
        Self::upstream(e.status(), &e.to_string())
    }
}

impl From<RegistryError> for MediaAPIError {
    fn from(e: RegistryError) -> Self {
        match &e {
            RegistryError::Validation { .. } => Self::bad_request(&e.to_string()),
            RegistryError::NotFound(_) => Self::not_found(&e.to_string()),
            RegistryError::Persistence(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
            }
        }
    }
}

impl From<OrganizeError> for MediaAPIError {
    fn from(e: OrganizeError) -> Self {
        match e {
            OrganizeError::Validation(message) => Self::bad_request(&message),
            OrganizeError::Remote(e) => e.into(),
        }
    }
}

impl From<ProxyError> for MediaAPIError {
    fn from(e: ProxyError) -> Self {
        match &e {
            ProxyError::MissingId => Self::bad_request(&e.to_string()),
            ProxyError::Upstream { status, .. } => Self::upstream(Some(*status), &e.to_string()),
            ProxyError::Fetch { .. } => Self::upstream(None, &e.to_string()),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProxyParams {
    /// Placeholder id or literal asset id
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrganizeAssets {
    pub public_ids: Vec<String>,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub context: Option<BTreeMap<String, String>>,
    /// Adds to the existing tags when true (the default), replaces them
    /// otherwise.
    #[serde(default)]
    pub add_tags: Option<bool>,
}

impl From<OrganizeAssets> for OrganizeRequest {
    fn from(value: OrganizeAssets) -> Self {
        let mut request = OrganizeRequest::new(value.public_ids);
        request.destination_folder = value
            .folder
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());
        request.tags = value.tags.map(|tags| tags.into_iter().collect());
        request.context = value.context;
        request.add_tags_additively = value.add_tags.unwrap_or(true);
        request
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssetResult {
    pub asset_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<AssetOperationResult> for AssetResult {
    fn from(value: AssetOperationResult) -> Self {
        Self {
            asset_id: value.asset_id,
            success: value.success,
            error: value.error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrganizeAssetsResponse {
    pub success: bool,
    pub message: String,
    pub results: Vec<AssetResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateCollection {
    pub name: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateCollectionResponse {
    pub success: bool,
    pub message: String,
    #[schema(value_type = Object)]
    pub result: CollectionDescriptor,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransformRequest {
    pub public_id: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub transformations: TransformOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransformResponse {
    pub url: String,
    pub public_id: String,
    /// Options after backfilling from the descriptor and system defaults
    #[schema(value_type = Object)]
    pub transformations: TransformOptions,
    pub media_type: MediaKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegistryEntries {
    pub entries: BTreeMap<String, AssetDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResolvedPlaceholder {
    pub descriptor: AssetDescriptor,
    /// False when the id matched no placeholder and was used literally
    pub registered: bool,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TagList {
    pub tags: Vec<String>,
}

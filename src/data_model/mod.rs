
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display},
    str::FromStr,
};

use anyhow::{anyhow, Result};
use derive_builder::Builder;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{AsRefStr, Display as StrumDisplay, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::transform::{classify_media_type, Crop, Gravity};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    StrumDisplay,
    EnumString,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    StrumDisplay,
    EnumString,
    AsRefStr,
    EnumIter,
    ToSchema,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Area {
    Hero,
    Article,
    Service,
    Team,
    Gallery,
    Logo,
    VideoThumbnail,
}

/// Placement defaults applied after the descriptor's own defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaPreset {
    pub width: u32,
    pub crop: Option<Crop>,
    pub gravity: Option<Gravity>,
}

impl Area {
    pub fn preset(&self) -> AreaPreset {
        let (width, crop, gravity) = match self {
            Area::Hero => (1920, None, None),
            Area::Article => (1200, None, None),
            Area::Service => (800, None, None),
            Area::Team => (400, Some(Crop::Thumb), Some(Gravity::Face)),
            Area::Gallery => (1000, None, None),
            Area::Logo => (300, Some(Crop::Fit), None),
            Area::VideoThumbnail => (640, Some(Crop::Fill), Some(Gravity::Auto)),
        };
        AreaPreset {
            width,
            crop,
            gravity,
        }
    }
}

/// Delivery quality: either a fixed value in 1..=100 or `auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quality {
    Auto,
    Fixed(u8),
}

impl Quality {
    pub fn fixed(value: u64) -> Result<Self> {
        if (1..=100).contains(&value) {
            Ok(Quality::Fixed(value as u8))
        } else {
            Err(anyhow!("quality must be between 1 and 100, got {}", value))
        }
    }
}

impl Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Auto => write!(f, "auto"),
            Quality::Fixed(value) => write!(f, "{}", value),
        }
    }
}

impl FromStr for Quality {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Quality::Auto);
        }
        let value: u64 = s
            .parse()
            .map_err(|_| anyhow!("invalid quality: {}", s))?;
        Quality::fixed(value)
    }
}

impl Serialize for Quality {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Quality::Auto => serializer.serialize_str("auto"),
            Quality::Fixed(value) => serializer.serialize_u8(*value),
        }
    }
}

impl<'de> Deserialize<'de> for Quality {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(value) => Quality::fixed(value).map_err(serde::de::Error::custom),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Format {
    Auto,
    Webp,
    Avif,
    Jpg,
    Png,
    Gif,
    Svg,
    Mp4,
    Webm,
    Mov,
}

impl Format {
    pub fn is_video_container(&self) -> bool {
        matches!(self, Format::Mp4 | Format::Webm | Format::Mov)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
}

impl Dimensions {
    /// Width over height, preferring the declared aspect ratio (`16:9` or
    /// `1.777`) over the pixel dimensions.
    pub fn ratio(&self) -> Option<f64> {
        if let Some(declared) = &self.aspect_ratio {
            let parsed = match declared.split_once([':', '/']) {
                Some((w, h)) => match (w.trim().parse::<f64>(), h.trim().parse::<f64>()) {
                    (Ok(w), Ok(h)) if h > 0.0 => Some(w / h),
                    _ => None,
                },
                None => declared.trim().parse::<f64>().ok(),
            };
            if let Some(ratio) = parsed.filter(|r| *r > 0.0) {
                return Some(ratio);
            }
        }
        if self.width > 0 && self.height > 0 {
            return Some(self.width as f64 / self.height as f64);
        }
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DefaultOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// `auto` or a number in 1..=100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub quality: Option<Quality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub format: Option<Format>,
}

impl DefaultOptions {
    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.quality.is_none() && self.format.is_none()
    }
}

/// Strips the leading slashes a remote-store id must never carry.
pub fn normalize_asset_id(id: &str) -> String {
    id.trim().trim_start_matches('/').to_string()
}

fn deserialize_asset_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let id = String::deserialize(deserializer)?;
    Ok(normalize_asset_id(&id))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssetDescriptor {
    #[serde(deserialize_with = "deserialize_asset_id")]
    #[builder(setter(into))]
    pub id: String,
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub area: Option<Area>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub dimensions: Option<Dimensions>,
    #[serde(default, skip_serializing_if = "DefaultOptions::is_empty")]
    #[builder(default)]
    pub default_options: DefaultOptions,
}

impl AssetDescriptor {
    /// Minimal descriptor for an id that has no registry entry.
    pub fn synthesized(id: &str) -> Self {
        let id = normalize_asset_id(id);
        let kind = classify_media_type(&id);
        Self {
            id,
            kind,
            area: None,
            dimensions: None,
            default_options: DefaultOptions::default(),
        }
    }

    pub fn normalized(mut self) -> Self {
        self.id = normalize_asset_id(&self.id);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(anyhow!("asset id must not be empty"));
        }
        if self.id.starts_with('/') {
            return Err(anyhow!("asset id must not start with a slash: {}", self.id));
        }
        if self.id.chars().any(char::is_whitespace) {
            return Err(anyhow!("asset id must not contain whitespace: {}", self.id));
        }
        if let Some(dimensions) = &self.dimensions {
            if dimensions.width == 0 || dimensions.height == 0 {
                return Err(anyhow!(
                    "dimensions of {} must be non-zero, got {}x{}",
                    self.id,
                    dimensions.width,
                    dimensions.height
                ));
            }
        }
        if self.default_options.width == Some(0) {
            return Err(anyhow!("default width of {} must be non-zero", self.id));
        }
        if let Some(format) = self.default_options.format {
            if self.kind == MediaKind::Image && format.is_video_container() {
                return Err(anyhow!(
                    "image asset {} cannot default to video format {}",
                    self.id,
                    format
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderNode {
    pub name: String,
    pub path: String,
    pub subfolders: Vec<FolderNode>,
    /// Set when this node's children could not be listed; `subfolders` is
    /// then empty because the listing failed, not because there are none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FolderNode {
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            subfolders: Vec::new(),
            error: None,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.error.is_some() || self.subfolders.iter().any(FolderNode::is_partial)
    }

    pub fn find(&self, path: &str) -> Option<&FolderNode> {
        if self.path == path {
            return Some(self);
        }
        self.subfolders.iter().find_map(|child| child.find(path))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizeRequest {
    pub asset_ids: BTreeSet<String>,
    pub destination_folder: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub context: Option<BTreeMap<String, String>>,
    pub add_tags_additively: bool,
}

impl OrganizeRequest {
    pub fn new<I, S>(asset_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            asset_ids: asset_ids
                .into_iter()
                .map(|id| normalize_asset_id(id.as_ref()))
                .collect(),
            destination_folder: None,
            tags: None,
            context: None,
            add_tags_additively: true,
        }
    }

    pub fn with_folder(mut self, folder: &str) -> Self {
        self.destination_folder = Some(folder.to_string());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = Some(tags.into_iter().map(|t| t.as_ref().to_string()).collect());
        self
    }

    pub fn with_context(mut self, context: BTreeMap<String, String>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn replacing_tags(mut self) -> Self {
        self.add_tags_additively = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.asset_ids.is_empty() {
            return Err(anyhow!("at least one asset id is required"));
        }
        if self.asset_ids.iter().any(|id| id.is_empty()) {
            return Err(anyhow!("asset ids must not be empty"));
        }
        if self.destination_folder.is_none() && self.tags.is_none() && self.context.is_none() {
            return Err(anyhow!(
                "nothing to do: provide a destination folder, tags or context"
            ));
        }
        if let Some(tags) = &self.tags {
            if tags.iter().any(|t| t.trim().is_empty()) {
                return Err(anyhow!("tags must not be empty"));
            }
        }
        if let Some(context) = &self.context {
            if context.keys().any(|k| k.trim().is_empty()) {
                return Err(anyhow!("context keys must not be empty"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetOperationResult {
    pub asset_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AssetOperationResult {
    pub fn succeeded(asset_id: &str) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            success: true,
            error: None,
        }
    }

    pub fn failed(asset_id: &str, error: String) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            success: false,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollectionSource {
    Tag(String),
    Folder(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDescriptor {
    pub name: String,
    pub source: CollectionSource,
    pub asset_ids: Vec<String>,
    /// False when an existing collection of the same name was updated.
    pub created: bool,
}

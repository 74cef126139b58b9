use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::data_model::{normalize_asset_id, AssetDescriptor, Format, MediaKind, Quality};

/// Container extensions the delivery endpoint serves from the video family.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "webm", "mov", "m4v", "mkv", "avi", "ogv", "3gp", "flv", "wmv", "mpeg", "mpg", "m3u8",
];

const ASPECT_TOLERANCE: f64 = 0.01;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Crop {
    Fill,
    Fit,
    Scale,
    Crop,
    Thumb,
}

impl Crop {
    /// Whether this mode discards pixels, which is when gravity matters.
    pub fn crops(&self) -> bool {
        matches!(self, Crop::Fill | Crop::Crop | Crop::Thumb)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Gravity {
    Auto,
    Face,
    Center,
    Region(String),
}

impl fmt::Display for Gravity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gravity::Auto => write!(f, "auto"),
            Gravity::Face => write!(f, "face"),
            Gravity::Center => write!(f, "center"),
            Gravity::Region(region) => write!(f, "{}", region),
        }
    }
}

impl FromStr for Gravity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Gravity::Auto),
            "face" => Ok(Gravity::Face),
            "center" => Ok(Gravity::Center),
            region
                if !region.is_empty()
                    && region
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':') =>
            {
                Ok(Gravity::Region(region.to_string()))
            }
            other => Err(format!("invalid gravity: {:?}", other)),
        }
    }
}

impl TryFrom<String> for Gravity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Gravity> for String {
    fn from(value: Gravity) -> Self {
        value.to_string()
    }
}

/// Options a call site may request. Keys the delivery layer does not know
/// about are dropped during deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransformOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<Crop>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gravity: Option<Gravity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Format>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blur: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle: Option<i32>,
}

impl TransformOptions {
    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }
}

/// Classifies an id by the extension of its trailing path segment.
pub fn classify_media_type(id: &str) -> MediaKind {
    let segment = id.rsplit('/').next().unwrap_or(id);
    match segment.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => {
            let extension = extension.to_ascii_lowercase();
            if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
                MediaKind::Video
            } else {
                MediaKind::Image
            }
        }
        _ => MediaKind::Image,
    }
}

fn aspect_crop(descriptor: &AssetDescriptor, width: Option<u32>, height: Option<u32>) -> Option<Crop> {
    let (width, height) = (width?, height?);
    if width == 0 || height == 0 {
        return None;
    }
    let source = descriptor.dimensions.as_ref()?.ratio()?;
    let requested = width as f64 / height as f64;
    if (source - requested).abs() > ASPECT_TOLERANCE {
        Some(Crop::Fill)
    } else {
        None
    }
}

/// Backfills call-site options: descriptor defaults first, then the area
/// preset, then the system defaults (original width, auto quality and format).
pub fn effective_image_options(
    descriptor: &AssetDescriptor,
    options: &TransformOptions,
) -> TransformOptions {
    let preset = descriptor.area.map(|area| area.preset());
    let defaults = &descriptor.default_options;

    let width = options
        .width
        .or(defaults.width)
        .or(preset.as_ref().map(|p| p.width));
    let height = options.height;

    let mut crop = options.crop;
    let mut gravity = options.gravity.clone();
    if crop.is_none() {
        if let Some(aspect) = aspect_crop(descriptor, width, height) {
            crop = Some(aspect);
            gravity = gravity.or(Some(Gravity::Auto));
        } else if let Some(preset) = &preset {
            crop = preset.crop;
            gravity = gravity.or(preset.gravity.clone());
        }
    }
    let gravity = gravity.filter(|_| crop.is_some_and(|c| c.crops()));

    TransformOptions {
        width,
        height,
        crop,
        gravity,
        quality: Some(options.quality.or(defaults.quality).unwrap_or(Quality::Auto)),
        format: Some(options.format.or(defaults.format).unwrap_or(Format::Auto)),
        ..options.clone()
    }
}

/// Video renditions only honour width, quality and a container format.
pub fn effective_video_options(
    descriptor: &AssetDescriptor,
    options: &TransformOptions,
) -> TransformOptions {
    let defaults = &descriptor.default_options;
    let format = options
        .format
        .filter(Format::is_video_container)
        .or(defaults.format.filter(Format::is_video_container))
        .unwrap_or(Format::Mp4);
    TransformOptions {
        width: options
            .width
            .or(defaults.width)
            .or(descriptor.area.map(|area| area.preset().width)),
        quality: Some(options.quality.or(defaults.quality).unwrap_or(Quality::Auto)),
        format: Some(format),
        ..Default::default()
    }
}

/// Renders options into the delivery endpoint's transformation segments,
/// e.g. `w_600,c_fill,g_auto,q_auto,f_auto`.
pub fn transformation_string(options: &TransformOptions) -> String {
    let mut tokens = Vec::new();
    if let Some(width) = options.width {
        tokens.push(format!("w_{}", width));
    }
    if let Some(height) = options.height {
        tokens.push(format!("h_{}", height));
    }
    if let Some(crop) = options.crop {
        tokens.push(format!("c_{}", crop));
    }
    if let Some(gravity) = &options.gravity {
        tokens.push(format!("g_{}", gravity));
    }
    if let Some(quality) = options.quality {
        tokens.push(format!("q_{}", quality));
    }
    if let Some(format) = options.format {
        tokens.push(format!("f_{}", format));
    }
    if let Some(angle) = options.angle {
        tokens.push(format!("a_{}", angle));
    }
    if let Some(background) = &options.background {
        match background.strip_prefix('#') {
            Some(hex) => tokens.push(format!("b_rgb:{}", hex)),
            None => tokens.push(format!("b_{}", background)),
        }
    }
    if let Some(overlay) = &options.overlay {
        tokens.push(format!("l_{}", normalize_asset_id(overlay).replace('/', ":")));
    }
    if let Some(effect) = &options.effect {
        tokens.push(format!("e_{}", effect));
    }

    let mut segments = Vec::new();
    if !tokens.is_empty() {
        segments.push(tokens.join(","));
    }
    // A second effect cannot share the component with `effect`, so blur is
    // always chained as its own component.
    if let Some(blur) = options.blur {
        segments.push(format!("e_blur:{}", blur));
    }
    segments.join("/")
}

/// Option keys the builder emits, in component order.
const OPTION_KEYS: &[&str] = &["w", "h", "c", "g", "q", "f", "a", "b", "l", "e"];

fn split_token(token: &str) -> Option<(&str, &str)> {
    let (key, value) = token.split_once('_')?;
    if key.is_empty() || key.len() > 2 || !key.chars().all(|c| c.is_ascii_lowercase()) {
        return None;
    }
    Some((key, value))
}

/// A token the builder could have produced: a known key whose value parses.
fn is_option_token(token: &str) -> bool {
    let Some((key, value)) = split_token(token) else {
        return false;
    };
    if !OPTION_KEYS.contains(&key) || value.is_empty() {
        return false;
    }
    match key {
        "w" | "h" => value.parse::<u32>().is_ok(),
        "c" => value.parse::<Crop>().is_ok(),
        "g" => value.parse::<Gravity>().is_ok(),
        "q" => value.parse::<Quality>().is_ok(),
        "f" => value.parse::<Format>().is_ok(),
        "a" => value.parse::<i32>().is_ok(),
        _ => true,
    }
}

fn is_transformation_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.split(',').all(is_option_token)
}

fn is_blur_segment(segment: &str) -> bool {
    segment
        .strip_prefix("e_blur:")
        .is_some_and(|strength| strength.parse::<u32>().is_ok())
}

/// Number of leading path segments that are transformation components. The
/// builder emits at most an option component followed by a blur component.
fn transformation_len(segments: &[&str]) -> usize {
    match segments {
        [first, ..] if is_blur_segment(first) => 1,
        [first, second, ..] if is_transformation_segment(first) && is_blur_segment(second) => 2,
        [first, ..] if is_transformation_segment(first) => 1,
        _ => 0,
    }
}

fn apply_token(options: &mut TransformOptions, key: &str, value: &str) {
    match key {
        "w" => options.width = value.parse().ok(),
        "h" => options.height = value.parse().ok(),
        "c" => options.crop = value.parse().ok(),
        "g" => options.gravity = value.parse().ok(),
        "q" => options.quality = value.parse().ok(),
        "f" => options.format = value.parse().ok(),
        "a" => options.angle = value.parse().ok(),
        "b" => {
            options.background = Some(match value.strip_prefix("rgb:") {
                Some(hex) => format!("#{}", hex),
                None => value.to_string(),
            })
        }
        "l" => options.overlay = Some(value.replace(':', "/")),
        "e" => match value
            .strip_prefix("blur:")
            .and_then(|strength| strength.parse().ok())
        {
            Some(strength) => options.blur = Some(strength),
            None => options.effect = Some(value.to_string()),
        },
        _ => {}
    }
}

/// Parses transformation segments (`w_600,q_auto/e_blur:300`) back into
/// options. Unknown keys are skipped.
pub fn parse_transformation(transformation: &str) -> TransformOptions {
    let mut options = TransformOptions::default();
    for segment in transformation.split('/') {
        for token in segment.split(',') {
            if let Some((key, value)) = split_token(token) {
                apply_token(&mut options, key, value);
            }
        }
    }
    options
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDeliveryUrl {
    pub kind: MediaKind,
    pub options: TransformOptions,
    pub public_id: String,
}

pub fn parse_delivery_url(url: &str) -> Option<ParsedDeliveryUrl> {
    let (kind, rest) = [MediaKind::Image, MediaKind::Video]
        .into_iter()
        .find_map(|kind| {
            let marker = format!("/{}/upload/", kind);
            url.find(&marker)
                .map(|index| (kind, &url[index + marker.len()..]))
        })?;

    let segments: Vec<&str> = rest.split('/').collect();
    let split_at = transformation_len(&segments);
    let public_id = segments[split_at..].join("/");
    if public_id.is_empty() {
        return None;
    }
    Some(ParsedDeliveryUrl {
        kind,
        options: parse_transformation(&segments[..split_at].join("/")),
        public_id,
    })
}

/// Builds delivery URLs of the form
/// `{base}/{cloud}/{image|video}/upload/{transformation}/{id}`.
#[derive(Debug, Clone)]
pub struct DeliveryUrlBuilder {
    base_url: String,
    cloud_name: String,
}

impl DeliveryUrlBuilder {
    pub fn new(base_url: &str, cloud_name: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            cloud_name: cloud_name.trim_matches('/').to_string(),
        }
    }

    /// Picks the builder matching the descriptor's kind.
    pub fn build_url(&self, descriptor: &AssetDescriptor, options: &TransformOptions) -> String {
        match descriptor.kind {
            MediaKind::Image => self.build_image_url(descriptor, options),
            MediaKind::Video => self.build_video_url(descriptor, options),
        }
    }

    /// Callers must not pass video descriptors here; the resulting URL
    /// points at the image endpoint family and is not playable.
    pub fn build_image_url(&self, descriptor: &AssetDescriptor, options: &TransformOptions) -> String {
        let effective = effective_image_options(descriptor, options);
        self.assemble(MediaKind::Image, &transformation_string(&effective), &descriptor.id)
    }

    pub fn build_video_url(&self, descriptor: &AssetDescriptor, options: &TransformOptions) -> String {
        let effective = effective_video_options(descriptor, options);
        self.assemble(MediaKind::Video, &transformation_string(&effective), &descriptor.id)
    }

    /// Passthrough URL for the stored original: no descriptor defaults, no
    /// area preset and no system defaults.
    pub fn canonical_url(&self, descriptor: &AssetDescriptor) -> String {
        self.assemble(descriptor.kind, "", &descriptor.id)
    }

    fn assemble(&self, kind: MediaKind, transformation: &str, id: &str) -> String {
        let id = normalize_asset_id(id);
        if transformation.is_empty() {
            format!("{}/{}/{}/upload/{}", self.base_url, self.cloud_name, kind, id)
        } else {
            format!(
                "{}/{}/{}/upload/{}/{}",
                self.base_url, self.cloud_name, kind, transformation, id
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_model::{
        test_objects::tests::{
            mock_hero_descriptor,
            mock_image_descriptor,
            mock_video_descriptor,
            TEST_CLOUD_NAME,
            TEST_DELIVERY_BASE_URL,
        },
        Area,
        AssetDescriptorBuilder,
        Dimensions,
    };

    fn builder() -> DeliveryUrlBuilder {
        DeliveryUrlBuilder::new(TEST_DELIVERY_BASE_URL, TEST_CLOUD_NAME)
    }

    #[test]
    fn test_classify_media_type_uses_trailing_extension() {
        assert_eq!(classify_media_type("videos/intro.mp4"), MediaKind::Video);
        assert_eq!(classify_media_type("videos/INTRO.MOV"), MediaKind::Video);
        assert_eq!(classify_media_type("reel.webm"), MediaKind::Video);
        assert_eq!(classify_media_type("videos.mp4/poster"), MediaKind::Image);
        assert_eq!(classify_media_type("hero/main-img"), MediaKind::Image);
        assert_eq!(classify_media_type("team/alex.jpg"), MediaKind::Image);
        assert_eq!(classify_media_type(".mp4"), MediaKind::Image);
    }

    #[test]
    fn test_descriptor_defaults_backfill_and_round_trip() {
        let descriptor = mock_image_descriptor("gallery/boat", 800, 80, Format::Webp);
        let url = builder().build_image_url(&descriptor, &TransformOptions::default());
        assert_eq!(
            url,
            "https://media.example.test/demo-cloud/image/upload/w_800,q_80,f_webp/gallery/boat"
        );

        let parsed = parse_delivery_url(&url).unwrap();
        assert_eq!(parsed.kind, MediaKind::Image);
        assert_eq!(parsed.public_id, "gallery/boat");
        assert_eq!(parsed.options.width, Some(800));
        assert_eq!(parsed.options.quality, Some(Quality::Fixed(80)));
        assert_eq!(parsed.options.format, Some(Format::Webp));
    }

    #[test]
    fn test_call_site_override_wins_over_defaults() {
        let descriptor = mock_hero_descriptor();
        let url = builder().build_image_url(&descriptor, &TransformOptions::default().with_width(600));
        let parsed = parse_delivery_url(&url).unwrap();
        assert_eq!(parsed.options.width, Some(600));
        assert_eq!(parsed.options.quality, Some(Quality::Auto));
        assert_eq!(parsed.options.format, Some(Format::Auto));
        assert!(url.contains("w_600"));
        assert!(!url.contains("w_1200"));
    }

    #[test]
    fn test_system_defaults_leave_width_unset() {
        let descriptor = AssetDescriptor::synthesized("/misc/photo");
        let url = builder().build_image_url(&descriptor, &TransformOptions::default());
        assert_eq!(
            url,
            "https://media.example.test/demo-cloud/image/upload/q_auto,f_auto/misc/photo"
        );
    }

    #[test]
    fn test_full_option_set_round_trips() {
        let options = TransformOptions {
            width: Some(640),
            height: Some(480),
            crop: Some(Crop::Fill),
            gravity: Some(Gravity::Region("north_east".to_string())),
            quality: Some(Quality::Fixed(65)),
            format: Some(Format::Avif),
            effect: Some("grayscale".to_string()),
            blur: Some(300),
            background: Some("#ffcc00".to_string()),
            overlay: Some("brand/logo-mark".to_string()),
            angle: Some(-15),
        };
        let descriptor = AssetDescriptor::synthesized("hero/main-img");
        let url = builder().build_image_url(&descriptor, &options);
        let parsed = parse_delivery_url(&url).unwrap();
        assert_eq!(parsed.options, options);
        assert_eq!(parsed.public_id, "hero/main-img");
    }

    #[test]
    fn test_gravity_dropped_without_cropping_mode() {
        let options = TransformOptions {
            width: Some(300),
            crop: Some(Crop::Fit),
            gravity: Some(Gravity::Face),
            ..Default::default()
        };
        let url = builder().build_image_url(&AssetDescriptor::synthesized("a/b"), &options);
        assert!(url.contains("c_fit"));
        assert!(!url.contains("g_face"));
    }

    #[test]
    fn test_aspect_mismatch_defaults_to_fill() {
        let descriptor = AssetDescriptorBuilder::default()
            .id("article/cover")
            .kind(MediaKind::Image)
            .dimensions(Some(Dimensions {
                width: 1600,
                height: 900,
                aspect_ratio: None,
            }))
            .build()
            .unwrap();
        let square = TransformOptions::default().with_width(400).with_height(400);
        let url = builder().build_image_url(&descriptor, &square);
        assert!(url.contains("c_fill"));
        assert!(url.contains("g_auto"));

        let matching = TransformOptions::default().with_width(800).with_height(450);
        let url = builder().build_image_url(&descriptor, &matching);
        assert!(!url.contains("c_"));
    }

    #[test]
    fn test_area_preset_applies_after_descriptor_defaults() {
        let descriptor = AssetDescriptorBuilder::default()
            .id("team/alex")
            .kind(MediaKind::Image)
            .area(Some(Area::Team))
            .build()
            .unwrap();
        let url = builder().build_image_url(&descriptor, &TransformOptions::default());
        let parsed = parse_delivery_url(&url).unwrap();
        assert_eq!(parsed.options.width, Some(400));
        assert_eq!(parsed.options.crop, Some(Crop::Thumb));
        assert_eq!(parsed.options.gravity, Some(Gravity::Face));
    }

    #[test]
    fn test_video_url_restricts_options_and_defaults_to_mp4() {
        let descriptor = mock_video_descriptor("videos/intro.mov");
        let options = TransformOptions {
            width: Some(720),
            format: Some(Format::Webp),
            effect: Some("sepia".to_string()),
            ..Default::default()
        };
        let url = builder().build_video_url(&descriptor, &options);
        assert_eq!(
            url,
            "https://media.example.test/demo-cloud/video/upload/w_720,q_auto,f_mp4/videos/intro.mov"
        );

        let webm = TransformOptions {
            format: Some(Format::Webm),
            ..Default::default()
        };
        let url = builder().build_url(&descriptor, &webm);
        assert!(url.contains("/video/upload/"));
        assert!(url.contains("f_webm"));
    }

    #[test]
    fn test_unknown_option_keys_are_ignored() {
        let options: TransformOptions = serde_json::from_value(serde_json::json!({
            "width": 320,
            "dpr": 2,
            "flags": "progressive",
        }))
        .unwrap();
        assert_eq!(options, TransformOptions::default().with_width(320));

        let parsed = parse_transformation("w_320,dpr_2.0,fl_progressive");
        assert_eq!(parsed.width, Some(320));
    }

    #[test]
    fn test_underscored_ids_survive_parsing() {
        for id in ["bg_hero", "ab_cd/photo", "w_abc/cover", "team/q_lead"] {
            let url = builder().build_image_url(
                &AssetDescriptor::synthesized(id),
                &TransformOptions::default(),
            );
            let parsed = parse_delivery_url(&url).unwrap();
            assert_eq!(parsed.public_id, id, "url {}", url);
            assert_eq!(parsed.options.quality, Some(Quality::Auto));
        }

        let blurred = TransformOptions {
            blur: Some(200),
            ..Default::default()
        };
        let url = builder().build_image_url(&AssetDescriptor::synthesized("e_x/shot"), &blurred);
        let parsed = parse_delivery_url(&url).unwrap();
        assert_eq!(parsed.public_id, "e_x/shot");
        assert_eq!(parsed.options.blur, Some(200));
    }

    #[test]
    fn test_canonical_url_skips_defaults_and_presets() {
        let team = AssetDescriptorBuilder::default()
            .id("/team/alex")
            .kind(MediaKind::Image)
            .area(Some(Area::Team))
            .build()
            .unwrap();
        assert_eq!(
            builder().canonical_url(&team),
            "https://media.example.test/demo-cloud/image/upload/team/alex"
        );
        assert_eq!(
            builder().canonical_url(&mock_video_descriptor("videos/intro.mov")),
            "https://media.example.test/demo-cloud/video/upload/videos/intro.mov"
        );
        let hero = builder().canonical_url(&mock_hero_descriptor());
        let parsed = parse_delivery_url(&hero).unwrap();
        assert_eq!(parsed.public_id, "hero/main-img");
        assert_eq!(parsed.options, TransformOptions::default());
    }
}

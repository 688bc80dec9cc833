// src/models.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelKind {
    #[default]
    #[serde(rename = "fast", alias = "nano-banana")]
    Fast,
    #[serde(rename = "high-fidelity", alias = "nano-banana-pro")]
    HighFidelity,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Fast, ModelKind::HighFidelity];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Fast => "fast",
            ModelKind::HighFidelity => "high-fidelity",
        }
    }

    /// Ceiling on reference images the edit endpoint accepts.
    pub fn max_reference_images(&self) -> usize {
        match self {
            ModelKind::Fast => 3,
            ModelKind::HighFidelity => 14,
        }
    }

    pub fn supports_resolution(&self, resolution: Resolution) -> bool {
        resolution == Resolution::OneK || *self == ModelKind::HighFidelity
    }

    pub fn info(&self) -> ModelInfo {
        match self {
            ModelKind::Fast => ModelInfo {
                id: self.as_str().to_string(),
                name: "Nano Banana".to_string(),
                provider: "fal.ai".to_string(),
                kind: "image".to_string(),
                description: "Fast text-to-image generation and editing with up to 3 reference images"
                    .to_string(),
            },
            ModelKind::HighFidelity => ModelInfo {
                id: self.as_str().to_string(),
                name: "Nano Banana Pro".to_string(),
                provider: "fal.ai".to_string(),
                kind: "image".to_string(),
                description: "High-fidelity generation and editing with up to 14 reference images, 1K/2K/4K output and optional web search"
                    .to_string(),
            },
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::OneK => "1K",
            Resolution::TwoK => "2K",
            Resolution::FourK => "4K",
        }
    }
}

/// Aspect ratios the upstream accepts. `auto` is only legal on edits.
pub const ASPECT_RATIOS: &[&str] = &[
    "21:9", "16:9", "3:2", "4:3", "5:4", "1:1", "4:5", "3:4", "2:3", "9:16",
];

pub const AUTO_ASPECT_RATIO: &str = "auto";

fn default_num_images() -> u32 {
    1
}

/// Arguments of a `generate_image` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    #[serde(default)]
    pub prompt: String,

    #[serde(default)]
    pub output_path: PathBuf,

    #[serde(default)]
    pub model: ModelKind,

    /// URLs, `data:` URIs or local file paths
    #[serde(default)]
    pub reference_images: Vec<String>,

    #[serde(default)]
    pub aspect_ratio: Option<String>,

    #[serde(default)]
    pub output_format: OutputFormat,

    #[serde(default)]
    pub resolution: Resolution,

    #[serde(default = "default_num_images")]
    pub num_images: u32,

    #[serde(default)]
    pub enable_web_search: bool,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            output_path: output_path.into(),
            model: ModelKind::default(),
            reference_images: Vec::new(),
            aspect_ratio: None,
            output_format: OutputFormat::default(),
            resolution: Resolution::default(),
            num_images: default_num_images(),
            enable_web_search: false,
        }
    }

    pub fn with_model(mut self, model: ModelKind) -> Self {
        self.model = model;
        self
    }

    pub fn with_reference_image(mut self, image: impl Into<String>) -> Self {
        self.reference_images.push(image.into());
        self
    }

    pub fn with_aspect_ratio(mut self, ar: impl Into<String>) -> Self {
        self.aspect_ratio = Some(ar.into());
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_num_images(mut self, num: u32) -> Self {
        self.num_images = num;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.enable_web_search = enabled;
        self
    }

    pub fn is_edit(&self) -> bool {
        !self.reference_images.is_empty()
    }
}

/// How a reference image string was given to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    RemoteUrl,
    EmbeddedData,
    LocalFile,
}

/// Body sent to a run endpoint. Optional fields are filled in by the router
/// according to the endpoint's schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FalPayload {
    pub prompt: String,
    pub output_format: OutputFormat,
    pub num_images: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_web_search: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub images: Vec<UpstreamImage>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub has_nsfw_concepts: Vec<bool>,
}

// fal sends `null` for lists it has nothing to say about.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamImage {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub image_path: PathBuf,
    pub model: ModelKind,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

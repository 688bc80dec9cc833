// src/mcp/tools.rs
use crate::errors::{ClassifiedError, FalImageError};
use crate::mcp::{McpTool, ToolOutput};
use crate::models::ASPECT_RATIOS;
use crate::services::ImageGenerator;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::fmt::Write as _;
use std::sync::Arc;

pub struct GenerateImageTool {
    generator: Arc<ImageGenerator>,
}

impl GenerateImageTool {
    pub fn new(generator: Arc<ImageGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl McpTool for GenerateImageTool {
    async fn execute(&self, params: Value) -> Result<ToolOutput, ClassifiedError> {
        let outcome = self.generator.generate_from_args(&params).await?;

        let mut text = format!(
            "Image generated with {} in {}ms\nSaved to: {}",
            outcome.result.model,
            outcome.result.usage.duration_ms,
            outcome.result.image_path.display()
        );
        for path in &outcome.saved.extra {
            let _ = write!(text, "\nAlso saved: {}", path.display());
        }
        if let Some(description) = &outcome.description {
            let _ = write!(text, "\nDescription: {}", description);
        }

        let structured = serde_json::to_value(&outcome.result).map_err(|e| {
            ClassifiedError::classify(&FalImageError::Serialization(e.to_string()))
        })?;

        Ok(ToolOutput { text, structured })
    }

    fn name(&self) -> &str {
        "generate_image"
    }

    fn description(&self) -> &str {
        "Generates an image from a text prompt, optionally editing or conditioning on reference images, and saves it to output_path"
    }

    fn input_schema(&self) -> Value {
        let mut aspect_ratios: Vec<&str> = ASPECT_RATIOS.to_vec();
        aspect_ratios.push("auto");

        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "What to generate, or how to edit the reference images"
                },
                "output_path": {
                    "type": "string",
                    "description": "Where to save the image. Extra images get _2, _3, ... suffixes"
                },
                "model": {
                    "type": "string",
                    "enum": ["fast", "high-fidelity"],
                    "default": "fast"
                },
                "reference_images": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Image URLs, data: URIs or local file paths (max 3 for fast, 14 for high-fidelity)"
                },
                "aspect_ratio": {
                    "type": "string",
                    "enum": aspect_ratios,
                    "description": "\"auto\" is only valid with reference images"
                },
                "output_format": {
                    "type": "string",
                    "enum": ["png", "jpeg", "webp"],
                    "default": "png"
                },
                "resolution": {
                    "type": "string",
                    "enum": ["1K", "2K", "4K"],
                    "default": "1K",
                    "description": "2K and 4K require high-fidelity"
                },
                "num_images": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 4,
                    "default": 1
                },
                "enable_web_search": {
                    "type": "boolean",
                    "default": false
                }
            },
            "required": ["prompt", "output_path"]
        })
    }
}

pub struct ListModelsTool {
    generator: Arc<ImageGenerator>,
}

impl ListModelsTool {
    pub fn new(generator: Arc<ImageGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl McpTool for ListModelsTool {
    async fn execute(&self, _params: Value) -> Result<ToolOutput, ClassifiedError> {
        let models = self.generator.list_models();
        let structured = json!({ "models": models });
        let text = serde_json::to_string_pretty(&models).map_err(|e| {
            ClassifiedError::classify(&FalImageError::Serialization(e.to_string()))
        })?;
        Ok(ToolOutput { text, structured })
    }

    fn name(&self) -> &str {
        "list_models"
    }

    fn description(&self) -> &str {
        "Lists the available image generation models"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }
}

// src/services/router.rs
use crate::models::{FalPayload, GenerationRequest, ModelKind};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    FastGenerate,
    FastEdit,
    ProGenerate,
    ProEdit,
}

impl Endpoint {
    pub fn route(model: ModelKind, has_reference_images: bool) -> Self {
        match (model, has_reference_images) {
            (ModelKind::Fast, false) => Endpoint::FastGenerate,
            (ModelKind::Fast, true) => Endpoint::FastEdit,
            (ModelKind::HighFidelity, false) => Endpoint::ProGenerate,
            (ModelKind::HighFidelity, true) => Endpoint::ProEdit,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Endpoint::FastGenerate => "fal-ai/nano-banana",
            Endpoint::FastEdit => "fal-ai/nano-banana/edit",
            Endpoint::ProGenerate => "fal-ai/nano-banana-pro",
            Endpoint::ProEdit => "fal-ai/nano-banana-pro/edit",
        }
    }

    pub fn is_edit(&self) -> bool {
        matches!(self, Endpoint::FastEdit | Endpoint::ProEdit)
    }

    pub fn is_pro(&self) -> bool {
        matches!(self, Endpoint::ProGenerate | Endpoint::ProEdit)
    }

    /// Shapes the request into this endpoint's schema. `image_urls` only goes
    /// to edit endpoints, resolution and web search only to pro ones.
    pub fn build_payload(&self, request: &GenerationRequest, image_urls: Vec<String>) -> FalPayload {
        FalPayload {
            prompt: request.prompt.clone(),
            output_format: request.output_format,
            num_images: request.num_images,
            aspect_ratio: request.aspect_ratio.clone(),
            image_urls: self.is_edit().then_some(image_urls),
            resolution: self.is_pro().then_some(request.resolution),
            enable_web_search: (self.is_pro() && request.enable_web_search).then_some(true),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

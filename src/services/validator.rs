// src/services/validator.rs
use crate::errors::FalImageError;
use crate::models::{ASPECT_RATIOS, AUTO_ASPECT_RATIO, GenerationRequest, ModelKind};

pub const MAX_NUM_IMAGES: u32 = 4;

/// Checks a request before any network activity. Stops at the first
/// violation.
pub fn validate_request(request: &GenerationRequest) -> Result<(), FalImageError> {
    if request.prompt.trim().is_empty() {
        return Err(FalImageError::Validation("prompt is required".to_string()));
    }

    if request.output_path.as_os_str().is_empty() {
        return Err(FalImageError::Validation("output_path is required".to_string()));
    }

    if let Some(ar) = request.aspect_ratio.as_deref() {
        if ar == AUTO_ASPECT_RATIO {
            if !request.is_edit() {
                return Err(FalImageError::Validation(format!(
                    "Aspect ratio \"auto\" requires reference images. Use one of: {}",
                    ASPECT_RATIOS.join(", ")
                )));
            }
        } else if !ASPECT_RATIOS.contains(&ar) {
            return Err(FalImageError::Validation(format!(
                "Invalid aspect ratio \"{}\". Valid options: {}{}",
                ar,
                ASPECT_RATIOS.join(", "),
                if request.is_edit() { ", auto" } else { "" }
            )));
        }
    }

    let max_refs = request.model.max_reference_images();
    if request.reference_images.len() > max_refs {
        return Err(FalImageError::Validation(format!(
            "Model {} accepts at most {} reference images, got {}",
            request.model,
            max_refs,
            request.reference_images.len()
        )));
    }

    if !request.model.supports_resolution(request.resolution) {
        return Err(FalImageError::Validation(format!(
            "Resolution {} requires the {} model; {} only supports 1K",
            request.resolution.as_str(),
            ModelKind::HighFidelity,
            request.model
        )));
    }

    if request.num_images == 0 || request.num_images > MAX_NUM_IMAGES {
        return Err(FalImageError::Validation(format!(
            "num_images must be between 1 and {}, got {}",
            MAX_NUM_IMAGES, request.num_images
        )));
    }

    Ok(())
}

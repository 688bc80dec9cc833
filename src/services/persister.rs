// src/services/persister.rs
use crate::errors::FalImageError;
use crate::models::{GenerationRequest, UpstreamResponse};
use bytes::Bytes;
use log::{debug, info};
use reqwest::Client;
use std::path::{Path, PathBuf};

/// Files written for one generation, primary first.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedImages {
    pub primary: PathBuf,
    pub extra: Vec<PathBuf>,
}

pub struct ImagePersister {
    client: Client,
}

impl ImagePersister {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Downloads the returned images and writes them next to `output_path`,
    /// in response order.
    pub async fn persist(
        &self,
        response: &UpstreamResponse,
        request: &GenerationRequest,
    ) -> Result<SavedImages, FalImageError> {
        let Some(first) = response.images.first() else {
            return Err(FalImageError::Validation(
                "No images returned from API".to_string(),
            ));
        };

        if response.has_nsfw_concepts.first().copied().unwrap_or(false) {
            return Err(FalImageError::SafetyBlock(
                "the generated image was flagged and withheld".to_string(),
            ));
        }

        let primary = request.output_path.clone();
        self.save(&first.url, &primary).await?;

        let mut extra = Vec::new();
        if request.num_images > 1 {
            let limit = request.num_images as usize;
            for (i, image) in response.images.iter().enumerate().take(limit).skip(1) {
                let path = sibling_path(&primary, i + 1);
                self.save(&image.url, &path).await?;
                extra.push(path);
            }
        }

        info!(
            "Saved {} image(s) to {}",
            1 + extra.len(),
            primary.display()
        );
        Ok(SavedImages { primary, extra })
    }

    async fn save(&self, url: &str, path: &Path) -> Result<(), FalImageError> {
        let data = self.download(url).await?;
        write_image(path, &data).await?;
        debug!("Wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Bytes, FalImageError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FalImageError::Download(format!("Failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FalImageError::Download(format!(
                "Failed to download image: HTTP {}",
                status.as_u16()
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| FalImageError::Download(format!("Failed to read image body: {}", e)))
    }
}

/// Creates missing parent directories and overwrites any existing file.
pub async fn write_image(path: &Path, data: &[u8]) -> Result<(), FalImageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data).await?;
    Ok(())
}

/// `/tmp/x.png` with n=2 becomes `/tmp/x_2.png`. Without an extension the
/// suffix goes at the end.
pub fn sibling_path(path: &Path, n: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let file_name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    };
    path.with_file_name(file_name)
}

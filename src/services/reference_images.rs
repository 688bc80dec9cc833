// src/services/reference_images.rs
use crate::errors::FalImageError;
use crate::models::ReferenceKind;
use crate::services::fal_client::FalApi;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use log::{debug, info};
use std::path::Path;
use std::time::Duration;

/// Decides how a reference image was supplied. Prefix only, no I/O.
pub fn classify(input: &str) -> ReferenceKind {
    if input.starts_with("data:") {
        ReferenceKind::EmbeddedData
    } else if input.starts_with("http://") || input.starts_with("https://") {
        ReferenceKind::RemoteUrl
    } else {
        ReferenceKind::LocalFile
    }
}

/// MIME type for a file extension; unknown extensions fall back to png.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "image/png",
    }
}

/// Splits `data:<mime>;base64,<payload>` and decodes the payload.
pub fn parse_data_url(input: &str) -> Result<(String, Vec<u8>), FalImageError> {
    let invalid = || FalImageError::Parse("Invalid data URL format".to_string());

    let rest = input.strip_prefix("data:").ok_or_else(invalid)?;
    let (mime, payload) = rest.split_once(";base64,").ok_or_else(invalid)?;
    if mime.is_empty() || mime.contains(';') || payload.is_empty() {
        return Err(invalid());
    }

    let data = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| FalImageError::Parse(format!("Invalid base64 payload: {}", e)))?;

    Ok((mime.to_string(), data))
}

/// Turns one reference image into a URL the provider can dereference.
pub async fn materialize(
    api: &dyn FalApi,
    input: &str,
    upload_timeout: Duration,
) -> Result<String, FalImageError> {
    match classify(input) {
        ReferenceKind::RemoteUrl => Ok(input.to_string()),
        ReferenceKind::EmbeddedData => {
            let (mime, data) = parse_data_url(input)?;
            let subtype = mime.rsplit('/').next().unwrap_or("png");
            let file_name = format!("reference.{}", subtype);
            upload_with_timeout(api, Bytes::from(data), &mime, &file_name, upload_timeout).await
        }
        ReferenceKind::LocalFile => {
            let path = Path::new(input);
            let is_file = tokio::fs::metadata(path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            if !is_file {
                return Err(FalImageError::NotFound(input.to_string()));
            }

            let data = tokio::fs::read(path).await?;
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("reference.png")
                .to_string();
            upload_with_timeout(
                api,
                Bytes::from(data),
                mime_for_path(path),
                &file_name,
                upload_timeout,
            )
            .await
        }
    }
}

/// Materializes every reference image in order. The first failure aborts the
/// batch and is reported with its 1-based position.
pub async fn materialize_all(
    api: &dyn FalApi,
    inputs: &[String],
    upload_timeout: Duration,
) -> Result<Vec<String>, FalImageError> {
    let mut urls = Vec::with_capacity(inputs.len());

    for (i, input) in inputs.iter().enumerate() {
        let url = materialize(api, input, upload_timeout)
            .await
            .map_err(|e| FalImageError::ReferenceImage {
                index: i + 1,
                source: Box::new(e),
            })?;
        debug!("Reference image {} -> {}", i + 1, url);
        urls.push(url);
    }

    if !urls.is_empty() {
        info!("Prepared {} reference image(s)", urls.len());
    }
    Ok(urls)
}

async fn upload_with_timeout(
    api: &dyn FalApi,
    data: Bytes,
    content_type: &str,
    file_name: &str,
    upload_timeout: Duration,
) -> Result<String, FalImageError> {
    match tokio::time::timeout(upload_timeout, api.upload(data, content_type, file_name)).await {
        Ok(result) => result,
        Err(_) => Err(FalImageError::Timeout(format!(
            "upload of {} timed out after {}s",
            file_name,
            upload_timeout.as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FalPayload, UpstreamResponse};
    use crate::services::router::Endpoint;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        uploads: Mutex<Vec<(String, String, usize)>>,
        hang: bool,
    }

    #[async_trait]
    impl FalApi for RecordingStore {
        async fn run(
            &self,
            _endpoint: Endpoint,
            _payload: &FalPayload,
        ) -> Result<UpstreamResponse, FalImageError> {
            unreachable!("materializer never runs models")
        }

        async fn upload(
            &self,
            data: Bytes,
            content_type: &str,
            file_name: &str,
        ) -> Result<String, FalImageError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            let mut uploads = self.uploads.lock().unwrap();
            uploads.push((content_type.to_string(), file_name.to_string(), data.len()));
            Ok(format!("https://cdn.test/{}/{}", uploads.len(), file_name))
        }
    }

    #[test]
    fn classification_by_prefix() {
        assert_eq!(classify("data:image/png;base64,AAAA"), ReferenceKind::EmbeddedData);
        assert_eq!(classify("data:https://nonsense"), ReferenceKind::EmbeddedData);
        assert_eq!(classify("https://x/y.jpg"), ReferenceKind::RemoteUrl);
        assert_eq!(classify("http://x/y.jpg"), ReferenceKind::RemoteUrl);
        assert_eq!(classify("./cat.png"), ReferenceKind::LocalFile);
        assert_eq!(classify("ftp://x/y.jpg"), ReferenceKind::LocalFile);
        assert_eq!(classify(""), ReferenceKind::LocalFile);
    }

    #[test]
    fn mime_table() {
        assert_eq!(mime_for_path(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("a.webp")), "image/webp");
        assert_eq!(mime_for_path(Path::new("a.bmp")), "image/bmp");
        assert_eq!(mime_for_path(Path::new("a.tiff")), "image/png");
        assert_eq!(mime_for_path(Path::new("noext")), "image/png");
    }

    #[test]
    fn data_url_parsing_is_strict() {
        let (mime, data) = parse_data_url("data:image/jpeg;base64,aGVsbG8=").unwrap();
        assert_eq!(mime, "image/jpeg");
        assert_eq!(data, b"hello");

        assert!(matches!(
            parse_data_url("data:image/png,aGVsbG8="),
            Err(FalImageError::Parse(_))
        ));
        assert!(matches!(
            parse_data_url("data:;base64,aGVsbG8="),
            Err(FalImageError::Parse(_))
        ));
        assert!(matches!(
            parse_data_url("data:image/png;base64,!!!"),
            Err(FalImageError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn remote_urls_pass_through_without_upload() {
        let store = RecordingStore::default();
        let urls = materialize_all(
            &store,
            &["https://x/y.jpg".to_string()],
            Duration::from_secs(30),
        )
        .await
        .unwrap();
        assert_eq!(urls, vec!["https://x/y.jpg".to_string()]);
        assert!(store.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn local_and_embedded_inputs_are_uploaded_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sketch.jpeg");
        std::fs::write(&file, b"jpegbytes").unwrap();

        let store = RecordingStore::default();
        let inputs = vec![
            file.to_string_lossy().to_string(),
            "https://x/keep.png".to_string(),
            "data:image/webp;base64,aGVsbG8=".to_string(),
        ];
        let urls = materialize_all(&store, &inputs, Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(
            urls,
            vec![
                "https://cdn.test/1/sketch.jpeg".to_string(),
                "https://x/keep.png".to_string(),
                "https://cdn.test/2/reference.webp".to_string(),
            ]
        );
        let uploads = store.uploads.lock().unwrap();
        assert_eq!(uploads[0], ("image/jpeg".to_string(), "sketch.jpeg".to_string(), 9));
        assert_eq!(uploads[1], ("image/webp".to_string(), "reference.webp".to_string(), 5));
    }

    #[tokio::test]
    async fn first_failure_aborts_with_index() {
        let store = RecordingStore::default();
        let inputs = vec![
            "https://x/ok.png".to_string(),
            "/definitely/not/here.png".to_string(),
            "data:image/png;base64,aGVsbG8=".to_string(),
        ];
        let err = materialize_all(&store, &inputs, Duration::from_secs(30))
            .await
            .unwrap_err();

        match err {
            FalImageError::ReferenceImage { index, source } => {
                assert_eq!(index, 2);
                assert!(matches!(*source, FalImageError::NotFound(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_upload_times_out() {
        let store = RecordingStore {
            hang: true,
            ..Default::default()
        };
        let err = materialize_all(
            &store,
            &["data:image/png;base64,aGVsbG8=".to_string()],
            Duration::from_secs(30),
        )
        .await
        .unwrap_err();

        match err {
            FalImageError::ReferenceImage { index, source } => {
                assert_eq!(index, 1);
                assert!(matches!(*source, FalImageError::Timeout(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

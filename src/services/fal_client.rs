// src/services/fal_client.rs
use crate::config::Config;
use crate::errors::FalImageError;
use crate::models::{FalPayload, UpstreamResponse};
use crate::services::router::Endpoint;
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

/// The two upstream capabilities the pipeline needs.
#[async_trait]
pub trait FalApi: Send + Sync {
    /// Runs a model endpoint synchronously and returns its output.
    async fn run(
        &self,
        endpoint: Endpoint,
        payload: &FalPayload,
    ) -> Result<UpstreamResponse, FalImageError>;

    /// Stores bytes in the provider's object store and returns a URL the
    /// model endpoints can fetch.
    async fn upload(
        &self,
        data: Bytes,
        content_type: &str,
        file_name: &str,
    ) -> Result<String, FalImageError>;
}

pub struct FalClient {
    api_key: String,
    api_base: String,
    storage_base: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct InitiateUploadResponse {
    upload_url: String,
    file_url: String,
}

impl FalClient {
    pub fn new(config: &Config, client: Client) -> Self {
        Self {
            api_key: config.api_key.clone(),
            api_base: config.api_base.clone(),
            storage_base: config.storage_base.clone(),
            client,
        }
    }

    fn auth_header(&self) -> String {
        format!("Key {}", self.api_key)
    }
}

#[async_trait]
impl FalApi for FalClient {
    async fn run(
        &self,
        endpoint: Endpoint,
        payload: &FalPayload,
    ) -> Result<UpstreamResponse, FalImageError> {
        let url = format!("{}/{}", self.api_base, endpoint.id());
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            FalImageError::Serialization(format!("Failed to parse {} response: {}", endpoint, e))
        })
    }

    async fn upload(
        &self,
        data: Bytes,
        content_type: &str,
        file_name: &str,
    ) -> Result<String, FalImageError> {
        let response = self
            .client
            .post(format!(
                "{}/storage/upload/initiate?storage_type=fal-cdn-v3",
                self.storage_base
            ))
            .header("Authorization", self.auth_header())
            .json(&json!({
                "content_type": content_type,
                "file_name": file_name,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FalImageError::Upload(format!(
                "initiate failed ({}): {}",
                status.as_u16(),
                error_detail(&body)
            )));
        }

        let initiated: InitiateUploadResponse = response.json().await.map_err(|e| {
            FalImageError::Upload(format!("Failed to parse upload initiation: {}", e))
        })?;

        let size = data.len();
        let response = self
            .client
            .put(&initiated.upload_url)
            .header("Content-Type", content_type)
            .body(data)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FalImageError::Upload(format!(
                "storage rejected {} ({})",
                file_name,
                status.as_u16()
            )));
        }

        debug!("Uploaded {} ({} bytes) to {}", file_name, size, initiated.file_url);
        Ok(initiated.file_url)
    }
}

pub(crate) fn api_error(status: StatusCode, body: &str) -> FalImageError {
    let reason = status.canonical_reason().unwrap_or("request failed");
    let detail = error_detail(body);
    let message = if detail.is_empty() {
        reason.to_string()
    } else {
        format!("{}: {}", reason, detail)
    };
    FalImageError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Pulls the human-readable part out of an error body. fal returns
/// `{"detail": "..."}` or `{"detail": [{"msg": "..."}]}`.
fn error_detail(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };

    match &value["detail"] {
        serde_json::Value::String(s) => return s.clone(),
        serde_json::Value::Array(items) => {
            let msgs: Vec<&str> = items.iter().filter_map(|i| i["msg"].as_str()).collect();
            if !msgs.is_empty() {
                return msgs.join("; ");
            }
        }
        _ => {}
    }

    value["message"]
        .as_str()
        .or_else(|| value["error"].as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| body.trim().to_string())
}

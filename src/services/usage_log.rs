// src/services/usage_log.rs
use crate::errors::FalImageError;
use crate::models::ModelKind;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

pub const USAGE_FILE: &str = "usage.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub timestamp: String,
    pub model: ModelKind,
    #[serde(rename = "type")]
    pub kind: String,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UsageRecord {
    pub fn image(
        at: DateTime<Utc>,
        model: ModelKind,
        duration_ms: u64,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            model,
            kind: "image".to_string(),
            duration_ms,
            success: error.is_none(),
            error,
        }
    }
}

/// Append-only usage log. Built once at startup and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct UsageLogger {
    log_dir: Option<PathBuf>,
}

impl UsageLogger {
    pub fn new(log_dir: Option<PathBuf>) -> Self {
        Self { log_dir }
    }

    pub fn usage_file(&self) -> Option<PathBuf> {
        self.log_dir.as_ref().map(|dir| dir.join(USAGE_FILE))
    }

    /// Records one request. Never fails the caller.
    pub async fn record(&self, record: &UsageRecord) {
        info!(
            "usage model={} success={} duration_ms={}",
            record.model, record.success, record.duration_ms
        );

        if let Err(e) = self.append(record).await {
            warn!("Failed to write usage record: {}", e);
        }
    }

    async fn append(&self, record: &UsageRecord) -> Result<(), FalImageError> {
        let (Some(dir), Some(file)) = (self.log_dir.as_ref(), self.usage_file()) else {
            return Ok(());
        };

        tokio::fs::create_dir_all(dir).await?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut handle = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file)
            .await?;
        handle.write_all(line.as_bytes()).await?;
        handle.flush().await?;
        Ok(())
    }
}

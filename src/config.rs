// src/config.rs
use crate::errors::FalImageError;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://fal.run";
pub const DEFAULT_STORAGE_BASE: &str = "https://rest.alpha.fal.ai";

/// Per-asset upload limit.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);
/// Shared deadline across every attempt of one generation.
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(180);

const API_KEY_VARS: [&str; 2] = ["FAL_KEY", "FAL_API_KEY"];

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base: String,
    pub storage_base: String,
    pub debug: bool,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, FalImageError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, FalImageError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = API_KEY_VARS
            .iter()
            .find_map(|&key| non_empty(key))
            .ok_or_else(|| FalImageError::Config("FAL_KEY (or FAL_API_KEY) must be set".to_string()))?;

        Ok(Self {
            api_key,
            api_base: non_empty("FAL_API_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            storage_base: non_empty("FAL_STORAGE_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_STORAGE_BASE.to_string()),
            debug: non_empty("FAL_IMAGE_DEBUG")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            log_dir: non_empty("FAL_IMAGE_LOG_DIR").map(PathBuf::from),
        })
    }
}

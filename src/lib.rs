// src/lib.rs
pub mod config;
pub mod errors;
pub mod mcp;
pub mod models;
pub mod services;

pub use config::Config;
pub use errors::{ClassifiedError, ErrorCategory, FalImageError};
pub use models::{GenerationRequest, GenerationResult, ModelKind};

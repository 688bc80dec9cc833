// src/services/mod.rs
pub mod fal_client;
pub mod generator;
pub mod invoker;
pub mod persister;
pub mod reference_images;
pub mod router;
pub mod usage_log;
pub mod validator;

pub use fal_client::{FalApi, FalClient};
pub use generator::{GenerationOutcome, ImageGenerator};
pub use persister::ImagePersister;
pub use router::Endpoint;
pub use usage_log::UsageLogger;

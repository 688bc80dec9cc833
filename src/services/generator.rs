// src/services/generator.rs
use crate::config::UPLOAD_TIMEOUT;
use crate::errors::{ClassifiedError, FalImageError};
use crate::models::{GenerationRequest, GenerationResult, ModelInfo, ModelKind, Usage};
use crate::services::fal_client::FalApi;
use crate::services::invoker::{self, RetryPolicy};
use crate::services::persister::{ImagePersister, SavedImages};
use crate::services::reference_images;
use crate::services::router::Endpoint;
use crate::services::usage_log::{UsageLogger, UsageRecord};
use crate::services::validator::validate_request;
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub result: GenerationResult,
    pub saved: SavedImages,
    pub description: Option<String>,
}

/// The generate pipeline: validate, materialize references, route, invoke,
/// persist. Every exit is either an outcome or a classified error.
pub struct ImageGenerator {
    api: Arc<dyn FalApi>,
    persister: ImagePersister,
    usage: UsageLogger,
    retry: RetryPolicy,
    upload_timeout: Duration,
}

impl ImageGenerator {
    pub fn new(api: Arc<dyn FalApi>, persister: ImagePersister, usage: UsageLogger) -> Self {
        Self {
            api,
            persister,
            usage,
            retry: RetryPolicy::default(),
            upload_timeout: UPLOAD_TIMEOUT,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    pub fn list_models(&self) -> Vec<ModelInfo> {
        ModelKind::ALL.iter().map(|m| m.info()).collect()
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome, ClassifiedError> {
        let request_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        let outcome = self.run(request_id, request, start).await;
        self.finish(request_id, started_at, start, request.model, outcome)
            .await
    }

    /// Entry point for raw tool arguments. Arguments that fail to parse still
    /// count as a request and get their usage record.
    pub async fn generate_from_args(
        &self,
        args: &Value,
    ) -> Result<GenerationOutcome, ClassifiedError> {
        let empty = Value::Object(Default::default());
        let args = if args.is_null() { &empty } else { args };

        match GenerationRequest::deserialize(args) {
            Ok(request) => self.generate(&request).await,
            Err(e) => {
                let model = ModelKind::deserialize(&args["model"]).unwrap_or_default();
                let err = FalImageError::Validation(format!("Invalid arguments: {}", e));
                self.finish(Uuid::new_v4(), Utc::now(), Instant::now(), model, Err(err))
                    .await
            }
        }
    }

    async fn finish(
        &self,
        request_id: Uuid,
        started_at: DateTime<Utc>,
        start: Instant,
        model: ModelKind,
        outcome: Result<GenerationOutcome, FalImageError>,
    ) -> Result<GenerationOutcome, ClassifiedError> {
        let duration_ms = start.elapsed().as_millis() as u64;

        let outcome = outcome.map_err(|e| {
            let classified = ClassifiedError::classify(&e);
            error!("[{}] generation failed: {}", request_id, classified);
            classified
        });

        let error_text = outcome.as_ref().err().map(|e| e.caller_text());
        self.usage
            .record(&UsageRecord::image(started_at, model, duration_ms, error_text))
            .await;

        outcome
    }

    async fn run(
        &self,
        request_id: Uuid,
        request: &GenerationRequest,
        start: Instant,
    ) -> Result<GenerationOutcome, FalImageError> {
        validate_request(request)?;

        let image_urls =
            reference_images::materialize_all(self.api.as_ref(), &request.reference_images, self.upload_timeout)
                .await?;

        let endpoint = Endpoint::route(request.model, request.is_edit());
        info!(
            "[{}] {} with {} reference image(s)",
            request_id,
            endpoint,
            image_urls.len()
        );

        let payload = endpoint.build_payload(request, image_urls);
        let response = invoker::invoke(self.api.as_ref(), endpoint, &payload, &self.retry).await?;
        let saved = self.persister.persist(&response, request).await?;

        Ok(GenerationOutcome {
            result: GenerationResult {
                image_path: saved.primary.clone(),
                model: request.model,
                usage: Usage {
                    duration_ms: start.elapsed().as_millis() as u64,
                },
            },
            saved,
            description: response.description,
        })
    }
}

// src/errors.rs
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FalImageError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("fal API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Blocked by safety checker: {0}")]
    SafetyBlock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Reference image {index}: {source}")]
    ReferenceImage {
        index: usize,
        #[source]
        source: Box<FalImageError>,
    },
}

impl From<reqwest::Error> for FalImageError {
    fn from(err: reqwest::Error) -> Self {
        FalImageError::Http(error_chain(&err))
    }
}

impl From<serde_json::Error> for FalImageError {
    fn from(err: serde_json::Error) -> Self {
        FalImageError::Serialization(err.to_string())
    }
}

impl FalImageError {
    /// Upstream status code, looking through reference-image wrappers.
    pub fn status(&self) -> Option<u16> {
        match self {
            FalImageError::Api { status, .. } => Some(*status),
            FalImageError::ReferenceImage { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Whether the failure came from talking to the upstream provider.
    pub fn is_upstream(&self) -> bool {
        match self {
            FalImageError::Api { .. } | FalImageError::Http(_) => true,
            FalImageError::ReferenceImage { source, .. } => source.is_upstream(),
            _ => false,
        }
    }

    fn innermost(&self) -> &FalImageError {
        match self {
            FalImageError::ReferenceImage { source, .. } => source.innermost(),
            other => other,
        }
    }
}

/// Flattens an error and its sources into one line. reqwest hides the
/// interesting part (connection reset, dns error) in the source chain.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut current = err.source();
    while let Some(source) = current {
        let part = source.to_string();
        if !text.contains(&part) {
            text.push_str(": ");
            text.push_str(&part);
        }
        current = source.source();
    }
    text
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    AuthError,
    RateLimit,
    ContentBlocked,
    SafetyBlock,
    Timeout,
    ValidationError,
    ApiError,
    GenerationError,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::AuthError => "AUTH_ERROR",
            ErrorCategory::RateLimit => "RATE_LIMIT",
            ErrorCategory::ContentBlocked => "CONTENT_BLOCKED",
            ErrorCategory::SafetyBlock => "SAFETY_BLOCK",
            ErrorCategory::Timeout => "TIMEOUT",
            ErrorCategory::ValidationError => "VALIDATION_ERROR",
            ErrorCategory::ApiError => "API_ERROR",
            ErrorCategory::GenerationError => "GENERATION_ERROR",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the classification table. A rule matches when the lowercased
/// message contains any needle, or the status code is listed.
#[derive(Debug)]
pub struct ClassificationRule {
    pub category: ErrorCategory,
    pub needles: &'static [&'static str],
    pub statuses: &'static [u16],
}

impl ClassificationRule {
    fn matches(&self, lowered: &str, status: Option<u16>) -> bool {
        status.is_some_and(|s| self.statuses.contains(&s))
            || self.needles.iter().any(|needle| lowered.contains(needle))
    }
}

// Order is priority. Bare "rate" is deliberately absent: it would match
// "generate".
pub const CLASSIFICATION_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        category: ErrorCategory::AuthError,
        needles: &["api key", "unauthorized", "authentication"],
        statuses: &[401, 403],
    },
    ClassificationRule {
        category: ErrorCategory::RateLimit,
        needles: &["quota", "rate limit", "rate_limit", "ratelimit", "429", "too many requests"],
        statuses: &[429],
    },
    ClassificationRule {
        category: ErrorCategory::ContentBlocked,
        needles: &["safety", "blocked", "content policy"],
        statuses: &[],
    },
    ClassificationRule {
        category: ErrorCategory::ValidationError,
        needles: &["invalid", "422"],
        statuses: &[422],
    },
    ClassificationRule {
        category: ErrorCategory::Timeout,
        needles: &["timeout", "timed out"],
        statuses: &[],
    },
];

/// First matching rule for a message, if any.
pub fn match_rules(message: &str, status: Option<u16>) -> Option<ErrorCategory> {
    let lowered = message.to_lowercase();
    CLASSIFICATION_RULES
        .iter()
        .find(|rule| rule.matches(&lowered, status))
        .map(|rule| rule.category)
}

/// A failure normalized for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ClassifiedError {
    pub fn classify(err: &FalImageError) -> Self {
        let message = err.to_string();
        let status = err.status();

        let category = match err.innermost() {
            FalImageError::Validation(_) => ErrorCategory::ValidationError,
            FalImageError::Timeout(_) => ErrorCategory::Timeout,
            FalImageError::SafetyBlock(_) => ErrorCategory::SafetyBlock,
            _ => match_rules(&message, status).unwrap_or(if err.is_upstream() {
                ErrorCategory::ApiError
            } else {
                ErrorCategory::GenerationError
            }),
        };

        Self {
            category,
            message,
            status,
        }
    }

    /// Classifies failure text that did not come with a typed error.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let category = match_rules(&message, None).unwrap_or(ErrorCategory::ApiError);
        Self {
            category,
            message,
            status: None,
        }
    }

    pub fn caller_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

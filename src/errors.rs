use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Invalid or incomplete configuration discovered at startup.
    ConfigError(String),
    /// Reading or writing a local file failed.
    IoError(String),
    /// The contact CSV could not be parsed or written.
    CsvError(String),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::IoError(msg) => write!(f, "I/O error: {}", msg),
            AppError::CsvError(msg) => write!(f, "CSV error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Maps each error variant to an HTTP status code and JSON body.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::ConfigError(msg) | AppError::IoError(msg) | AppError::CsvError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::WithContext { source, context } => {
                tracing::error!("Error with context: {} -> {}", context, source);
                return (**source).clone().into_response();
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::CsvError(err.to_string())
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<AppError>,
{
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e.into()),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e.into()),
            context: f(),
        })
    }
}

/// Why a single provider call contributed nothing.
///
/// These never abort a contact: the waterfall treats every variant as
/// "this stage had nothing to offer" and moves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    /// Timeout, connection error, or an unexpected HTTP status.
    Transport(String),
    /// Credential rejected by the vendor.
    Auth(String),
    /// Vendor kept answering 429 after the cooldown retry.
    RateLimited(String),
    /// Response body did not have the expected shape.
    MalformedResponse(String),
    /// Nothing to call: provider disabled or its circuit is open.
    NoCandidate(String),
}

impl ProviderFailure {
    /// Short machine-friendly class name for logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderFailure::Transport(_) => "transport",
            ProviderFailure::Auth(_) => "auth",
            ProviderFailure::RateLimited(_) => "rate_limited",
            ProviderFailure::MalformedResponse(_) => "malformed_response",
            ProviderFailure::NoCandidate(_) => "no_candidate",
        }
    }

    /// Whether this failure should count against the provider's circuit breaker.
    pub fn trips_breaker(&self) -> bool {
        !matches!(self, ProviderFailure::NoCandidate(_))
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderFailure::Transport(msg) => write!(f, "Transport failure: {}", msg),
            ProviderFailure::Auth(msg) => write!(f, "Authentication failure: {}", msg),
            ProviderFailure::RateLimited(msg) => write!(f, "Rate limited: {}", msg),
            ProviderFailure::MalformedResponse(msg) => write!(f, "Malformed response: {}", msg),
            ProviderFailure::NoCandidate(msg) => write!(f, "No candidate: {}", msg),
        }
    }
}

//! Error handling for the analytics service.
//!
//! This module provides:
//! - A crate-wide [`AnalyticsError`] with machine-readable [`ErrorCode`]s
//! - HTTP status mapping for the query path
//! - Severity-aware logging and an error counter
//! - Per-message ingestion errors ([`IngestError`]) and validation errors
//!   ([`ValidationError`]), which are classified and never fatal
//!
//! # Usage
//!
//! ```rust,ignore
//! use wms_analytics_core::error::{AnalyticsError, ErrorContext, Result};
//!
//! fn load() -> Result<String> {
//!     std::fs::read_to_string("settings.toml").context("Failed to read settings")
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for analytics operations.
pub type Result<T> = std::result::Result<T, AnalyticsError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes for API responses and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Store Errors (2000-2099)
    StoreUnavailable,
    DatabaseQueryFailed,
    DatabaseError,
    MigrationFailed,
    RecordNotFound,

    // Bus Errors (2100-2199)
    BusError,

    // Payload Errors (2200-2299)
    MalformedPayload,
    SerializationError,

    // Request Errors (4100-4199)
    InvalidInput,

    // Scheduling Errors (4200-4299)
    ScheduleTaskFailure,

    // Configuration Errors (5000-5099)
    ConfigurationError,
    InvalidConfiguration,

    // Internal Errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::StoreUnavailable => 2000,
            Self::DatabaseQueryFailed => 2001,
            Self::DatabaseError => 2002,
            Self::MigrationFailed => 2003,
            Self::RecordNotFound => 2004,

            Self::BusError => 2100,

            Self::MalformedPayload => 2200,
            Self::SerializationError => 2201,

            Self::InvalidInput => 4100,

            Self::ScheduleTaskFailure => 4200,

            Self::ConfigurationError => 5000,
            Self::InvalidConfiguration => 5001,

            Self::InternalError => 9000,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::RecordNotFound => StatusCode::NOT_FOUND,

            Self::MalformedPayload | Self::InvalidInput => StatusCode::BAD_REQUEST,

            Self::StoreUnavailable | Self::BusError => StatusCode::SERVICE_UNAVAILABLE,

            Self::DatabaseQueryFailed
            | Self::DatabaseError
            | Self::MigrationFailed
            | Self::SerializationError
            | Self::ScheduleTaskFailure
            | Self::ConfigurationError
            | Self::InvalidConfiguration
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error is retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable | Self::BusError)
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            2000..=2099 => "store",
            2100..=2199 => "bus",
            2200..=2299 => "payload",
            4100..=4199 => "request",
            4200..=4299 => "scheduling",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Bad input from producers or clients
    Low,
    /// Operational issues that resolve themselves
    Medium,
    /// System errors
    High,
    /// The service cannot do its job
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::MalformedPayload
            | ErrorCode::InvalidInput
            | ErrorCode::RecordNotFound => Self::Low,

            ErrorCode::BusError | ErrorCode::ScheduleTaskFailure => Self::Medium,

            ErrorCode::DatabaseQueryFailed
            | ErrorCode::DatabaseError
            | ErrorCode::SerializationError
            | ErrorCode::InternalError => Self::High,

            ErrorCode::StoreUnavailable
            | ErrorCode::MigrationFailed
            | ErrorCode::ConfigurationError
            | ErrorCode::InvalidConfiguration => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for the analytics service.
///
/// Carries a stable [`ErrorCode`], a message that is safe to show API clients,
/// an optional internal message for logs, and the underlying source error.
#[derive(Error, Debug)]
pub struct AnalyticsError {
    code: ErrorCode,

    user_message: Cow<'static, str>,

    internal_message: Option<String>,

    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for AnalyticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl AnalyticsError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    /// Create a not found error.
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::new(ErrorCode::RecordNotFound, format!("{} not found", entity.into()))
    }

    /// The event store could not be reached.
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::StoreUnavailable,
            "The event store is unavailable",
            message,
        )
    }

    /// A scheduled rollup run failed.
    pub fn schedule_failure(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::ScheduleTaskFailure,
            "A scheduled task failed",
            message,
        )
    }

    /// Configuration is present but not usable.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InvalidConfiguration,
            "Invalid configuration",
            message,
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add internal message.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();
        let status = self.http_status().as_u16();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!(
            "analytics_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error response for API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false for errors
    pub success: bool,

    pub error: ErrorInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,

    pub numeric_code: u32,

    /// User-friendly error message
    pub message: String,

    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&AnalyticsError> for ErrorResponse {
    fn from(error: &AnalyticsError) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                code: error.code,
                numeric_code: error.code.numeric_code(),
                message: error.user_message.to_string(),
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

impl IntoResponse for AnalyticsError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        let response = ErrorResponse::from(&self);

        (status, Json(response)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| AnalyticsError::internal(message.into()).with_source(e))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for AnalyticsError {
    fn from(error: sqlx::Error) -> Self {
        let (code, user_msg) = match &error {
            sqlx::Error::RowNotFound => (ErrorCode::RecordNotFound, "The requested record was not found"),
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => (ErrorCode::StoreUnavailable, "The event store is unavailable"),
            sqlx::Error::Database(_) => (ErrorCode::DatabaseQueryFailed, "A database error occurred"),
            sqlx::Error::Migrate(_) => (ErrorCode::MigrationFailed, "Database migration failed"),
            _ => (ErrorCode::DatabaseError, "A database error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<sqlx::migrate::MigrateError> for AnalyticsError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::with_internal(ErrorCode::MigrationFailed, "Database migration failed", error.to_string())
            .with_source(error)
    }
}

impl From<serde_json::Error> for AnalyticsError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_syntax() || error.is_eof() {
            ErrorCode::MalformedPayload
        } else {
            ErrorCode::SerializationError
        };

        Self::with_internal(code, "Failed to process JSON data", error.to_string()).with_source(error)
    }
}

impl From<std::io::Error> for AnalyticsError {
    fn from(error: std::io::Error) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An I/O error occurred", error.to_string())
            .with_source(error)
    }
}

impl From<config::ConfigError> for AnalyticsError {
    fn from(error: config::ConfigError) -> Self {
        let code = match &error {
            config::ConfigError::NotFound(_) | config::ConfigError::Type { .. } => {
                ErrorCode::InvalidConfiguration
            }
            _ => ErrorCode::ConfigurationError,
        };

        Self::with_internal(code, "Configuration error", error.to_string()).with_source(error)
    }
}

impl From<anyhow::Error> for AnalyticsError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<AnalyticsError>() {
            Ok(analytics_error) => analytics_error,
            Err(error) => Self::internal(error.to_string()),
        }
    }
}

#[cfg(feature = "kafka")]
impl From<rdkafka::error::KafkaError> for AnalyticsError {
    fn from(error: rdkafka::error::KafkaError) -> Self {
        Self::with_internal(ErrorCode::BusError, "Message bus error", error.to_string()).with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Ingestion Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a raw bus payload could not be turned into a [`crate::store::NewMaterialEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("required field `{0}` is missing")]
    MissingField(&'static str),

    #[error("required field `{0}` is empty")]
    EmptyField(&'static str),

    #[error("field `{field}` has unsupported type {found}")]
    UnsupportedType { field: &'static str, found: &'static str },
}

/// Classified failure of a single bus message. Never fatal to the consumer loop.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("invalid event: {0}")]
    Invalid(#[from] ValidationError),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] AnalyticsError),

    /// Shutdown interrupted processing before the message reached an outcome.
    /// The message must not be acknowledged, so the bus redelivers it.
    #[error("processing cancelled")]
    Cancelled,
}

impl IngestError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedPayload(_) => "malformed_payload",
            Self::Invalid(_) => "invalid",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the message reached a final outcome and may be acknowledged.
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_unavailable_maps_to_503_and_is_retryable() {
        let err = AnalyticsError::store_unavailable("connection refused");
        assert_eq!(err.http_status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.code().category(), "store");
    }

    #[test]
    fn test_query_failure_is_not_retryable() {
        assert!(!ErrorCode::DatabaseQueryFailed.is_retryable());
        assert_eq!(
            ErrorCode::DatabaseQueryFailed.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_pool_timeout_is_store_unavailable() {
        let err = AnalyticsError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.code(), ErrorCode::StoreUnavailable);
    }

    #[test]
    fn test_display_includes_internal_message() {
        let err = AnalyticsError::schedule_failure("job panicked");
        let text = err.to_string();
        assert!(text.contains("ScheduleTaskFailure"));
        assert!(text.contains("job panicked"));
    }

    #[test]
    fn test_error_response_hides_internal_message() {
        let err = AnalyticsError::store_unavailable("password=hunter2 host unreachable");
        let body = serde_json::to_value(ErrorResponse::from(&err)).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "STORE_UNAVAILABLE");
        assert!(!body.to_string().contains("hunter2"));
    }

    #[test]
    fn test_error_context_wraps_source() {
        let io: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        let err = io.context("Failed to read config file").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert_eq!(err.internal_message(), Some("Failed to read config file"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_ingest_error_kinds() {
        assert_eq!(IngestError::MalformedPayload("x".into()).kind(), "malformed_payload");
        assert_eq!(IngestError::from(ValidationError::NotAnObject).kind(), "invalid");
        assert_eq!(
            IngestError::StoreUnavailable(AnalyticsError::store_unavailable("down")).kind(),
            "store_unavailable"
        );
        assert_eq!(IngestError::Cancelled.kind(), "cancelled");
        assert!(!IngestError::Cancelled.is_final());
        assert!(IngestError::MalformedPayload("x".into()).is_final());
    }
}

use thiserror::Error;

/// Application-wide error types.
///
/// This enum represents all possible errors that can occur while reconciling
/// campaign resources. It uses the `thiserror` crate for ergonomic error
/// handling and automatic conversion from underlying library errors.
///
/// # Error Conversion
///
/// Most errors automatically convert from their source types using the `#[from]` attribute:
/// - `sqlx::Error` → `AppError::DatabaseError`
/// - `serde_json::Error` → `AppError::SerializationError`
#[derive(Error, Debug)]
pub enum AppError {
    /// Database operation failed.
    ///
    /// This error wraps all errors from SQLx database operations, including
    /// connection failures, query errors, and constraint violations.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// HTTP client request failed.
    ///
    /// This error occurs when requests to a downstream service fail due to
    /// network issues, timeouts, or server errors.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// A downstream service rejected an operation.
    ///
    /// Carries the operation name and the error body returned by the service
    /// so callers can decide whether the failure is recoverable.
    #[error("Downstream error during {operation}: {message}")]
    DownstreamError { operation: String, message: String },

    /// Message bus publish failed.
    #[error("Bus error: {0}")]
    BusError(String),

    /// JSON serialization or deserialization failed.
    ///
    /// This error occurs when converting between Rust types and JSON,
    /// typically when preparing bus payloads or parsing API responses.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A confirmation check did not succeed within its attempt budget.
    #[error("Gave up waiting for {operation} after {attempts} attempts")]
    RetryExhausted { operation: String, attempts: u32 },

    /// A campaign phase ended in failure.
    ///
    /// Raised after the phase has been recorded as failed in the process
    /// status store.
    #[error("Campaign {campaign_number} phase {process} failed: {message}")]
    PhaseFailed {
        campaign_number: String,
        process: String,
        message: String,
    },

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Configuration error.
    ///
    /// This error occurs when engine configuration values are invalid, such
    /// as a zero chunk size or an empty topic name.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic application error for cases not covered by specific variants.
    ///
    /// Use this sparingly - prefer creating specific error variants
    /// for better error handling and debugging.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is retryable.
    ///
    /// # Examples
    ///
    /// ```
    /// use forge_core::error::AppError;
    ///
    /// // Client errors are retryable
    /// let err = AppError::ClientError("connection reset".to_string());
    /// assert!(err.is_retryable());
    ///
    /// // A failed phase is NOT retryable
    /// let err = AppError::PhaseFailed {
    ///     campaign_number: "CMP-2024-000001".to_string(),
    ///     process: "mapping".to_string(),
    ///     message: "boom".to_string(),
    /// };
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::ClientError(_) | AppError::Timeout(_) | AppError::BusError(_) => true,
            AppError::DownstreamError { message, .. } => {
                message.contains("timeout")
                    || message.contains("timed out")
                    || message.contains("connect")
            }
            _ => false,
        }
    }
}

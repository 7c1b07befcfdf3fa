use sqlmon_common::classify::ValueError;
use sqlmon_common::types::BatchId;

/// Errors raised while discovering or collecting metrics.
///
/// Per-metric null observations are not errors; they surface as
/// [`MetricValue::Null`](sqlmon_common::types::MetricValue::Null).
///
/// # Examples
///
/// ```rust
/// use sqlmon_collector::error::CollectorError;
/// use sqlmon_common::types::BatchId;
///
/// let err = CollectorError::Unavailable {
///     batch: BatchId::Replica,
///     reason: "not configured".to_string(),
/// };
/// assert!(err.to_string().contains("replica"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// The source could not answer the request for a batch.
    #[error("Collector: {batch} request failed: {message}")]
    Source { batch: BatchId, message: String },

    /// A batch that must be present is not available on this server.
    #[error("Collector: {batch} batch unavailable: {reason}")]
    Unavailable { batch: BatchId, reason: String },

    /// The source answered, but the result does not have the expected shape.
    #[error("Collector: malformed {batch} result: {message}")]
    MalformedRow { batch: BatchId, message: String },

    /// A status column held something other than an integer.
    #[error("Collector: invalid value for '{column}': {source}")]
    InvalidValue { column: String, source: ValueError },

    /// The server does not support the requested feature.
    #[error("Collector: {0}")]
    Unsupported(String),

    /// The stats source could not be opened.
    #[error("Collector: cannot open stats source: {0}")]
    Connect(String),

    /// The stats source failed to release its resources.
    #[error("Collector: cannot close stats source: {0}")]
    Close(String),

    /// A previous poll panicked while holding the collector state.
    #[error("Collector: state lock poisoned")]
    LockPoisoned,
}

/// Convenience `Result` alias for collector operations.
pub type Result<T> = std::result::Result<T, CollectorError>;

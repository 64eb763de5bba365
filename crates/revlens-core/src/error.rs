use thiserror::Error;

/// Validation errors for externally supplied inputs (timestamps, windows,
/// relative periods).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("window start {start} must precede end {end}")]
    Inverted { start: String, end: String },

    #[error("invalid relative period '{value}', expected one of last_7_days, last_30_days, last_90_days, last_365_days")]
    InvalidPeriod { value: String },

    #[error("timezone cannot be empty")]
    EmptyTimezone,
}

/// Top-level error type for engine operations.
///
/// Transient upstream failures are retried inside the HTTP client and only
/// surface here after retries are exhausted. `ClientRejected` is absorbed at
/// the resource-service boundary; callers of the orchestrator see it only for
/// the request that triggered it directly.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("upstream refused capacity after {attempts} attempt(s): {message}")]
    RateLimitExhausted { attempts: u32, message: String },

    #[error("upstream rejected the request with status {status}: {message}")]
    ClientRejected { status: u16, message: String },

    #[error("transient upstream failure persisted across {attempts} attempt(s): {message}")]
    TransientUpstream { attempts: u32, message: String },

    #[error("upstream rejected the API credentials (status {status})")]
    Unauthorized { status: u16 },

    #[error("upstream response body is not valid JSON: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    #[error(transparent)]
    Window(#[from] WindowError),
}

impl EngineError {
    /// True when the failure is scoped to one upstream resource and the
    /// extraction run can continue without it.
    pub const fn is_resource_scoped(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExhausted { .. }
                | Self::ClientRejected { .. }
                | Self::TransientUpstream { .. }
                | Self::MalformedResponse(_)
        )
    }
}

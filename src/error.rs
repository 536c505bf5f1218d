//! Error taxonomy for pipeline operations
//!
//! Every failure the core produces or absorbs is a `PipelineError`. Variants
//! map onto the recovery policy applied to them:
//! - `Validation`: bad input to the core's own APIs, never retried
//! - `Operational`: transient remote failures, retried and breaker-tracked
//! - `NotFound`: terminal "resource missing" signal, ends a chain naturally
//! - `Fatal`: programming errors or corrupt state, propagated immediately
//! - `Navigation`: chain traversal aborted after recovery was exhausted
//! - `RetriesExhausted`: summary raised by the retry executor

use std::fmt;

/// Categorizes operational failures for retry and health bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transport-level failure (DNS, connection refused/reset, EOF)
    Network,
    /// Remote call exceeded its deadline
    Timeout,
    /// Provider signalled rate limiting (HTTP 429 or equivalent)
    RateLimited,
    /// Provider answered with a transient server-side error
    Service,
}

impl FailureKind {
    /// Classify an error message into a failure kind
    ///
    /// Returns `None` when nothing in the message points at a transient cause.
    #[must_use]
    pub fn classify(message: &str) -> Option<Self> {
        let msg = message.to_lowercase();

        if msg.contains("429") || msg.contains("too many requests") || msg.contains("rate limit") {
            return Some(Self::RateLimited);
        }

        if msg.contains("timeout") || msg.contains("timed out") {
            return Some(Self::Timeout);
        }

        if msg.contains("dns")
            || msg.contains("enotfound")
            || msg.contains("econnreset")
            || msg.contains("connection reset")
            || msg.contains("connection refused")
            || msg.contains("network")
            || msg.contains("unreachable")
            || msg.contains("eof")
        {
            return Some(Self::Network);
        }

        if msg.contains("502")
            || msg.contains("503")
            || msg.contains("504")
            || msg.contains("bad gateway")
            || msg.contains("service unavailable")
            || msg.contains("overloaded")
        {
            return Some(Self::Service);
        }

        None
    }

    /// Stable label used when tallying errors by type
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Service => "service",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for every pipeline component
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// Invalid argument or configuration
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transient failure worth retrying
    #[error("Operational error ({kind}): {message}")]
    Operational { kind: FailureKind, message: String },

    /// The remote resource does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Unrecoverable failure
    #[error("Fatal error: {0}")]
    Fatal(String),

    /// Chain traversal aborted
    #[error("Navigation failed at step {step} ({url}): {message}")]
    Navigation {
        message: String,
        url: String,
        step: usize,
    },

    /// Retry budget spent without a success
    #[error("{context} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        context: String,
        attempts: u32,
        last_error: Box<PipelineError>,
    },

    /// Filesystem failure surfaced by a writer
    #[error("I/O error: {0}")]
    Io(String),

    /// Payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PipelineError {
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    #[must_use]
    pub fn operational(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Operational {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound(identifier.into())
    }

    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Whether the retry executor may attempt the operation again
    ///
    /// Operational errors are recoverable. Fatal errors whose message names a
    /// DNS lookup or connection reset are treated as transport blips too. An
    /// exhausted retry budget is final, whatever it wraps.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Operational { .. } => true,
            Self::Fatal(message) => matches!(
                FailureKind::classify(message),
                Some(FailureKind::Network)
            ),
            Self::Validation(_)
            | Self::RetriesExhausted { .. }
            | Self::NotFound(_)
            | Self::Navigation { .. }
            | Self::Io(_)
            | Self::Serialization(_) => false,
        }
    }

    /// Whether this error (or the error it wraps) signals a missing resource
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::RetriesExhausted { last_error, .. } => last_error.is_not_found(),
            _ => false,
        }
    }

    /// Failure kind for operational errors, looking through retry wrappers
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Operational { kind, .. } => Some(*kind),
            Self::RetriesExhausted { last_error, .. } => last_error.failure_kind(),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.failure_kind() == Some(FailureKind::Timeout)
    }

    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        self.failure_kind() == Some(FailureKind::RateLimited)
    }

    /// Short label used when tallying errors by type
    #[must_use]
    pub fn type_label(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Operational { kind, .. } => kind.as_str(),
            Self::NotFound(_) => "not_found",
            Self::Fatal(_) => "fatal",
            Self::Navigation { .. } => "navigation",
            Self::RetriesExhausted { last_error, .. } => last_error.type_label(),
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        // {:#} keeps the whole context chain in the message
        let message = format!("{err:#}");
        if let Some(kind) = FailureKind::classify(&message) {
            return Self::Operational { kind, message };
        }
        let lower = message.to_lowercase();
        if lower.contains("404") || lower.contains("not found") {
            return Self::NotFound(message);
        }
        Self::Fatal(message)
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionRefused
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => Self::operational(FailureKind::Network, err.to_string()),
            ErrorKind::TimedOut => Self::operational(FailureKind::Timeout, err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience alias for Result with `PipelineError`
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_messages() {
        assert_eq!(
            FailureKind::classify("HTTP 429 Too Many Requests"),
            Some(FailureKind::RateLimited)
        );
        assert_eq!(
            FailureKind::classify("request timed out after 30s"),
            Some(FailureKind::Timeout)
        );
        assert_eq!(
            FailureKind::classify("getaddrinfo ENOTFOUND api.example.com"),
            Some(FailureKind::Network)
        );
        assert_eq!(
            FailureKind::classify("503 Service Unavailable"),
            Some(FailureKind::Service)
        );
        assert_eq!(FailureKind::classify("invalid api key"), None);
    }

    #[test]
    fn test_recoverability() {
        assert!(PipelineError::operational(FailureKind::Network, "reset").is_recoverable());
        assert!(PipelineError::fatal("socket hang up: ECONNRESET").is_recoverable());
        assert!(!PipelineError::fatal("null pointer").is_recoverable());
        assert!(!PipelineError::validation("bad").is_recoverable());
        assert!(!PipelineError::not_found("u1").is_recoverable());
    }

    #[test]
    fn test_not_found_seen_through_retry_wrapper() {
        let wrapped = PipelineError::RetriesExhausted {
            context: "fetch u9".to_string(),
            attempts: 1,
            last_error: Box::new(PipelineError::not_found("u9")),
        };
        assert!(wrapped.is_not_found());
        assert_eq!(wrapped.type_label(), "not_found");
    }

    #[test]
    fn test_exhausted_budget_is_not_retried_again() {
        let wrapped = PipelineError::RetriesExhausted {
            context: "fetch u1".to_string(),
            attempts: 3,
            last_error: Box::new(PipelineError::operational(FailureKind::Timeout, "slow")),
        };
        assert!(!wrapped.is_recoverable());
        assert!(wrapped.is_timeout());
        assert_eq!(wrapped.failure_kind(), Some(FailureKind::Timeout));
    }

    #[test]
    fn test_from_anyhow_classifies() {
        let err: PipelineError = anyhow::anyhow!("upstream returned 404 Not Found").into();
        assert!(err.is_not_found());

        let err: PipelineError = anyhow::anyhow!("rate limit exceeded").into();
        assert!(err.is_rate_limit());

        let err: PipelineError = anyhow::anyhow!("model refused the prompt").into();
        assert!(matches!(err, PipelineError::Fatal(_)));
    }

    #[test]
    fn test_from_io_error() {
        let err: PipelineError =
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset").into();
        assert!(err.is_recoverable());

        let err: PipelineError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}

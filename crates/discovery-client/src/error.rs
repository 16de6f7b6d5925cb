//! Error types for the discovery client.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use discovery_types::ValidationError;

/// Result type alias for discovery client operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Application-level rejection reported by a discovery server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCode {
    NotFound,
    InvalidArgument,
    /// A higher-ranked registration for the same member id is held.
    Superseded,
    /// Any other non-retryable rejection.
    Rejected,
}

impl fmt::Display for RemoteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemoteCode::NotFound => "not found",
            RemoteCode::InvalidArgument => "invalid argument",
            RemoteCode::Superseded => "superseded",
            RemoteCode::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Outcome of a single attempt against a single server.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("{code}: {message}")]
    Remote { code: RemoteCode, message: String },
}

impl TransportError {
    pub fn remote(code: RemoteCode, message: impl Into<String>) -> Self {
        TransportError::Remote {
            code,
            message: message.into(),
        }
    }

    /// Whether another server might answer differently.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Remote { .. })
    }
}

/// One failed attempt within a dispatched call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub address: String,
    pub error: TransportError,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.address, self.error)
    }
}

/// Errors surfaced by [`DiscoveryClient`](crate::DiscoveryClient).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("heartbeat for member {member_id:?} superseded: {message}")]
    Superseded { member_id: String, message: String },

    #[error("rejected by server: {0}")]
    Rejected(String),

    #[error(
        "discovery servers unavailable after {} attempt(s); last error: {}",
        .attempts.len(),
        last_attempt(.attempts)
    )]
    Unavailable { attempts: Vec<AttemptFailure> },

    #[error("call cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("client stopped")]
    Stopped,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("address resolution failed: {0}")]
    Resolve(String),
}

impl DiscoveryError {
    /// Whether the caller may reasonably retry the same call later.
    ///
    /// Only exhausted failover and deadline expiry qualify; logical
    /// rejections, cancellation and shutdown do not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DiscoveryError::Unavailable { .. } | DiscoveryError::DeadlineExceeded
        )
    }

    /// Map a server-side rejection onto the client taxonomy.
    pub(crate) fn from_remote(code: RemoteCode, message: String, member_id: Option<&str>) -> Self {
        match code {
            RemoteCode::NotFound => DiscoveryError::NotFound(message),
            RemoteCode::InvalidArgument => DiscoveryError::InvalidArgument(message),
            RemoteCode::Superseded => DiscoveryError::Superseded {
                member_id: member_id.unwrap_or_default().to_string(),
                message,
            },
            RemoteCode::Rejected => DiscoveryError::Rejected(message),
        }
    }
}

impl From<ValidationError> for DiscoveryError {
    fn from(e: ValidationError) -> Self {
        DiscoveryError::InvalidArgument(e.to_string())
    }
}

fn last_attempt(attempts: &[AttemptFailure]) -> String {
    attempts
        .last()
        .map(ToString::to_string)
        .unwrap_or_else(|| "no servers attempted".to_string())
}

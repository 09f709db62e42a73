//! Error types for the change-token controller

use crate::provider::ResourceState;
use crate::token::Scope;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured error returned by the remote API transport.
///
/// `code` is the machine-readable error code the service returned
/// (e.g. `WAFStaleDataException`); classification only ever looks at it.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Retry-relevant category of a remote error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// The change token no longer matches the server's current token
    Stale,
    /// Rejected for load or contention reasons, retry after backoff
    Busy,
    /// The referenced remote object does not exist
    NotFound,
    /// Anything else. Never retried.
    Fatal,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::Stale => write!(f, "stale token"),
            ConflictKind::Busy => write!(f, "busy"),
            ConflictKind::NotFound => write!(f, "not found"),
            ConflictKind::Fatal => write!(f, "fatal"),
        }
    }
}

/// Failures that cross the [`RetryExecutor`](crate::retry::RetryExecutor) boundary
#[derive(Error, Debug, Clone)]
pub enum RetryError {
    #[error("[{scope}] remote call failed: {source}")]
    Fatal { scope: Scope, source: ApiError },

    #[error("[{scope}] gave up after {attempts} attempts, last transient error ({kind}): {last}")]
    Exhausted {
        scope: Scope,
        attempts: u32,
        kind: ConflictKind,
        last: ApiError,
    },

    #[error("[{scope}] cancelled after {attempts} attempts")]
    Cancelled { scope: Scope, attempts: u32 },
}

impl RetryError {
    /// Exhausted and cancelled operations are safe to re-run as a whole
    pub fn is_transient(&self) -> bool {
        !matches!(self, RetryError::Fatal { .. })
    }
}

/// Lifecycle and provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error(transparent)]
    Retry(#[from] RetryError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Resource type not supported: {0}")]
    UnsupportedResource(String),

    #[error("Resource has no remote id bound")]
    NotBound,

    #[error("Changing `{0}` requires replacing the resource")]
    RequiresReplacement(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The remote object exists but a later step failed. `state` carries the
    /// binding so the host can record it and retry or destroy.
    #[error("{} left partially applied: {source}", .state.resource_type)]
    PartiallyApplied {
        state: Box<ResourceState>,
        source: Box<CloudError>,
    },
}

impl CloudError {
    /// Re-running the whole operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            CloudError::Retry(err) => err.is_transient(),
            CloudError::PartiallyApplied { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// State the host must persist even though the operation failed
    pub fn partial_state(&self) -> Option<&ResourceState> {
        match self {
            CloudError::PartiallyApplied { state, .. } => Some(state.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_keeps_remote_detail() {
        let err = RetryError::Fatal {
            scope: Scope::global(),
            source: ApiError::new("AccessDeniedException", "not authorized to CreateIPSet"),
        };
        assert_eq!(
            err.to_string(),
            "[global] remote call failed: AccessDeniedException: not authorized to CreateIPSet"
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn test_exhausted_names_attempts_and_reason() {
        let err = RetryError::Exhausted {
            scope: Scope::new("eu-west-1"),
            attempts: 20,
            kind: ConflictKind::Busy,
            last: ApiError::new("ThrottlingException", "Rate exceeded"),
        };
        let msg = err.to_string();
        assert!(msg.contains("20 attempts"));
        assert!(msg.contains("busy"));
        assert!(msg.contains("ThrottlingException: Rate exceeded"));
        assert!(err.is_transient());
    }

    #[test]
    fn test_partially_applied_keeps_binding() {
        let state = ResourceState::new(
            "aws_waf_ipset",
            crate::lifecycle::RemoteObjectRef::bound("ipset-0001"),
        );
        let err = CloudError::PartiallyApplied {
            state: Box::new(state),
            source: Box::new(CloudError::Retry(RetryError::Exhausted {
                scope: Scope::global(),
                attempts: 3,
                kind: ConflictKind::Busy,
                last: ApiError::new("ThrottlingException", "Rate exceeded"),
            })),
        };

        assert_eq!(err.partial_state().and_then(|s| s.binding.id()), Some("ipset-0001"));
        assert!(err.is_transient());
        assert!(err.to_string().starts_with("aws_waf_ipset left partially applied: [global]"));
        assert!(CloudError::NotBound.partial_state().is_none());
        assert!(!CloudError::NotBound.is_transient());
    }
}

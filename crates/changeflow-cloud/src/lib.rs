//! ChangeFlow Cloud
//!
//! Generic controller for remote APIs that require every mutating call to
//! carry a single, globally serialized change token.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              host framework (CRUD)               │
//! └─────────────────┬───────────────────────────────┘
//!                   │ CloudProvider
//! ┌─────────────────▼───────────────────────────────┐
//! │               changeflow-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  ResourceLifecycle / MemberSetResource    │   │
//! │  └──────────────────┬───────────────────────┘   │
//! │  ┌──────────────────▼───────────────────────┐   │
//! │  │             RetryExecutor                 │   │
//! │  └───┬──────────────┬───────────────┬───────┘   │
//! │  ┌───▼────────┐ ┌───▼──────────┐ ┌──▼────────┐  │
//! │  │TokenSource │ │ScopeSerializer│ │Classifier │  │
//! │  └────────────┘ └──────────────┘ └───────────┘  │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! Every attempt fetches its own token under the scope lock. Stale tokens
//! are retried at once, busy rejections after a jittered exponential
//! backoff, both within a bounded attempt budget.

pub mod action;
pub mod classify;
pub mod diff;
pub mod error;
pub mod lifecycle;
pub mod provider;
pub mod retry;
pub mod scope;
pub mod token;

// Re-exports
pub use action::{ChangeAction, ChangeSummary, MemberChange};
pub use classify::{CodeClassifier, ConflictClassifier};
pub use diff::{MemberDiff, diff_members};
pub use error::{ApiError, CloudError, ConflictKind, Result, RetryError};
pub use lifecycle::{
    DEFAULT_BATCH_SIZE, MemberSet, MemberSetApi, MemberSetResource, RemoteObjectRef,
    ResourceLifecycle, ResourceStatus,
};
pub use provider::{AuthStatus, CloudProvider, ResourceConfig, ResourceState};
pub use retry::{Outcome, RetryConfig, RetryExecutor};
pub use scope::{ScopeGuard, ScopeSerializer};
pub use token::{ChangeToken, Scope, TokenSource};

pub use tokio_util::sync::CancellationToken;

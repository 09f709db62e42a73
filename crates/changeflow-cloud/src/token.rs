//! Change tokens and the scopes that partition them

use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const GLOBAL_SCOPE: &str = "global";

/// Partition key for change-token serialization (`global` or a region name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().to_string())
    }

    /// The service-wide scope
    pub fn global() -> Self {
        Self::new(GLOBAL_SCOPE)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_global(&self) -> bool {
        self.0 == GLOBAL_SCOPE
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Scope {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Opaque, single-use version stamp handed out by the service.
///
/// Deliberately not `Clone`: each attempt owns the token it fetched.
#[derive(Debug, PartialEq, Eq)]
pub struct ChangeToken(String);

impl ChangeToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ChangeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fetches the current change token for a scope.
///
/// Implementations must hit the remote service on every call. Tokens are
/// consumed by actors outside this process too, so a cached token is stale
/// by construction.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self, scope: &Scope) -> std::result::Result<ChangeToken, ApiError>;
}

#[async_trait]
impl<T: TokenSource + ?Sized> TokenSource for Arc<T> {
    async fn fetch(&self, scope: &Scope) -> std::result::Result<ChangeToken, ApiError> {
        (**self).fetch(scope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_display_and_global() {
        assert!(Scope::global().is_global());
        assert!(!Scope::new("us-west-2").is_global());
        assert_eq!(Scope::from("us-west-2").to_string(), "us-west-2");
    }

    #[test]
    fn test_scope_serde_is_plain_string() {
        let json = serde_json::to_string(&Scope::global()).unwrap();
        assert_eq!(json, "\"global\"");
        let scope: Scope = serde_json::from_str("\"ap-northeast-1\"").unwrap();
        assert_eq!(scope.as_str(), "ap-northeast-1");
    }
}

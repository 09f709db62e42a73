//! WAF transport boundary
//!
//! One [`WafApi`] per endpoint: the global WAF Classic endpoint, or the WAF
//! Regional endpoint of one region. Each endpoint hands out its own change
//! tokens.

use crate::error::codes;
use async_trait::async_trait;
use changeflow_cloud::{ApiError, ChangeToken, MemberChange, Scope, TokenSource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Address family of an IP set descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IpSetDescriptorType {
    #[serde(rename = "IPV4")]
    Ipv4,
    #[serde(rename = "IPV6")]
    Ipv6,
}

impl IpSetDescriptorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ipv4 => "IPV4",
            Self::Ipv6 => "IPV6",
        }
    }
}

impl std::fmt::Display for IpSetDescriptorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One CIDR block in an IP set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IpSetDescriptor {
    #[serde(rename = "type")]
    pub kind: IpSetDescriptorType,
    pub value: String,
}

impl IpSetDescriptor {
    pub fn ipv4(value: impl Into<String>) -> Self {
        Self {
            kind: IpSetDescriptorType::Ipv4,
            value: value.into(),
        }
    }

    pub fn ipv6(value: impl Into<String>) -> Self {
        Self {
            kind: IpSetDescriptorType::Ipv6,
            value: value.into(),
        }
    }
}

/// Insert or delete of one descriptor
pub type IpSetUpdate = MemberChange<IpSetDescriptor>;

/// Remote IP set as returned by GetIPSet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpSet {
    pub ip_set_id: String,
    pub name: String,
    pub descriptors: Vec<IpSetDescriptor>,
}

#[async_trait]
pub trait WafApi: Send + Sync {
    async fn get_change_token(&self) -> Result<ChangeToken, ApiError>;

    /// Create an empty IP set and return its id
    async fn create_ip_set(&self, token: &ChangeToken, name: &str) -> Result<String, ApiError>;

    async fn get_ip_set(&self, ip_set_id: &str) -> Result<IpSet, ApiError>;

    async fn update_ip_set(
        &self,
        token: &ChangeToken,
        ip_set_id: &str,
        updates: &[IpSetUpdate],
    ) -> Result<(), ApiError>;

    async fn delete_ip_set(&self, token: &ChangeToken, ip_set_id: &str) -> Result<(), ApiError>;
}

#[async_trait]
impl<T: WafApi + ?Sized> WafApi for Arc<T> {
    async fn get_change_token(&self) -> Result<ChangeToken, ApiError> {
        (**self).get_change_token().await
    }

    async fn create_ip_set(&self, token: &ChangeToken, name: &str) -> Result<String, ApiError> {
        (**self).create_ip_set(token, name).await
    }

    async fn get_ip_set(&self, ip_set_id: &str) -> Result<IpSet, ApiError> {
        (**self).get_ip_set(ip_set_id).await
    }

    async fn update_ip_set(
        &self,
        token: &ChangeToken,
        ip_set_id: &str,
        updates: &[IpSetUpdate],
    ) -> Result<(), ApiError> {
        (**self).update_ip_set(token, ip_set_id, updates).await
    }

    async fn delete_ip_set(&self, token: &ChangeToken, ip_set_id: &str) -> Result<(), ApiError> {
        (**self).delete_ip_set(token, ip_set_id).await
    }
}

/// Routes token fetches to the endpoint that owns each scope
#[derive(Clone, Default)]
pub struct ScopedTokens {
    endpoints: HashMap<Scope, Arc<dyn WafApi>>,
}

impl ScopedTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, scope: Scope, api: Arc<dyn WafApi>) -> Self {
        self.endpoints.insert(scope, api);
        self
    }

    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.endpoints.keys()
    }
}

#[async_trait]
impl TokenSource for ScopedTokens {
    async fn fetch(&self, scope: &Scope) -> Result<ChangeToken, ApiError> {
        let api = self.endpoints.get(scope).ok_or_else(|| {
            ApiError::new(
                codes::UNKNOWN_SCOPE,
                format!("no WAF endpoint configured for scope {scope}"),
            )
        })?;
        api.get_change_token().await
    }
}

//! Cloud provider trait definition

use crate::error::Result;
use crate::lifecycle::RemoteObjectRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Cloud provider abstraction trait
///
/// The host framework drives every managed resource through these four
/// operations. Resource-specific payloads travel as JSON.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Returns the provider name (e.g., "aws-waf")
    fn name(&self) -> &str;

    /// Returns the provider display name for UI
    fn display_name(&self) -> &str;

    /// Resource type names this provider manages
    fn resource_types(&self) -> Vec<&str>;

    /// Check if the provider is properly configured and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Create the resource and return its observed state
    async fn create(&self, desired: &ResourceConfig) -> Result<ResourceState>;

    /// Refresh a resource. An unbound result means it no longer exists.
    async fn read(&self, current: &ResourceState) -> Result<ResourceState>;

    /// Move a resource from its prior observed state to the desired one
    async fn update(&self, prior: &ResourceState, desired: &ResourceConfig)
    -> Result<ResourceState>;

    /// Destroy a resource. Already-absent resources are not an error.
    async fn delete(&self, current: &ResourceState) -> Result<()>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Desired configuration for a cloud resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource type (e.g., "aws_waf_ipset")
    pub resource_type: String,

    /// Resource-specific configuration
    pub config: serde_json::Value,
}

impl ResourceConfig {
    pub fn new(resource_type: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            config,
        }
    }

    /// Deserialize the configuration into a resource's typed descriptor
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.config.clone())?)
    }
}

/// Observed state of a single resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type
    pub resource_type: String,

    /// Remote id binding and lifecycle status
    #[serde(flatten)]
    pub binding: RemoteObjectRef,

    /// Observed attributes
    pub attributes: serde_json::Value,
}

impl ResourceState {
    pub fn new(resource_type: impl Into<String>, binding: RemoteObjectRef) -> Self {
        Self {
            resource_type: resource_type.into(),
            binding,
            attributes: serde_json::Value::Null,
        }
    }

    pub fn with_attributes(mut self, attributes: serde_json::Value) -> Self {
        self.attributes = attributes;
        self
    }

    /// The resource no longer exists remotely
    pub fn is_absent(&self) -> bool {
        !self.binding.is_bound()
    }

    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.attributes.clone())?)
    }
}

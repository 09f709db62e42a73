//! AWS WAF provider for ChangeFlow
//!
//! Manages WAF Classic and WAF Regional IP sets. Both APIs require a fresh
//! change token on every mutating call, and a token is invalidated by the
//! first mutation that uses it, so all writes go through
//! [`changeflow_cloud::RetryExecutor`].
//!
//! # Resource types
//!
//! - `aws_waf_ipset`: global endpoint, scope `global`
//! - `aws_wafregional_ipset`: regional endpoint, scope = configured region
//!
//! # Example
//!
//! ```ignore
//! use changeflow_cloud::{CloudProvider, ResourceConfig};
//! use changeflow_cloud_aws::{WAF_IPSET, sdk::provider_from_env};
//!
//! let provider = provider_from_env().await?;
//! let state = provider
//!     .create(&ResourceConfig::new(
//!         WAF_IPSET,
//!         serde_json::json!({
//!             "name": "blocklist",
//!             "ip_set_descriptors": [{ "type": "IPV4", "value": "192.0.2.0/24" }]
//!         }),
//!     ))
//!     .await?;
//! ```
//!
//! # Features
//!
//! - `sdk`: AWS SDK transport ([`sdk::SdkWaf`], [`sdk::SdkWafRegional`])
//! - `test-utils`: in-memory endpoint ([`testing::MemoryWaf`])

pub mod api;
pub mod error;
pub mod ipset;
pub mod logging;
pub mod provider;

#[cfg(feature = "sdk")]
pub mod sdk;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use api::{IpSet, IpSetDescriptor, IpSetDescriptorType, IpSetUpdate, ScopedTokens, WafApi};
pub use error::{AwsError, Result, codes, waf_classifier};
pub use ipset::{IpSetApi, IpSetConfig, IpSetResource, ip_set_resource};
pub use logging::{init_logging, try_init_logging};
pub use provider::{WAF_IPSET, WAFREGIONAL_IPSET, WafProvider};

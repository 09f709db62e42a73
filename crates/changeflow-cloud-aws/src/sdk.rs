//! AWS SDK transport for WAF Classic and WAF Regional
//!
//! Enabled with the `sdk` feature. Both services expose the same change-token
//! IP set API under different crates, so one macro generates both clients.

use crate::api::{IpSet, IpSetDescriptor, IpSetDescriptorType, IpSetUpdate, WafApi};
use crate::error::{Result, codes};
use crate::provider::WafProvider;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_waf::error::{DisplayErrorContext, ProvideErrorMetadata};
use changeflow_cloud::{ApiError, ChangeAction, ChangeToken};
use changeflow_config::ProviderConfig;
use std::sync::Arc;

/// WAF Classic is a global service homed in us-east-1
const GLOBAL_REGION: &str = "us-east-1";

/// Raised when the SDK fails before the service answered
const TRANSPORT_ERROR: &str = "ChangeFlowTransportError";

fn api_error<E>(err: E) -> ApiError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    let code = err.code().unwrap_or(TRANSPORT_ERROR).to_string();
    let message = match err.message() {
        Some(message) => message.to_string(),
        None => DisplayErrorContext(&err).to_string(),
    };
    ApiError::new(code, message)
}

fn malformed(what: &str) -> ApiError {
    ApiError::new(codes::MALFORMED_RESPONSE, format!("response is missing {what}"))
}

macro_rules! sdk_waf_client {
    ($(#[$doc:meta])* $name:ident, $sdk:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            client: $sdk::Client,
        }

        impl $name {
            pub fn new(client: $sdk::Client) -> Self {
                Self { client }
            }

            fn to_sdk_descriptor(
                descriptor: &IpSetDescriptor,
            ) -> std::result::Result<$sdk::types::IpSetDescriptor, ApiError> {
                let kind = match descriptor.kind {
                    IpSetDescriptorType::Ipv4 => $sdk::types::IpSetDescriptorType::Ipv4,
                    IpSetDescriptorType::Ipv6 => $sdk::types::IpSetDescriptorType::Ipv6,
                };
                $sdk::types::IpSetDescriptor::builder()
                    .r#type(kind)
                    .value(descriptor.value.clone())
                    .build()
                    .map_err(|e| ApiError::new(codes::INVALID_PARAMETER, e.to_string()))
            }

            fn from_sdk_descriptor(
                descriptor: &$sdk::types::IpSetDescriptor,
            ) -> std::result::Result<IpSetDescriptor, ApiError> {
                let kind = match descriptor.r#type() {
                    $sdk::types::IpSetDescriptorType::Ipv4 => IpSetDescriptorType::Ipv4,
                    $sdk::types::IpSetDescriptorType::Ipv6 => IpSetDescriptorType::Ipv6,
                    other => {
                        return Err(ApiError::new(
                            codes::MALFORMED_RESPONSE,
                            format!("unsupported descriptor type {}", other.as_str()),
                        ));
                    }
                };
                Ok(IpSetDescriptor {
                    kind,
                    value: descriptor.value().to_string(),
                })
            }

            fn to_sdk_update(
                update: &IpSetUpdate,
            ) -> std::result::Result<$sdk::types::IpSetUpdate, ApiError> {
                let action = match update.action {
                    ChangeAction::Insert => $sdk::types::ChangeAction::Insert,
                    ChangeAction::Delete => $sdk::types::ChangeAction::Delete,
                };
                $sdk::types::IpSetUpdate::builder()
                    .action(action)
                    .ip_set_descriptor(Self::to_sdk_descriptor(&update.member)?)
                    .build()
                    .map_err(|e| ApiError::new(codes::INVALID_PARAMETER, e.to_string()))
            }
        }

        #[async_trait]
        impl WafApi for $name {
            async fn get_change_token(&self) -> std::result::Result<ChangeToken, ApiError> {
                let output = self
                    .client
                    .get_change_token()
                    .send()
                    .await
                    .map_err(api_error)?;
                output
                    .change_token()
                    .map(ChangeToken::new)
                    .ok_or_else(|| malformed("ChangeToken"))
            }

            async fn create_ip_set(
                &self,
                token: &ChangeToken,
                name: &str,
            ) -> std::result::Result<String, ApiError> {
                let output = self
                    .client
                    .create_ip_set()
                    .name(name)
                    .change_token(token.as_str())
                    .send()
                    .await
                    .map_err(api_error)?;
                output
                    .ip_set()
                    .map(|ip_set| ip_set.ip_set_id().to_string())
                    .ok_or_else(|| malformed("IPSet"))
            }

            async fn get_ip_set(&self, ip_set_id: &str) -> std::result::Result<IpSet, ApiError> {
                let output = self
                    .client
                    .get_ip_set()
                    .ip_set_id(ip_set_id)
                    .send()
                    .await
                    .map_err(api_error)?;
                let ip_set = output.ip_set().ok_or_else(|| malformed("IPSet"))?;
                let descriptors = ip_set
                    .ip_set_descriptors()
                    .iter()
                    .map(Self::from_sdk_descriptor)
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(IpSet {
                    ip_set_id: ip_set.ip_set_id().to_string(),
                    name: ip_set.name().unwrap_or_default().to_string(),
                    descriptors,
                })
            }

            async fn update_ip_set(
                &self,
                token: &ChangeToken,
                ip_set_id: &str,
                updates: &[IpSetUpdate],
            ) -> std::result::Result<(), ApiError> {
                let updates = updates
                    .iter()
                    .map(Self::to_sdk_update)
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                self.client
                    .update_ip_set()
                    .ip_set_id(ip_set_id)
                    .change_token(token.as_str())
                    .set_updates(Some(updates))
                    .send()
                    .await
                    .map_err(api_error)?;
                Ok(())
            }

            async fn delete_ip_set(
                &self,
                token: &ChangeToken,
                ip_set_id: &str,
            ) -> std::result::Result<(), ApiError> {
                self.client
                    .delete_ip_set()
                    .ip_set_id(ip_set_id)
                    .change_token(token.as_str())
                    .send()
                    .await
                    .map_err(api_error)?;
                Ok(())
            }
        }
    };
}

sdk_waf_client!(
    /// WAF Classic (global, CloudFront) endpoint
    SdkWaf,
    aws_sdk_waf
);

sdk_waf_client!(
    /// WAF Regional endpoint (ALB, API Gateway) of one region
    SdkWafRegional,
    aws_sdk_wafregional
);

/// Build SDK clients for the global endpoint and the configured region
pub async fn load_clients(config: &ProviderConfig) -> (SdkWaf, SdkWafRegional) {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region().to_string()));
    if let Some(url) = &config.endpoint_url {
        loader = loader.endpoint_url(url.clone());
    }
    let sdk_config = loader.load().await;

    let global_config = aws_sdk_waf::config::Builder::from(&sdk_config)
        .region(Region::new(GLOBAL_REGION))
        .build();

    (
        SdkWaf::new(aws_sdk_waf::Client::from_conf(global_config)),
        SdkWafRegional::new(aws_sdk_wafregional::Client::new(&sdk_config)),
    )
}

/// Load configuration from file and environment and build the provider
pub async fn provider_from_env() -> Result<WafProvider> {
    let config = changeflow_config::load_config()?;
    let (global, regional) = load_clients(&config).await;
    tracing::info!(region = config.region(), "using AWS SDK transport");
    WafProvider::new(Arc::new(global), Some(Arc::new(regional)), &config)
}

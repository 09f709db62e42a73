//! AWS WAF provider implementation

use crate::api::{ScopedTokens, WafApi};
use crate::error::{AwsError, Result, waf_classifier};
use crate::ipset::{IpSetConfig, IpSetResource, ip_set_resource};
use async_trait::async_trait;
use changeflow_cloud::{
    AuthStatus, CloudError, CloudProvider, RemoteObjectRef, ResourceConfig, ResourceLifecycle,
    ResourceState, RetryExecutor, Scope, TokenSource,
};
use changeflow_config::ProviderConfig;
use std::sync::Arc;

/// IP set managed through the global WAF Classic endpoint
pub const WAF_IPSET: &str = "aws_waf_ipset";
/// IP set managed through the WAF Regional endpoint of the configured region
pub const WAFREGIONAL_IPSET: &str = "aws_wafregional_ipset";

/// AWS WAF provider
///
/// All resource types share one [`RetryExecutor`], so every mutation in a
/// scope is serialized process-wide.
pub struct WafProvider {
    tokens: ScopedTokens,
    region: Scope,
    global: IpSetResource,
    regional: Option<IpSetResource>,
}

impl WafProvider {
    /// Build the provider from a global endpoint and an optional regional one
    pub fn new(
        global: Arc<dyn WafApi>,
        regional: Option<Arc<dyn WafApi>>,
        config: &ProviderConfig,
    ) -> Result<Self> {
        config.validate()?;

        let region = Scope::new(config.region());
        let mut tokens = ScopedTokens::new().with_endpoint(Scope::global(), global.clone());
        if let Some(api) = &regional {
            tokens = tokens.with_endpoint(region.clone(), api.clone());
        }

        let executor =
            RetryExecutor::new(tokens.clone(), waf_classifier()).with_config(config.retry.clone());

        let global = ip_set_resource(global, executor.clone(), Scope::global(), config.batch_size);
        let regional = regional
            .map(|api| ip_set_resource(api, executor.clone(), region.clone(), config.batch_size));

        tracing::debug!(
            region = %region,
            regional = regional.is_some(),
            "configured WAF provider"
        );

        Ok(Self {
            tokens,
            region,
            global,
            regional,
        })
    }

    pub fn region(&self) -> &Scope {
        &self.region
    }

    fn resource_for(&self, resource_type: &str) -> changeflow_cloud::Result<&IpSetResource> {
        match resource_type {
            WAF_IPSET => Ok(&self.global),
            WAFREGIONAL_IPSET => self.regional.as_ref().ok_or_else(|| {
                CloudError::InvalidConfig(
                    AwsError::RegionNotConfigured(self.region.to_string()).to_string(),
                )
            }),
            other => Err(CloudError::UnsupportedResource(other.to_string())),
        }
    }

    fn state(
        resource_type: &str,
        binding: RemoteObjectRef,
        observed: Option<changeflow_cloud::MemberSet<crate::api::IpSetDescriptor>>,
    ) -> changeflow_cloud::Result<ResourceState> {
        let state = ResourceState::new(resource_type, binding);
        Ok(match observed {
            Some(set) => state.with_attributes(serde_json::to_value(IpSetConfig::from(set))?),
            None => state,
        })
    }
}

#[async_trait]
impl CloudProvider for WafProvider {
    fn name(&self) -> &str {
        "aws-waf"
    }

    fn display_name(&self) -> &str {
        "AWS WAF"
    }

    fn resource_types(&self) -> Vec<&str> {
        let mut types = vec![WAF_IPSET];
        if self.regional.is_some() {
            types.push(WAFREGIONAL_IPSET);
        }
        types
    }

    async fn check_auth(&self) -> changeflow_cloud::Result<AuthStatus> {
        match self.tokens.fetch(&Scope::global()).await {
            Ok(_) => Ok(AuthStatus::ok(format!("WAF ({})", self.region))),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn create(&self, desired: &ResourceConfig) -> changeflow_cloud::Result<ResourceState> {
        let resource = self.resource_for(&desired.resource_type)?;
        let config: IpSetConfig = desired.parse()?;
        tracing::info!("Creating {} {}", desired.resource_type, config.name);

        let mut binding = RemoteObjectRef::new();
        match resource.create(&config.to_member_set(), &mut binding).await {
            Ok(observed) => Self::state(&desired.resource_type, binding, observed),
            // Attributes stay unknown; the next update refreshes them first.
            Err(source) if binding.is_bound() => Err(CloudError::PartiallyApplied {
                state: Box::new(ResourceState::new(&desired.resource_type, binding)),
                source: Box::new(source),
            }),
            Err(err) => Err(err),
        }
    }

    async fn read(&self, current: &ResourceState) -> changeflow_cloud::Result<ResourceState> {
        let resource = self.resource_for(&current.resource_type)?;
        let mut binding = current.binding.clone();
        let observed = resource.read(&mut binding).await?;
        Self::state(&current.resource_type, binding, observed)
    }

    async fn update(
        &self,
        prior: &ResourceState,
        desired: &ResourceConfig,
    ) -> changeflow_cloud::Result<ResourceState> {
        if prior.resource_type != desired.resource_type {
            return Err(CloudError::RequiresReplacement("resource_type".to_string()));
        }
        let resource = self.resource_for(&desired.resource_type)?;
        let config: IpSetConfig = desired.parse()?;

        let mut binding = prior.binding.clone();
        let observed = if prior.attributes.is_null() {
            match resource.read(&mut binding).await? {
                Some(observed) => observed,
                None => return Self::state(&desired.resource_type, binding, None),
            }
        } else {
            prior.parse::<IpSetConfig>()?.to_member_set()
        };

        let observed = resource
            .update(&observed, &config.to_member_set(), &mut binding)
            .await?;
        Self::state(&desired.resource_type, binding, observed)
    }

    async fn delete(&self, current: &ResourceState) -> changeflow_cloud::Result<()> {
        let resource = self.resource_for(&current.resource_type)?;
        let mut binding = current.binding.clone();
        if let Some(id) = binding.id() {
            tracing::info!("Deleting {} {}", current.resource_type, id);
        }
        resource.delete(&mut binding).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryWaf;
    use serde_json::json;

    fn provider(regional: bool) -> (Arc<MemoryWaf>, Arc<MemoryWaf>, WafProvider) {
        let global = Arc::new(MemoryWaf::new());
        let region = Arc::new(MemoryWaf::new());
        let config = ProviderConfig {
            region: Some("eu-west-1".to_string()),
            ..ProviderConfig::default()
        };
        let regional_api: Option<Arc<dyn WafApi>> = if regional {
            Some(region.clone())
        } else {
            None
        };
        let provider = WafProvider::new(global.clone(), regional_api, &config).unwrap();
        (global, region, provider)
    }

    #[test]
    fn test_resource_types() {
        let (_, _, without) = provider(false);
        assert_eq!(without.resource_types(), vec![WAF_IPSET]);
        let (_, _, with) = provider(true);
        assert_eq!(with.resource_types(), vec![WAF_IPSET, WAFREGIONAL_IPSET]);
        assert_eq!(with.region().as_str(), "eu-west-1");
    }

    #[tokio::test]
    async fn test_regional_resources_use_regional_endpoint() {
        let (global, region, provider) = provider(true);
        let desired = ResourceConfig::new(
            WAFREGIONAL_IPSET,
            json!({ "name": "edge", "ip_set_descriptors": [{ "type": "IPV4", "value": "192.0.2.0/24" }] }),
        );

        let state = provider.create(&desired).await.unwrap();

        assert!(!state.is_absent());
        assert_eq!(region.ip_set_count(), 1);
        assert_eq!(global.ip_set_count(), 0);
        assert_eq!(global.token_fetches(), 0);
    }

    #[tokio::test]
    async fn test_regional_without_endpoint_is_rejected() {
        let (_, _, provider) = provider(false);
        let desired = ResourceConfig::new(WAFREGIONAL_IPSET, json!({ "name": "edge" }));
        let err = provider.create(&desired).await.unwrap_err();
        assert!(matches!(err, CloudError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let (_, _, provider) = provider(false);
        let desired = ResourceConfig::new("aws_waf_rule", json!({ "name": "r" }));
        let err = provider.create(&desired).await.unwrap_err();
        assert!(matches!(err, CloudError::UnsupportedResource(t) if t == "aws_waf_rule"));
    }

    #[tokio::test]
    async fn test_check_auth() {
        let (global, _, provider) = provider(false);
        assert!(provider.check_auth().await.unwrap().authenticated);

        global.fail_times(
            crate::testing::Operation::GetChangeToken,
            crate::error::codes::ACCESS_DENIED,
            1,
        );
        let status = provider.check_auth().await.unwrap();
        assert!(!status.authenticated);
        assert!(status.error.unwrap().contains("AccessDeniedException"));
    }

    #[test]
    fn test_region_named_global_is_rejected() {
        let config = ProviderConfig {
            region: Some("global".to_string()),
            ..ProviderConfig::default()
        };
        let regional: Arc<dyn WafApi> = Arc::new(MemoryWaf::new());
        let result = WafProvider::new(Arc::new(MemoryWaf::new()), Some(regional), &config);
        assert!(matches!(result, Err(AwsError::Config(_))));
    }

    #[tokio::test]
    async fn test_resource_type_change_requires_replacement() {
        let (global, region, provider) = provider(true);
        let prior = provider
            .create(&ResourceConfig::new(WAF_IPSET, json!({ "name": "edge" })))
            .await
            .unwrap();
        let desired = ResourceConfig::new(WAFREGIONAL_IPSET, json!({ "name": "edge" }));

        let err = provider.update(&prior, &desired).await.unwrap_err();

        assert!(matches!(err, CloudError::RequiresReplacement(field) if field == "resource_type"));
        assert_eq!(global.ip_set_count(), 1);
        assert_eq!(region.token_fetches(), 0);
    }
}


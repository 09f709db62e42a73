use changeflow_cloud::{ResourceConfig, ResourceState, RetryConfig};
use changeflow_cloud_aws::testing::MemoryWaf;
use changeflow_cloud_aws::{IpSetConfig, WAF_IPSET, WafApi, WafProvider};
use changeflow_config::ProviderConfig;
use serde_json::json;
use std::sync::Arc;

pub struct TestWaf {
    pub global: Arc<MemoryWaf>,
    pub regional: Arc<MemoryWaf>,
    pub provider: Arc<WafProvider>,
}

impl TestWaf {
    pub fn new() -> Self {
        Self::with_config(ProviderConfig::default(), MemoryWaf::new(), MemoryWaf::new())
    }

    pub fn with_config(config: ProviderConfig, global: MemoryWaf, regional: MemoryWaf) -> Self {
        let global = Arc::new(global);
        let regional = Arc::new(regional);
        let regional_api: Arc<dyn WafApi> = regional.clone();
        let provider = WafProvider::new(global.clone(), Some(regional_api), &config).unwrap();
        Self {
            global,
            regional,
            provider: Arc::new(provider),
        }
    }
}

/// バックオフを短くした設定
#[allow(dead_code)]
pub fn fast_retry(max_attempts: u32) -> ProviderConfig {
    ProviderConfig {
        retry: RetryConfig {
            max_attempts,
            initial_delay_ms: 10,
            max_delay_ms: 40,
            ..RetryConfig::default()
        },
        ..ProviderConfig::default()
    }
}

pub fn ip_set(name: &str, cidrs: &[&str]) -> ResourceConfig {
    ip_set_of(WAF_IPSET, name, cidrs)
}

pub fn ip_set_of(resource_type: &str, name: &str, cidrs: &[&str]) -> ResourceConfig {
    let descriptors: Vec<_> = cidrs
        .iter()
        .map(|cidr| json!({ "type": "IPV4", "value": cidr }))
        .collect();
    ResourceConfig::new(
        resource_type,
        json!({ "name": name, "ip_set_descriptors": descriptors }),
    )
}

pub fn cidrs(state: &ResourceState) -> Vec<String> {
    let config: IpSetConfig = state.parse().unwrap();
    config
        .ip_set_descriptors
        .into_iter()
        .map(|d| d.value)
        .collect()
}

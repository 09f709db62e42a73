//! WAF IP set resource
//!
//! An IP set is created empty (CreateIPSet only accepts a name) and filled
//! through UpdateIPSet insert/delete batches.

use crate::api::{IpSet, IpSetDescriptor, IpSetUpdate, WafApi};
use async_trait::async_trait;
use changeflow_cloud::{
    ApiError, ChangeToken, MemberSet, MemberSetApi, MemberSetResource, RetryExecutor, Scope,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Lifecycle of an IP set in one scope
pub type IpSetResource = MemberSetResource<IpSetApi>;

/// Configuration / observed attributes of an IP set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpSetConfig {
    pub name: String,
    #[serde(default)]
    pub ip_set_descriptors: Vec<IpSetDescriptor>,
}

impl IpSetConfig {
    pub fn to_member_set(&self) -> MemberSet<IpSetDescriptor> {
        MemberSet::new(self.name.clone(), self.ip_set_descriptors.iter().cloned())
    }
}

impl From<MemberSet<IpSetDescriptor>> for IpSetConfig {
    fn from(set: MemberSet<IpSetDescriptor>) -> Self {
        Self {
            name: set.name,
            ip_set_descriptors: set.members.into_iter().collect(),
        }
    }
}

impl From<IpSet> for MemberSet<IpSetDescriptor> {
    fn from(ip_set: IpSet) -> Self {
        MemberSet::new(ip_set.name, ip_set.descriptors)
    }
}

/// Adapts a WAF endpoint to the generic member-set lifecycle
pub struct IpSetApi {
    waf: Arc<dyn WafApi>,
}

impl IpSetApi {
    pub fn new(waf: Arc<dyn WafApi>) -> Self {
        Self { waf }
    }
}

#[async_trait]
impl MemberSetApi for IpSetApi {
    type Member = IpSetDescriptor;

    fn kind(&self) -> &str {
        "ip_set"
    }

    async fn create(
        &self,
        token: &ChangeToken,
        desired: &MemberSet<IpSetDescriptor>,
    ) -> Result<String, ApiError> {
        self.waf.create_ip_set(token, &desired.name).await
    }

    async fn get(&self, id: &str) -> Result<MemberSet<IpSetDescriptor>, ApiError> {
        Ok(self.waf.get_ip_set(id).await?.into())
    }

    async fn update(
        &self,
        token: &ChangeToken,
        id: &str,
        changes: &[IpSetUpdate],
    ) -> Result<(), ApiError> {
        self.waf.update_ip_set(token, id, changes).await
    }

    async fn delete(&self, token: &ChangeToken, id: &str) -> Result<(), ApiError> {
        self.waf.delete_ip_set(token, id).await
    }
}

/// Build the IP set lifecycle for one endpoint and scope
pub fn ip_set_resource(
    waf: Arc<dyn WafApi>,
    executor: RetryExecutor,
    scope: Scope,
    batch_size: usize,
) -> IpSetResource {
    MemberSetResource::new(Arc::new(IpSetApi::new(waf)), executor, scope).with_batch_size(batch_size)
}

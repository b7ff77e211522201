//! # Provider ports
//!
//! The cloud surface the core consumes, split per concern. Managers depend on
//! these traits only; [`aws`] adapts the AWS SDK clients to them.
//!
//! Every call fails with a [`ProviderError`] that keeps the provider's error
//! code. Whether a code means "already exists", "not found" or "try again" is
//! decided by the caller, never by the adapter.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use cdn_proxy_common::error::ProviderError;

pub mod aws;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub name: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: String,
    pub arn: String,
}

/// An immutable published version. `arn` is the qualified ARN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedVersion {
    pub version: String,
    pub arn: String,
}

impl PublishedVersion {
    /// The mutable alias every function has. It can never be pinned.
    pub const LATEST: &'static str = "$LATEST";

    pub fn is_latest(&self) -> bool {
        self.version == Self::LATEST
    }
}

#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub name: String,
    pub role_arn: String,
    pub runtime: String,
    pub handler: String,
    pub description: String,
    pub timeout_secs: i32,
    pub memory_mb: i32,
    pub package: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionGrant {
    pub statement_id: String,
    pub principal: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionSummary {
    pub id: String,
    pub arn: String,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginRequestPolicySummary {
    pub id: String,
    pub name: String,
}

/// Forward every viewer header, cookie and query string, plus the listed
/// CDN-generated headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginRequestPolicySpec {
    pub name: String,
    pub comment: String,
    pub cdn_headers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionSpec {
    /// Unique per create request.
    pub caller_reference: String,
    pub comment: String,
    pub placeholder_origin: String,
    /// Qualified ARN of the published function version.
    pub function_version_arn: String,
    pub origin_request_policy_id: String,
    pub cache_policy_id: String,
    pub tags: BTreeMap<String, String>,
}

/// A config together with the consistency token it was read under.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<C> {
    pub etag: String,
    pub config: C,
}

/// The parts of a provider-owned distribution config the core edits. The rest
/// is sent back untouched.
pub trait EditableConfig {
    fn is_enabled(&self) -> bool;
    fn disable(&mut self);
    /// ARNs of every edge function bound to the config.
    fn function_arns(&self) -> Vec<String>;
    /// Drops every edge-function association.
    fn unbind_functions(&mut self) -> Result<(), ProviderError>;
}

#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn get_role(&self, name: &str) -> Result<Role, ProviderError>;
    async fn create_role(
        &self,
        name: &str,
        trust_policy: &str,
        description: &str,
    ) -> Result<Role, ProviderError>;
    async fn put_role_policy(
        &self,
        role: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<(), ProviderError>;
    async fn delete_role_policy(&self, role: &str, policy_name: &str) -> Result<(), ProviderError>;
    async fn delete_role(&self, name: &str) -> Result<(), ProviderError>;
}

#[async_trait]
pub trait FunctionApi: Send + Sync {
    async fn get_function(&self, name: &str) -> Result<FunctionInfo, ProviderError>;
    async fn create_function(&self, spec: &FunctionSpec) -> Result<FunctionInfo, ProviderError>;
    async fn update_function_code(
        &self,
        name: &str,
        package: &[u8],
    ) -> Result<FunctionInfo, ProviderError>;
    async fn add_permission(
        &self,
        function: &str,
        grant: &PermissionGrant,
    ) -> Result<(), ProviderError>;
    /// Statement ids in the function's resource policy. Empty when the
    /// function has no policy yet.
    async fn permission_ids(&self, function: &str) -> Result<Vec<String>, ProviderError>;
    /// Blocks until pending creates or code updates have settled.
    async fn wait_ready(&self, name: &str) -> Result<(), ProviderError>;
    async fn publish_version(&self, name: &str) -> Result<PublishedVersion, ProviderError>;
    /// Every version including `$LATEST`.
    async fn list_versions(&self, name: &str) -> Result<Vec<PublishedVersion>, ProviderError>;
    /// `qualifier == None` deletes the function itself.
    async fn delete_function(&self, name: &str, qualifier: Option<&str>)
    -> Result<(), ProviderError>;
}

#[async_trait]
pub trait CdnApi: Send + Sync {
    type Config: EditableConfig + Send + Sync + 'static;

    async fn list_distributions(&self) -> Result<Vec<DistributionSummary>, ProviderError>;
    async fn list_tags(&self, arn: &str) -> Result<BTreeMap<String, String>, ProviderError>;
    async fn list_origin_request_policies(
        &self,
    ) -> Result<Vec<OriginRequestPolicySummary>, ProviderError>;
    async fn create_origin_request_policy(
        &self,
        spec: &OriginRequestPolicySpec,
    ) -> Result<OriginRequestPolicySummary, ProviderError>;
    async fn create_distribution(
        &self,
        spec: &DistributionSpec,
    ) -> Result<DistributionSummary, ProviderError>;
    async fn get_distribution_config(
        &self,
        id: &str,
    ) -> Result<Versioned<Self::Config>, ProviderError>;
    /// Returns the new consistency token.
    async fn update_distribution(
        &self,
        id: &str,
        etag: &str,
        config: Self::Config,
    ) -> Result<String, ProviderError>;
    async fn delete_distribution(&self, id: &str, etag: &str) -> Result<(), ProviderError>;
    /// Provider-native long poll until the distribution is deployed.
    async fn wait_deployed(&self, id: &str, max_wait: Duration) -> Result<(), ProviderError>;
}

/// Everything the orchestrator needs from one provider.
pub trait Provider: IdentityApi + FunctionApi + CdnApi {}

impl<T> Provider for T where T: IdentityApi + FunctionApi + CdnApi {}

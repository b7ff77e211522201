//! # In-memory provider
//!
//! [`FakeProvider`] implements every provider port against plain maps. It
//! mirrors the provider behaviours the managers depend on:
//!
//! * names are unique (`EntityAlreadyExists`, `ResourceConflictException`),
//! * a function cannot be created with an unknown role, and a version cannot
//!   be deleted while a distribution still references it
//!   (`InvalidParameterValueException`),
//! * a distribution cannot bind an unpublished version or one the replicator
//!   cannot read (`InvalidLambdaFunctionAssociation`),
//! * updates and deletes need the current etag, and a distribution must be
//!   disabled and deployed before it can be deleted.
//!
//! Every call is recorded by operation name, and any operation can be made to
//! fail with a given code.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use cdn_proxy_common::error::{ProviderError, codes};

use crate::provider::{
    CdnApi, DistributionSpec, DistributionSummary, EditableConfig, FunctionApi, FunctionInfo,
    FunctionSpec, IdentityApi, OriginRequestPolicySpec, OriginRequestPolicySummary,
    PermissionGrant, PublishedVersion, Role, Versioned,
};

const ACCOUNT: &str = "000000000000";
const DELETE_CONFLICT: &str = "DeleteConflict";
const NO_SUCH_RESOURCE: &str = "NoSuchResource";
const DISTRIBUTION_NOT_DISABLED: &str = "DistributionNotDisabled";
const POLICY_ALREADY_EXISTS: &str = "OriginRequestPolicyAlreadyExists";

/// The slice of a distribution config the fake keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeDistributionConfig {
    pub enabled: bool,
    pub comment: String,
    pub function_arns: Vec<String>,
}

impl EditableConfig for FakeDistributionConfig {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn function_arns(&self) -> Vec<String> {
        self.function_arns.clone()
    }

    fn unbind_functions(&mut self) -> Result<(), ProviderError> {
        self.function_arns.clear();
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct FakeRole {
    role: Role,
    policies: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct FakeFunction {
    info: FunctionInfo,
    role_arn: String,
    package: Vec<u8>,
    versions: Vec<u32>,
    next_version: u32,
    permissions: Vec<PermissionGrant>,
}

#[derive(Debug, Clone)]
struct FakeDistribution {
    summary: DistributionSummary,
    caller_reference: String,
    tags: BTreeMap<String, String>,
    config: FakeDistributionConfig,
    etag: u32,
    deployed: bool,
    /// Unbound versions whose edge replicas are only released on deploy.
    replicas: Vec<String>,
}

impl FakeDistribution {
    fn etag(&self) -> String {
        format!("E{}", self.etag)
    }
}

#[derive(Debug, Clone)]
struct Fault {
    error: ProviderError,
    remaining: Option<u32>,
}

#[derive(Default)]
struct State {
    roles: BTreeMap<String, FakeRole>,
    functions: BTreeMap<String, FakeFunction>,
    policies: Vec<OriginRequestPolicySummary>,
    distributions: Vec<FakeDistribution>,
    faults: HashMap<&'static str, Fault>,
    calls: Vec<&'static str>,
    next_id: u32,
}

impl State {
    fn distribution(&mut self, id: &str) -> Result<&mut FakeDistribution, ProviderError> {
        self.distributions
            .iter_mut()
            .find(|d| d.summary.id == id)
            .ok_or_else(|| {
                ProviderError::coded("Distribution", codes::NO_SUCH_DISTRIBUTION, id.to_string())
            })
    }

    fn function(&mut self, op: &'static str, name: &str) -> Result<&mut FakeFunction, ProviderError> {
        self.functions.get_mut(name).ok_or_else(|| {
            ProviderError::coded(op, codes::RESOURCE_NOT_FOUND, format!("Function not found: {name}"))
        })
    }

    fn is_bound(&self, arn: &str) -> bool {
        self.distributions
            .iter()
            .any(|d| d.config.function_arns.iter().chain(&d.replicas).any(|bound| bound == arn))
    }
}

#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<State>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the call and returns the injected fault, if any.
    fn enter(&self, op: &'static str) -> Result<MutexGuard<'_, State>, ProviderError> {
        let mut state = self.lock();
        state.calls.push(op);

        let mut exhausted: bool = false;
        let fault: Option<ProviderError> = state.faults.get_mut(op).map(|fault| {
            if let Some(remaining) = fault.remaining.as_mut() {
                *remaining = remaining.saturating_sub(1);
                exhausted = *remaining == 0;
            }
            fault.error.clone()
        });
        if exhausted {
            state.faults.remove(op);
        }

        match fault {
            Some(error) => Err(error),
            None => Ok(state),
        }
    }

    /// Makes the next `times` calls of `op` fail with `code`.
    pub fn fail(&self, op: &'static str, code: &str, times: u32) {
        self.lock().faults.insert(
            op,
            Fault {
                error: ProviderError::coded(op, code, "injected fault"),
                remaining: Some(times),
            },
        );
    }

    /// Makes every call of `op` fail with `code`.
    pub fn fail_always(&self, op: &'static str, code: &str) {
        self.lock().faults.insert(
            op,
            Fault {
                error: ProviderError::coded(op, code, "injected fault"),
                remaining: None,
            },
        );
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Operation names in call order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.lock().calls.iter().filter(|call| **call == op).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Seeds a deployed, enabled distribution.
    pub fn add_distribution(&self, id: &str, tags: BTreeMap<String, String>, function_arns: &[&str]) {
        let mut state = self.lock();
        state.distributions.push(FakeDistribution {
            summary: DistributionSummary {
                id: id.to_string(),
                arn: format!("arn:aws:cloudfront::{ACCOUNT}:distribution/{id}"),
                domain: format!("{}.cloudfront.test", id.to_lowercase()),
            },
            caller_reference: format!("seeded-{id}"),
            tags,
            config: FakeDistributionConfig {
                enabled: true,
                comment: String::new(),
                function_arns: function_arns.iter().map(|arn| arn.to_string()).collect(),
            },
            etag: 1,
            deployed: true,
            replicas: Vec::new(),
        });
    }

    pub fn role(&self, name: &str) -> Option<Role> {
        self.lock().roles.get(name).map(|r| r.role.clone())
    }

    pub fn role_policy(&self, role: &str, policy: &str) -> Option<String> {
        self.lock()
            .roles
            .get(role)
            .and_then(|r| r.policies.get(policy).cloned())
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.lock().functions.contains_key(name)
    }

    pub fn function_role(&self, name: &str) -> Option<String> {
        self.lock().functions.get(name).map(|f| f.role_arn.clone())
    }

    pub fn function_package(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().functions.get(name).map(|f| f.package.clone())
    }

    pub fn published_versions(&self, name: &str) -> Vec<u32> {
        self.lock()
            .functions
            .get(name)
            .map(|f| f.versions.clone())
            .unwrap_or_default()
    }

    pub fn permissions(&self, name: &str) -> Vec<PermissionGrant> {
        self.lock()
            .functions
            .get(name)
            .map(|f| f.permissions.clone())
            .unwrap_or_default()
    }

    pub fn distribution_ids(&self) -> Vec<String> {
        self.lock()
            .distributions
            .iter()
            .map(|d| d.summary.id.clone())
            .collect()
    }

    pub fn distribution_config(&self, id: &str) -> Option<FakeDistributionConfig> {
        self.lock()
            .distributions
            .iter()
            .find(|d| d.summary.id == id)
            .map(|d| d.config.clone())
    }

    pub fn distribution_tags(&self, id: &str) -> Option<BTreeMap<String, String>> {
        self.lock()
            .distributions
            .iter()
            .find(|d| d.summary.id == id)
            .map(|d| d.tags.clone())
    }

    pub fn origin_request_policies(&self) -> Vec<OriginRequestPolicySummary> {
        self.lock().policies.clone()
    }
}

#[async_trait]
impl IdentityApi for FakeProvider {
    async fn get_role(&self, name: &str) -> Result<Role, ProviderError> {
        let state = self.enter("GetRole")?;
        state
            .roles
            .get(name)
            .map(|r| r.role.clone())
            .ok_or_else(|| ProviderError::coded("GetRole", codes::NO_SUCH_ENTITY, name.to_string()))
    }

    async fn create_role(
        &self,
        name: &str,
        _trust_policy: &str,
        _description: &str,
    ) -> Result<Role, ProviderError> {
        let mut state = self.enter("CreateRole")?;
        if state.roles.contains_key(name) {
            return Err(ProviderError::coded(
                "CreateRole",
                codes::ENTITY_ALREADY_EXISTS,
                name.to_string(),
            ));
        }
        let role = Role {
            name: name.to_string(),
            arn: format!("arn:aws:iam::{ACCOUNT}:role/{name}"),
        };
        state.roles.insert(
            name.to_string(),
            FakeRole {
                role: role.clone(),
                policies: BTreeMap::new(),
            },
        );
        Ok(role)
    }

    async fn put_role_policy(
        &self,
        role: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<(), ProviderError> {
        let mut state = self.enter("PutRolePolicy")?;
        let entry = state.roles.get_mut(role).ok_or_else(|| {
            ProviderError::coded("PutRolePolicy", codes::NO_SUCH_ENTITY, role.to_string())
        })?;
        entry
            .policies
            .insert(policy_name.to_string(), document.to_string());
        Ok(())
    }

    async fn delete_role_policy(&self, role: &str, policy_name: &str) -> Result<(), ProviderError> {
        let mut state = self.enter("DeleteRolePolicy")?;
        state
            .roles
            .get_mut(role)
            .and_then(|r| r.policies.remove(policy_name))
            .map(|_| ())
            .ok_or_else(|| {
                ProviderError::coded("DeleteRolePolicy", codes::NO_SUCH_ENTITY, policy_name.to_string())
            })
    }

    async fn delete_role(&self, name: &str) -> Result<(), ProviderError> {
        let mut state = self.enter("DeleteRole")?;
        match state.roles.get(name) {
            None => Err(ProviderError::coded("DeleteRole", codes::NO_SUCH_ENTITY, name.to_string())),
            Some(role) if !role.policies.is_empty() => Err(ProviderError::coded(
                "DeleteRole",
                DELETE_CONFLICT,
                "Cannot delete entity, must delete policies first.",
            )),
            Some(_) => {
                state.roles.remove(name);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl FunctionApi for FakeProvider {
    async fn get_function(&self, name: &str) -> Result<FunctionInfo, ProviderError> {
        let mut state = self.enter("GetFunction")?;
        Ok(state.function("GetFunction", name)?.info.clone())
    }

    async fn create_function(&self, spec: &FunctionSpec) -> Result<FunctionInfo, ProviderError> {
        let mut state = self.enter("CreateFunction")?;
        if state.functions.contains_key(&spec.name) {
            return Err(ProviderError::coded(
                "CreateFunction",
                codes::RESOURCE_CONFLICT,
                format!("Function already exist: {}", spec.name),
            ));
        }
        let role_known: bool = state.roles.values().any(|r| r.role.arn == spec.role_arn);
        if !role_known {
            return Err(ProviderError::coded(
                "CreateFunction",
                codes::INVALID_PARAMETER_VALUE,
                "The role defined for the function cannot be assumed by Lambda.",
            ));
        }

        let info = FunctionInfo {
            name: spec.name.clone(),
            arn: format!("arn:aws:lambda:us-east-1:{ACCOUNT}:function:{}", spec.name),
        };
        state.functions.insert(
            spec.name.clone(),
            FakeFunction {
                info: info.clone(),
                role_arn: spec.role_arn.clone(),
                package: spec.package.clone(),
                versions: Vec::new(),
                next_version: 1,
                permissions: Vec::new(),
            },
        );
        Ok(info)
    }

    async fn update_function_code(
        &self,
        name: &str,
        package: &[u8],
    ) -> Result<FunctionInfo, ProviderError> {
        let mut state = self.enter("UpdateFunctionCode")?;
        let function = state.function("UpdateFunctionCode", name)?;
        function.package = package.to_vec();
        Ok(function.info.clone())
    }

    async fn add_permission(
        &self,
        function: &str,
        grant: &PermissionGrant,
    ) -> Result<(), ProviderError> {
        let mut state = self.enter("AddPermission")?;
        let function = state.function("AddPermission", function)?;
        if function
            .permissions
            .iter()
            .any(|p| p.statement_id == grant.statement_id)
        {
            return Err(ProviderError::coded(
                "AddPermission",
                codes::RESOURCE_CONFLICT,
                "The statement id provided already exists.",
            ));
        }
        function.permissions.push(grant.clone());
        Ok(())
    }

    async fn permission_ids(&self, function: &str) -> Result<Vec<String>, ProviderError> {
        let mut state = self.enter("GetPolicy")?;
        let function = state.function("GetPolicy", function)?;
        Ok(function
            .permissions
            .iter()
            .map(|p| p.statement_id.clone())
            .collect())
    }

    async fn wait_ready(&self, name: &str) -> Result<(), ProviderError> {
        let mut state = self.enter("WaitFunctionReady")?;
        state.function("WaitFunctionReady", name)?;
        Ok(())
    }

    async fn publish_version(&self, name: &str) -> Result<PublishedVersion, ProviderError> {
        let mut state = self.enter("PublishVersion")?;
        let function = state.function("PublishVersion", name)?;
        let version: u32 = function.next_version;
        function.next_version += 1;
        function.versions.push(version);
        Ok(PublishedVersion {
            version: version.to_string(),
            arn: format!("{}:{version}", function.info.arn),
        })
    }

    async fn list_versions(&self, name: &str) -> Result<Vec<PublishedVersion>, ProviderError> {
        let mut state = self.enter("ListVersionsByFunction")?;
        let function = state.function("ListVersionsByFunction", name)?;
        let latest = PublishedVersion {
            version: PublishedVersion::LATEST.to_string(),
            arn: format!("{}:{}", function.info.arn, PublishedVersion::LATEST),
        };
        let published = function.versions.iter().map(|v| PublishedVersion {
            version: v.to_string(),
            arn: format!("{}:{v}", function.info.arn),
        });
        Ok(std::iter::once(latest).chain(published).collect())
    }

    async fn delete_function(
        &self,
        name: &str,
        qualifier: Option<&str>,
    ) -> Result<(), ProviderError> {
        let mut state = self.enter("DeleteFunction")?;
        let function = state.function("DeleteFunction", name)?.clone();

        let replicated = |arn: &str| {
            ProviderError::coded(
                "DeleteFunction",
                codes::INVALID_PARAMETER_VALUE,
                format!("Lambda was unable to delete {arn} because it is a replicated function."),
            )
        };

        match qualifier {
            Some(version) => {
                let arn: String = format!("{}:{version}", function.info.arn);
                let number: Option<u32> = version.parse().ok();
                if !number.is_some_and(|n| function.versions.contains(&n)) {
                    return Err(ProviderError::coded(
                        "DeleteFunction",
                        codes::RESOURCE_NOT_FOUND,
                        format!("Function not found: {arn}"),
                    ));
                }
                if state.is_bound(&arn) {
                    return Err(replicated(&arn));
                }
                let f = state.function("DeleteFunction", name)?;
                f.versions.retain(|v| Some(*v) != number);
            }
            None => {
                let bound: bool = function
                    .versions
                    .iter()
                    .any(|v| state.is_bound(&format!("{}:{v}", function.info.arn)));
                if bound {
                    return Err(replicated(&function.info.arn));
                }
                state.functions.remove(name);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CdnApi for FakeProvider {
    type Config = FakeDistributionConfig;

    async fn list_distributions(&self) -> Result<Vec<DistributionSummary>, ProviderError> {
        let state = self.enter("ListDistributions")?;
        Ok(state.distributions.iter().map(|d| d.summary.clone()).collect())
    }

    async fn list_tags(&self, arn: &str) -> Result<BTreeMap<String, String>, ProviderError> {
        let state = self.enter("ListTagsForResource")?;
        state
            .distributions
            .iter()
            .find(|d| d.summary.arn == arn)
            .map(|d| d.tags.clone())
            .ok_or_else(|| ProviderError::coded("ListTagsForResource", NO_SUCH_RESOURCE, arn.to_string()))
    }

    async fn list_origin_request_policies(
        &self,
    ) -> Result<Vec<OriginRequestPolicySummary>, ProviderError> {
        let state = self.enter("ListOriginRequestPolicies")?;
        Ok(state.policies.clone())
    }

    async fn create_origin_request_policy(
        &self,
        spec: &OriginRequestPolicySpec,
    ) -> Result<OriginRequestPolicySummary, ProviderError> {
        let mut state = self.enter("CreateOriginRequestPolicy")?;
        if state.policies.iter().any(|p| p.name == spec.name) {
            return Err(ProviderError::coded(
                "CreateOriginRequestPolicy",
                POLICY_ALREADY_EXISTS,
                spec.name.clone(),
            ));
        }
        state.next_id += 1;
        let policy = OriginRequestPolicySummary {
            id: format!("policy-{}", state.next_id),
            name: spec.name.clone(),
        };
        state.policies.push(policy.clone());
        Ok(policy)
    }

    async fn create_distribution(
        &self,
        spec: &DistributionSpec,
    ) -> Result<DistributionSummary, ProviderError> {
        const OP: &str = "CreateDistributionWithTags";
        let mut state = self.enter(OP)?;

        if state
            .distributions
            .iter()
            .any(|d| d.caller_reference == spec.caller_reference)
        {
            return Err(ProviderError::coded(
                OP,
                codes::DISTRIBUTION_ALREADY_EXISTS,
                spec.caller_reference.clone(),
            ));
        }

        let association_ok: bool = state.functions.values().any(|f| {
            let readable: bool = f.permissions.iter().any(|p| p.principal.starts_with("replicator."));
            readable
                && f.versions
                    .iter()
                    .any(|v| format!("{}:{v}", f.info.arn) == spec.function_version_arn)
        });
        if !association_ok {
            return Err(ProviderError::coded(
                OP,
                codes::INVALID_LAMBDA_FUNCTION_ASSOCIATION,
                format!("The function ARN must reference a published version: {}", spec.function_version_arn),
            ));
        }

        state.next_id += 1;
        let id: String = format!("E{}FAKE", state.next_id);
        let summary = DistributionSummary {
            id: id.clone(),
            arn: format!("arn:aws:cloudfront::{ACCOUNT}:distribution/{id}"),
            domain: format!("{}.cloudfront.test", id.to_lowercase()),
        };
        state.distributions.push(FakeDistribution {
            summary: summary.clone(),
            caller_reference: spec.caller_reference.clone(),
            tags: spec.tags.clone(),
            config: FakeDistributionConfig {
                enabled: true,
                comment: spec.comment.clone(),
                function_arns: vec![spec.function_version_arn.clone()],
            },
            etag: 1,
            deployed: false,
            replicas: Vec::new(),
        });
        Ok(summary)
    }

    async fn get_distribution_config(
        &self,
        id: &str,
    ) -> Result<Versioned<Self::Config>, ProviderError> {
        let mut state = self.enter("GetDistributionConfig")?;
        let distribution = state.distribution(id)?;
        Ok(Versioned {
            etag: distribution.etag(),
            config: distribution.config.clone(),
        })
    }

    async fn update_distribution(
        &self,
        id: &str,
        etag: &str,
        config: Self::Config,
    ) -> Result<String, ProviderError> {
        let mut state = self.enter("UpdateDistribution")?;
        let distribution = state.distribution(id)?;
        if distribution.etag() != etag {
            return Err(ProviderError::coded(
                "UpdateDistribution",
                codes::PRECONDITION_FAILED,
                "The If-Match version is missing or not valid for the resource.",
            ));
        }
        let released: Vec<String> = distribution
            .config
            .function_arns
            .iter()
            .filter(|arn| !config.function_arns.contains(arn))
            .cloned()
            .collect();
        distribution.replicas.extend(released);
        distribution.config = config;
        distribution.etag += 1;
        distribution.deployed = false;
        Ok(distribution.etag())
    }

    async fn delete_distribution(&self, id: &str, etag: &str) -> Result<(), ProviderError> {
        let mut state = self.enter("DeleteDistribution")?;
        let distribution = state.distribution(id)?;
        if distribution.etag() != etag {
            return Err(ProviderError::coded(
                "DeleteDistribution",
                codes::PRECONDITION_FAILED,
                "The If-Match version is missing or not valid for the resource.",
            ));
        }
        if distribution.config.enabled || !distribution.deployed {
            return Err(ProviderError::coded(
                "DeleteDistribution",
                DISTRIBUTION_NOT_DISABLED,
                "The distribution you are trying to delete has not been disabled.",
            ));
        }
        state.distributions.retain(|d| d.summary.id != id);
        Ok(())
    }

    async fn wait_deployed(&self, id: &str, _max_wait: Duration) -> Result<(), ProviderError> {
        let mut state = self.enter("WaitDistributionDeployed")?;
        let distribution = state.distribution(id)?;
        distribution.deployed = true;
        distribution.replicas.clear();
        Ok(())
    }
}

//! # Distribution
//!
//! Creates the CloudFront distribution in front of the edge function and tears
//! it down again. Teardown is a strict sequence: unbind and disable under the
//! current etag, wait for the change to deploy, then delete under the new etag.
//! The provider rejects a delete that skips any of those steps.

use std::time::Duration;

use cdn_proxy_common::config::Config;
use cdn_proxy_common::deployment::{DistributionState, ResourceNames, deployment_tags};
use cdn_proxy_common::error::{CdnProxyError, ProviderError, codes};
use cdn_proxy_common::progress::ProgressSink;
use tracing::{debug, info};
use uuid::Uuid;

use crate::provider::{
    CdnApi, DistributionSpec, DistributionSummary, EditableConfig, OriginRequestPolicySpec,
    OriginRequestPolicySummary, Versioned,
};
use crate::retry::{RetryError, retry_on};

/// Managed "CachingDisabled" policy. Every proxied request reaches the edge
/// function.
pub const CACHE_POLICY_ID: &str = "4135ea2d-6df8-44a3-9df3-4b5a84be39ad";
pub const FORWARDED_PROTO_HEADER: &str = "CloudFront-Forwarded-Proto";
const POLICY_COMMENT: &str = "Allow all w/ proto";
const POLICY_ALREADY_EXISTS: &str = "OriginRequestPolicyAlreadyExists";

pub struct DistributionManager<'a, C> {
    api: &'a C,
    cfg: &'a Config,
    names: ResourceNames,
}

impl<'a, C: CdnApi> DistributionManager<'a, C> {
    pub fn new(api: &'a C, cfg: &'a Config) -> Self {
        Self {
            api,
            cfg,
            names: ResourceNames::from(cfg),
        }
    }

    /// Creates a tagged distribution bound to `function_version_arn`. Returns
    /// as soon as the provider accepted it; see [`Self::await_propagation`].
    pub async fn ensure(
        &self,
        function_version_arn: &str,
        progress: &dyn ProgressSink,
    ) -> Result<DistributionSummary, CdnProxyError> {
        let policy: OriginRequestPolicySummary = self.origin_request_policy(progress).await?;

        let spec = DistributionSpec {
            caller_reference: Uuid::new_v4().to_string(),
            comment: format!("cdn-proxy ({})", self.cfg.deployment_name),
            placeholder_origin: self.cfg.placeholder_origin.clone(),
            function_version_arn: function_version_arn.to_string(),
            origin_request_policy_id: policy.id,
            cache_policy_id: CACHE_POLICY_ID.to_string(),
            tags: deployment_tags(self.cfg),
        };

        let mut state = DistributionState::Absent;
        advance(&mut state, DistributionState::Creating, "-");

        // Fresh function permissions take a moment to reach CloudFront.
        let result = retry_on(
            self.cfg.retry.distribution_create,
            &[codes::INVALID_LAMBDA_FUNCTION_ASSOCIATION],
            |attempt| progress.step(format!("Distribution -- Creating ({attempt})")),
            || self.api.create_distribution(&spec),
        )
        .await;

        let distribution: DistributionSummary = match result {
            Ok(distribution) => distribution,
            Err(RetryError::Fatal(e)) if e.is(codes::DISTRIBUTION_ALREADY_EXISTS) => {
                return Err(CdnProxyError::Conflict(format!(
                    "a distribution for request {} already exists ({})",
                    spec.caller_reference, e.message
                )));
            }
            Err(e) => return Err(e.into_error("Distribution")),
        };

        advance(&mut state, DistributionState::Created, &distribution.id);
        info!(distribution = %distribution.id, domain = %distribution.domain, "distribution created");
        progress.step(format!(
            "Distribution {} -- Created (but not propagated)",
            distribution.id
        ));
        Ok(distribution)
    }

    /// Blocks on the provider's own deployment waiter. This takes minutes.
    pub async fn await_propagation(
        &self,
        id: &str,
        progress: &dyn ProgressSink,
    ) -> Result<(), CdnProxyError> {
        progress.step("Distribution -- Waiting for propagation (this may take a while)".to_string());
        self.wait(id).await?;
        progress.step(format!("Distribution {id} -- Propagated"));
        Ok(())
    }

    pub async fn disable_and_delete(
        &self,
        id: &str,
        progress: &dyn ProgressSink,
    ) -> Result<(), CdnProxyError> {
        let mut state = DistributionState::Propagated;

        progress.step(format!("Distribution {id} -- Disabling"));
        let Versioned { etag, mut config } = match self.api.get_distribution_config(id).await {
            Ok(versioned) => versioned,
            Err(e) if e.is_not_found() => {
                progress.warning(format!("Distribution {id} -- Already deleted"));
                return Ok(());
            }
            Err(e) => return Err(self.fail(id, e)),
        };

        // A previous run may have got this far already.
        if config.is_enabled() || !config.function_arns().is_empty() {
            config.unbind_functions().map_err(|e| self.fail(id, e))?;
            config.disable();
            self.api
                .update_distribution(id, &etag, config)
                .await
                .map_err(|e| self.token_error(id, e))?;
        }
        advance(&mut state, DistributionState::Disabling, id);

        progress.step(format!("Distribution {id} -- Waiting for the disable to propagate"));
        self.wait(id).await?;
        advance(&mut state, DistributionState::Disabled, id);

        progress.step(format!("Distribution {id} -- Deleting"));
        let etag: String = self
            .api
            .get_distribution_config(id)
            .await
            .map_err(|e| self.fail(id, e))?
            .etag;
        self.api
            .delete_distribution(id, &etag)
            .await
            .map_err(|e| self.token_error(id, e))?;
        advance(&mut state, DistributionState::Deleted, id);

        progress.step(format!("Distribution {id} -- Deleted"));
        Ok(())
    }

    async fn origin_request_policy(
        &self,
        progress: &dyn ProgressSink,
    ) -> Result<OriginRequestPolicySummary, CdnProxyError> {
        let name: &str = &self.names.origin_request_policy;
        if let Some(policy) = self.find_policy(name).await? {
            debug!(policy = %policy.id, "reusing origin request policy");
            return Ok(policy);
        }

        progress.step("Distribution -- Creating origin request policy".to_string());
        let spec = OriginRequestPolicySpec {
            name: name.to_string(),
            comment: POLICY_COMMENT.to_string(),
            cdn_headers: vec![FORWARDED_PROTO_HEADER.to_string()],
        };
        match self.api.create_origin_request_policy(&spec).await {
            Ok(policy) => Ok(policy),
            Err(e) if e.is(POLICY_ALREADY_EXISTS) => self
                .find_policy(name)
                .await?
                .ok_or_else(|| self.fail(name, e)),
            Err(e) => Err(self.fail(name, e)),
        }
    }

    async fn find_policy(
        &self,
        name: &str,
    ) -> Result<Option<OriginRequestPolicySummary>, CdnProxyError> {
        let policies = self
            .api
            .list_origin_request_policies()
            .await
            .map_err(|e| self.fail(name, e))?;
        Ok(policies.into_iter().find(|p| p.name == name))
    }

    async fn wait(&self, id: &str) -> Result<(), CdnProxyError> {
        let ceiling: Duration = self.cfg.propagation_timeout;
        self.api
            .wait_deployed(id, ceiling)
            .await
            .map_err(|e| self.fail(id, e))
    }

    fn token_error(&self, id: &str, source: ProviderError) -> CdnProxyError {
        if source.is_any(&[codes::PRECONDITION_FAILED, codes::INVALID_IF_MATCH_VERSION]) {
            CdnProxyError::StaleConsistencyToken {
                resource: format!("Distribution {id}"),
                source,
            }
        } else {
            self.fail(id, source)
        }
    }

    fn fail(&self, resource: &str, source: ProviderError) -> CdnProxyError {
        CdnProxyError::provider(format!("Distribution {resource}"), source)
    }
}

fn advance(state: &mut DistributionState, next: DistributionState, id: &str) {
    if state.can_advance_to(next) {
        debug!(distribution = id, from = ?*state, to = ?next, "distribution state");
        *state = next;
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use cdn_proxy_common::config::RetrySettings;
    use cdn_proxy_common::deployment::TAG_TARGET;
    use cdn_proxy_common::progress::{Recorder, Silent};

    use super::*;
    use crate::function::EdgeFunctionManager;
    use crate::identity::ExecutionIdentityManager;
    use crate::testing::FakeProvider;

    fn config() -> Config {
        Config {
            retry: RetrySettings::immediate(4),
            ..Config::default()
        }
    }

    async fn published(fake: &FakeProvider, cfg: &Config) -> String {
        let role = ExecutionIdentityManager::new(fake, ResourceNames::from(cfg))
            .ensure(&Silent)
            .await
            .unwrap();
        EdgeFunctionManager::new(fake, cfg)
            .ensure(&role.arn, &Silent)
            .await
            .unwrap()
            .arn
    }

    #[tokio::test]
    async fn creates_a_tagged_distribution_bound_to_the_version() {
        let fake = FakeProvider::new();
        let cfg = config();
        let version_arn = published(&fake, &cfg).await;

        let distribution = DistributionManager::new(&fake, &cfg)
            .ensure(&version_arn, &Silent)
            .await
            .unwrap();

        let tags = fake.distribution_tags(&distribution.id).unwrap();
        assert_eq!(tags.get(TAG_TARGET).map(String::as_str), Some("example.com"));
        let bound = fake.distribution_config(&distribution.id).unwrap().function_arns;
        assert_eq!(bound, vec![version_arn]);
    }

    #[tokio::test]
    async fn origin_request_policy_is_created_once() {
        let fake = FakeProvider::new();
        let cfg = config();
        let version_arn = published(&fake, &cfg).await;
        let manager = DistributionManager::new(&fake, &cfg);

        manager.ensure(&version_arn, &Silent).await.unwrap();
        manager.ensure(&version_arn, &Silent).await.unwrap();

        assert_eq!(fake.count("CreateOriginRequestPolicy"), 1);
        assert_eq!(fake.origin_request_policies().len(), 1);
    }

    #[tokio::test]
    async fn association_errors_are_retried() {
        let fake = FakeProvider::new();
        let cfg = config();
        let version_arn = published(&fake, &cfg).await;
        fake.fail("CreateDistributionWithTags", codes::INVALID_LAMBDA_FUNCTION_ASSOCIATION, 3);
        let progress = Recorder::new();

        DistributionManager::new(&fake, &cfg)
            .ensure(&version_arn, &progress)
            .await
            .unwrap();

        assert_eq!(fake.count("CreateDistributionWithTags"), 4);
        let messages: Vec<String> = progress.events().iter().map(|e| e.message().to_string()).collect();
        assert!(messages.contains(&"Distribution -- Creating (4)".to_string()));
    }

    #[tokio::test]
    async fn already_exists_is_a_conflict_and_not_retried() {
        let fake = FakeProvider::new();
        let cfg = config();
        let version_arn = published(&fake, &cfg).await;
        fake.fail("CreateDistributionWithTags", codes::DISTRIBUTION_ALREADY_EXISTS, 1);

        let err = DistributionManager::new(&fake, &cfg)
            .ensure(&version_arn, &Silent)
            .await
            .unwrap_err();

        assert!(matches!(err, CdnProxyError::Conflict(_)));
        assert_eq!(fake.count("CreateDistributionWithTags"), 1);
    }

    #[tokio::test]
    async fn delete_follows_the_four_step_sequence() {
        let fake = FakeProvider::new();
        let cfg = config();
        let version_arn = published(&fake, &cfg).await;
        let manager = DistributionManager::new(&fake, &cfg);
        let distribution = manager.ensure(&version_arn, &Silent).await.unwrap();
        manager.await_propagation(&distribution.id, &Silent).await.unwrap();
        fake.clear_calls();

        manager.disable_and_delete(&distribution.id, &Silent).await.unwrap();

        assert_eq!(
            fake.calls(),
            vec![
                "GetDistributionConfig",
                "UpdateDistribution",
                "WaitDistributionDeployed",
                "GetDistributionConfig",
                "DeleteDistribution",
            ]
        );
        assert!(fake.distribution_ids().is_empty());
    }

    #[tokio::test]
    async fn stale_etag_is_surfaced() {
        let fake = FakeProvider::new();
        let cfg = config();
        fake.add_distribution("E1PROXY", Default::default(), &[]);
        fake.fail("UpdateDistribution", codes::PRECONDITION_FAILED, 1);

        let err = DistributionManager::new(&fake, &cfg)
            .disable_and_delete("E1PROXY", &Silent)
            .await
            .unwrap_err();

        assert!(matches!(err, CdnProxyError::StaleConsistencyToken { .. }));
        assert_eq!(fake.count("DeleteDistribution"), 0);
    }

    #[tokio::test]
    async fn deleting_a_missing_distribution_warns() {
        let fake = FakeProvider::new();
        let cfg = config();
        let progress = Recorder::new();

        DistributionManager::new(&fake, &cfg)
            .disable_and_delete("E404", &progress)
            .await
            .unwrap();
        assert_eq!(progress.warnings(), vec!["Distribution E404 -- Already deleted"]);
    }
}

//! # Orchestrator
//!
//! Sequences the three managers. Stages run strictly one after another and the
//! first failure aborts the rest. Nothing is rolled back: every stage is
//! idempotent, so re-running `create` or `delete` finishes a partial run.

use cdn_proxy_common::config::Config;
use cdn_proxy_common::deployment::{DeploymentRecord, ResourceNames, deployment_tags};
use cdn_proxy_common::error::{CdnProxyError, codes};
use cdn_proxy_common::network::target::is_hostname;
use cdn_proxy_common::progress::ProgressSink;
use tracing::info;

use crate::distribution::DistributionManager;
use crate::function::EdgeFunctionManager;
use crate::identity::ExecutionIdentityManager;
use crate::provider::{FunctionApi, Provider, PublishedVersion};
use crate::state::StateProbe;

pub struct Orchestrator<'a, P> {
    provider: &'a P,
    cfg: &'a Config,
}

impl<'a, P: Provider> Orchestrator<'a, P> {
    pub fn new(provider: &'a P, cfg: &'a Config) -> Self {
        Self { provider, cfg }
    }

    fn probe(&self) -> StateProbe<'a, P> {
        StateProbe::new(self.provider)
    }

    fn identity(&self) -> ExecutionIdentityManager<'a, P> {
        ExecutionIdentityManager::new(self.provider, ResourceNames::from(self.cfg))
    }

    fn function(&self) -> EdgeFunctionManager<'a, P> {
        EdgeFunctionManager::new(self.provider, self.cfg)
    }

    fn distribution(&self) -> DistributionManager<'a, P> {
        DistributionManager::new(self.provider, self.cfg)
    }

    /// Identity, function, distribution, then the propagation wait. Refuses to
    /// run while a tagged distribution exists.
    pub async fn create(
        &self,
        progress: &dyn ProgressSink,
    ) -> Result<DeploymentRecord, CdnProxyError> {
        if !is_hostname(&self.cfg.placeholder_origin) {
            return Err(CdnProxyError::Validation(format!(
                "target must be a hostname: {}",
                self.cfg.placeholder_origin
            )));
        }

        if let Some(existing) = self.probe().find().await? {
            return Err(CdnProxyError::Conflict(format!(
                "a deployment already exists at {} ({}), delete it first",
                existing.domain, existing.distribution_id
            )));
        }

        let role = self.identity().ensure(progress).await?;
        let version: PublishedVersion = self.function().ensure(&role.arn, progress).await?;

        let distribution = self.distribution();
        let created = distribution.ensure(&version.arn, progress).await?;
        distribution.await_propagation(&created.id, progress).await?;

        let record = DeploymentRecord::from_tags(&created.id, &created.domain, &deployment_tags(self.cfg))
            .ok_or_else(|| CdnProxyError::Validation("deployment tags are incomplete".to_string()))?;
        info!(distribution = %record.distribution_id, domain = %record.domain, "deployment ready");
        Ok(record)
    }

    /// Pushes the current rewriter and settings as a new function version. The
    /// distribution is left alone.
    pub async fn update(
        &self,
        progress: &dyn ProgressSink,
    ) -> Result<PublishedVersion, CdnProxyError> {
        let role = self.identity().ensure(progress).await?;
        self.function().ensure(&role.arn, progress).await
    }

    /// Distribution, then function, then identity. The order matters: the
    /// provider refuses to delete a function a distribution still uses.
    pub async fn delete(&self, progress: &dyn ProgressSink) -> Result<(), CdnProxyError> {
        match self.probe().find().await? {
            Some(record) => {
                self.distribution()
                    .disable_and_delete(&record.distribution_id, progress)
                    .await?;
            }
            None => progress.warning("Distribution -- Nothing to delete".to_string()),
        }

        self.ensure_function_unused().await?;
        self.function().remove(progress).await?;
        self.identity().remove(progress).await?;
        Ok(())
    }

    pub async fn status(&self) -> Result<Option<DeploymentRecord>, CdnProxyError> {
        self.probe().find().await
    }

    pub async fn list(&self) -> Result<Vec<DeploymentRecord>, CdnProxyError> {
        self.probe().list().await
    }

    async fn ensure_function_unused(&self) -> Result<(), CdnProxyError> {
        let name: String = ResourceNames::from(self.cfg).function;
        let function = match self.provider.get_function(&name).await {
            Ok(function) => function,
            Err(e) if e.is(codes::RESOURCE_NOT_FOUND) => return Ok(()),
            Err(e) => return Err(CdnProxyError::provider(format!("Lambda function {name}"), e)),
        };

        match self.probe().function_user(&function.arn).await? {
            Some(distribution) => Err(CdnProxyError::Conflict(format!(
                "Lambda function {name} is still used by distribution {distribution}"
            ))),
            None => Ok(()),
        }
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

//! # Edge function
//!
//! Packages, creates or updates, and publishes the edge function. The CDN can
//! only bind an immutable published version, so [`EdgeFunctionManager::ensure`]
//! always ends with a publish and never hands out `$LATEST`.

use cdn_proxy_common::config::{Config, RetrySettings};
use cdn_proxy_common::deployment::ResourceNames;
use cdn_proxy_common::error::{CdnProxyError, ProviderError, codes};
use cdn_proxy_common::progress::ProgressSink;
use cdn_proxy_common::trim;
use cdn_proxy_edge::{PACKAGE_ENTRY_POINT, RewriteSettings};
use tracing::{debug, info};

use crate::provider::{FunctionApi, FunctionSpec, PermissionGrant, PublishedVersion};
use crate::retry::{RetryError, retry_on};

pub mod package;

pub const RUNTIME: &str = "nodejs20.x";
/// Lambda@Edge origin-request ceiling.
pub const TIMEOUT_SECS: i32 = 30;
pub const MEMORY_MB: i32 = 128;

/// Lets the edge replicator copy the function to every region.
fn replicator_grant() -> PermissionGrant {
    PermissionGrant {
        statement_id: "replicator".to_string(),
        principal: "replicator.lambda.amazonaws.com".to_string(),
        action: "lambda:GetFunction".to_string(),
    }
}

pub struct EdgeFunctionManager<'a, F> {
    api: &'a F,
    names: ResourceNames,
    settings: RewriteSettings,
    retry: RetrySettings,
}

impl<'a, F: FunctionApi> EdgeFunctionManager<'a, F> {
    pub fn new(api: &'a F, cfg: &Config) -> Self {
        Self {
            api,
            names: ResourceNames::from(cfg),
            settings: RewriteSettings {
                x_forwarded_for: cfg.x_forwarded_for,
            },
            retry: cfg.retry,
        }
    }

    /// Creates the function bound to `role_arn`, or replaces the code of the
    /// existing one, then publishes a new version.
    pub async fn ensure(
        &self,
        role_arn: &str,
        progress: &dyn ProgressSink,
    ) -> Result<PublishedVersion, CdnProxyError> {
        let name: &str = &self.names.function;
        let label: String = trim(name, 15);
        let package: Vec<u8> = package::build(&self.settings)?;

        match self.api.get_function(name).await {
            Ok(_) => {
                progress.step(format!("Lambda {label} -- Updating code"));
                self.api
                    .update_function_code(name, &package)
                    .await
                    .map_err(|e| self.fail(e))?;
            }
            Err(e) if e.is(codes::RESOURCE_NOT_FOUND) => {
                self.create(role_arn, package, &label, progress).await?;
            }
            Err(e) => return Err(self.fail(e)),
        }

        progress.step(format!("Lambda {label} -- Waiting for function to settle"));
        self.api.wait_ready(name).await.map_err(|e| self.fail(e))?;

        // Also on the update path, so a create that died before this point is
        // completed by the next run.
        self.grant_replicator(&label, progress).await?;

        progress.step(format!("Lambda {label} -- Publishing version"));
        let version: PublishedVersion =
            self.api.publish_version(name).await.map_err(|e| self.fail(e))?;
        if version.is_latest() {
            return Err(self.fail(ProviderError::new(
                "PublishVersion",
                None,
                "provider returned the unpinned $LATEST alias",
            )));
        }

        info!(function = name, version = %version.version, "edge function published");
        progress.step(format!("Lambda {label} -- Published version {}", version.version));
        Ok(version)
    }

    /// Lambda answers `ResourceConflict` both for a statement that already
    /// exists and for a function busy with another update. Only the first
    /// counts as granted; the second is retried once the function settles.
    async fn grant_replicator(
        &self,
        label: &str,
        progress: &dyn ProgressSink,
    ) -> Result<(), CdnProxyError> {
        let api: &F = self.api;
        let name: &str = &self.names.function;
        let grant: &PermissionGrant = &replicator_grant();

        retry_on(
            self.retry.function_create,
            &[codes::RESOURCE_CONFLICT],
            |attempt| {
                if attempt > 1 {
                    progress.step(format!("Lambda {label} -- Granting replication ({attempt})"));
                }
            },
            move || async move {
                let err: ProviderError = match api.add_permission(name, grant).await {
                    Err(e) if e.is(codes::RESOURCE_CONFLICT) => e,
                    other => return other,
                };
                if api.permission_ids(name).await?.contains(&grant.statement_id) {
                    return Ok(());
                }
                api.wait_ready(name).await?;
                Err(err)
            },
        )
        .await
        .map_err(|e| e.into_error(self.resource()))
    }

    async fn create(
        &self,
        role_arn: &str,
        package: Vec<u8>,
        label: &str,
        progress: &dyn ProgressSink,
    ) -> Result<(), CdnProxyError> {
        let spec = FunctionSpec {
            name: self.names.function.clone(),
            role_arn: role_arn.to_string(),
            runtime: RUNTIME.to_string(),
            handler: PACKAGE_ENTRY_POINT.to_string(),
            description: "Rewrites the origin of every proxied request".to_string(),
            timeout_secs: TIMEOUT_SECS,
            memory_mb: MEMORY_MB,
            package,
        };

        // A fresh role is not assumable for a few seconds.
        retry_on(
            self.retry.function_create,
            &[codes::INVALID_PARAMETER_VALUE],
            |attempt| progress.step(format!("Lambda {label} -- Creating function ({attempt})")),
            || self.api.create_function(&spec),
        )
        .await
        .map_err(|e| e.into_error(self.resource()))?;

        debug!(function = %spec.name, "edge function created");
        Ok(())
    }

    /// Published versions, without `$LATEST`.
    pub async fn versions(&self) -> Result<Vec<PublishedVersion>, CdnProxyError> {
        let versions = self
            .api
            .list_versions(&self.names.function)
            .await
            .map_err(|e| self.fail(e))?;
        Ok(versions.into_iter().filter(|v| !v.is_latest()).collect())
    }

    /// Deletes every published version, then the function. Anything already
    /// gone is reported as a warning.
    pub async fn remove(&self, progress: &dyn ProgressSink) -> Result<(), CdnProxyError> {
        let name: &str = &self.names.function;
        let label: String = trim(name, 15);

        let versions: Vec<PublishedVersion> = match self.versions().await {
            Ok(versions) => versions,
            Err(CdnProxyError::Provider { source, .. }) if source.is_not_found() => {
                progress.warning(format!("Lambda {label} -- Already deleted"));
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        for version in &versions {
            progress.step(format!("Lambda {label} -- Deleting version {}", version.version));
            let deleted: bool = self.delete(Some(&version.version), &label, progress).await?;
            if !deleted {
                progress.warning(format!(
                    "Lambda {label} -- Version {} already deleted",
                    version.version
                ));
            }
        }

        progress.step(format!("Lambda {label} -- Deleting function"));
        if self.delete(None, &label, progress).await? {
            progress.step(format!("Lambda {label} -- Deleted"));
        } else {
            progress.warning(format!("Lambda {label} -- Already deleted"));
        }
        Ok(())
    }

    /// `Ok(false)` when the target was already gone.
    async fn delete(
        &self,
        qualifier: Option<&str>,
        label: &str,
        progress: &dyn ProgressSink,
    ) -> Result<bool, CdnProxyError> {
        // Replicas linger for a while after the distribution let go.
        let result = retry_on(
            self.retry.function_delete,
            &[codes::INVALID_PARAMETER_VALUE],
            |attempt| {
                if attempt > 1 {
                    progress.step(format!(
                        "Lambda {label} -- Waiting for replicas to be removed ({attempt})"
                    ));
                }
            },
            || self.api.delete_function(&self.names.function, qualifier),
        )
        .await;

        match result {
            Ok(()) => Ok(true),
            Err(RetryError::Fatal(e)) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into_error(self.resource())),
        }
    }

    fn resource(&self) -> String {
        format!("Lambda function {}", self.names.function)
    }

    fn fail(&self, source: ProviderError) -> CdnProxyError {
        CdnProxyError::provider(self.resource(), source)
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

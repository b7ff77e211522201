//! # StateProbe
//!
//! Answers "does a deployment exist" from the CDN's tag store. Nothing is kept
//! locally: every call lists the distributions and reads their tags.

use async_trait::async_trait;
use cdn_proxy_common::deployment::DeploymentRecord;
use cdn_proxy_common::error::CdnProxyError;
use tracing::debug;

use crate::provider::{CdnApi, EditableConfig};

/// Anything that can locate the live deployment. The scanner only needs this.
#[async_trait]
pub trait DeploymentLocator: Send + Sync {
    async fn find(&self) -> Result<Option<DeploymentRecord>, CdnProxyError>;
}

pub struct StateProbe<'a, C> {
    cdn: &'a C,
}

impl<'a, C: CdnApi> StateProbe<'a, C> {
    pub fn new(cdn: &'a C) -> Self {
        Self { cdn }
    }

    /// Every distribution carrying the deployment marker tag.
    pub async fn list(&self) -> Result<Vec<DeploymentRecord>, CdnProxyError> {
        let distributions = self
            .cdn
            .list_distributions()
            .await
            .map_err(|e| CdnProxyError::provider("distributions", e))?;

        let mut records: Vec<DeploymentRecord> = Vec::new();
        for distribution in distributions {
            let tags = match self.cdn.list_tags(&distribution.arn).await {
                Ok(tags) => tags,
                // Deleted between the list and the tag read.
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(CdnProxyError::provider(distribution.id.clone(), e)),
            };

            if let Some(record) =
                DeploymentRecord::from_tags(&distribution.id, &distribution.domain, &tags)
            {
                debug!(distribution = %record.distribution_id, "found tagged distribution");
                records.push(record);
            }
        }

        Ok(records)
    }

    /// The first tagged distribution. Absence is `Ok(None)`, not an error.
    pub async fn find(&self) -> Result<Option<DeploymentRecord>, CdnProxyError> {
        Ok(self.list().await?.into_iter().next())
    }

    /// Id of a tagged distribution still bound to any version of the function
    /// `function_arn` (unqualified).
    pub async fn function_user(&self, function_arn: &str) -> Result<Option<String>, CdnProxyError> {
        let version_prefix: String = format!("{function_arn}:");

        for record in self.list().await? {
            let versioned = match self.cdn.get_distribution_config(&record.distribution_id).await {
                Ok(versioned) => versioned,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(CdnProxyError::provider(record.distribution_id.clone(), e)),
            };

            let bound: bool = versioned
                .config
                .function_arns()
                .iter()
                .any(|arn| arn == function_arn || arn.starts_with(&version_prefix));
            if bound {
                return Ok(Some(record.distribution_id));
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl<'a, C: CdnApi> DeploymentLocator for StateProbe<'a, C> {
    async fn find(&self) -> Result<Option<DeploymentRecord>, CdnProxyError> {
        StateProbe::find(self).await
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

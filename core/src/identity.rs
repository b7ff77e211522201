//! # Execution identity
//!
//! The role the edge function runs as. It may be assumed by the Lambda and
//! Lambda@Edge services and can do nothing but write to the function's own log
//! groups.

use cdn_proxy_common::deployment::ResourceNames;
use cdn_proxy_common::error::{CdnProxyError, ProviderError, codes};
use cdn_proxy_common::progress::ProgressSink;
use cdn_proxy_common::trim;
use serde_json::json;
use tracing::debug;

use crate::provider::{IdentityApi, Role};

const ROLE_DESCRIPTION: &str = "Execution role for the cdn-proxy edge function";

pub struct ExecutionIdentityManager<'a, I> {
    api: &'a I,
    names: ResourceNames,
}

impl<'a, I: IdentityApi> ExecutionIdentityManager<'a, I> {
    pub fn new(api: &'a I, names: ResourceNames) -> Self {
        Self { api, names }
    }

    /// Returns the existing role untouched, or creates it with its inline
    /// logging policy.
    pub async fn ensure(&self, progress: &dyn ProgressSink) -> Result<Role, CdnProxyError> {
        let name: &str = &self.names.role;
        let label: String = trim(name, 15);

        match self.api.get_role(name).await {
            Ok(role) => {
                progress.step(format!("IAM Role {label} -- Already exists"));
                return Ok(role);
            }
            Err(e) if e.is(codes::NO_SUCH_ENTITY) => {}
            Err(e) => return Err(self.fail(e)),
        }

        progress.step(format!("IAM Role {label} -- Creating"));
        let role: Role = match self
            .api
            .create_role(name, &trust_policy(), ROLE_DESCRIPTION)
            .await
        {
            Ok(role) => role,
            // Lost a race with a concurrent create. Take what is there.
            Err(e) if e.is(codes::ENTITY_ALREADY_EXISTS) => {
                self.api.get_role(name).await.map_err(|e| self.fail(e))?
            }
            Err(e) => return Err(self.fail(e)),
        };

        progress.step(format!("IAM Role {label} -- Attaching policy"));
        self.api
            .put_role_policy(name, &self.names.role_policy, &log_policy(&self.names.function))
            .await
            .map_err(|e| self.fail(e))?;

        debug!(role = %role.arn, "execution role created");
        progress.step(format!("IAM Role {label} -- Created"));
        Ok(role)
    }

    /// Deletes the inline policy, then the role. Either being gone already is
    /// fine.
    pub async fn remove(&self, progress: &dyn ProgressSink) -> Result<(), CdnProxyError> {
        let name: &str = &self.names.role;
        let label: String = trim(name, 15);

        progress.step(format!("IAM Role {label} -- Deleting policy"));
        match self.api.delete_role_policy(name, &self.names.role_policy).await {
            Ok(()) => {}
            Err(e) if e.is(codes::NO_SUCH_ENTITY) => {
                progress.warning(format!("IAM Role {label} -- Policy already deleted"));
            }
            Err(e) => return Err(self.fail(e)),
        }

        progress.step(format!("IAM Role {label} -- Deleting"));
        match self.api.delete_role(name).await {
            Ok(()) => progress.step(format!("IAM Role {label} -- Deleted")),
            Err(e) if e.is(codes::NO_SUCH_ENTITY) => {
                progress.warning(format!("IAM Role {label} -- Already deleted"));
            }
            Err(e) => return Err(self.fail(e)),
        }

        Ok(())
    }

    fn fail(&self, source: ProviderError) -> CdnProxyError {
        CdnProxyError::provider(format!("IAM role {}", self.names.role), source)
    }
}

fn trust_policy() -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": {
                "Service": ["edgelambda.amazonaws.com", "lambda.amazonaws.com"]
            },
            "Action": "sts:AssumeRole"
        }]
    })
    .to_string()
}

/// Lambda@Edge writes to `/aws/lambda/us-east-1.<name>` in whichever region
/// served the request.
fn log_policy(function: &str) -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": [
                "logs:CreateLogGroup",
                "logs:CreateLogStream",
                "logs:PutLogEvents"
            ],
            "Resource": [
                format!("arn:aws:logs:*:*:log-group:/aws/lambda/{function}:*"),
                format!("arn:aws:logs:*:*:log-group:/aws/lambda/*.{function}:*")
            ]
        }]
    })
    .to_string()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

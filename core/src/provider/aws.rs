//! # AWS adapter
//!
//! Implements the provider ports with IAM, Lambda and CloudFront. Lambda@Edge
//! functions and CloudFront are only managed from `us-east-1`, so those two
//! clients are pinned there whatever region the caller configured.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_cloudfront::client::Waiters as _;
use aws_sdk_cloudfront::types as cf;
use aws_sdk_lambda::client::Waiters as _;
use aws_sdk_lambda::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{FunctionCode, PackageType, Runtime};
use cdn_proxy_common::config::{Config, EDGE_REGION};
use cdn_proxy_common::error::{ProviderError, codes};
use tracing::debug;

use super::{
    CdnApi, DistributionSpec, DistributionSummary, EditableConfig, FunctionApi, FunctionInfo,
    FunctionSpec, IdentityApi, OriginRequestPolicySpec, OriginRequestPolicySummary,
    PermissionGrant, PublishedVersion, Role, Versioned,
};

/// Id of the single origin in every distribution we create.
const ORIGIN_ID: &str = "default";
const ALLOWED_METHODS: [&str; 7] = ["GET", "HEAD", "POST", "PUT", "PATCH", "OPTIONS", "DELETE"];
/// Wide on purpose: scanned origins are frequently old.
const ORIGIN_SSL_PROTOCOLS: [&str; 4] = ["SSLv3", "TLSv1", "TLSv1.1", "TLSv1.2"];
/// Ceiling for Lambda's own state waiters. Settling takes seconds.
const FUNCTION_SETTLE_TIMEOUT: Duration = Duration::from_secs(300);

pub struct AwsProvider {
    iam: aws_sdk_iam::Client,
    lambda: aws_sdk_lambda::Client,
    cloudfront: aws_sdk_cloudfront::Client,
}

impl AwsProvider {
    /// Loads credentials through the default provider chain, honouring the
    /// configured profile.
    pub async fn connect(cfg: &Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()));
        if let Some(profile) = &cfg.profile {
            loader = loader.profile_name(profile);
        }
        let shared = loader.load().await;
        let edge_region = Region::new(EDGE_REGION);

        let lambda_conf = aws_sdk_lambda::config::Builder::from(&shared)
            .region(edge_region.clone())
            .build();
        let cloudfront_conf = aws_sdk_cloudfront::config::Builder::from(&shared)
            .region(edge_region)
            .build();

        debug!(region = %cfg.region, profile = ?cfg.profile, "aws clients ready");

        Self {
            iam: aws_sdk_iam::Client::new(&shared),
            lambda: aws_sdk_lambda::Client::from_conf(lambda_conf),
            cloudfront: aws_sdk_cloudfront::Client::from_conf(cloudfront_conf),
        }
    }
}

fn sdk_error<E>(operation: &'static str, err: E) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let message: String = match err.message() {
        Some(msg) => msg.to_string(),
        None => DisplayErrorContext(&err).to_string(),
    };
    ProviderError::new(operation, err.code(), message)
}

fn local_error(operation: &'static str, err: impl std::fmt::Display) -> ProviderError {
    ProviderError::new(operation, None, err.to_string())
}

fn missing(operation: &'static str, what: &str) -> ProviderError {
    ProviderError::new(operation, None, format!("response has no {what}"))
}

// ╭──────────────────────────────────────────╮
// │ IAM                                      │
// ╰──────────────────────────────────────────╯

fn to_role(operation: &'static str, role: Option<&aws_sdk_iam::types::Role>) -> Result<Role, ProviderError> {
    let role = role.ok_or_else(|| missing(operation, "role"))?;
    Ok(Role {
        name: role.role_name().to_string(),
        arn: role.arn().to_string(),
    })
}

#[async_trait]
impl IdentityApi for AwsProvider {
    async fn get_role(&self, name: &str) -> Result<Role, ProviderError> {
        let out = self
            .iam
            .get_role()
            .role_name(name)
            .send()
            .await
            .map_err(|e| sdk_error("GetRole", e))?;
        to_role("GetRole", out.role())
    }

    async fn create_role(
        &self,
        name: &str,
        trust_policy: &str,
        description: &str,
    ) -> Result<Role, ProviderError> {
        let out = self
            .iam
            .create_role()
            .role_name(name)
            .assume_role_policy_document(trust_policy)
            .description(description)
            .send()
            .await
            .map_err(|e| sdk_error("CreateRole", e))?;
        to_role("CreateRole", out.role())
    }

    async fn put_role_policy(
        &self,
        role: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<(), ProviderError> {
        self.iam
            .put_role_policy()
            .role_name(role)
            .policy_name(policy_name)
            .policy_document(document)
            .send()
            .await
            .map_err(|e| sdk_error("PutRolePolicy", e))?;
        Ok(())
    }

    async fn delete_role_policy(&self, role: &str, policy_name: &str) -> Result<(), ProviderError> {
        self.iam
            .delete_role_policy()
            .role_name(role)
            .policy_name(policy_name)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteRolePolicy", e))?;
        Ok(())
    }

    async fn delete_role(&self, name: &str) -> Result<(), ProviderError> {
        self.iam
            .delete_role()
            .role_name(name)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteRole", e))?;
        Ok(())
    }
}

// ╭──────────────────────────────────────────╮
// │ Lambda                                   │
// ╰──────────────────────────────────────────╯

fn to_function(
    operation: &'static str,
    name: Option<&str>,
    arn: Option<&str>,
) -> Result<FunctionInfo, ProviderError> {
    Ok(FunctionInfo {
        name: name.ok_or_else(|| missing(operation, "function name"))?.to_string(),
        arn: arn.ok_or_else(|| missing(operation, "function arn"))?.to_string(),
    })
}

#[async_trait]
impl FunctionApi for AwsProvider {
    async fn get_function(&self, name: &str) -> Result<FunctionInfo, ProviderError> {
        let out = self
            .lambda
            .get_function()
            .function_name(name)
            .send()
            .await
            .map_err(|e| sdk_error("GetFunction", e))?;
        let conf = out
            .configuration()
            .ok_or_else(|| missing("GetFunction", "configuration"))?;
        to_function("GetFunction", conf.function_name(), conf.function_arn())
    }

    async fn create_function(&self, spec: &FunctionSpec) -> Result<FunctionInfo, ProviderError> {
        let code = FunctionCode::builder()
            .zip_file(Blob::new(spec.package.clone()))
            .build();
        let out = self
            .lambda
            .create_function()
            .function_name(&spec.name)
            .runtime(Runtime::from(spec.runtime.as_str()))
            .role(&spec.role_arn)
            .handler(&spec.handler)
            .code(code)
            .description(&spec.description)
            .timeout(spec.timeout_secs)
            .memory_size(spec.memory_mb)
            .publish(false)
            .package_type(PackageType::from("Zip"))
            .send()
            .await
            .map_err(|e| sdk_error("CreateFunction", e))?;
        to_function("CreateFunction", out.function_name(), out.function_arn())
    }

    async fn update_function_code(
        &self,
        name: &str,
        package: &[u8],
    ) -> Result<FunctionInfo, ProviderError> {
        let out = self
            .lambda
            .update_function_code()
            .function_name(name)
            .zip_file(Blob::new(package.to_vec()))
            .publish(false)
            .send()
            .await
            .map_err(|e| sdk_error("UpdateFunctionCode", e))?;
        to_function("UpdateFunctionCode", out.function_name(), out.function_arn())
    }

    async fn add_permission(
        &self,
        function: &str,
        grant: &PermissionGrant,
    ) -> Result<(), ProviderError> {
        self.lambda
            .add_permission()
            .function_name(function)
            .statement_id(&grant.statement_id)
            .principal(&grant.principal)
            .action(&grant.action)
            .send()
            .await
            .map_err(|e| sdk_error("AddPermission", e))?;
        Ok(())
    }

    async fn permission_ids(&self, function: &str) -> Result<Vec<String>, ProviderError> {
        let sent = self
            .lambda
            .get_policy()
            .function_name(function)
            .send()
            .await
            .map_err(|e| sdk_error("GetPolicy", e));
        let out = match sent {
            Ok(out) => out,
            Err(e) if e.is(codes::RESOURCE_NOT_FOUND) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let Some(policy) = out.policy() else {
            return Ok(Vec::new());
        };
        let document: serde_json::Value =
            serde_json::from_str(policy).map_err(|e| local_error("GetPolicy", e))?;
        let ids = document["Statement"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|statement| statement["Sid"].as_str())
            .map(str::to_string)
            .collect();
        Ok(ids)
    }

    async fn wait_ready(&self, name: &str) -> Result<(), ProviderError> {
        self.lambda
            .wait_until_function_active_v2()
            .function_name(name)
            .wait(FUNCTION_SETTLE_TIMEOUT)
            .await
            .map_err(|e| local_error("WaitFunctionActive", DisplayErrorContext(&e)))?;
        self.lambda
            .wait_until_function_updated_v2()
            .function_name(name)
            .wait(FUNCTION_SETTLE_TIMEOUT)
            .await
            .map_err(|e| local_error("WaitFunctionUpdated", DisplayErrorContext(&e)))?;
        Ok(())
    }

    async fn publish_version(&self, name: &str) -> Result<PublishedVersion, ProviderError> {
        let out = self
            .lambda
            .publish_version()
            .function_name(name)
            .send()
            .await
            .map_err(|e| sdk_error("PublishVersion", e))?;
        Ok(PublishedVersion {
            version: out
                .version()
                .ok_or_else(|| missing("PublishVersion", "version"))?
                .to_string(),
            arn: out
                .function_arn()
                .ok_or_else(|| missing("PublishVersion", "function arn"))?
                .to_string(),
        })
    }

    async fn list_versions(&self, name: &str) -> Result<Vec<PublishedVersion>, ProviderError> {
        let mut versions: Vec<PublishedVersion> = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let out = self
                .lambda
                .list_versions_by_function()
                .function_name(name)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| sdk_error("ListVersionsByFunction", e))?;

            versions.extend(out.versions().iter().filter_map(|conf| {
                Some(PublishedVersion {
                    version: conf.version()?.to_string(),
                    arn: conf.function_arn()?.to_string(),
                })
            }));

            match out.next_marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(versions)
    }

    async fn delete_function(
        &self,
        name: &str,
        qualifier: Option<&str>,
    ) -> Result<(), ProviderError> {
        self.lambda
            .delete_function()
            .function_name(name)
            .set_qualifier(qualifier.map(str::to_string))
            .send()
            .await
            .map_err(|e| sdk_error("DeleteFunction", e))?;
        Ok(())
    }
}

// ╭──────────────────────────────────────────╮
// │ CloudFront                               │
// ╰──────────────────────────────────────────╯

impl EditableConfig for cf::DistributionConfig {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn function_arns(&self) -> Vec<String> {
        self.default_cache_behavior
            .as_ref()
            .and_then(|behavior| behavior.lambda_function_associations.as_ref())
            .and_then(|associations| associations.items.as_ref())
            .map(|items| {
                items
                    .iter()
                    .map(|association| association.lambda_function_arn.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn unbind_functions(&mut self) -> Result<(), ProviderError> {
        let empty = cf::LambdaFunctionAssociations::builder()
            .quantity(0)
            .build()
            .map_err(|e| local_error("UpdateDistribution", e))?;
        if let Some(behavior) = self.default_cache_behavior.as_mut() {
            behavior.lambda_function_associations = Some(empty);
        }
        Ok(())
    }
}

fn origin_request_policy_config(
    spec: &OriginRequestPolicySpec,
) -> Result<cf::OriginRequestPolicyConfig, ProviderError> {
    const OP: &str = "CreateOriginRequestPolicy";

    let headers = cf::Headers::builder()
        .quantity(spec.cdn_headers.len() as i32)
        .set_items(Some(spec.cdn_headers.clone()))
        .build()
        .map_err(|e| local_error(OP, e))?;
    let headers_config = cf::OriginRequestPolicyHeadersConfig::builder()
        .header_behavior(cf::OriginRequestPolicyHeaderBehavior::from(
            "allViewerAndWhitelistCloudFront",
        ))
        .headers(headers)
        .build()
        .map_err(|e| local_error(OP, e))?;
    let cookies_config = cf::OriginRequestPolicyCookiesConfig::builder()
        .cookie_behavior(cf::OriginRequestPolicyCookieBehavior::from("all"))
        .build()
        .map_err(|e| local_error(OP, e))?;
    let query_strings_config = cf::OriginRequestPolicyQueryStringsConfig::builder()
        .query_string_behavior(cf::OriginRequestPolicyQueryStringBehavior::from("all"))
        .build()
        .map_err(|e| local_error(OP, e))?;

    cf::OriginRequestPolicyConfig::builder()
        .name(&spec.name)
        .comment(&spec.comment)
        .headers_config(headers_config)
        .cookies_config(cookies_config)
        .query_strings_config(query_strings_config)
        .build()
        .map_err(|e| local_error(OP, e))
}

fn distribution_config(spec: &DistributionSpec) -> Result<cf::DistributionConfig, ProviderError> {
    const OP: &str = "CreateDistributionWithTags";

    let ssl_protocols = cf::OriginSslProtocols::builder()
        .quantity(ORIGIN_SSL_PROTOCOLS.len() as i32)
        .set_items(Some(
            ORIGIN_SSL_PROTOCOLS.iter().map(|p| cf::SslProtocol::from(*p)).collect(),
        ))
        .build()
        .map_err(|e| local_error(OP, e))?;
    let custom_origin = cf::CustomOriginConfig::builder()
        .http_port(80)
        .https_port(443)
        .origin_protocol_policy(cf::OriginProtocolPolicy::from("match-viewer"))
        .origin_ssl_protocols(ssl_protocols)
        .origin_read_timeout(30)
        .build()
        .map_err(|e| local_error(OP, e))?;
    let origin = cf::Origin::builder()
        .id(ORIGIN_ID)
        .domain_name(&spec.placeholder_origin)
        .custom_origin_config(custom_origin)
        .connection_attempts(1)
        .connection_timeout(10)
        .build()
        .map_err(|e| local_error(OP, e))?;
    let origins = cf::Origins::builder()
        .quantity(1)
        .items(origin)
        .build()
        .map_err(|e| local_error(OP, e))?;

    let cached_methods = cf::CachedMethods::builder()
        .quantity(2)
        .items(cf::Method::from("GET"))
        .items(cf::Method::from("HEAD"))
        .build()
        .map_err(|e| local_error(OP, e))?;
    let allowed_methods = cf::AllowedMethods::builder()
        .quantity(ALLOWED_METHODS.len() as i32)
        .set_items(Some(ALLOWED_METHODS.iter().map(|m| cf::Method::from(*m)).collect()))
        .cached_methods(cached_methods)
        .build()
        .map_err(|e| local_error(OP, e))?;

    let association = cf::LambdaFunctionAssociation::builder()
        .lambda_function_arn(&spec.function_version_arn)
        .event_type(cf::EventType::from("origin-request"))
        .include_body(false)
        .build()
        .map_err(|e| local_error(OP, e))?;
    let associations = cf::LambdaFunctionAssociations::builder()
        .quantity(1)
        .items(association)
        .build()
        .map_err(|e| local_error(OP, e))?;

    let default_cache_behavior = cf::DefaultCacheBehavior::builder()
        .target_origin_id(ORIGIN_ID)
        .viewer_protocol_policy(cf::ViewerProtocolPolicy::from("allow-all"))
        .allowed_methods(allowed_methods)
        .compress(false)
        .lambda_function_associations(associations)
        .cache_policy_id(&spec.cache_policy_id)
        .origin_request_policy_id(&spec.origin_request_policy_id)
        .build()
        .map_err(|e| local_error(OP, e))?;

    cf::DistributionConfig::builder()
        .caller_reference(&spec.caller_reference)
        .origins(origins)
        .default_cache_behavior(default_cache_behavior)
        .comment(&spec.comment)
        .price_class(cf::PriceClass::from("PriceClass_100"))
        .enabled(true)
        .http_version(cf::HttpVersion::from("http1.1"))
        .is_ipv6_enabled(false)
        .build()
        .map_err(|e| local_error(OP, e))
}

fn distribution_tags(tags: &BTreeMap<String, String>) -> Result<cf::Tags, ProviderError> {
    let items: Vec<cf::Tag> = tags
        .iter()
        .map(|(key, value)| cf::Tag::builder().key(key).value(value).build())
        .collect::<Result<_, _>>()
        .map_err(|e| local_error("CreateDistributionWithTags", e))?;
    Ok(cf::Tags::builder().set_items(Some(items)).build())
}

#[async_trait]
impl CdnApi for AwsProvider {
    type Config = cf::DistributionConfig;

    async fn list_distributions(&self) -> Result<Vec<DistributionSummary>, ProviderError> {
        let mut distributions: Vec<DistributionSummary> = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let out = self
                .cloudfront
                .list_distributions()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| sdk_error("ListDistributions", e))?;
            let Some(list) = out.distribution_list() else {
                break;
            };

            distributions.extend(list.items().iter().map(|summary| DistributionSummary {
                id: summary.id().to_string(),
                arn: summary.arn().to_string(),
                domain: summary.domain_name().to_string(),
            }));

            match list.next_marker() {
                Some(next) if list.is_truncated() && !next.is_empty() => {
                    marker = Some(next.to_string())
                }
                _ => break,
            }
        }

        Ok(distributions)
    }

    async fn list_tags(&self, arn: &str) -> Result<BTreeMap<String, String>, ProviderError> {
        let out = self
            .cloudfront
            .list_tags_for_resource()
            .resource(arn)
            .send()
            .await
            .map_err(|e| sdk_error("ListTagsForResource", e))?;

        let tags: BTreeMap<String, String> = out
            .tags()
            .map(|tags| {
                tags.items()
                    .iter()
                    .map(|tag| {
                        (
                            tag.key().to_string(),
                            tag.value().unwrap_or_default().to_string(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(tags)
    }

    async fn list_origin_request_policies(
        &self,
    ) -> Result<Vec<OriginRequestPolicySummary>, ProviderError> {
        let mut policies: Vec<OriginRequestPolicySummary> = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let out = self
                .cloudfront
                .list_origin_request_policies()
                .r#type(cf::OriginRequestPolicyType::from("custom"))
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| sdk_error("ListOriginRequestPolicies", e))?;
            let Some(list) = out.origin_request_policy_list() else {
                break;
            };

            policies.extend(list.items().iter().filter_map(|summary| {
                let policy = summary.origin_request_policy()?;
                let config = policy.origin_request_policy_config()?;
                Some(OriginRequestPolicySummary {
                    id: policy.id().to_string(),
                    name: config.name().to_string(),
                })
            }));

            match list.next_marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(policies)
    }

    async fn create_origin_request_policy(
        &self,
        spec: &OriginRequestPolicySpec,
    ) -> Result<OriginRequestPolicySummary, ProviderError> {
        let config = origin_request_policy_config(spec)?;
        let out = self
            .cloudfront
            .create_origin_request_policy()
            .origin_request_policy_config(config)
            .send()
            .await
            .map_err(|e| sdk_error("CreateOriginRequestPolicy", e))?;
        let policy = out
            .origin_request_policy()
            .ok_or_else(|| missing("CreateOriginRequestPolicy", "policy"))?;
        Ok(OriginRequestPolicySummary {
            id: policy.id().to_string(),
            name: spec.name.clone(),
        })
    }

    async fn create_distribution(
        &self,
        spec: &DistributionSpec,
    ) -> Result<DistributionSummary, ProviderError> {
        let with_tags = cf::DistributionConfigWithTags::builder()
            .distribution_config(distribution_config(spec)?)
            .tags(distribution_tags(&spec.tags)?)
            .build();
        let out = self
            .cloudfront
            .create_distribution_with_tags()
            .distribution_config_with_tags(with_tags)
            .send()
            .await
            .map_err(|e| sdk_error("CreateDistributionWithTags", e))?;
        let distribution = out
            .distribution()
            .ok_or_else(|| missing("CreateDistributionWithTags", "distribution"))?;
        Ok(DistributionSummary {
            id: distribution.id().to_string(),
            arn: distribution.arn().to_string(),
            domain: distribution.domain_name().to_string(),
        })
    }

    async fn get_distribution_config(
        &self,
        id: &str,
    ) -> Result<Versioned<Self::Config>, ProviderError> {
        let out = self
            .cloudfront
            .get_distribution_config()
            .id(id)
            .send()
            .await
            .map_err(|e| sdk_error("GetDistributionConfig", e))?;
        Ok(Versioned {
            etag: out
                .e_tag()
                .ok_or_else(|| missing("GetDistributionConfig", "etag"))?
                .to_string(),
            config: out
                .distribution_config()
                .ok_or_else(|| missing("GetDistributionConfig", "config"))?
                .clone(),
        })
    }

    async fn update_distribution(
        &self,
        id: &str,
        etag: &str,
        config: Self::Config,
    ) -> Result<String, ProviderError> {
        let out = self
            .cloudfront
            .update_distribution()
            .id(id)
            .if_match(etag)
            .distribution_config(config)
            .send()
            .await
            .map_err(|e| sdk_error("UpdateDistribution", e))?;
        Ok(out.e_tag().unwrap_or_default().to_string())
    }

    async fn delete_distribution(&self, id: &str, etag: &str) -> Result<(), ProviderError> {
        self.cloudfront
            .delete_distribution()
            .id(id)
            .if_match(etag)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteDistribution", e))?;
        Ok(())
    }

    async fn wait_deployed(&self, id: &str, max_wait: Duration) -> Result<(), ProviderError> {
        self.cloudfront
            .wait_until_distribution_deployed()
            .id(id)
            .wait(max_wait)
            .await
            .map_err(|e| local_error("WaitDistributionDeployed", DisplayErrorContext(&e)))?;
        Ok(())
    }
}

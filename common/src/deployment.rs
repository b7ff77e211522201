//! # Deployment model
//!
//! A deployment is never persisted locally. The provider's tag store is the
//! single source of truth: a [`DeploymentRecord`] is rebuilt from the tags of the
//! distribution that carries [`TAG_TARGET`].

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use crate::config::Config;

/// Marker tag. Its presence identifies a distribution as ours.
pub const TAG_TARGET: &str = "cdn-proxy-target";
pub const TAG_HOST: &str = "cdn-proxy-host";
pub const TAG_FORWARDED_FOR: &str = "cdn-proxy-x-forwarded-for";

/// Role and function names must stay under 64 characters.
const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRecord {
    pub distribution_id: String,
    pub domain: String,
    pub target: String,
    pub host: Option<String>,
    pub x_forwarded_for: Option<Ipv4Addr>,
}

impl DeploymentRecord {
    /// Rebuilds a record from a distribution's tags, or `None` if the marker
    /// tag is missing.
    pub fn from_tags(
        distribution_id: &str,
        domain: &str,
        tags: &BTreeMap<String, String>,
    ) -> Option<Self> {
        let target = tags.get(TAG_TARGET)?;
        Some(Self {
            distribution_id: distribution_id.to_string(),
            domain: domain.to_string(),
            target: target.clone(),
            host: tags.get(TAG_HOST).cloned(),
            x_forwarded_for: tags
                .get(TAG_FORWARDED_FOR)
                .and_then(|value| value.parse().ok()),
        })
    }
}

impl fmt::Display for DeploymentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -- {} ({})", self.target, self.distribution_id, self.domain)
    }
}

/// Tags written on distribution creation.
pub fn deployment_tags(cfg: &Config) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    tags.insert(TAG_TARGET.to_string(), cfg.placeholder_origin.clone());
    if let Some(host) = &cfg.host {
        tags.insert(TAG_HOST.to_string(), host.clone());
    }
    if let Some(ip) = cfg.x_forwarded_for {
        tags.insert(TAG_FORWARDED_FOR.to_string(), ip.to_string());
    }
    tags
}

/// Deterministic provider-side names. Repeating `create` collides on these
/// names, which is what makes each stage idempotent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub role: String,
    pub role_policy: String,
    pub function: String,
    pub origin_request_policy: String,
}

impl ResourceNames {
    pub fn derive(deployment_name: &str) -> Self {
        let base: String = sanitize(deployment_name);
        Self {
            role: base.clone(),
            role_policy: "basic-execution".to_string(),
            function: base.clone(),
            origin_request_policy: format!("{}-forward-all", truncate(&base, MAX_NAME_LEN - 12)),
        }
    }
}

impl From<&Config> for ResourceNames {
    fn from(cfg: &Config) -> Self {
        Self::derive(&cfg.deployment_name)
    }
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    truncate(&cleaned, MAX_NAME_LEN).to_string()
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max { s } else { &s[..max] }
}

/// Managed lifetime of a distribution. Only forward transitions exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DistributionState {
    Absent,
    Creating,
    /// Accepted by the provider but not yet deployed to every edge location.
    Created,
    Propagated,
    Disabling,
    Disabled,
    Deleted,
}

impl DistributionState {
    pub fn can_advance_to(self, next: DistributionState) -> bool {
        next > self
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

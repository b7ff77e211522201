//! # Error taxonomy
//!
//! [`ProviderError`] is the only error that crosses the provider boundary. It keeps
//! the provider's error code so retry and tolerance decisions can be made on it.
//! [`CdnProxyError`] is what orchestration and scanning surface to the operator.

use std::fmt;

use thiserror::Error;

/// Provider error codes the core reacts to.
pub mod codes {
    pub const NO_SUCH_ENTITY: &str = "NoSuchEntity";
    pub const ENTITY_ALREADY_EXISTS: &str = "EntityAlreadyExists";
    pub const RESOURCE_NOT_FOUND: &str = "ResourceNotFoundException";
    pub const RESOURCE_CONFLICT: &str = "ResourceConflictException";
    pub const INVALID_PARAMETER_VALUE: &str = "InvalidParameterValueException";
    pub const DISTRIBUTION_ALREADY_EXISTS: &str = "DistributionAlreadyExists";
    pub const INVALID_LAMBDA_FUNCTION_ASSOCIATION: &str = "InvalidLambdaFunctionAssociation";
    pub const NO_SUCH_DISTRIBUTION: &str = "NoSuchDistribution";
    pub const PRECONDITION_FAILED: &str = "PreconditionFailed";
    pub const INVALID_IF_MATCH_VERSION: &str = "InvalidIfMatchVersion";
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ProviderError {
    pub operation: &'static str,
    pub code: Option<String>,
    pub message: String,
}

impl ProviderError {
    pub fn new(operation: &'static str, code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            operation,
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn coded(operation: &'static str, code: &str, message: impl Into<String>) -> Self {
        Self::new(operation, Some(code), message)
    }

    pub fn is(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }

    pub fn is_any(&self, codes: &[&str]) -> bool {
        codes.iter().any(|code| self.is(code))
    }

    pub fn is_not_found(&self) -> bool {
        self.is_any(&[
            codes::NO_SUCH_ENTITY,
            codes::RESOURCE_NOT_FOUND,
            codes::NO_SUCH_DISTRIBUTION,
        ])
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} failed with {}: {}", self.operation, code, self.message),
            None => write!(f, "{} failed: {}", self.operation, self.message),
        }
    }
}

#[derive(Debug, Error)]
pub enum CdnProxyError {
    /// A resource that must be unique already exists.
    #[error("{0}")]
    Conflict(String),

    #[error("{resource}: gave up after {attempts} attempts ({source})")]
    RetriesExhausted {
        resource: String,
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    /// The consistency token used for an update no longer matches.
    #[error("{resource} was modified concurrently, re-run the command ({source})")]
    StaleConsistencyToken {
        resource: String,
        #[source]
        source: ProviderError,
    },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{resource}: {source}")]
    Provider {
        resource: String,
        #[source]
        source: ProviderError,
    },

    #[error("failed to build deployment package: {0}")]
    Package(String),

    #[error("no proxy domain given and no deployment was found")]
    MissingProxyDomain,

    #[error("failed to write report: {0}")]
    Report(String),
}

impl CdnProxyError {
    pub fn provider(resource: impl Into<String>, source: ProviderError) -> Self {
        Self::Provider {
            resource: resource.into(),
            source,
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

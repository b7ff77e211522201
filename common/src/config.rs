use std::net::Ipv4Addr;
use std::time::Duration;

/// Region every edge-function and CDN call is pinned to.
pub const EDGE_REGION: &str = "us-east-1";

pub const DEFAULT_DEPLOYMENT_NAME: &str = "cdn-proxy";
pub const DEFAULT_PLACEHOLDER_ORIGIN: &str = "example.com";

/// Runtime configuration handed to every component constructor.
#[derive(Debug, Clone)]
pub struct Config {
    /// Fixed name every managed resource is derived from.
    pub deployment_name: String,
    pub region: String,
    /// Shared credential profile; `None` uses the default provider chain.
    pub profile: Option<String>,
    /// Origin written into the distribution. The edge function replaces it
    /// on every request, so it never serves traffic.
    pub placeholder_origin: String,
    pub host: Option<String>,
    /// Fixed X-Forwarded-For value baked into the edge function at deploy time.
    pub x_forwarded_for: Option<Ipv4Addr>,
    pub retry: RetrySettings,
    /// Upper bound handed to the provider's deployment waiter.
    pub propagation_timeout: Duration,
    pub scan: ScanSettings,
    /// 0 prints everything, higher values progressively silence output.
    pub quiet: u8,
    pub no_banner: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deployment_name: DEFAULT_DEPLOYMENT_NAME.to_string(),
            region: EDGE_REGION.to_string(),
            profile: None,
            placeholder_origin: DEFAULT_PLACEHOLDER_ORIGIN.to_string(),
            host: None,
            x_forwarded_for: None,
            retry: RetrySettings::default(),
            propagation_timeout: Duration::from_secs(60 * 60),
            scan: ScanSettings::default(),
            quiet: 0,
            no_banner: false,
        }
    }
}

/// Fixed-delay retry ceiling for one class of provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// `attempts` tries with no delay between them. Handy for tests.
    pub const fn immediate(attempts: u32) -> Self {
        Self::new(attempts, Duration::ZERO)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetrySettings {
    /// Role not yet assumable right after it was created.
    pub function_create: RetryPolicy,
    /// Replicas still attached after the distribution released the function.
    pub function_delete: RetryPolicy,
    /// Function permissions not yet visible to the CDN.
    pub distribution_create: RetryPolicy,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            function_create: RetryPolicy::new(12, Duration::from_secs(5)),
            function_delete: RetryPolicy::new(30, Duration::from_secs(30)),
            distribution_create: RetryPolicy::new(10, Duration::from_secs(10)),
        }
    }
}

impl RetrySettings {
    pub fn immediate(attempts: u32) -> Self {
        Self {
            function_create: RetryPolicy::immediate(attempts),
            function_delete: RetryPolicy::immediate(attempts),
            distribution_create: RetryPolicy::immediate(attempts),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Maximum number of origins probed at the same time.
    pub workers: usize,
    pub timeout: Duration,
    pub max_redirects: usize,
    /// `https` in production; tests talk plain `http` to local listeners.
    pub scheme: String,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            workers: 20,
            timeout: Duration::from_secs(15),
            max_redirects: 10,
            scheme: "https".to_string(),
        }
    }
}

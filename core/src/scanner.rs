//! # Bypass scanner
//!
//! Probes every origin twice, directly and through the deployed CDN, and
//! reports whether the CDN reaches an origin that refuses direct traffic.
//!
//! A semaphore caps the number of origins in flight. Results are sent on a
//! channel as each pair completes, so their order follows completion, not
//! input. Cancelling the token stops new probes at once and drops in-flight
//! pairs without emitting anything for them. Dropping the receiver has the
//! same effect once the next result fails to send.

use std::sync::Arc;

use cdn_proxy_common::config::ScanSettings;
use cdn_proxy_common::error::CdnProxyError;
use cdn_proxy_common::scan::ScanResult;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::state::DeploymentLocator;

pub mod probe;

use probe::Prober;

#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub origins: Vec<String>,
    /// Host header for both paths. Defaults to the origin itself.
    pub host: Option<String>,
    /// CDN domain to route through. Looked up from the live deployment when
    /// absent.
    pub proxy_domain: Option<String>,
}

pub struct BypassScanner {
    settings: ScanSettings,
}

impl BypassScanner {
    pub fn new(settings: ScanSettings) -> Self {
        Self { settings }
    }

    /// Starts the scan and returns the result stream. Fails before probing
    /// anything when no proxy domain can be determined.
    pub async fn scan(
        &self,
        request: ScanRequest,
        locator: Option<&dyn DeploymentLocator>,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<ScanResult>, CdnProxyError> {
        let proxy_domain: String = resolve_proxy_domain(request.proxy_domain, locator).await?;
        info!(proxy = %proxy_domain, origins = request.origins.len(), "starting bypass scan");

        let prober = Prober::new(&self.settings, proxy_domain, request.host)?;
        let workers: usize = self.settings.workers.max(1);
        let (tx, rx) = mpsc::channel::<ScanResult>(workers);

        tokio::spawn(run(prober, request.origins, workers, tx, cancel));
        Ok(rx)
    }
}

pub async fn resolve_proxy_domain(
    explicit: Option<String>,
    locator: Option<&dyn DeploymentLocator>,
) -> Result<String, CdnProxyError> {
    if let Some(domain) = explicit {
        return Ok(domain);
    }
    let Some(locator) = locator else {
        return Err(CdnProxyError::MissingProxyDomain);
    };
    locator
        .find()
        .await?
        .map(|record| record.domain)
        .ok_or(CdnProxyError::MissingProxyDomain)
}

async fn run(
    prober: Prober,
    origins: Vec<String>,
    workers: usize,
    tx: mpsc::Sender<ScanResult>,
    cancel: CancellationToken,
) {
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks: JoinSet<()> = JoinSet::new();

    for origin in origins {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let prober = prober.clone();
        let tx = tx.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let _permit = permit;
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(%origin, "probe cancelled");
                }
                result = prober.probe(&origin) => {
                    if tx.send(result).await.is_err() {
                        debug!("result receiver dropped, stopping scan");
                        cancel.cancel();
                    }
                }
            }
        });

        while tasks.try_join_next().is_some() {}
    }

    while tasks.join_next().await.is_some() {}
    debug!("bypass scan finished");
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

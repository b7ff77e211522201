use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, anyhow};
use cdn_proxy_common::config::Config;
use cdn_proxy_common::network::target::{Target, targets_from_text};
use cdn_proxy_common::scan::ScanResult;
use cdn_proxy_common::{success, warn};
use cdn_proxy_core::provider::aws::AwsProvider;
use cdn_proxy_core::report::Report;
use cdn_proxy_core::scanner::{BypassScanner, ScanRequest};
use cdn_proxy_core::state::DeploymentLocator;
use cdn_proxy_core::StateProbe;
use colored::*;
use tokio_util::sync::CancellationToken;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::mprint;
use crate::terminal::{colors, print, spinner};

pub struct ScanArgs {
    pub targets: Vec<String>,
    pub host: Option<String>,
    pub proxy_domain: Option<String>,
    pub report: Option<PathBuf>,
}

pub async fn scan(args: ScanArgs, cfg: &Config) -> anyhow::Result<()> {
    let origins: Vec<String> = expand_targets(&args.targets)?;
    if origins.is_empty() {
        return Err(anyhow!("no origins to scan"));
    }

    // Only touch the cloud when the domain has to be looked up.
    let provider: Option<AwsProvider> = match args.proxy_domain {
        Some(_) => None,
        None => Some(AwsProvider::connect(cfg).await),
    };
    let probe = provider.as_ref().map(StateProbe::new);
    let locator: Option<&dyn DeploymentLocator> =
        probe.as_ref().map(|p| p as &dyn DeploymentLocator);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, waiting for in-flight probes to stop");
                cancel.cancel();
            }
        }
    });

    let request = ScanRequest {
        origins,
        host: args.host,
        proxy_domain: args.proxy_domain,
    };
    let total: usize = request.origins.len();
    let mut results = BypassScanner::new(cfg.scan.clone())
        .scan(request, locator, cancel.clone())
        .await?;

    print::header("bypass scan", cfg.quiet);
    let span = spinner::scan_span(total);
    let _guard = span.enter();
    let start_time: Instant = Instant::now();
    let mut report = Report::new();
    let mut bypasses: usize = 0;
    let mut completed: usize = 0;

    while let Some(result) = results.recv().await {
        completed += 1;
        span.pb_inc(1);
        report.record(&result, &cfg.scan.scheme);
        if result.is_bypass() {
            bypasses += 1;
        }
        print_result(&result, cfg.quiet);
    }
    drop(_guard);

    if cancel.is_cancelled() {
        warn!("Scan cancelled after {completed} of {total} origins");
    }

    mprint!();
    let summary: String = format!(
        "Scan complete: {} of {} origins bypassable in {}",
        bypasses.to_string().color(colors::BYPASS).bold(),
        completed,
        format!("{:.2}s", start_time.elapsed().as_secs_f64()).bold().yellow()
    );
    if cfg.quiet == 0 {
        print::fat_separator();
        print::centerln(&summary);
    } else {
        success!("{}", summary);
    }

    if let Some(path) = args.report {
        report.write(&path).await?;
        success!("Report with {} findings written to {}", report.findings(), path.display());
    }
    Ok(())
}

fn print_result(result: &ScanResult, quiet: u8) {
    if result.is_bypass() {
        print::print(&format!("{}", result.to_string().color(colors::BYPASS).bold()));
    } else if quiet < 2 {
        print::print_status(result.to_string());
    }
}

/// Every argument is a target expression, or a file of them.
fn expand_targets(args: &[String]) -> anyhow::Result<Vec<String>> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut origins: Vec<String> = Vec::new();

    for arg in args {
        let target: Target = if Path::new(arg).is_file() {
            let text: String = std::fs::read_to_string(arg)
                .with_context(|| format!("failed to read targets from {arg}"))?;
            targets_from_text(&text).map_err(|e| anyhow!("{arg}: {e}"))?
        } else {
            arg.parse().map_err(|e: String| anyhow!(e))?
        };

        for origin in target.to_origins() {
            if seen.insert(origin.clone()) {
                origins.push(origin);
            }
        }
    }

    Ok(origins)
}

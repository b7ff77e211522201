use std::time::Instant;

use anyhow::Context;
use cdn_proxy_common::config::Config;
use cdn_proxy_common::deployment::DeploymentRecord;
use cdn_proxy_common::success;
use cdn_proxy_core::Orchestrator;
use cdn_proxy_core::provider::aws::AwsProvider;
use colored::*;
use tracing::Instrument;

use crate::terminal::spinner::{self, SpanProgress};
use crate::terminal::{colors, print};

pub async fn create(cfg: &Config) -> anyhow::Result<()> {
    let provider = AwsProvider::connect(cfg).await;
    let orchestrator = Orchestrator::new(&provider, cfg);
    let span = spinner::deployment_span();
    let progress = SpanProgress::new(span.clone());
    let start_time: Instant = Instant::now();

    let record: DeploymentRecord = orchestrator
        .create(&progress)
        .instrument(span)
        .await
        .context("create failed, re-run create or delete to finish the partial deployment")?;

    print::header("deployment ready", cfg.quiet);
    print_record(&record);
    success!(
        "Proxy live at {} after {:.0}s",
        record.domain.color(colors::DOMAIN).bold(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

pub async fn update(cfg: &Config) -> anyhow::Result<()> {
    let provider = AwsProvider::connect(cfg).await;
    let span = spinner::deployment_span();
    let progress = SpanProgress::new(span.clone());

    let version = Orchestrator::new(&provider, cfg)
        .update(&progress)
        .instrument(span)
        .await
        .context("update failed")?;

    success!("Published edge function version {}", version.version.bold());
    Ok(())
}

pub async fn delete(cfg: &Config) -> anyhow::Result<()> {
    let provider = AwsProvider::connect(cfg).await;
    let span = spinner::deployment_span();
    let progress = SpanProgress::new(span.clone());

    Orchestrator::new(&provider, cfg)
        .delete(&progress)
        .instrument(span)
        .await
        .context("delete failed, re-run delete to finish")?;

    success!("Deployment {} removed", cfg.deployment_name.bold());
    Ok(())
}

pub fn print_record(record: &DeploymentRecord) {
    print::aligned_line("Domain", record.domain.clone().color(colors::DOMAIN));
    print::aligned_line("Distribution", record.distribution_id.as_str());
    print::aligned_line("Target", record.target.as_str());
    if let Some(host) = &record.host {
        print::aligned_line("Host", host.as_str());
    }
    if let Some(ip) = record.x_forwarded_for {
        print::aligned_line("XFF", ip.to_string());
    }
}

use cdn_proxy_common::config::Config;
use cdn_proxy_common::deployment::DeploymentRecord;
use cdn_proxy_core::StateProbe;
use cdn_proxy_core::provider::aws::AwsProvider;
use colored::*;

use crate::commands::deploy::print_record;
use crate::mprint;
use crate::terminal::{colors, print};

pub async fn status(cfg: &Config) -> anyhow::Result<()> {
    let provider = AwsProvider::connect(cfg).await;

    match StateProbe::new(&provider).find().await? {
        Some(record) => {
            print::header("live deployment", cfg.quiet);
            print_record(&record);
        }
        None => {
            print::header("no deployment", cfg.quiet);
            print::nothing_deployed();
        }
    }
    Ok(())
}

pub async fn list(cfg: &Config) -> anyhow::Result<()> {
    let provider = AwsProvider::connect(cfg).await;
    let records: Vec<DeploymentRecord> = StateProbe::new(&provider).list().await?;

    if records.is_empty() {
        print::nothing_deployed();
        return Ok(());
    }

    print::header("tagged distributions", cfg.quiet);
    for (idx, record) in records.iter().enumerate() {
        if cfg.quiet > 0 {
            print::print_status(record.to_string());
            continue;
        }

        print::tree_head(idx, &record.target);
        let mut details: Vec<(String, ColoredString)> = vec![
            ("Id".to_string(), record.distribution_id.normal()),
            ("Domain".to_string(), record.domain.color(colors::DOMAIN)),
        ];
        if let Some(host) = &record.host {
            details.push(("Host".to_string(), host.normal()));
        }
        if let Some(ip) = record.x_forwarded_for {
            details.push(("XFF".to_string(), ip.to_string().normal()));
        }
        print::as_tree_one_level(details);

        if idx + 1 != records.len() {
            mprint!();
        }
    }
    Ok(())
}

pub mod deploy;
pub mod scan;
pub mod status;

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use cdn_proxy_common::config::{
    Config, DEFAULT_DEPLOYMENT_NAME, DEFAULT_PLACEHOLDER_ORIGIN, EDGE_REGION, ScanSettings,
};
use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cdn-proxy")]
#[command(version, about = "Route requests through CloudFront and hunt for origins that trust it.")]
pub struct CommandLine {
    /// Shared credentials profile
    #[arg(long, global = true)]
    pub profile: Option<String>,

    #[arg(long, global = true, default_value = EDGE_REGION)]
    pub region: String,

    /// Name every managed resource is derived from
    #[arg(long, global = true, default_value = DEFAULT_DEPLOYMENT_NAME)]
    pub name: String,

    /// Less output, repeat for even less
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(long, global = true)]
    pub no_banner: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone, Default)]
pub struct ForwardedFor {
    /// Fixed X-Forwarded-For instead of a random public address
    #[arg(long = "x-forwarded-for")]
    pub x_forwarded_for: Option<Ipv4Addr>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy the role, the edge function and the distribution
    #[command(alias = "c")]
    Create {
        /// Placeholder origin recorded on the distribution
        #[arg(long, default_value = DEFAULT_PLACEHOLDER_ORIGIN)]
        target: String,
        /// Host recorded on the deployment's tags
        #[arg(long)]
        host: Option<String>,
        #[command(flatten)]
        forwarded_for: ForwardedFor,
    },
    /// Publish a new edge function version with the current settings
    #[command(alias = "u")]
    Update {
        #[command(flatten)]
        forwarded_for: ForwardedFor,
    },
    /// Tear the deployment down
    #[command(alias = "d")]
    Delete,
    /// Show the live deployment
    Status,
    /// List every tagged distribution
    #[command(alias = "l")]
    List,
    /// Compare direct and proxied reachability of origins
    #[command(alias = "s")]
    Scan {
        /// IPs, hostnames, ranges, CIDR blocks or files of those
        #[arg(required = true)]
        targets: Vec<String>,

        #[arg(long)]
        host: Option<String>,

        /// CDN domain to route through, defaults to the live deployment
        #[arg(long)]
        proxy_domain: Option<String>,

        #[arg(long, default_value_t = 20)]
        workers: usize,

        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 15)]
        timeout: u64,

        /// Write bypass findings as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn to_config(&self) -> Config {
        let mut cfg = Config {
            deployment_name: self.name.clone(),
            region: self.region.clone(),
            profile: self.profile.clone(),
            quiet: self.quiet,
            no_banner: self.no_banner,
            ..Config::default()
        };

        match &self.command {
            Commands::Create {
                target,
                host,
                forwarded_for,
            } => {
                cfg.placeholder_origin = target.clone();
                cfg.host = host.clone();
                cfg.x_forwarded_for = forwarded_for.x_forwarded_for;
            }
            Commands::Update { forwarded_for } => {
                cfg.x_forwarded_for = forwarded_for.x_forwarded_for;
            }
            Commands::Scan { workers, timeout, .. } => {
                cfg.scan = ScanSettings {
                    workers: *workers,
                    timeout: Duration::from_secs(*timeout),
                    ..ScanSettings::default()
                };
            }
            Commands::Delete | Commands::Status | Commands::List => {}
        }

        cfg
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

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CommandLine, clap::Error> {
        CommandLine::try_parse_from(std::iter::once("cdn-proxy").chain(args.iter().copied()))
    }

    #[test]
    fn create_records_host_and_forwarded_for() {
        let cfg = parse(&[
            "create",
            "--target",
            "origin.example.net",
            "--host",
            "test-host",
            "--x-forwarded-for",
            "8.8.4.4",
        ])
        .unwrap()
        .to_config();

        assert_eq!(cfg.placeholder_origin, "origin.example.net");
        assert_eq!(cfg.host.as_deref(), Some("test-host"));
        assert_eq!(cfg.x_forwarded_for, Some(Ipv4Addr::new(8, 8, 4, 4)));
    }

    #[test]
    fn update_only_takes_forwarded_for() {
        let cfg = parse(&["update", "--x-forwarded-for", "8.8.4.4"]).unwrap().to_config();
        assert_eq!(cfg.x_forwarded_for, Some(Ipv4Addr::new(8, 8, 4, 4)));
        assert_eq!(cfg.host, None);

        let err = parse(&["update", "--host", "test-host"]).err().unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn scan_settings_come_from_flags() {
        let cfg = parse(&["scan", "52.4.10.14", "--workers", "5", "--timeout", "3"])
            .unwrap()
            .to_config();
        assert_eq!(cfg.scan.workers, 5);
        assert_eq!(cfg.scan.timeout, Duration::from_secs(3));
    }
}

mod commands;
mod terminal;

use std::process::ExitCode;

use cdn_proxy_common::config::Config;
use cdn_proxy_common::error;
use commands::scan::ScanArgs;
use commands::{CommandLine, Commands, deploy, scan, status};
use terminal::{logging, print};

#[tokio::main]
async fn main() -> ExitCode {
    let commands = CommandLine::parse_args();
    let cfg: Config = commands.to_config();

    logging::init_logging(cfg.quiet);
    print::banner(cfg.no_banner, cfg.quiet);

    let outcome: anyhow::Result<()> = match commands.command {
        Commands::Create { .. } => {
            print::header("creating deployment", cfg.quiet);
            deploy::create(&cfg).await
        }
        Commands::Update { .. } => {
            print::header("updating edge function", cfg.quiet);
            deploy::update(&cfg).await
        }
        Commands::Delete => {
            print::header("deleting deployment", cfg.quiet);
            deploy::delete(&cfg).await
        }
        Commands::Status => status::status(&cfg).await,
        Commands::List => status::list(&cfg).await,
        Commands::Scan {
            targets,
            host,
            proxy_domain,
            report,
            ..
        } => {
            let args = ScanArgs {
                targets,
                host,
                proxy_domain,
                report,
            };
            scan::scan(args, &cfg).await
        }
    };

    match outcome {
        Ok(()) => {
            if cfg.quiet == 0 {
                print::end_of_program();
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

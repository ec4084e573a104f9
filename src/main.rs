//! cloudflare-utils
//!
//! Bulk operations over a Cloudflare account that the dashboard makes
//! tedious: purging DNS records, pruning Pages deployments, syncing IP
//! lists, purging cache and auditing tunnel connector versions.
//!
//! # Usage
//! ```bash
//! # Delete every record of a zone
//! cloudflare-utils --zone-name example.com dns-purge
//!
//! # Prune Pages deployments of a branch
//! cloudflare-utils --account-id $ACCOUNT prune-deployments -p site -b preview
//!
//! # Replace an IP list with Cloudflare's ranges
//! cloudflare-utils --account-id $ACCOUNT sync-list preset://cloudflare --list-name edge
//! ```

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

use cloudflare_utils::commands::{Command, Context};
use cloudflare_utils::config::CloudflareConfig;

// ============================================================
// CLI Definition
// ============================================================

#[derive(Debug, Parser)]
#[command(name = "cloudflare-utils")]
#[command(about = "Helpful utilities for working with Cloudflare", long_about = None)]
#[command(version, disable_version_flag = true)]
struct Cli {
    /// Print version
    #[arg(long, action = clap::ArgAction::Version)]
    version: Option<bool>,

    #[command(flatten)]
    config: CloudflareConfig,

    /// Info level logging
    #[arg(short = 'V', long, env = "LOG_LEVEL_VERBOSE", global = true)]
    verbose: bool,

    /// Debug level logging
    #[arg(short = 'd', long, env = "LOG_LEVEL_DEBUG", global = true)]
    debug: bool,

    /// Trace level logging
    #[arg(long, global = true)]
    trace: bool,

    /// Log as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Filter directive from the level flags, then `LOG_LEVEL`. `None`
    /// defers to `RUST_LOG`.
    fn log_directive(&self, log_level: Option<&str>) -> Option<String> {
        let level = if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else if self.trace {
            "trace"
        } else {
            match log_level.map(|l| l.trim().to_lowercase()).as_deref() {
                Some("trace") => "trace",
                Some("debug") => "debug",
                Some("info") => "info",
                _ => return None,
            }
        };
        Some(format!("warn,cloudflare_utils={}", level))
    }
}

fn init_logging(cli: &Cli) {
    let log_level = std::env::var("LOG_LEVEL").ok();
    let filter = match cli.log_directive(log_level.as_deref()) {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ============================================================
// Main Entry Point
// ============================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after in-flight operations");
            on_signal.cancel();
        }
    });

    match run(cli, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    debug!(command = ?cli.command, "Starting");
    let ctx = Context::new(cli.config, cancel).await?;
    cli.command.run(&ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["cloudflare-utils"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_log_level_flags_win_over_env() {
        let cli = parse(&["-d", "--trace", "cache-cleaner", "--everything"]);
        assert_eq!(cli.log_directive(Some("info")).as_deref(), Some("warn,cloudflare_utils=debug"));

        let cli = parse(&["cache-cleaner", "--everything", "-V"]);
        assert_eq!(cli.log_directive(None).as_deref(), Some("warn,cloudflare_utils=info"));
    }

    #[test]
    fn test_log_level_env_fallback() {
        let cli = parse(&["cache-cleaner", "--everything"]);
        assert_eq!(cli.log_directive(Some("TRACE")).as_deref(), Some("warn,cloudflare_utils=trace"));
        assert_eq!(cli.log_directive(Some("loud")), None);
        assert_eq!(cli.log_directive(None), None);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["dns-purge", "--zone-id", "z1", "--api-token", "tok", "--dry-run"]);
        assert_eq!(cli.config.zone_id.as_deref(), Some("z1"));
        assert!(matches!(cli.command, Command::DnsPurge(ref args) if args.dry_run));
    }

    #[test]
    fn test_unknown_subcommand_is_rejected() {
        let err = Cli::try_parse_from(["cloudflare-utils", "dns-nuke"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidSubcommand);
    }
}

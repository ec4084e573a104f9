//! `tunnel-versions`: report connectors not running the latest cloudflared.

use anyhow::Result;
use clap::Args;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

use super::Context;
use crate::bulk::{fetch_all, BulkError, FetchError, ListOptions};
use crate::cloudflare::types::Tunnel;
use crate::cloudflare::{Capability, TunnelPages};
use crate::github::GitHubClient;

const REQUIRED: &[Capability] = &[Capability::TunnelRead];
const HEALTHY: &str = "healthy";

#[derive(Debug, Clone, Args)]
pub struct TunnelVersionsArgs {
    /// Report versions of all connectors, not just outdated ones
    #[arg(short = 'a', long, env = "ALL_TUNNELS")]
    pub all_tunnels: bool,

    /// Include deleted tunnels in the report
    #[arg(long, env = "INCLUDE_DELETED_TUNNELS")]
    pub include_deleted: bool,

    /// Only report on healthy tunnels
    #[arg(short = 'o', long, env = "ACTIVE_ONLY_TUNNELS")]
    pub healthy_only: bool,

    /// GitHub token, raises the API rate limit
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,
}

/// Connector count per version, per tunnel name
pub type VersionReport = BTreeMap<String, BTreeMap<String, usize>>;

/// Count connector versions of each tunnel. Unless `all` is set only
/// versions other than `latest` are counted; tunnels with nothing to count
/// are left out.
pub fn count_versions(tunnels: &[Tunnel], latest: &str, all: bool) -> VersionReport {
    let mut report = VersionReport::new();
    for tunnel in tunnels {
        let mut counts = BTreeMap::new();
        for connection in &tunnel.connections {
            if all || connection.client_version != latest {
                *counts.entry(connection.client_version.clone()).or_insert(0) += 1;
            }
        }
        if counts.is_empty() {
            debug!(tunnel = %tunnel.name, "No outdated connectors");
            continue;
        }
        debug!(tunnel = %tunnel.name, versions = ?counts, "Connector versions");
        report.entry(tunnel.name.clone()).or_default().extend(counts);
    }
    report
}

/// List tunnels; a listing cut short still yields what was fetched.
async fn list_tunnels(ctx: &Context, account_id: &str, include_deleted: bool) -> Result<Vec<Tunnel>> {
    let source = TunnelPages::new(ctx.client.clone(), account_id, include_deleted);
    match fetch_all(&source, &ListOptions::default(), &ctx.cancel).await {
        Ok(tunnels) => Ok(tunnels),
        Err(FetchError::Partial { items, source }) => {
            warn!(fetched = items.len(), error = %source, "Tunnel listing incomplete, reporting on partial results");
            Ok(items)
        }
        Err(err) => Err(BulkError::from(err).into()),
    }
}

pub async fn report(ctx: &Context, args: TunnelVersionsArgs) -> Result<()> {
    let account_id = ctx.account_id()?;
    ctx.orchestrator(REQUIRED).authorize().await?;

    let mut tunnels = list_tunnels(ctx, &account_id, args.include_deleted).await?;
    if args.healthy_only {
        tunnels.retain(|t| t.status == HEALTHY);
    }
    debug!(count = tunnels.len(), "Tunnels to report on");

    let latest = GitHubClient::new(args.github_token.as_deref())?
        .latest_release("cloudflare", "cloudflared")
        .await?;
    debug!(latest = %latest, "Cloudflared latest version");

    let report = count_versions(&tunnels, &latest, args.all_tunnels);
    trace!(report = ?report, "Connector version map");
    print!("{}", render(&report));
    Ok(())
}

fn render(report: &VersionReport) -> String {
    if report.is_empty() {
        return "All connectors are up to date\n".to_string();
    }
    let mut out = format!("There are {} tunnels with outdated connectors\n", report.len());
    for (tunnel, versions) in report {
        out.push_str(&format!("Tunnel: {}\n", tunnel));
        for (version, count) in versions {
            out.push_str(&format!("\tVersion: {}, Count: {}\n", version, count));
        }
    }
    out
}

//! Command handlers
//!
//! Each subcommand gathers its arguments, drives the bulk engine and prints
//! the user-facing result on stdout. Errors propagate to `main`.

pub mod cache;
pub mod dns;
pub mod lists;
pub mod pages;
pub mod tunnels;

use anyhow::{Context as _, Result};
use clap::Subcommand;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bulk::{ApiError, CapabilityGate, Orchestrator, Resource, RunOutcome};
use crate::cloudflare::{Capability, CloudflareClient};
use crate::config::{CloudflareConfig, ZoneSelector};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deletes all DNS records.
    /// API Token Requirements: DNS:Edit
    DnsPurge(dns::DnsPurgeArgs),

    /// Clean DNS records by downloading them to a file, editing, and uploading.
    /// API Token Requirements: DNS:Edit
    DnsCleaner(dns::DnsCleanerArgs),

    /// Prune deployments by either branch or time.
    /// API Token Requirements: Pages:Edit
    PruneDeployments(pages::PruneArgs),

    /// Delete all deployments of a project.
    /// API Token Requirements: Pages:Edit
    PurgeDeployments(pages::PurgeArgs),

    /// Syncs a list of IPs with a Cloudflare List, replacing all items.
    /// API Token Requirements: Account Filter Lists:Edit
    SyncList(lists::SyncListArgs),

    /// Purges the cache of a zone.
    /// API Token Requirements: Cache Purge
    CacheCleaner(cache::CacheCleanerArgs),

    /// Reports the versions of tunnel connectors.
    /// API Token Requirements: Cloudflare Tunnel:Read
    TunnelVersions(tunnels::TunnelVersionsArgs),
}

impl Command {
    pub async fn run(self, ctx: &Context) -> Result<()> {
        match self {
            Command::DnsPurge(args) => dns::purge(ctx, args, std::io::BufReader::new(std::io::stdin())).await,
            Command::DnsCleaner(args) => dns::cleaner(ctx, args).await,
            Command::PruneDeployments(args) => pages::prune(ctx, args).await,
            Command::PurgeDeployments(args) => pages::purge(ctx, args).await,
            Command::SyncList(args) => lists::sync(ctx, args).await,
            Command::CacheCleaner(args) => cache::clean(ctx, args).await,
            Command::TunnelVersions(args) => tunnels::report(ctx, args).await,
        }
    }
}

/// One remote mutation of a batch
pub(crate) type Mutation = Pin<Box<dyn Future<Output = Result<(), ApiError>> + Send>>;

/// Everything a command needs for one invocation
pub struct Context {
    pub config: CloudflareConfig,
    pub client: Arc<CloudflareClient>,
    pub cancel: CancellationToken,
}

impl Context {
    pub async fn new(config: CloudflareConfig, cancel: CancellationToken) -> Result<Self> {
        let credential = config.resolve_credential().await?;
        let client = CloudflareClient::new(credential, config.client_options())
            .context("Failed to create Cloudflare client")?;
        Ok(Self {
            config,
            client: Arc::new(client),
            cancel,
        })
    }

    /// Context over an existing client.
    pub fn with_client(config: CloudflareConfig, client: CloudflareClient) -> Self {
        Self {
            config,
            client: Arc::new(client),
            cancel: CancellationToken::new(),
        }
    }

    pub fn orchestrator(&self, required: &[Capability]) -> Orchestrator<'_> {
        let gate = CapabilityGate::new(self.client.credential(), self.client.as_ref());
        Orchestrator::new(gate, required).with_cancellation(self.cancel.clone())
    }

    /// Zone id from `--zone-id`, or looked up from `--zone-name`.
    pub async fn zone_id(&self) -> Result<String> {
        match self.config.zone()? {
            ZoneSelector::Id(id) => Ok(id),
            ZoneSelector::Name(name) => self
                .client
                .zone_id_by_name(&name)
                .await
                .with_context(|| format!("Error getting zone id from name {}", name)),
        }
    }

    pub fn account_id(&self) -> Result<String> {
        Ok(self.config.account_id()?.to_string())
    }
}

/// Print the result of a delete run; any failed item is an error.
///
/// `noun` is the plural of what was deleted, `describe` renders one item for
/// dry-run and failure output.
pub(crate) fn report_deletions<T: Resource>(
    outcome: RunOutcome<T>,
    noun: &str,
    describe: impl Fn(&T) -> String,
) -> Result<()> {
    match outcome {
        RunOutcome::NothingToDo => {
            println!("Found no {} to delete", noun);
        }
        RunOutcome::DryRun { items } => {
            for item in &items {
                println!("Dry Run: would delete {}", describe(item));
            }
            println!("Dry Run: would delete {} {}", items.len(), noun);
        }
        RunOutcome::Completed(summary) => {
            println!("Deleted {} {}", summary.succeeded(), noun);
            for (id, error) in &summary.failures {
                warn!(id = %id, error = %error, "Delete failed");
                println!("Failed to delete {}: {}", id, error);
            }
            if !summary.not_dispatched.is_empty() {
                println!(
                    "Cancelled before deleting {} {}",
                    summary.not_dispatched.len(),
                    noun
                );
            }
            info!(retries = summary.retries, "Deletion finished");
            summary.into_result()?;
        }
        RunOutcome::Started { operation_id } => {
            println!("Started operation {}", operation_id);
        }
    }
    Ok(())
}

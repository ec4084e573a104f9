//! `cache-cleaner`: purge a zone's cache.

use anyhow::{Context as _, Result};
use clap::Args;
use tracing::info;

use super::Context;
use crate::cloudflare::types::PurgeRequest;
use crate::cloudflare::Capability;

const REQUIRED: &[Capability] = &[Capability::CachePurge];

#[derive(Debug, Clone, Args)]
#[group(id = "method", required = true, multiple = true)]
pub struct CacheCleanerArgs {
    /// Purge everything from the cache
    #[arg(long, conflicts_with_all = ["url", "tag", "prefix", "host"])]
    pub everything: bool,

    /// URL to purge from the cache. Can be repeated
    #[arg(long)]
    pub url: Vec<String>,

    /// Tag to purge from the cache. Can be repeated
    #[arg(long)]
    pub tag: Vec<String>,

    /// Prefix to purge from the cache. Can be repeated
    #[arg(long)]
    pub prefix: Vec<String>,

    /// Host to purge from the cache. Can be repeated
    #[arg(long)]
    pub host: Vec<String>,
}

impl CacheCleanerArgs {
    pub fn purge_request(&self) -> PurgeRequest {
        if self.everything {
            return PurgeRequest::everything();
        }
        PurgeRequest {
            purge_everything: false,
            files: self.url.clone(),
            tags: self.tag.clone(),
            prefixes: self.prefix.clone(),
            hosts: self.host.clone(),
        }
    }
}

pub async fn clean(ctx: &Context, args: CacheCleanerArgs) -> Result<()> {
    info!("Starting cache cleaner");
    let request = args.purge_request();
    if request.is_empty() {
        anyhow::bail!("must specify at least one purge method: --everything, --url, --tag, --prefix or --host");
    }

    ctx.orchestrator(REQUIRED).authorize().await?;
    let zone_id = ctx.zone_id().await?;

    if request.purge_everything {
        info!("Purging everything from cache");
    } else {
        info!(
            urls = request.files.len(),
            tags = request.tags.len(),
            prefixes = request.prefixes.len(),
            hosts = request.hosts.len(),
            "Purging cache"
        );
    }
    ctx.client
        .purge_cache(&zone_id, &request)
        .await
        .context("Error purging cache")?;
    println!("Successfully purged cache");
    Ok(())
}

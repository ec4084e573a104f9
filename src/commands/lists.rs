//! `sync-list`: replace every item of an account IP list from a source.

use anyhow::{bail, Context as _, Result};
use chrono::Local;
use clap::{Args, ValueEnum};
use reqwest::Url;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::Context;
use crate::bulk::{Orchestrator, RunOptions, RunOutcome};
use crate::cloudflare::types::ListItem;
use crate::cloudflare::{Capability, ListReplacement};
use crate::github::GitHubClient;

const REQUIRED: &[Capability] = &[Capability::ListsWrite];
const MAX_COMMENT_LEN: usize = 64;
const UPTIME_ROBOT_URL: &str = "https://cdn.uptimerobot.com/api/IPv4andIPv6.txt";
const LIST_DESCRIPTION: &str = "Created by cloudflare-utils";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum IpVersion {
    Ipv4,
    Ipv6,
    #[default]
    Both,
}

impl IpVersion {
    pub fn accepts(&self, ip: &str) -> bool {
        match self {
            IpVersion::Ipv4 => ip.contains('.') && !ip.contains(':'),
            IpVersion::Ipv6 => ip.contains(':') && !ip.contains('.'),
            IpVersion::Both => true,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct SyncListArgs {
    /// Source of the IPs, same forms as --source
    #[arg(value_name = "SOURCE")]
    pub source_arg: Option<String>,

    /// Source of the IPs: http(s)://, file:// or preset://
    /// (cloudflare[?include=china], uptime-robot, github[?include=<groups to skip>])
    #[arg(long)]
    pub source: Option<String>,

    /// ID of the list to sync with. Used over --list-name when both are set
    #[arg(long, required_unless_present = "list_name")]
    pub list_id: Option<String>,

    /// Name of the list to sync with. Created when it does not exist
    #[arg(long)]
    pub list_name: Option<String>,

    /// IP version to sync
    #[arg(long, value_enum, default_value_t = IpVersion::Both)]
    pub ip_version: IpVersion,

    /// Comment added to each list item
    #[arg(long, value_parser = parse_comment)]
    pub comment: Option<String>,

    /// Add no comment to the list items
    #[arg(long)]
    pub no_comment: bool,

    /// Don't actually sync anything. Just print what would be synced
    #[arg(long)]
    pub dry_run: bool,

    /// Exit right after starting the replace operation
    #[arg(long)]
    pub no_wait: bool,

    /// GitHub token, raises the API rate limit
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,
}

fn parse_comment(value: &str) -> Result<String, String> {
    if value.chars().count() > MAX_COMMENT_LEN {
        return Err(format!("comment cannot be longer than {} characters", MAX_COMMENT_LEN));
    }
    Ok(value.to_string())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("error parsing source URL: {0}")]
    InvalidUrl(String),

    #[error("invalid preset: {0}. Valid presets are: cloudflare, uptime-robot, github")]
    UnknownPreset(String),

    #[error("invalid source scheme: {0}")]
    UnknownScheme(String),
}

/// Where the IPs come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListSource {
    Cloudflare { include_china: bool },
    UptimeRobot,
    /// `exclude` holds the meta groups to skip
    GitHub { exclude: HashSet<String> },
    Url(String),
    File(PathBuf),
}

impl ListSource {
    pub fn parse(source: &str) -> Result<Self, SourceError> {
        let url = Url::parse(source).map_err(|e| SourceError::InvalidUrl(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(Self::Url(source.to_string())),
            "file" => local_path(&url)
                .map(Self::File)
                .ok_or_else(|| SourceError::InvalidUrl(format!("not a file path: {}", source))),
            "preset" => {
                let includes = includes(&url);
                match url.host_str().unwrap_or_default() {
                    "cloudflare" => Ok(Self::Cloudflare {
                        include_china: includes.contains("china"),
                    }),
                    "uptime-robot" => Ok(Self::UptimeRobot),
                    "github" => Ok(Self::GitHub { exclude: includes }),
                    other => Err(SourceError::UnknownPreset(other.to_string())),
                }
            }
            other => Err(SourceError::UnknownScheme(other.to_string())),
        }
    }
}

/// Percent-decoded path of a `file://` URL. A host names a path relative to
/// the working directory, so `file://ips.txt` is `./ips.txt`.
fn local_path(url: &Url) -> Option<PathBuf> {
    let decoded = Url::parse(&format!("file://{}", url.path()))
        .ok()?
        .to_file_path()
        .ok()?;
    match url.host_str().filter(|h| !h.is_empty() && *h != "localhost") {
        None => Some(decoded),
        Some(host) => {
            let rest = decoded.strip_prefix("/").ok()?;
            if rest.as_os_str().is_empty() {
                Some(PathBuf::from(host))
            } else {
                Some(Path::new(host).join(rest))
            }
        }
    }
}

/// Lowercased entries of the comma separated `include` query value.
fn includes(url: &Url) -> HashSet<String> {
    url.query_pairs()
        .filter(|(key, _)| key == "include")
        .flat_map(|(_, value)| {
            value
                .split(',')
                .map(|v| v.trim().to_lowercase())
                .filter(|v| !v.is_empty())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Non-empty trimmed lines.
fn lines(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

async fn fetch_lines(url: &str) -> Result<Vec<String>> {
    let response = reqwest::Client::new()
        .get(url)
        .header(reqwest::header::USER_AGENT, concat!("cloudflare-utils/", env!("CARGO_PKG_VERSION")))
        .send()
        .await
        .with_context(|| format!("Error fetching IPs from {}", url))?;
    let status = response.status();
    if !status.is_success() {
        bail!("error fetching IPs from URL: received status code {}", status.as_u16());
    }
    let body = response.text().await.context("Error reading IPs from URL")?;
    Ok(lines(&body))
}

async fn fetch_ips(ctx: &Context, source: &ListSource, github_token: Option<&str>) -> Result<Vec<String>> {
    match source {
        ListSource::Cloudflare { include_china } => {
            let ranges = ctx
                .client
                .cloudflare_ips(*include_china)
                .await
                .context("Error getting Cloudflare IPs")?;
            let mut ips = ranges.ipv4_cidrs;
            ips.extend(ranges.ipv6_cidrs);
            if *include_china {
                ips.extend(ranges.jdcloud_cidrs);
            }
            Ok(ips)
        }
        ListSource::UptimeRobot => fetch_lines(UPTIME_ROBOT_URL)
            .await
            .context("Error getting Uptime Robot IPs"),
        ListSource::GitHub { exclude } => {
            let meta = GitHubClient::new(github_token)?
                .meta()
                .await
                .context("Error getting GitHub IPs")?;
            Ok(meta.ranges(exclude))
        }
        ListSource::Url(url) => fetch_lines(url).await,
        ListSource::File(path) => {
            if !path.exists() {
                bail!("file does not exist: {}", path.display());
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Error reading file {}", path.display()))?;
            Ok(lines(&data))
        }
    }
}

fn default_comment() -> String {
    format!(
        "Added by cloudflare-utils sync-list on {}",
        Local::now().format("%d %b %y %H:%M %z")
    )
}

/// Keep the IPs of the requested version, all sharing `comment`.
pub fn build_items(ips: Vec<String>, version: IpVersion, comment: &str) -> Vec<ListItem> {
    ips.into_iter()
        .filter(|ip| {
            if ip.is_empty() {
                warn!("Skipping empty IP");
            }
            !ip.is_empty() && version.accepts(ip)
        })
        .map(|ip| ListItem {
            ip,
            comment: comment.to_string(),
        })
        .collect()
}

impl SyncListArgs {
    fn source(&self) -> Result<ListSource> {
        let Some(source) = self.source.as_deref().or(self.source_arg.as_deref()) else {
            bail!("source must be provided as an argument or with --source");
        };
        Ok(ListSource::parse(source)?)
    }

    fn item_comment(&self) -> String {
        if self.no_comment {
            return String::new();
        }
        match self.comment.as_deref().filter(|c| !c.is_empty()) {
            Some(comment) => comment.to_string(),
            None => default_comment(),
        }
    }
}

/// Id of the target list, looked up by name and created when missing.
async fn resolve_list(
    ctx: &Context,
    orchestrator: &Orchestrator<'_>,
    account_id: &str,
    args: &SyncListArgs,
) -> Result<String> {
    if let Some(id) = args.list_id.as_deref().filter(|id| !id.is_empty()) {
        return Ok(id.to_string());
    }
    let Some(name) = args.list_name.as_deref().filter(|n| !n.is_empty()) else {
        bail!("either --list-id or --list-name must be provided");
    };

    info!(name, "Fetching list by name");
    let lists = ctx
        .client
        .list_lists(account_id)
        .await
        .context("Error fetching lists")?;
    if let Some(list) = lists.into_iter().find(|l| l.name == name) {
        info!(name, id = %list.id, "Found list");
        return Ok(list.id);
    }

    if args.dry_run {
        println!("Dry Run: would create list with name {}", name);
        return Ok(String::new());
    }
    orchestrator.authorize().await?;
    info!(name, "List not found, creating it");
    let list = ctx
        .client
        .create_list(account_id, name, "ip", LIST_DESCRIPTION)
        .await
        .context("Error creating list")?;
    info!(name, id = %list.id, "Created list");
    Ok(list.id)
}

pub async fn sync(ctx: &Context, args: SyncListArgs) -> Result<()> {
    let source = args.source()?;
    let account_id = ctx.account_id()?;
    debug!(source = ?source, "Resolved source");

    let ips = fetch_ips(ctx, &source, args.github_token.as_deref()).await?;
    if ips.is_empty() {
        bail!("no IPs found to sync");
    }
    let items = build_items(ips, args.ip_version, &args.item_comment());

    let orchestrator = ctx.orchestrator(REQUIRED);
    let list_id = resolve_list(ctx, &orchestrator, &account_id, &args).await?;
    info!(count = items.len(), list_id = %list_id, "Syncing IPs");

    let replacement = ListReplacement::new(ctx.client.clone(), account_id, list_id.clone());
    let options = RunOptions {
        dry_run: args.dry_run,
        no_wait: args.no_wait,
        ..RunOptions::default()
    };
    match orchestrator
        .replace(&replacement, &replacement, items, &options)
        .await?
    {
        RunOutcome::NothingToDo => println!("No IPs of the requested version to sync"),
        RunOutcome::DryRun { items } if list_id.is_empty() => {
            println!("Dry Run: would sync {} IPs to the new list", items.len())
        }
        RunOutcome::DryRun { items } => {
            println!("Dry Run: would sync {} IPs to list ID {}", items.len(), list_id)
        }
        RunOutcome::Started { operation_id } => println!(
            "Started async operation to replace list items. Operation ID: {}",
            operation_id
        ),
        RunOutcome::Completed(summary) => {
            debug!(elapsed = ?summary.elapsed, "List sync operation completed");
            println!("Successfully synced {} IPs to list ID {}", summary.selected, list_id);
        }
    }
    Ok(())
}

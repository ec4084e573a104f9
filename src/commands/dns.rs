//! DNS commands: `dns-purge` and `dns-cleaner`.

use anyhow::{bail, Context as _, Result};
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{report_deletions, Context, Mutation};
use crate::bulk::{
    fetch_all, BulkError, ListOptions, PurgeConfirmation, Resource, RunOptions, RunOutcome,
    Selection,
};
use crate::cloudflare::types::DnsRecord;
use crate::cloudflare::{Capability, DnsRecordPages};
use crate::config::ZoneSelector;

const REQUIRED: &[Capability] = &[Capability::DnsWrite];

// ============================================================
// dns-purge
// ============================================================

#[derive(Debug, Clone, Args)]
pub struct DnsPurgeArgs {
    /// Auto confirm to delete records
    #[arg(long)]
    pub confirm: bool,

    /// Don't actually delete anything. Just print what would be deleted
    #[arg(long)]
    pub dry_run: bool,
}

/// Delete every record of the zone after confirmation read from `input`.
pub async fn purge<R>(ctx: &Context, args: DnsPurgeArgs, input: R) -> Result<()>
where
    R: BufRead + Send + 'static,
{
    info!("Starting DNS purge");
    let orchestrator = ctx.orchestrator(REQUIRED);
    orchestrator.authorize().await?;

    let zone_id = ctx.zone_id().await?;
    let source = DnsRecordPages::new(ctx.client.clone(), zone_id.clone());
    let records = orchestrator
        .collect(
            &source,
            &Selection::Everything(PurgeConfirmation::explicit()),
            &ListOptions::default(),
        )
        .await?;

    if !records.is_empty() && !args.dry_run && !args.confirm {
        print!("About to remove {} records.\nContinue (y/n): ", records.len());
        std::io::stdout().flush().context("Failed to write prompt")?;
        let answer = read_answer(input, &ctx.cancel).await?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("Did not get `y` as input. Exiting");
            return Ok(());
        }
    }

    let options = RunOptions {
        dry_run: args.dry_run,
        ..RunOptions::default()
    };
    let outcome = orchestrator
        .execute(records, &options, delete_record(ctx, zone_id))
        .await?;
    report_deletions(outcome, "DNS records", |r: &DnsRecord| {
        format!("{} {} ({})", r.record_type, r.name, r.id)
    })
}

/// Read one line from `input` without blocking the runtime. The reader runs
/// on a detached thread so a pending read never holds up shutdown.
async fn read_answer<R>(mut input: R, cancel: &CancellationToken) -> Result<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut answer = String::new();
        let _ = tx.send(input.read_line(&mut answer).map(|_| answer));
    });
    tokio::select! {
        biased;
        _ = cancel.cancelled() => bail!("cancelled while waiting for confirmation"),
        answer = rx => answer
            .context("Confirmation reader stopped")?
            .context("Failed to read confirmation"),
    }
}

/// Mutation deleting one record of `zone_id`.
fn delete_record<T: Resource>(ctx: &Context, zone_id: String) -> impl Fn(T) -> Mutation {
    let client = ctx.client.clone();
    move |record: T| {
        let client = client.clone();
        let zone_id = zone_id.clone();
        let record_id = record.id().to_string();
        Box::pin(async move { client.delete_dns_record(&zone_id, &record_id).await }) as Mutation
    }
}

// ============================================================
// dns-cleaner
// ============================================================

#[derive(Debug, Clone, Args)]
pub struct DnsCleanerArgs {
    #[command(subcommand)]
    pub action: Option<CleanerAction>,

    #[command(flatten)]
    pub options: CleanerOptions,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CleanerAction {
    /// Download DNS records
    Download,
    /// Upload DNS records
    Upload,
}

#[derive(Debug, Clone, Args)]
pub struct CleanerOptions {
    /// Path to the dns record file
    #[arg(short = 'f', long, env = "DNS_RECORD_FILE", default_value = "./dns-records.yml", global = true)]
    pub dns_file: PathBuf,

    /// Mark records for removal by default
    #[arg(short = 'k', long, env = "NO_KEEP", global = true)]
    pub no_keep: bool,

    /// Auto marks DNS records that are numeric to be removed
    #[arg(short = 'q', long, env = "QUICK_CLEAN", global = true)]
    pub quick_clean: bool,

    /// Do not replace existing DNS file
    #[arg(short = 'n', long, global = true)]
    pub no_overwrite: bool,

    /// Remove the DNS file once the upload completes
    #[arg(long, global = true)]
    pub remove_file: bool,

    /// Do not make any changes. Only applies to upload
    #[arg(long, global = true)]
    pub dry_run: bool,
}

/// One record of the editable file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub id: String,
    pub keep: bool,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
}

impl Resource for RecordEntry {
    fn id(&self) -> &str {
        &self.id
    }
}

/// The YAML file written by download and read by upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFile {
    pub zone_name: String,
    pub zone_id: String,
    #[serde(default)]
    pub records: Vec<RecordEntry>,
}

impl RecordFile {
    /// Build the file contents, deciding `keep` for every record.
    pub fn build(
        zone_id: String,
        zone_name: String,
        records: Vec<DnsRecord>,
        no_keep: bool,
        quick_clean: bool,
    ) -> Result<Self> {
        if quick_clean && no_keep {
            bail!("using `--quick-clean` is not supported with `--no-keep`");
        }
        let records = records
            .into_iter()
            .map(|record| {
                let keep = if quick_clean {
                    !is_numeric_label(&zone_name, &record.name)
                } else {
                    !no_keep
                };
                RecordEntry {
                    id: record.id,
                    keep,
                    name: record.name,
                    record_type: record.record_type,
                    content: record.content,
                }
            })
            .collect();
        Ok(Self {
            zone_name,
            zone_id,
            records,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Error reading DNS file {}", path.display()))?;
        serde_yaml::from_str(&data).with_context(|| format!("Error parsing DNS file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self).context("Error serializing DNS records")?;
        std::fs::write(path, data)
            .with_context(|| format!("Error writing DNS file {}", path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Error restricting permissions of {}", path.display()))?;
        }
        Ok(())
    }

    pub fn marked_for_removal(&self) -> Vec<RecordEntry> {
        self.records.iter().filter(|r| !r.keep).cloned().collect()
    }
}

/// Whether the record's label under the zone is a plain number.
fn is_numeric_label(zone_name: &str, record_name: &str) -> bool {
    let suffix = format!(".{}", zone_name);
    let label = record_name.strip_suffix(&suffix).unwrap_or(record_name);
    debug!(label, "Stripped record");
    label.parse::<i64>().is_ok()
}

pub async fn cleaner(ctx: &Context, args: DnsCleanerArgs) -> Result<()> {
    match args.action {
        Some(CleanerAction::Download) => download(ctx, &args.options).await,
        Some(CleanerAction::Upload) => upload(ctx, &args.options).await,
        None => {
            let exists = args.options.dns_file.exists();
            debug!(exists, "Existing DNS file");
            if exists {
                info!("Uploading DNS records");
                upload(ctx, &args.options).await
            } else {
                info!("Downloading DNS records");
                download(ctx, &args.options).await
            }
        }
    }
}

pub async fn download(ctx: &Context, options: &CleanerOptions) -> Result<()> {
    if options.no_overwrite && options.dns_file.exists() {
        bail!("existing DNS file found and no overwrite flag is set");
    }
    if options.quick_clean && options.no_keep {
        bail!("using `--quick-clean` is not supported with `--no-keep`");
    }

    let zone_id = ctx.zone_id().await?;
    let zone_name = match ctx.config.zone()? {
        ZoneSelector::Name(name) => name,
        ZoneSelector::Id(_) => ctx
            .config
            .zone_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| zone_id.clone()),
    };

    let source = DnsRecordPages::new(ctx.client.clone(), zone_id.clone());
    let records = fetch_all(&source, &ListOptions::default(), &ctx.cancel)
        .await
        .map_err(BulkError::from)?;

    let file = RecordFile::build(zone_id, zone_name, records, options.no_keep, options.quick_clean)?;
    file.save(&options.dns_file)?;
    println!(
        "Wrote {} DNS records to {} ({} marked for removal)",
        file.records.len(),
        options.dns_file.display(),
        file.marked_for_removal().len()
    );
    Ok(())
}

pub async fn upload(ctx: &Context, options: &CleanerOptions) -> Result<()> {
    if !options.dns_file.exists() {
        bail!("no DNS file found at '{}'", options.dns_file.display());
    }
    let file = RecordFile::load(&options.dns_file)?;
    let to_remove = file.marked_for_removal();
    info!(
        total = file.records.len(),
        to_remove = to_remove.len(),
        "Loaded DNS file"
    );

    let orchestrator = ctx.orchestrator(REQUIRED);
    orchestrator.authorize().await?;

    let run = RunOptions {
        dry_run: options.dry_run,
        ..RunOptions::default()
    };
    let outcome = orchestrator
        .execute(to_remove, &run, delete_record(ctx, file.zone_id.clone()))
        .await?;
    let completed = matches!(outcome, RunOutcome::Completed(_) | RunOutcome::NothingToDo);
    report_deletions(outcome, "DNS records", |r: &RecordEntry| {
        format!("{} {} ({})", r.record_type, r.name, r.id)
    })?;

    if completed && options.remove_file {
        if let Err(e) = std::fs::remove_file(&options.dns_file) {
            warn!(error = %e, "Error deleting old DNS file");
        }
    }
    Ok(())
}

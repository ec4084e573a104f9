//! Pages commands: `prune-deployments` and `purge-deployments`.

use anyhow::{bail, Context as _, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{ArgAction, Args};
use tracing::info;

use super::{report_deletions, Context, Mutation};
use crate::bulk::{ListOptions, PurgeConfirmation, RunOptions, RunOutcome, Selection};
use crate::cloudflare::types::Deployment;
use crate::cloudflare::{Capability, DeploymentPages};

const REQUIRED: &[Capability] = &[Capability::PagesWrite];
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const LOTS_OF_DEPLOYMENTS_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, Args)]
pub struct PagesArgs {
    /// Pages project to delete deployments from
    #[arg(short = 'p', long = "project", env = "CF_PAGES_PROJECT")]
    pub project: String,

    /// Don't actually delete anything. Just print what would be deleted
    #[arg(long)]
    pub dry_run: bool,

    /// Keep retrying deployments that failed to delete
    #[arg(long)]
    pub persist_retry: bool,

    /// Retry rounds used with --persist-retry
    #[arg(long, default_value_t = 10)]
    pub persist_retry_amount: u32,

    /// Use smaller pages and fewer parallel deletes for large projects
    #[arg(long)]
    pub lots_of_deployments: bool,

    /// Also delete aliased deployments
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub force: bool,
}

impl PagesArgs {
    fn run_options(&self) -> RunOptions {
        let mut options = RunOptions {
            dry_run: self.dry_run,
            persist_retry: self.persist_retry.then_some(self.persist_retry_amount),
            ..RunOptions::default()
        };
        if self.lots_of_deployments {
            options.concurrency = LOTS_OF_DEPLOYMENTS_CONCURRENCY;
            options.list = ListOptions::default().many_items(true);
        }
        options
    }
}

#[derive(Debug, Clone, Args)]
pub struct PruneArgs {
    #[command(flatten)]
    pub pages: PagesArgs,

    /// Branch to delete deployments from
    #[arg(short = 'b', long, env = "CF_PAGES_BRANCH", conflicts_with_all = ["before", "after"])]
    pub branch: Option<String>,

    /// Delete deployments created before this time (YYYY-MM-DDTHH:MM:SS, UTC)
    #[arg(long, value_parser = parse_timestamp)]
    pub before: Option<DateTime<Utc>>,

    /// Delete deployments created after this time (YYYY-MM-DDTHH:MM:SS, UTC)
    #[arg(long, value_parser = parse_timestamp)]
    pub after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Args)]
pub struct PurgeArgs {
    #[command(flatten)]
    pub pages: PagesArgs,

    /// Delete the project once every deployment is gone
    #[arg(long)]
    pub delete_project: bool,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    NaiveDateTime::parse_from_str(value, TIME_FORMAT)
        .map(|t| t.and_utc())
        .map_err(|e| format!("expected YYYY-MM-DDTHH:MM:SS: {}", e))
}

/// Which deployments a prune removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentFilter {
    Branch(String),
    /// Both bounds apply when both are set
    Window {
        before: Option<DateTime<Utc>>,
        after: Option<DateTime<Utc>>,
    },
}

impl DeploymentFilter {
    pub fn from_args(args: &PruneArgs) -> Result<Self> {
        if let Some(branch) = args.branch.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            return Ok(Self::Branch(branch.to_string()));
        }
        if args.before.is_none() && args.after.is_none() {
            bail!("need either `--branch`, `--before` or `--after` set");
        }
        Ok(Self::Window {
            before: args.before,
            after: args.after,
        })
    }

    pub fn matches(&self, deployment: &Deployment) -> bool {
        match self {
            Self::Branch(branch) => deployment.branch() == Some(branch.as_str()),
            Self::Window { before, after } => {
                before.map_or(true, |b| deployment.created_on < b)
                    && after.map_or(true, |a| deployment.created_on > a)
            }
        }
    }

    pub fn into_selection(self) -> Selection<Deployment> {
        Selection::matching(move |d| self.matches(d))
    }
}

fn delete_deployment(ctx: &Context, account_id: String, args: &PagesArgs) -> impl Fn(Deployment) -> Mutation {
    let client = ctx.client.clone();
    let project = args.project.clone();
    let force = args.force;
    move |deployment: Deployment| {
        let client = client.clone();
        let account_id = account_id.clone();
        let project = project.clone();
        Box::pin(async move {
            client
                .delete_deployment(&account_id, &project, &deployment.id, force)
                .await
        }) as Mutation
    }
}

fn describe(deployment: &Deployment) -> String {
    match deployment.branch() {
        Some(branch) => format!(
            "{} (branch {}, created {})",
            deployment.id,
            branch,
            deployment.created_on.format(TIME_FORMAT)
        ),
        None => format!("{} (created {})", deployment.id, deployment.created_on.format(TIME_FORMAT)),
    }
}

pub async fn prune(ctx: &Context, args: PruneArgs) -> Result<()> {
    let filter = DeploymentFilter::from_args(&args)?;
    let account_id = ctx.account_id()?;
    info!(project = %args.pages.project, filter = ?filter, "Pruning deployments");

    let source = DeploymentPages::new(ctx.client.clone(), account_id.clone(), args.pages.project.clone());
    let outcome = ctx
        .orchestrator(REQUIRED)
        .delete(
            &source,
            filter.into_selection(),
            &args.pages.run_options(),
            delete_deployment(ctx, account_id, &args.pages),
        )
        .await?;
    report_deletions(outcome, "deployments", describe)
}

pub async fn purge(ctx: &Context, args: PurgeArgs) -> Result<()> {
    let account_id = ctx.account_id()?;
    let project = args.pages.project.clone();
    info!(project = %project, "Purging deployments");

    let source = DeploymentPages::new(ctx.client.clone(), account_id.clone(), project.clone());
    let outcome = ctx
        .orchestrator(REQUIRED)
        .delete(
            &source,
            Selection::Everything(PurgeConfirmation::explicit()),
            &args.pages.run_options(),
            delete_deployment(ctx, account_id.clone(), &args.pages),
        )
        .await?;
    let nothing_to_do = matches!(outcome, RunOutcome::NothingToDo);
    let dry_run = matches!(outcome, RunOutcome::DryRun { .. });
    report_deletions(outcome, "deployments", describe)?;

    if !args.delete_project {
        return Ok(());
    }
    if nothing_to_do {
        info!(project = %project, "No deployments deleted, leaving project in place");
        return Ok(());
    }
    if dry_run {
        println!("Dry Run: would delete project {}", project);
        return Ok(());
    }
    ctx.client
        .delete_project(&account_id, &project)
        .await
        .with_context(|| format!("Error deleting project {}", project))?;
    println!("Deleted project {}", project);
    Ok(())
}

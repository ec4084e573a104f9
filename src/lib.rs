//! Bulk administration for Cloudflare accounts
//!
//! [`bulk`] holds the engine: pagination, the permission gate, bounded batch
//! execution and async operation polling. It speaks in Cloudflare credentials
//! and capabilities but never touches HTTP; [`cloudflare`] binds it to the v4
//! API and [`commands`] exposes it as CLI subcommands.

pub mod bulk;
pub mod cloudflare;
pub mod commands;
pub mod config;
pub mod github;

pub use bulk::{BulkError, Orchestrator, RunOutcome, Selection};
pub use cloudflare::{Capability, CloudflareClient, Credential};
pub use config::{CloudflareConfig, ConfigError};

//! Cloudflare v4 API client and its bindings to the bulk engine.

pub mod client;
pub mod credentials;
pub mod permissions;
#[cfg(feature = "secret-manager")]
pub mod secrets;
pub mod sources;
pub mod types;

pub use client::{ClientOptions, CloudflareClient};
pub use credentials::Credential;
pub use permissions::Capability;
pub use sources::{DeploymentPages, DnsRecordPages, ListReplacement, TunnelPages};

//! Cloudflare v4 API types
//!
//! Only the fields the tool reads are modelled; everything else in the
//! responses is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bulk::Resource;

// ============================================================
// Envelope
// ============================================================

/// Every v4 response is wrapped in this envelope
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<WireMessage>,
    pub result: Option<T>,
    pub result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireMessage {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Pagination metadata of a list response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultInfo {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub per_page: u32,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub total_count: u32,
}

// ============================================================
// Zones and DNS
// ============================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub ttl: u32,
    #[serde(default)]
    pub proxied: bool,
}

impl Resource for DnsRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

// ============================================================
// Pages
// ============================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Deployment {
    pub id: String,
    #[serde(default)]
    pub short_id: String,
    #[serde(default)]
    pub environment: String,
    pub created_on: DateTime<Utc>,
    #[serde(default)]
    pub deployment_trigger: Option<DeploymentTrigger>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeploymentTrigger {
    #[serde(rename = "type", default)]
    pub trigger_type: String,
    pub metadata: Option<TriggerMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerMetadata {
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub commit_hash: String,
}

impl Deployment {
    /// Branch that triggered the deployment, if the remote reported one.
    pub fn branch(&self) -> Option<&str> {
        self.deployment_trigger
            .as_ref()
            .and_then(|t| t.metadata.as_ref())
            .map(|m| m.branch.as_str())
    }
}

impl Resource for Deployment {
    fn id(&self) -> &str {
        &self.id
    }
}

// ============================================================
// Lists
// ============================================================

#[derive(Debug, Clone, Deserialize)]
pub struct IpList {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub num_items: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateListRequest<'a> {
    pub name: &'a str,
    pub kind: &'a str,
    pub description: &'a str,
}

/// One item of an IP list replacement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListItem {
    pub ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OperationIdResult {
    pub operation_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BulkOperation {
    #[allow(dead_code)]
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

// ============================================================
// Tokens
// ============================================================

#[derive(Debug, Deserialize)]
pub(crate) struct VerifiedToken {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiToken {
    #[serde(default)]
    pub policies: Vec<WirePolicy>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WirePolicy {
    pub id: String,
    #[serde(default)]
    pub permission_groups: Vec<PermissionGroupRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PermissionGroupRef {
    pub id: String,
}

// ============================================================
// Cache
// ============================================================

/// Body of a cache purge request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeRequest {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub purge_everything: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub prefixes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
}

impl PurgeRequest {
    pub fn everything() -> Self {
        Self {
            purge_everything: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.purge_everything
            && self.files.is_empty()
            && self.tags.is_empty()
            && self.prefixes.is_empty()
            && self.hosts.is_empty()
    }
}

// ============================================================
// Tunnels
// ============================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Tunnel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub connections: Vec<TunnelConnection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TunnelConnection {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_version: String,
    #[serde(default)]
    pub colo_name: String,
}

impl Resource for Tunnel {
    fn id(&self) -> &str {
        &self.id
    }
}

// ============================================================
// IP ranges
// ============================================================

/// Published Cloudflare edge ranges
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudflareIps {
    #[serde(default)]
    pub ipv4_cidrs: Vec<String>,
    #[serde(default)]
    pub ipv6_cidrs: Vec<String>,
    #[serde(default)]
    pub jdcloud_cidrs: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_branch_from_trigger() {
        let deployment: Deployment = serde_json::from_value(serde_json::json!({
            "id": "f64788e9-fccd-4d4a-a28a-cb84f88f6",
            "short_id": "f64788e9",
            "environment": "preview",
            "created_on": "2024-03-01T10:00:00.000000Z",
            "deployment_trigger": {
                "type": "ad_hoc",
                "metadata": {"branch": "feature/login", "commit_hash": "abc123"}
            }
        }))
        .unwrap();

        assert_eq!(deployment.branch(), Some("feature/login"));
    }

    #[test]
    fn test_deployment_without_trigger_metadata() {
        let deployment: Deployment = serde_json::from_value(serde_json::json!({
            "id": "d1",
            "created_on": "2024-03-01T10:00:00Z",
            "deployment_trigger": {"type": "github:push", "metadata": null}
        }))
        .unwrap();

        assert_eq!(deployment.branch(), None);
    }

    #[test]
    fn test_purge_request_serialization_skips_empty() {
        let body = serde_json::to_value(PurgeRequest {
            tags: vec!["static".to_string()],
            ..PurgeRequest::default()
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"tags": ["static"]}));

        let body = serde_json::to_value(PurgeRequest::everything()).unwrap();
        assert_eq!(body, serde_json::json!({"purge_everything": true}));
        assert!(PurgeRequest::default().is_empty());
    }

    #[test]
    fn test_list_item_without_comment() {
        let body = serde_json::to_value(ListItem {
            ip: "192.0.2.1".to_string(),
            comment: String::new(),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"ip": "192.0.2.1"}));
    }
}

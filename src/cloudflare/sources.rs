//! Bindings of the bulk engine's remote traits to Cloudflare endpoints.

use async_trait::async_trait;
use std::sync::Arc;

use super::client::CloudflareClient;
use super::types::{Deployment, DnsRecord, ListItem, Tunnel};
use crate::bulk::{
    ApiError, BulkMutationStarter, Cursor, OperationHandle, OperationStatus,
    OperationStatusSource, Page, PageSource,
};

/// DNS records of one zone
pub struct DnsRecordPages {
    client: Arc<CloudflareClient>,
    zone_id: String,
}

impl DnsRecordPages {
    pub fn new(client: Arc<CloudflareClient>, zone_id: impl Into<String>) -> Self {
        Self {
            client,
            zone_id: zone_id.into(),
        }
    }
}

#[async_trait]
impl PageSource for DnsRecordPages {
    type Item = DnsRecord;

    async fn list_page(&self, cursor: Cursor) -> Result<Page<DnsRecord>, ApiError> {
        self.client.list_dns_records(&self.zone_id, cursor).await
    }
}

/// Deployments of one Pages project
pub struct DeploymentPages {
    client: Arc<CloudflareClient>,
    account_id: String,
    project: String,
}

impl DeploymentPages {
    pub fn new(
        client: Arc<CloudflareClient>,
        account_id: impl Into<String>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            client,
            account_id: account_id.into(),
            project: project.into(),
        }
    }
}

#[async_trait]
impl PageSource for DeploymentPages {
    type Item = Deployment;

    async fn list_page(&self, cursor: Cursor) -> Result<Page<Deployment>, ApiError> {
        self.client
            .list_deployments(&self.account_id, &self.project, cursor)
            .await
    }
}

/// Tunnels of one account
pub struct TunnelPages {
    client: Arc<CloudflareClient>,
    account_id: String,
    include_deleted: bool,
}

impl TunnelPages {
    pub fn new(client: Arc<CloudflareClient>, account_id: impl Into<String>, include_deleted: bool) -> Self {
        Self {
            client,
            account_id: account_id.into(),
            include_deleted,
        }
    }
}

#[async_trait]
impl PageSource for TunnelPages {
    type Item = Tunnel;

    async fn list_page(&self, cursor: Cursor) -> Result<Page<Tunnel>, ApiError> {
        self.client
            .list_tunnels(&self.account_id, self.include_deleted, cursor)
            .await
    }
}

/// Full replacement of an account IP list, plus status of the resulting
/// bulk operation
pub struct ListReplacement {
    client: Arc<CloudflareClient>,
    account_id: String,
    list_id: String,
}

impl ListReplacement {
    pub fn new(
        client: Arc<CloudflareClient>,
        account_id: impl Into<String>,
        list_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            account_id: account_id.into(),
            list_id: list_id.into(),
        }
    }
}

#[async_trait]
impl BulkMutationStarter for ListReplacement {
    type Item = ListItem;

    async fn start(&self, items: Vec<ListItem>) -> Result<OperationHandle, ApiError> {
        self.client
            .replace_list_items(&self.account_id, &self.list_id, &items)
            .await
    }
}

#[async_trait]
impl OperationStatusSource for ListReplacement {
    async fn operation_status(&self, handle: &OperationHandle) -> Result<OperationStatus, ApiError> {
        self.client
            .list_bulk_operation(&self.account_id, &handle.id)
            .await
    }
}

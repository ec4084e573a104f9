//! Cloudflare API Client
//!
//! Thin wrapper over the v4 REST API. Every call shares one send path, which
//! applies authentication, the optional client-side rate limit and the
//! envelope decoding.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, trace};

use super::credentials::Credential;
use super::types::{
    ApiToken, BulkOperation, CloudflareIps, CreateListRequest, Deployment, DnsRecord, Envelope,
    IpList, ListItem, OperationIdResult, PurgeRequest, ResultInfo, Tunnel, VerifiedToken, Zone,
};
use crate::bulk::{
    ApiError, Cursor, OperationHandle, OperationStatus, Page, RemoteMessage, TokenIntrospector,
    TokenPolicy, TokenStatus,
};

pub const CLOUDFLARE_API: &str = "https://api.cloudflare.com/client/v4";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}

/// Client construction options
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Maximum requests per second
    pub rate_limit: Option<u32>,
    /// Appended to the user agent
    pub extra_user_agent: Option<String>,
}

/// Cloudflare API client
pub struct CloudflareClient {
    client: Client,
    credential: Credential,
    base_url: String,
    limiter: Option<Mutex<Interval>>,
}

impl CloudflareClient {
    /// Create a new client. Must be called inside a tokio runtime when a rate
    /// limit is set.
    pub fn new(credential: Credential, options: ClientOptions) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(user_agent(options.extra_user_agent.as_deref()))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let limiter = options.rate_limit.filter(|rps| *rps > 0).map(|rps| {
            let mut interval = tokio::time::interval(Duration::from_secs(1) / rps);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Mutex::new(interval)
        });

        Ok(Self {
            client,
            credential,
            base_url: CLOUDFLARE_API.to_string(),
            limiter,
        })
    }

    /// Point the client at another API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credential {
            Credential::ScopedToken(token) => request.bearer_auth(token),
            Credential::LegacyKeyPair { email, key } => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", key),
        }
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.lock().await.tick().await;
        }
    }

    /// Send a request and decode the envelope, checking `success`.
    async fn send_envelope<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Envelope<T>, ApiError> {
        self.throttle().await;

        let response = self.authorize(request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        trace!(status = status.as_u16(), bytes = body.len(), "Cloudflare response");

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(ApiError::Remote {
                    status: status.as_u16(),
                    errors: Vec::new(),
                })
            }
            Err(e) => return Err(ApiError::Decode(e.to_string())),
        };

        if !envelope.success || !status.is_success() {
            return Err(ApiError::Remote {
                status: status.as_u16(),
                errors: envelope
                    .errors
                    .into_iter()
                    .map(|e| RemoteMessage {
                        code: e.code,
                        message: e.message,
                    })
                    .collect(),
            });
        }
        Ok(envelope)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        self.send_envelope(request)
            .await?
            .result
            .ok_or_else(|| ApiError::Decode("response has no result".to_string()))
    }

    async fn send_page<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        cursor: Cursor,
    ) -> Result<Page<T>, ApiError> {
        let envelope = self
            .send_envelope::<Vec<T>>(paginate(request, cursor))
            .await?;
        Ok(into_page(
            envelope.result.unwrap_or_default(),
            envelope.result_info,
            cursor,
        ))
    }

    async fn send_unit(&self, request: RequestBuilder) -> Result<(), ApiError> {
        self.send_envelope::<serde_json::Value>(request).await.map(|_| ())
    }

    // ============================================================
    // Zones and DNS
    // ============================================================

    /// Look up a zone id by name
    pub async fn zone_id_by_name(&self, zone_name: &str) -> Result<String, ApiError> {
        debug!(zone = zone_name, "Looking up zone ID");
        let zones: Vec<Zone> = self
            .send(self.client.get(self.url("/zones")).query(&[("name", zone_name)]))
            .await?;

        zones
            .into_iter()
            .find(|zone| zone.name == zone_name)
            .map(|zone| zone.id)
            .ok_or_else(|| ApiError::remote(404, 1001, format!("zone not found: {}", zone_name)))
    }

    pub async fn list_dns_records(
        &self,
        zone_id: &str,
        cursor: Cursor,
    ) -> Result<Page<DnsRecord>, ApiError> {
        let url = self.url(&format!("/zones/{}/dns_records", zone_id));
        self.send_page(self.client.get(url), cursor).await
    }

    pub async fn delete_dns_record(&self, zone_id: &str, record_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("/zones/{}/dns_records/{}", zone_id, record_id));
        self.send_unit(self.client.delete(url)).await
    }

    // ============================================================
    // Pages
    // ============================================================

    pub async fn list_deployments(
        &self,
        account_id: &str,
        project: &str,
        cursor: Cursor,
    ) -> Result<Page<Deployment>, ApiError> {
        let url = self.url(&format!(
            "/accounts/{}/pages/projects/{}/deployments",
            account_id, project
        ));
        self.send_page(self.client.get(url), cursor).await
    }

    /// Delete a deployment; `force` also removes aliased deployments.
    pub async fn delete_deployment(
        &self,
        account_id: &str,
        project: &str,
        deployment_id: &str,
        force: bool,
    ) -> Result<(), ApiError> {
        let url = self.url(&format!(
            "/accounts/{}/pages/projects/{}/deployments/{}",
            account_id, project, deployment_id
        ));
        let mut request = self.client.delete(url);
        if force {
            request = request.query(&[("force", "true")]);
        }
        self.send_unit(request).await
    }

    pub async fn delete_project(&self, account_id: &str, project: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("/accounts/{}/pages/projects/{}", account_id, project));
        self.send_unit(self.client.delete(url)).await
    }

    // ============================================================
    // Lists
    // ============================================================

    pub async fn list_lists(&self, account_id: &str) -> Result<Vec<IpList>, ApiError> {
        let url = self.url(&format!("/accounts/{}/rules/lists", account_id));
        self.send(self.client.get(url)).await
    }

    pub async fn create_list(
        &self,
        account_id: &str,
        name: &str,
        kind: &str,
        description: &str,
    ) -> Result<IpList, ApiError> {
        let url = self.url(&format!("/accounts/{}/rules/lists", account_id));
        let body = CreateListRequest {
            name,
            kind,
            description,
        };
        self.send(self.client.post(url).json(&body)).await
    }

    /// Replace every item of a list. Runs asynchronously on the remote.
    pub async fn replace_list_items(
        &self,
        account_id: &str,
        list_id: &str,
        items: &[ListItem],
    ) -> Result<OperationHandle, ApiError> {
        let url = self.url(&format!("/accounts/{}/rules/lists/{}/items", account_id, list_id));
        let result: OperationIdResult = self.send(self.client.put(url).json(items)).await?;
        Ok(OperationHandle::new(result.operation_id))
    }

    pub async fn list_bulk_operation(
        &self,
        account_id: &str,
        operation_id: &str,
    ) -> Result<OperationStatus, ApiError> {
        let url = self.url(&format!(
            "/accounts/{}/rules/lists/bulk_operations/{}",
            account_id, operation_id
        ));
        let operation: BulkOperation = self.send(self.client.get(url)).await?;
        Ok(OperationStatus::from_wire(&operation.status, operation.error))
    }

    // ============================================================
    // Cache
    // ============================================================

    pub async fn purge_cache(&self, zone_id: &str, request: &PurgeRequest) -> Result<(), ApiError> {
        let url = self.url(&format!("/zones/{}/purge_cache", zone_id));
        self.send_unit(self.client.post(url).json(request)).await
    }

    // ============================================================
    // Tunnels
    // ============================================================

    /// List tunnels; deleted tunnels are only included when asked for.
    pub async fn list_tunnels(
        &self,
        account_id: &str,
        include_deleted: bool,
        cursor: Cursor,
    ) -> Result<Page<Tunnel>, ApiError> {
        let url = self.url(&format!("/accounts/{}/cfd_tunnel", account_id));
        let mut request = self.client.get(url);
        if !include_deleted {
            request = request.query(&[("is_deleted", "false")]);
        }
        self.send_page(request, cursor).await
    }

    // ============================================================
    // IP ranges
    // ============================================================

    /// Cloudflare's published edge ranges, optionally with the China network.
    pub async fn cloudflare_ips(&self, include_china: bool) -> Result<CloudflareIps, ApiError> {
        let mut request = self.client.get(self.url("/ips"));
        if include_china {
            request = request.query(&[("networks", "jdcloud")]);
        }
        self.send(request).await
    }
}

#[async_trait]
impl TokenIntrospector for CloudflareClient {
    async fn verify_token(&self) -> Result<TokenStatus, ApiError> {
        let verified: VerifiedToken = self
            .send(self.client.get(self.url("/user/tokens/verify")))
            .await?;
        Ok(TokenStatus {
            id: verified.id,
            status: verified.status,
        })
    }

    async fn token_policies(&self, token_id: &str) -> Result<Vec<TokenPolicy>, ApiError> {
        let url = self.url(&format!("/user/tokens/{}", token_id));
        let token: ApiToken = self.send(self.client.get(url)).await?;
        Ok(token
            .policies
            .into_iter()
            .map(|policy| TokenPolicy {
                id: policy.id,
                permission_groups: policy.permission_groups.into_iter().map(|g| g.id).collect(),
            })
            .collect())
    }
}

fn user_agent(extra: Option<&str>) -> String {
    let base = format!("cloudflare-utils/{}", env!("CARGO_PKG_VERSION"));
    match extra.map(str::trim).filter(|e| !e.is_empty()) {
        Some(extra) => format!("{} {}", base, extra),
        None => base,
    }
}

fn paginate(request: RequestBuilder, cursor: Cursor) -> RequestBuilder {
    let request = request.query(&[("page", cursor.page)]);
    match cursor.per_page {
        Some(per_page) => request.query(&[("per_page", per_page)]),
        None => request,
    }
}

fn into_page<T>(items: Vec<T>, info: Option<ResultInfo>, cursor: Cursor) -> Page<T> {
    let info = info.unwrap_or_default();
    let page = if info.page == 0 { cursor.page } else { info.page };
    let per_page = if info.per_page == 0 {
        cursor.per_page.unwrap_or(items.len() as u32)
    } else {
        info.per_page
    };
    // Some endpoints report only total_count
    let total_pages = if info.total_pages == 0 && info.total_count > 0 && per_page > 0 {
        info.total_count.div_ceil(per_page)
    } else {
        info.total_pages
    };
    Page {
        items,
        page,
        total_pages,
        per_page,
    }
}


#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::bulk::{fetch_all, ListOptions};
    use crate::cloudflare::sources::DnsRecordPages;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_mock_client(mock_server: &MockServer, credential: Credential) -> CloudflareClient {
        CloudflareClient::new(credential, ClientOptions::default())
            .unwrap()
            .with_base_url(mock_server.uri())
    }

    fn record(id: &str, name: &str) -> serde_json::Value {
        serde_json::json!({"id": id, "type": "A", "name": name, "content": "192.0.2.1", "ttl": 1, "proxied": false})
    }

    #[tokio::test]
    async fn test_zone_lookup_by_name() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/zones"))
            .and(query_param("name", "example.com"))
            .and(header("Authorization", "Bearer test_token_12345"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "errors": [],
                "result": [{"id": "023e105f4ecef8ad9ca31a8372d0c353", "name": "example.com"}]
            })))
            .mount(&mock_server)
            .await;

        let client = create_mock_client(&mock_server, Credential::token("test_token_12345"));
        let zone_id = client.zone_id_by_name("example.com").await.unwrap();

        assert_eq!(zone_id, "023e105f4ecef8ad9ca31a8372d0c353");
    }

    #[tokio::test]
    async fn test_legacy_credential_headers() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/zones/z1/dns_records/r1"))
            .and(header("X-Auth-Email", "ops@example.com"))
            .and(header("X-Auth-Key", "global-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "errors": [], "result": {"id": "r1"}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_mock_client(
            &mock_server,
            Credential::key_pair("ops@example.com", "global-key"),
        );
        client.delete_dns_record("z1", "r1").await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_errors_are_decoded() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/user/tokens/verify"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "success": false,
                "errors": [{"code": 9109, "message": "Unauthorized to access requested resource"}],
                "result": null
            })))
            .mount(&mock_server)
            .await;

        let client = create_mock_client(&mock_server, Credential::token("t"));
        let err = client.verify_token().await.unwrap_err();

        match &err {
            ApiError::Remote { status, errors } => {
                assert_eq!(*status, 403);
                assert_eq!(errors[0].code, 9109);
            }
            other => panic!("expected remote error, got {:?}", other),
        }
        assert!(err.is_self_introspection_denied());
    }

    #[tokio::test]
    async fn test_non_json_error_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/accounts/acc/rules/lists"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
            .mount(&mock_server)
            .await;

        let client = create_mock_client(&mock_server, Credential::token("t"));
        let err = client.list_lists("acc").await.unwrap_err();

        assert!(matches!(err, ApiError::Remote { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_token_policies_flatten_permission_groups() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/user/tokens/tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "errors": [],
                "result": {
                    "id": "tok-1",
                    "status": "active",
                    "policies": [{
                        "id": "pol-1",
                        "effect": "allow",
                        "permission_groups": [
                            {"id": "4755a26eedb94da69e1066d98aa820be", "name": "DNS Write"}
                        ]
                    }]
                }
            })))
            .mount(&mock_server)
            .await;

        let client = create_mock_client(&mock_server, Credential::token("t"));
        let policies = client.token_policies("tok-1").await.unwrap();

        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].permission_groups, vec!["4755a26eedb94da69e1066d98aa820be"]);
    }

    #[tokio::test]
    async fn test_dns_records_paginate_over_http() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/zones/z1/dns_records"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "errors": [],
                "result": [record("r1", "a.example.com"), record("r2", "b.example.com")],
                "result_info": {"page": 1, "per_page": 2, "total_pages": 2, "count": 2, "total_count": 3}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/zones/z1/dns_records"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "errors": [],
                "result": [record("r3", "c.example.com")],
                "result_info": {"page": 2, "per_page": 2, "total_pages": 2, "count": 1, "total_count": 3}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = Arc::new(create_mock_client(&mock_server, Credential::token("t")));
        let source = DnsRecordPages::new(client, "z1");
        let records = fetch_all(&source, &ListOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2", "r3"]);
    }

    #[tokio::test]
    async fn test_delete_deployment_forces() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/accounts/acc/pages/projects/site/deployments/dep-1"))
            .and(query_param("force", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "errors": [], "result": null
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_mock_client(&mock_server, Credential::token("t"));
        client.delete_deployment("acc", "site", "dep-1", true).await.unwrap();
    }

    #[tokio::test]
    async fn test_replace_list_items_returns_operation() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/accounts/acc/rules/lists/list-1/items"))
            .and(body_json(serde_json::json!([
                {"ip": "192.0.2.0/24", "comment": "office"},
                {"ip": "2001:db8::/32"}
            ])))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "errors": [],
                "result": {"operation_id": "4da8780eeb215e6cb7f48dd981c4ea02"}
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/accounts/acc/rules/lists/bulk_operations/4da8780eeb215e6cb7f48dd981c4ea02"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "errors": [],
                "result": {"id": "4da8780eeb215e6cb7f48dd981c4ea02", "status": "failed", "error": "This list is at the maximum number of items"}
            })))
            .mount(&mock_server)
            .await;

        let client = create_mock_client(&mock_server, Credential::token("t"));
        let items = vec![
            ListItem { ip: "192.0.2.0/24".to_string(), comment: "office".to_string() },
            ListItem { ip: "2001:db8::/32".to_string(), comment: String::new() },
        ];
        let handle = client.replace_list_items("acc", "list-1", &items).await.unwrap();
        assert_eq!(handle.id, "4da8780eeb215e6cb7f48dd981c4ea02");

        let status = client.list_bulk_operation("acc", &handle.id).await.unwrap();
        assert_eq!(
            status,
            OperationStatus::Failed("This list is at the maximum number of items".to_string())
        );
    }

    #[tokio::test]
    async fn test_purge_cache_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/zones/z1/purge_cache"))
            .and(body_json(serde_json::json!({"purge_everything": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "errors": [], "result": {"id": "z1"}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_mock_client(&mock_server, Credential::token("t"));
        client.purge_cache("z1", &PurgeRequest::everything()).await.unwrap();
    }

    #[tokio::test]
    async fn test_rate_limit_spaces_requests() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "errors": [], "result": null
            })))
            .mount(&mock_server)
            .await;

        let client = CloudflareClient::new(
            Credential::token("t"),
            ClientOptions {
                rate_limit: Some(20),
                extra_user_agent: None,
            },
        )
        .unwrap()
        .with_base_url(mock_server.uri());

        let started = std::time::Instant::now();
        for id in ["r1", "r2", "r3"] {
            client.delete_dns_record("z1", id).await.unwrap();
        }
        // First tick is immediate, the next two wait 50ms each
        assert!(started.elapsed() >= Duration::from_millis(90));
    }
}

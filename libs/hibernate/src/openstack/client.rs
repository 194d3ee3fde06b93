//! Nova compute API client.
//!
//! Speaks just enough of the identity and compute APIs for hibernation:
//! token issuance, catalog endpoint resolution, server listing by name
//! prefix, and the os-stop / os-start server actions. The client does no
//! state classification; it hands back raw records.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

use stratus_cloud_config::{AuthMethod, CloudProfile, ValidatedAuth};

use crate::machine::InstanceRecord;

/// Request timeout for identity and compute calls.
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Compute API errors.
#[derive(Debug, Error)]
pub enum ComputeError {
    /// Transport-level failure, including per-request timeouts.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },

    /// The identity service rejected the credentials.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The service catalog has no matching compute endpoint.
    #[error("no compute endpoint for region '{region}' interface '{interface}'")]
    MissingEndpoint { region: String, interface: String },

    /// The API answered with a body this client cannot interpret.
    #[error("malformed api response: {0}")]
    Decode(String),
}

/// Minimal compute API surface the hibernation actuator needs.
#[async_trait]
pub trait ComputeClient: Send + Sync {
    /// List servers whose name starts with `name_prefix`.
    async fn list_servers(&self, name_prefix: &str) -> Result<Vec<InstanceRecord>, ComputeError>;

    /// Request a server stop. Idempotence is the caller's concern.
    async fn stop_server(&self, server_id: &str) -> Result<(), ComputeError>;

    /// Request a server start.
    async fn start_server(&self, server_id: &str) -> Result<(), ComputeError>;
}

impl fmt::Debug for dyn ComputeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeClient").finish_non_exhaustive()
    }
}

/// Resolved identity session: the token plus the compute endpoint it
/// unlocked.
#[derive(Debug, Clone)]
struct Session {
    token: String,
    compute_url: String,
}

/// A Nova client authenticated through the identity v3 token flow.
///
/// The token and compute endpoint are resolved lazily on the first call
/// and cached for the client's lifetime. Clients are built fresh per
/// actuator invocation, so there is no renewal path.
pub struct NovaComputeClient {
    http: reqwest::Client,
    auth: ValidatedAuth,
    region: Option<String>,
    interface: String,
    session: OnceCell<Session>,
}

impl NovaComputeClient {
    /// Build a client from validated auth parameters plus the profile's
    /// connection options (region, interface, TLS trust).
    pub fn new(auth: ValidatedAuth, profile: &CloudProfile) -> Result<Self, ComputeError> {
        let mut builder = reqwest::Client::builder().timeout(API_TIMEOUT);

        if let Some(pem) = profile.cacert.as_deref() {
            for certificate in reqwest::Certificate::from_pem_bundle(pem.as_bytes())? {
                builder = builder.add_root_certificate(certificate);
            }
        }
        if !profile.verify_tls() {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            http: builder.build()?,
            auth,
            region: profile.region_name.clone(),
            interface: profile.interface().to_string(),
            session: OnceCell::new(),
        })
    }

    async fn session(&self) -> Result<&Session, ComputeError> {
        self.session.get_or_try_init(|| self.authenticate()).await
    }

    /// Request a token and resolve the compute endpoint from the catalog
    /// the identity service returns alongside it.
    async fn authenticate(&self) -> Result<Session, ComputeError> {
        let url = format!("{}/auth/tokens", self.auth.auth_url.trim_end_matches('/'));
        debug!(url = %url, "Requesting identity token");

        let response = self
            .http
            .post(&url)
            .json(&token_request(&self.auth))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(ComputeError::Auth(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ComputeError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let token = response
            .headers()
            .get("x-subject-token")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| {
                ComputeError::Decode("token response missing x-subject-token header".to_string())
            })?;

        let body: TokenResponse = response.json().await?;
        if let Some(expires_at) = body.token.expires_at {
            debug!(expires_at = %expires_at, "Identity token issued");
        }

        let compute_url = self.resolve_compute_endpoint(&body.token.catalog)?;
        debug!(compute_url = %compute_url, "Resolved compute endpoint");

        Ok(Session { token, compute_url })
    }

    fn resolve_compute_endpoint(&self, catalog: &[CatalogService]) -> Result<String, ComputeError> {
        for service in catalog.iter().filter(|s| s.service_type == "compute") {
            for endpoint in &service.endpoints {
                if !endpoint.interface.eq_ignore_ascii_case(&self.interface) {
                    continue;
                }
                let region_matches = match (&self.region, &endpoint.region) {
                    (Some(want), Some(have)) => want == have,
                    (Some(_), None) => false,
                    (None, _) => true,
                };
                if region_matches {
                    return Ok(endpoint.url.trim_end_matches('/').to_string());
                }
            }
        }
        Err(ComputeError::MissingEndpoint {
            region: self.region.clone().unwrap_or_else(|| "any".to_string()),
            interface: self.interface.clone(),
        })
    }

    async fn server_action(
        &self,
        server_id: &str,
        body: serde_json::Value,
    ) -> Result<(), ComputeError> {
        let session = self.session().await?;
        let url = format!("{}/servers/{}/action", session.compute_url, server_id);

        let response = self
            .http
            .post(&url)
            .header("x-auth-token", &session.token)
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ComputeClient for NovaComputeClient {
    async fn list_servers(&self, name_prefix: &str) -> Result<Vec<InstanceRecord>, ComputeError> {
        let session = self.session().await?;
        let mut records = Vec::new();
        let mut next: Option<String> = None;

        loop {
            let request = match &next {
                Some(link) => self.http.get(link),
                None => self
                    .http
                    .get(format!("{}/servers/detail", session.compute_url))
                    .query(&[("name", name_prefix)]),
            };

            let response = request
                .header("x-auth-token", &session.token)
                .send()
                .await?;
            let response = ensure_success(response).await?;
            let page: ServerListPage = response.json().await?;

            debug!(count = page.servers.len(), "Fetched server page");
            records.extend(page.servers.into_iter().map(ServerDetail::into_record));

            next = page
                .servers_links
                .into_iter()
                .find(|link| link.rel == "next")
                .map(|link| link.href);
            if next.is_none() {
                break;
            }
        }

        Ok(records)
    }

    async fn stop_server(&self, server_id: &str) -> Result<(), ComputeError> {
        debug!(server_id = %server_id, "Requesting server stop");
        self.server_action(server_id, json!({ "os-stop": null })).await
    }

    async fn start_server(&self, server_id: &str) -> Result<(), ComputeError> {
        debug!(server_id = %server_id, "Requesting server start");
        self.server_action(server_id, json!({ "os-start": null })).await
    }
}

/// Map a non-success response to an error, pulling the body into the
/// message.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ComputeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ComputeError::Auth(message));
    }
    Err(ComputeError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Identity v3 token request body.
fn token_request(auth: &ValidatedAuth) -> serde_json::Value {
    let identity = match &auth.method {
        AuthMethod::Password {
            username,
            password,
            user_domain_name,
        } => {
            let mut user = json!({
                "name": username,
                "password": password,
            });
            if let Some(domain) = user_domain_name {
                user["domain"] = json!({ "name": domain });
            }
            json!({
                "methods": ["password"],
                "password": { "user": user },
            })
        }
        AuthMethod::ApplicationCredential { id, secret } => json!({
            "methods": ["application_credential"],
            "application_credential": { "id": id, "secret": secret },
        }),
    };

    let mut request = json!({ "auth": { "identity": identity } });

    // Application credentials carry their own scope; only password auth
    // takes an explicit project scope.
    if matches!(auth.method, AuthMethod::Password { .. }) {
        if let Some(scope) = project_scope(auth) {
            request["auth"]["scope"] = scope;
        }
    }

    request
}

fn project_scope(auth: &ValidatedAuth) -> Option<serde_json::Value> {
    let mut project = if let Some(name) = &auth.project_name {
        json!({ "name": name })
    } else if let Some(id) = &auth.project_id {
        json!({ "id": id })
    } else {
        return None;
    };
    if let Some(domain) = &auth.project_domain_name {
        project["domain"] = json!({ "name": domain });
    }
    Some(json!({ "project": project }))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: Vec<CatalogService>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CatalogService {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    url: String,
    #[serde(default)]
    region: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServerListPage {
    #[serde(default)]
    servers: Vec<ServerDetail>,
    #[serde(default)]
    servers_links: Vec<PageLink>,
}

#[derive(Debug, Deserialize)]
struct PageLink {
    rel: String,
    href: String,
}

#[derive(Debug, Deserialize)]
struct ServerDetail {
    id: String,
    name: String,
    status: String,
    #[serde(rename = "OS-EXT-STS:task_state", default)]
    task_state: Option<String>,
    #[serde(rename = "hostId", default)]
    host_id: Option<String>,
}

impl ServerDetail {
    fn into_record(self) -> InstanceRecord {
        InstanceRecord {
            id: self.id,
            name: self.name,
            status: self.status,
            task_state: self.task_state,
            host_id: self.host_id,
        }
    }
}

/// Mock compute client for tests and local development.
///
/// Holds a fixed set of server records; power actions are recorded but
/// do not mutate the records. Failures can be injected per server id or
/// for listing as a whole.
#[derive(Default)]
pub struct MockComputeClient {
    servers: Mutex<Vec<InstanceRecord>>,
    fail_actions: Mutex<HashSet<String>>,
    fail_listing: AtomicBool,
    action_delay: Mutex<Option<Duration>>,
    list_calls: AtomicU64,
    stop_calls: Mutex<Vec<String>>,
    start_calls: Mutex<Vec<String>>,
}

impl MockComputeClient {
    /// Create a mock with no servers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock seeded with the given records.
    pub fn with_servers(servers: Vec<InstanceRecord>) -> Self {
        Self {
            servers: Mutex::new(servers),
            ..Self::default()
        }
    }

    /// Make power actions against `server_id` fail.
    pub fn set_action_failure(&self, server_id: &str) {
        self.fail_actions
            .lock()
            .expect("mock state lock")
            .insert(server_id.to_string());
    }

    /// Make every list call fail.
    pub fn set_list_failure(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    /// Delay every power action by `delay` before it completes.
    pub fn set_action_delay(&self, delay: Duration) {
        *self.action_delay.lock().expect("mock state lock") = Some(delay);
    }

    /// Server ids stop was called for, in call order.
    pub fn stop_calls(&self) -> Vec<String> {
        self.stop_calls.lock().expect("mock state lock").clone()
    }

    /// Server ids start was called for, in call order.
    pub fn start_calls(&self) -> Vec<String> {
        self.start_calls.lock().expect("mock state lock").clone()
    }

    /// Number of list calls made.
    pub fn list_call_count(&self) -> u64 {
        self.list_calls.load(Ordering::SeqCst)
    }

    async fn action(&self, server_id: &str) -> Result<(), ComputeError> {
        let delay = *self.action_delay.lock().expect("mock state lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .fail_actions
            .lock()
            .expect("mock state lock")
            .contains(server_id);
        if failing {
            return Err(ComputeError::Api {
                status: 409,
                message: format!("injected failure for {server_id}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ComputeClient for MockComputeClient {
    async fn list_servers(&self, name_prefix: &str) -> Result<Vec<InstanceRecord>, ComputeError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(ComputeError::Api {
                status: 503,
                message: "injected listing failure".to_string(),
            });
        }
        let servers = self.servers.lock().expect("mock state lock");
        Ok(servers
            .iter()
            .filter(|s| s.name.starts_with(name_prefix))
            .cloned()
            .collect())
    }

    async fn stop_server(&self, server_id: &str) -> Result<(), ComputeError> {
        self.stop_calls
            .lock()
            .expect("mock state lock")
            .push(server_id.to_string());
        self.action(server_id).await
    }

    async fn start_server(&self, server_id: &str) -> Result<(), ComputeError> {
        self.start_calls
            .lock()
            .expect("mock state lock")
            .push(server_id.to_string());
        self.action(server_id).await
    }
}

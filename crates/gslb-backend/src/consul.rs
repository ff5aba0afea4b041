//! Consul catalog sink
//!
//! Each GslbContent becomes an external node in the Consul catalog carrying
//! the Gslb's service and one health check. Consul ESM runs the check, so the
//! node is marked `external-probe=false`.
//!
//! Catalog registration upserts services and checks by ID and never removes
//! the ones it is not given. Both IDs are therefore derived from the node id
//! alone, so re-registering a node after a serviceName or probe change
//! replaces the previous entries instead of accumulating them.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use gslb_common::crd::Backend;
use gslb_common::{Error, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::health::{CheckTarget, HealthCheck};
use crate::RegistrationSink;

const SINK: &str = "consul";
const TOKEN_HEADER: &str = "X-Consul-Token";

/// Connection settings for the Consul HTTP API
#[derive(Clone, Debug)]
pub struct ConsulConfig {
    /// `host[:port]` of the Consul agent or server
    pub address: String,
    /// `http` or `https`
    pub scheme: String,
    /// Datacenter to register in; the agent's own when unset
    pub datacenter: Option<String>,
    /// ACL token
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8500".to_string(),
            scheme: "http".to_string(),
            datacenter: None,
            token: None,
            timeout: Duration::from_secs(15),
        }
    }
}

/// Registration sink backed by the Consul catalog API
#[derive(Clone, Debug)]
pub struct ConsulCatalog {
    client: reqwest::Client,
    base_url: String,
    datacenter: Option<String>,
    token: Option<String>,
}

impl ConsulCatalog {
    /// Create a catalog client from `config`
    pub fn new(config: ConsulConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: format!("{}://{}", config.scheme, config.address.trim_end_matches('/')),
            datacenter: config.datacenter,
            token: config.token,
        })
    }

    async fn put<T: Serialize>(&self, path: &str, body: &T, what: &str) -> Result<()> {
        let request = self
            .client
            .put(format!("{}{path}", self.base_url))
            .json(body);
        self.send(request, what).await.map(|_| ())
    }

    async fn send(
        &self,
        mut request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<reqwest::Response> {
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::backend(SINK, format!("failed to {what}: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("failed to {what}: HTTP {status}: {}", body.trim());
        if status.is_server_error() || status.as_u16() == 429 {
            Err(Error::backend(SINK, message))
        } else {
            Err(Error::backend_permanent(SINK, message))
        }
    }
}

#[async_trait]
impl RegistrationSink for ConsulCatalog {
    fn name(&self) -> &'static str {
        SINK
    }

    async fn register(
        &self,
        node_id: &str,
        address: &str,
        service_name: &str,
        backend: &Backend,
    ) -> Result<()> {
        let check = HealthCheck::from_backend(backend)?;
        let check_id = check_id(node_id);
        let registration = CatalogRegistration::new(
            self.datacenter.as_deref(),
            node_id,
            address,
            service_name,
            &check_id,
            &check,
        );

        debug!(node = %node_id, service = %service_name, check = check.name, "registering catalog node");
        self.put("/v1/catalog/register", &registration, "register consul service")
            .await?;
        info!(node = %node_id, service = %service_name, "registered catalog node");
        Ok(())
    }

    async fn deregister(&self, node_id: &str) -> Result<()> {
        let deregistration = CatalogDeregistration {
            datacenter: self.datacenter.as_deref(),
            node: node_id,
        };
        // Consul answers 200 for nodes it does not know
        self.put(
            "/v1/catalog/deregister",
            &deregistration,
            "deregister consul service",
        )
        .await?;
        info!(node = %node_id, "deregistered catalog node");
        Ok(())
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CatalogRegistration<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    datacenter: Option<&'a str>,
    node: &'a str,
    address: &'a str,
    node_meta: BTreeMap<&'static str, &'static str>,
    service: AgentService<'a>,
    checks: Vec<CatalogCheck<'a>>,
}

impl<'a> CatalogRegistration<'a> {
    fn new(
        datacenter: Option<&'a str>,
        node: &'a str,
        address: &'a str,
        service_name: &'a str,
        check_id: &'a str,
        check: &'a HealthCheck,
    ) -> Self {
        Self {
            datacenter,
            node,
            address,
            node_meta: BTreeMap::from([("external-node", "true"), ("external-probe", "false")]),
            service: AgentService {
                id: node,
                service: service_name,
            },
            checks: vec![CatalogCheck {
                node,
                check_id,
                name: check.name,
                status: "passing",
                definition: CheckDefinition::from(check),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct AgentService<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "Service")]
    service: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CatalogCheck<'a> {
    node: &'a str,
    #[serde(rename = "CheckID")]
    check_id: &'a str,
    name: &'a str,
    status: &'a str,
    definition: CheckDefinition<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CheckDefinition<'a> {
    #[serde(rename = "HTTP", skip_serializing_if = "Option::is_none")]
    http: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    header: Option<&'a BTreeMap<String, Vec<String>>>,
    #[serde(rename = "TCP", skip_serializing_if = "Option::is_none")]
    tcp: Option<&'a str>,
    interval: String,
    timeout: String,
}

impl<'a> From<&'a HealthCheck> for CheckDefinition<'a> {
    fn from(check: &'a HealthCheck) -> Self {
        let (http, header, tcp) = match &check.target {
            CheckTarget::Http { url, headers } => (
                Some(url.as_str()),
                (!headers.is_empty()).then_some(headers),
                None,
            ),
            CheckTarget::Tcp { address } => (None, None, Some(address.as_str())),
        };
        Self {
            http,
            header,
            tcp,
            interval: go_duration(check.interval),
            timeout: go_duration(check.timeout),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CatalogDeregistration<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    datacenter: Option<&'a str>,
    node: &'a str,
}

/// Check ID of a node's single health check
fn check_id(node_id: &str) -> String {
    format!("{node_id}-check")
}

/// Duration in the `10s` / `1500ms` form Consul parses
fn go_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

//! GSLBI driver sink
//!
//! The driver is a separate process reached over gRPC, normally on a unix
//! socket. On startup the operator waits for the driver to report ready and
//! learns its name; afterwards a [`ConnectionSupervisor`] keeps probing it
//! and the process exits when the driver stays unreachable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gslb_common::crd::{Backend, ProbeHandler, MISSING_HANDLER};
use gslb_common::retry::{retry_with_backoff_if, RetryConfig};
use gslb_common::{Error, Result};
use gslb_proto::controller_client::ControllerClient;
use gslb_proto::identity_client::IdentityClient;
use gslb_proto::{CreateGslbRequest, DeleteGslbRequest, GetPluginInfoRequest, ProbeRequest};
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tonic::Code;
use tower::service_fn;
use tracing::{debug, error, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::health::probe_host;
use crate::RegistrationSink;

const SINK: &str = "driver";

/// Default location of the driver socket
pub const DEFAULT_DRIVER_ADDRESS: &str = "/var/run/gslbi/gslbi.sock";

/// Consecutive failed probes after which the driver is considered lost
pub const MAX_PROBE_FAILURES: u32 = 3;

/// Probes made during the startup handshake before giving up
pub const DEFAULT_HANDSHAKE_ATTEMPTS: u32 = 30;

/// The calls the operator makes on a GSLBI driver
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GslbiClient: Send + Sync {
    /// Liveness probe; `Ok(false)` means reachable but not ready
    async fn probe(&self) -> std::result::Result<bool, tonic::Status>;

    /// Name the driver reports for itself
    async fn plugin_name(&self) -> std::result::Result<String, tonic::Status>;

    /// Create or update a GSLB entry, returning the driver's id for it
    async fn create_gslb(
        &self,
        request: CreateGslbRequest,
    ) -> std::result::Result<String, tonic::Status>;

    /// Delete a GSLB entry by id
    async fn delete_gslb(&self, gslb_id: String) -> std::result::Result<(), tonic::Status>;
}

/// [`GslbiClient`] over a tonic channel
#[derive(Clone, Debug)]
pub struct TonicGslbiClient {
    identity: IdentityClient<Channel>,
    controller: ControllerClient<Channel>,
}

impl TonicGslbiClient {
    /// Build a client over an existing channel
    pub fn new(channel: Channel) -> Self {
        Self {
            identity: IdentityClient::new(channel.clone()),
            controller: ControllerClient::new(channel),
        }
    }

    /// Connect lazily to `address`
    ///
    /// `http://` and `https://` addresses are dialed over TCP; anything else
    /// (optionally prefixed with `unix://`) is a unix socket path. The channel
    /// reconnects on its own, so no I/O happens here.
    pub fn connect(address: &str, connect_timeout: Duration) -> Result<Self> {
        let channel = if address.starts_with("http://") || address.starts_with("https://") {
            Endpoint::from_shared(address.to_string())
                .map_err(|e| Error::validation(format!("invalid driver address '{address}': {e}")))?
                .connect_timeout(connect_timeout)
                .connect_lazy()
        } else {
            let path = address.trim_start_matches("unix://").to_string();
            // the URI is required by the API but unused by the connector
            Endpoint::from_static("http://[::]:50051")
                .connect_timeout(connect_timeout)
                .connect_with_connector_lazy(service_fn(move |_: Uri| {
                    let path = path.clone();
                    async move { Ok::<_, std::io::Error>(TokioIo::new(UnixStream::connect(path).await?)) }
                }))
        };
        Ok(Self::new(channel))
    }
}

#[async_trait]
impl GslbiClient for TonicGslbiClient {
    async fn probe(&self) -> std::result::Result<bool, tonic::Status> {
        let response = self.identity.clone().probe(ProbeRequest {}).await?;
        // an unset field means ready
        Ok(response.into_inner().ready.unwrap_or(true))
    }

    async fn plugin_name(&self) -> std::result::Result<String, tonic::Status> {
        let response = self
            .identity
            .clone()
            .get_plugin_info(GetPluginInfoRequest {})
            .await?;
        Ok(response.into_inner().name)
    }

    async fn create_gslb(
        &self,
        request: CreateGslbRequest,
    ) -> std::result::Result<String, tonic::Status> {
        let response = self.controller.clone().create_gslb(request).await?;
        response
            .into_inner()
            .gslb
            .map(|g| g.gslb_id)
            .ok_or_else(|| tonic::Status::internal("driver returned no gslb in CreateGSLB response"))
    }

    async fn delete_gslb(&self, gslb_id: String) -> std::result::Result<(), tonic::Status> {
        self.controller
            .clone()
            .delete_gslb(DeleteGslbRequest { gslb_id })
            .await?;
        Ok(())
    }
}

/// Whether a gRPC status code is worth retrying
fn is_transient(code: Code) -> bool {
    matches!(
        code,
        Code::Cancelled
            | Code::DeadlineExceeded
            | Code::Unavailable
            | Code::ResourceExhausted
            | Code::Aborted
    )
}

fn status_error(what: &str, status: tonic::Status) -> Error {
    let message = format!("{what}: {}: {}", status.code(), status.message());
    if is_transient(status.code()) {
        Error::backend(SINK, message)
    } else {
        Error::backend_permanent(SINK, message)
    }
}

/// Build the CreateGSLB request for one backend
///
/// Only HTTP probes can be expressed to the driver; the weight must parse as
/// a positive integer before anything is sent.
pub fn create_request(
    node_id: &str,
    address: &str,
    service_name: &str,
    backend: &Backend,
) -> Result<CreateGslbRequest> {
    let weight = backend
        .parsed_weight()
        .map_err(|msg| Error::validation_for_field("spec.backend.weight", msg))?;

    let probe = backend
        .probe
        .as_ref()
        .ok_or_else(|| Error::validation(MISSING_HANDLER))?;
    let ProbeHandler::HttpGet(http) = &probe.handler else {
        return Err(Error::validation_for_field(
            "spec.backend.probe",
            format!(
                "the driver only supports httpGet probes, got {}",
                probe.handler.kind()
            ),
        ));
    };

    let mut parameters = HashMap::from([
        ("probe_timeout".to_string(), probe.timeout_seconds.to_string()),
        ("probe_interval".to_string(), probe.period_seconds.to_string()),
        ("probe_scheme".to_string(), http.scheme.clone()),
        (
            "probe_address".to_string(),
            probe_host(address, http.host.as_deref()).to_string(),
        ),
        ("probe_path".to_string(), http.path.clone()),
    ]);
    if let Some(port) = http.port {
        parameters.insert("probe_port".to_string(), port.to_string());
    }

    Ok(CreateGslbRequest {
        name: node_id.to_string(),
        service_name: service_name.to_string(),
        host: address.to_string(),
        weight,
        parameters,
    })
}

/// Registration sink backed by a GSLBI driver
#[derive(Clone)]
pub struct DriverSink {
    client: Arc<dyn GslbiClient>,
}

impl DriverSink {
    /// Create a sink over `client`
    pub fn new(client: Arc<dyn GslbiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RegistrationSink for DriverSink {
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
        let request = create_request(node_id, address, service_name, backend)?;
        let gslb_id = self
            .client
            .create_gslb(request)
            .await
            .map_err(|s| status_error("CreateGSLB failed", s))?;
        info!(node = %node_id, gslb_id = %gslb_id, service = %service_name, "registered with driver");
        Ok(())
    }

    async fn deregister(&self, node_id: &str) -> Result<()> {
        match self.client.delete_gslb(node_id.to_string()).await {
            Ok(()) => {
                info!(node = %node_id, "deregistered from driver");
                Ok(())
            }
            Err(status) if status.code() == Code::NotFound => {
                debug!(node = %node_id, "driver has no entry, nothing to deregister");
                Ok(())
            }
            Err(status) => Err(status_error("DeleteGSLB failed", status)),
        }
    }
}

// =============================================================================
// Startup handshake and supervision
// =============================================================================

/// Timing of the startup handshake
#[derive(Clone, Debug)]
pub struct HandshakeConfig {
    /// Deadline of each Probe / GetPluginInfo call
    pub call_timeout: Duration,
    /// Backoff between probes until the driver is ready; must be bounded
    pub retry: RetryConfig,
}

impl HandshakeConfig {
    /// Handshake with `call_timeout` per call, giving up after `attempts` probes
    pub fn new(call_timeout: Duration, attempts: u32) -> Self {
        Self {
            call_timeout,
            retry: RetryConfig::with_max_attempts(attempts.max(1)),
        }
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), DEFAULT_HANDSHAKE_ATTEMPTS)
    }
}

async fn probe_once(client: &dyn GslbiClient, timeout: Duration) -> Result<()> {
    match crate::bounded("driver probe", timeout, async {
        client.probe().await.map_err(|s| status_error("Probe failed", s))
    })
    .await?
    {
        true => Ok(()),
        false => Err(Error::backend(SINK, "driver is not ready")),
    }
}

/// Wait for the driver to become ready and discover its name
///
/// Transient probe failures are retried per `config.retry` until its attempts
/// run out. A permanent failure, exhausted attempts, or an empty driver name
/// is returned as an error and is fatal to the caller.
pub async fn handshake(client: &dyn GslbiClient, config: &HandshakeConfig) -> Result<String> {
    retry_with_backoff_if(&config.retry, "driver probe", Error::is_retryable, || {
        probe_once(client, config.call_timeout)
    })
    .await?;

    let name = crate::bounded("driver name discovery", config.call_timeout, async {
        client
            .plugin_name()
            .await
            .map_err(|s| status_error("GetPluginInfo failed", s))
    })
    .await?;

    if name.is_empty() {
        return Err(Error::backend_permanent(SINK, "driver reported an empty name"));
    }
    info!(driver = %name, "connected to GSLBI driver");
    Ok(name)
}

/// Periodically probes the driver and reports when it is lost
pub struct ConnectionSupervisor {
    client: Arc<dyn GslbiClient>,
    interval: Duration,
    call_timeout: Duration,
    max_failures: u32,
}

impl ConnectionSupervisor {
    /// Supervise `client`, probing every `interval`
    pub fn new(client: Arc<dyn GslbiClient>, interval: Duration, call_timeout: Duration) -> Self {
        Self {
            client,
            interval,
            call_timeout,
            max_failures: MAX_PROBE_FAILURES,
        }
    }

    /// Probe until `max_failures` consecutive probes fail, then return the last error
    pub async fn run(self) -> Error {
        let mut failures = 0u32;
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match probe_once(self.client.as_ref(), self.call_timeout).await {
                Ok(()) => {
                    if failures > 0 {
                        info!(after = failures, "driver connection recovered");
                    }
                    failures = 0;
                }
                Err(e) => {
                    failures += 1;
                    if failures >= self.max_failures {
                        error!(failures, error = %e, "lost connection to GSLBI driver");
                        return e;
                    }
                    warn!(failures, error = %e, "driver probe failed");
                }
            }
        }
    }
}

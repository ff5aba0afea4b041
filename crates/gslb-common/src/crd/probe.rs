//! Health probe types for GSLB backends
//!
//! Mirrors the shape of a Kubernetes container probe, but the handler is a
//! sum type: exactly one of `httpGet`, `tcpSocket` or `exec` is present.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Health probe for a backend
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", try_from = "RawProbe")]
pub struct Probe {
    /// Probe handler (exactly one variant)
    #[serde(flatten)]
    pub handler: ProbeHandler,

    /// Seconds after which the probe times out
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,

    /// How often (in seconds) to perform the probe
    #[serde(default = "default_period_seconds")]
    pub period_seconds: u32,

    /// Seconds to wait before the first probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_seconds: Option<u32>,

    /// Consecutive successes for the backend to be considered healthy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_threshold: Option<u32>,

    /// Consecutive failures for the backend to be considered unhealthy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,
}

fn default_timeout_seconds() -> u32 {
    1
}

fn default_period_seconds() -> u32 {
    10
}

/// Wire form of a probe, before the single-handler rule is enforced
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProbe {
    #[serde(default)]
    http_get: Option<HttpGetAction>,
    #[serde(default)]
    tcp_socket: Option<TcpSocketAction>,
    #[serde(default)]
    exec: Option<ExecAction>,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u32,
    #[serde(default = "default_period_seconds")]
    period_seconds: u32,
    #[serde(default)]
    initial_delay_seconds: Option<u32>,
    #[serde(default)]
    success_threshold: Option<u32>,
    #[serde(default)]
    failure_threshold: Option<u32>,
}

impl TryFrom<RawProbe> for Probe {
    type Error = String;

    fn try_from(raw: RawProbe) -> Result<Self, Self::Error> {
        let mut handlers = Vec::with_capacity(1);
        if let Some(http) = raw.http_get {
            handlers.push(ProbeHandler::HttpGet(http));
        }
        if let Some(tcp) = raw.tcp_socket {
            handlers.push(ProbeHandler::TcpSocket(tcp));
        }
        if let Some(exec) = raw.exec {
            handlers.push(ProbeHandler::Exec(exec));
        }

        let handler = match handlers.len() {
            0 => return Err(MISSING_HANDLER.to_string()),
            1 => handlers.remove(0),
            _ => {
                let kinds: Vec<_> = handlers.iter().map(ProbeHandler::kind).collect();
                return Err(format!(
                    "exactly one probe handler may be specified, found: {}",
                    kinds.join(", ")
                ));
            }
        };

        Ok(Self {
            handler,
            timeout_seconds: raw.timeout_seconds,
            period_seconds: raw.period_seconds,
            initial_delay_seconds: raw.initial_delay_seconds,
            success_threshold: raw.success_threshold,
            failure_threshold: raw.failure_threshold,
        })
    }
}

/// Message for a probe without any handler
pub const MISSING_HANDLER: &str =
    "at least one check type must be specified: [\"httpGet\",\"exec\",\"tcpSocket\"]";

impl Probe {
    /// Build a probe with default timings around a handler
    pub fn new(handler: ProbeHandler) -> Self {
        Self {
            handler,
            timeout_seconds: default_timeout_seconds(),
            period_seconds: default_period_seconds(),
            initial_delay_seconds: None,
            success_threshold: None,
            failure_threshold: None,
        }
    }

    /// Probe timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_seconds))
    }

    /// Probe interval as a duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.period_seconds))
    }
}

/// The single active probe mechanism
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ProbeHandler {
    /// HTTP GET against the backend
    HttpGet(HttpGetAction),
    /// TCP connect to the backend
    TcpSocket(TcpSocketAction),
    /// Command executed by the sink
    Exec(ExecAction),
}

impl ProbeHandler {
    /// Short name of the probe family, used in errors and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeHandler::HttpGet(_) => "httpGet",
            ProbeHandler::TcpSocket(_) => "tcpSocket",
            ProbeHandler::Exec(_) => "exec",
        }
    }
}

/// HTTP GET probe
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpGetAction {
    /// Path to request
    #[serde(default = "default_path")]
    pub path: String,

    /// Port to connect to (scheme default when omitted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Host to connect to (backend host when omitted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Scheme to use, HTTP or HTTPS
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Custom request headers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_headers: Vec<HttpHeader>,
}

fn default_path() -> String {
    "/".to_string()
}

fn default_scheme() -> String {
    "HTTP".to_string()
}

/// A request header for an HTTP probe
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct HttpHeader {
    /// Header name
    pub name: String,
    /// Header value
    pub value: String,
}

/// TCP connect probe
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TcpSocketAction {
    /// Port to connect to
    pub port: u16,

    /// Host to connect to (backend host when omitted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Command probe
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ExecAction {
    /// Command line to execute
    pub command: Vec<String>,
}

//! Translation of a backend's probe into a sink health check

use std::collections::BTreeMap;
use std::time::Duration;

use gslb_common::crd::{Backend, HttpGetAction, ProbeHandler, TcpSocketAction, MISSING_HANDLER};
use gslb_common::{Error, Result};

/// A health check definition, independent of the sink that runs it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthCheck {
    /// Check name ("http-check" or "tcp-check")
    pub name: &'static str,
    /// What to probe
    pub target: CheckTarget,
    /// Time between probes
    pub interval: Duration,
    /// Deadline of a single probe
    pub timeout: Duration,
}

/// What a health check probes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckTarget {
    /// HTTP GET against a full URL
    Http {
        /// `scheme://host[:port]/path`
        url: String,
        /// Request headers, all values of one name grouped together
        headers: BTreeMap<String, Vec<String>>,
    },
    /// TCP connect to `host:port`
    Tcp {
        /// `host:port`
        address: String,
    },
}

impl HealthCheck {
    /// Build the health check for `backend`
    ///
    /// A backend without a probe, or with an exec probe, is a validation
    /// error: no sink can run it.
    pub fn from_backend(backend: &Backend) -> Result<Self> {
        let probe = backend
            .probe
            .as_ref()
            .ok_or_else(|| Error::validation(MISSING_HANDLER))?;

        let (name, target) = match &probe.handler {
            ProbeHandler::HttpGet(http) => ("http-check", http_target(&backend.host, http)),
            ProbeHandler::TcpSocket(tcp) => ("tcp-check", tcp_target(&backend.host, tcp)),
            ProbeHandler::Exec(_) => {
                return Err(Error::validation_for_field(
                    "spec.backend.probe.exec",
                    "exec probes are not supported by any registration sink",
                ))
            }
        };

        Ok(Self {
            name,
            target,
            interval: probe.interval(),
            timeout: probe.timeout(),
        })
    }
}

/// Host to probe: the probe's own host if set, otherwise the backend's
pub fn probe_host<'a>(backend_host: &'a str, probe_host: Option<&'a str>) -> &'a str {
    probe_host.filter(|h| !h.is_empty()).unwrap_or(backend_host)
}

fn http_target(backend_host: &str, http: &HttpGetAction) -> CheckTarget {
    let mut authority = probe_host(backend_host, http.host.as_deref()).to_string();
    if let Some(port) = http.port {
        authority = format!("{authority}:{port}");
    }

    let path = if http.path.starts_with('/') {
        http.path.clone()
    } else {
        format!("/{}", http.path)
    };

    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for header in &http.http_headers {
        headers
            .entry(header.name.clone())
            .or_default()
            .push(header.value.clone());
    }

    CheckTarget::Http {
        url: format!("{}://{authority}{path}", http.scheme.to_ascii_lowercase()),
        headers,
    }
}

fn tcp_target(backend_host: &str, tcp: &TcpSocketAction) -> CheckTarget {
    CheckTarget::Tcp {
        address: format!("{}:{}", probe_host(backend_host, tcp.host.as_deref()), tcp.port),
    }
}

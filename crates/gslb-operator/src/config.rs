//! Command-line configuration
//!
//! Every flag has an environment fallback so the operator can be configured
//! from a Deployment without rewriting its args.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use gslb_backend::driver::{HandshakeConfig, DEFAULT_DRIVER_ADDRESS, DEFAULT_HANDSHAKE_ATTEMPTS};
use gslb_backend::ConsulConfig;
use gslb_common::telemetry::LogFormat;

use crate::webhook::TlsFiles;

/// Lower bound on the kube client's read timeout; idle watches are closed
/// by the API server after 25s
const WATCH_READ_FLOOR: Duration = Duration::from_secs(30);

/// GSLB operator - publishes Gslb resources to a registration sink
#[derive(Parser, Debug)]
#[command(name = "gslb-operator", version, about, long_about = None)]
pub struct Cli {
    /// Log line format (json or plain)
    #[arg(
        long,
        global = true,
        env = "GSLB_LOG_FORMAT",
        default_value = "json",
        value_parser = LogFormat::from_str
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// The subcommand to execute; `run` with env and default flags when none was given
    pub fn into_command(self) -> Result<Commands, clap::Error> {
        match self.command {
            Some(command) => Ok(command),
            None => Ok(Commands::Run(DefaultRun::try_parse_from(["gslb-operator"])?.run)),
        }
    }
}

/// Parser used to fill `RunArgs` from the environment alone
#[derive(Parser)]
struct DefaultRun {
    #[command(flatten)]
    run: RunArgs,
}

/// Operator subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the controllers and the admission webhook (default)
    Run(RunArgs),
    /// Print the CRD manifests and exit
    Crd,
}

/// Which registration sink backs GslbContents
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkKind {
    /// Consul catalog over HTTP
    Consul,
    /// GSLBI driver over gRPC
    Driver,
}

/// Flags of the `run` subcommand
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Registration sink
    #[arg(long, env = "GSLB_SINK", value_enum, default_value = "consul")]
    pub sink: SinkKind,

    /// Consul address (host:port)
    #[arg(long, env = "CONSUL_HTTP_ADDR", default_value = "127.0.0.1:8500")]
    pub consul_address: String,

    /// Consul scheme (http or https)
    #[arg(long, env = "CONSUL_SCHEME", default_value = "http")]
    pub consul_scheme: String,

    /// Consul datacenter; the agent's own when unset
    #[arg(long, env = "CONSUL_DATACENTER")]
    pub consul_datacenter: Option<String>,

    /// Consul ACL token
    #[arg(long, env = "CONSUL_HTTP_TOKEN", hide_env_values = true)]
    pub consul_token: Option<String>,

    /// GSLBI driver address: a unix socket path or http(s)://host:port
    #[arg(long, env = "GSLBI_DRIVER_ADDRESS", default_value = DEFAULT_DRIVER_ADDRESS)]
    pub driver_address: String,

    /// Deadline of each sink call
    #[arg(long, env = "GSLB_CALL_TIMEOUT", default_value = "15s", value_parser = parse_duration)]
    pub call_timeout: Duration,

    /// Deadline of each driver probe during the startup handshake
    #[arg(long, env = "GSLBI_HANDSHAKE_TIMEOUT", default_value = "1s", value_parser = parse_duration)]
    pub driver_handshake_timeout: Duration,

    /// Driver probes made at startup before the operator gives up and exits
    #[arg(
        long,
        env = "GSLBI_HANDSHAKE_ATTEMPTS",
        default_value_t = DEFAULT_HANDSHAKE_ATTEMPTS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub driver_handshake_attempts: u32,

    /// Interval between driver liveness probes after startup
    #[arg(long, env = "GSLBI_PROBE_INTERVAL", default_value = "10s", value_parser = parse_duration)]
    pub driver_probe_interval: Duration,

    /// Requeue interval of converged objects
    #[arg(long, env = "GSLB_RESYNC_PERIOD", default_value = "4h", value_parser = parse_duration)]
    pub resync_period: Duration,

    /// Listen address of the admission webhook
    #[arg(long, env = "GSLB_WEBHOOK_ADDR", default_value = "0.0.0.0:9443")]
    pub webhook_addr: SocketAddr,

    /// PEM certificate for the webhook; plain HTTP when unset
    #[arg(long, env = "GSLB_WEBHOOK_CERT", requires = "webhook_key")]
    pub webhook_cert: Option<PathBuf>,

    /// PEM private key for the webhook
    #[arg(long, env = "GSLB_WEBHOOK_KEY", requires = "webhook_cert")]
    pub webhook_key: Option<PathBuf>,

    /// Install or update the CRDs on startup
    #[arg(long, env = "GSLB_INSTALL_CRDS")]
    pub install_crds: bool,
}

impl RunArgs {
    /// Consul client settings
    pub fn consul_config(&self) -> ConsulConfig {
        ConsulConfig {
            address: self.consul_address.clone(),
            scheme: self.consul_scheme.clone(),
            datacenter: self.consul_datacenter.clone(),
            token: self.consul_token.clone(),
            timeout: self.call_timeout,
        }
    }

    /// Startup handshake settings for the driver sink
    pub fn handshake_config(&self) -> HandshakeConfig {
        HandshakeConfig::new(self.driver_handshake_timeout, self.driver_handshake_attempts)
    }

    /// Webhook TLS files, when both were given
    pub fn webhook_tls(&self) -> Option<TlsFiles> {
        match (&self.webhook_cert, &self.webhook_key) {
            (Some(cert), Some(key)) => Some(TlsFiles {
                cert: cert.clone(),
                key: key.clone(),
            }),
            _ => None,
        }
    }

    /// Read/write timeout of the Kubernetes client
    pub fn kube_timeout(&self) -> Duration {
        self.call_timeout.max(WATCH_READ_FLOOR)
    }
}

/// Parse a duration such as `500ms`, `15s`, `10m` or `4h`; bare numbers are seconds
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{s}': expected a number followed by ms, s, m or h"))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        other => Err(format!("invalid duration unit '{other}' in '{s}'")),
    }
}

//! Validating admission webhook for Gslb
//!
//! Every Gslb create, update and delete passes through here before it is
//! persisted, which is where service name uniqueness is enforced. The same
//! server exposes `/healthz` and `/readyz`; readiness follows the claim
//! registry's seeding so the API server never routes a review to an
//! instance that cannot answer it.

pub mod gate;
pub mod gslb;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tracing::info;

use gslb_common::ClaimRegistry;

pub use gate::AdmissionGate;

/// Shared state for webhook handlers
#[derive(Clone)]
pub struct WebhookState {
    /// Admission decisions backed by the claim registry
    pub gate: AdmissionGate,
}

impl WebhookState {
    /// Create webhook state around a claim registry
    pub fn new(claims: Arc<dyn ClaimRegistry>) -> Self {
        Self {
            gate: AdmissionGate::new(claims),
        }
    }
}

/// TLS material for the webhook server
#[derive(Clone, Debug)]
pub struct TlsFiles {
    /// PEM certificate chain
    pub cert: PathBuf,
    /// PEM private key
    pub key: PathBuf,
}

/// Create the webhook router
///
/// - POST /validate-gslb - validate Gslb writes
/// - GET /healthz - liveness
/// - GET /readyz - 503 until the claim registry is seeded
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/validate-gslb", post(gslb::validate_handler))
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .with_state(state)
}

async fn readyz(State(state): State<Arc<WebhookState>>) -> (StatusCode, &'static str) {
    if state.gate.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "claim registry not seeded")
    }
}

/// Serve the webhook on `addr`, over TLS when `tls` is given
pub async fn serve(
    addr: SocketAddr,
    tls: Option<TlsFiles>,
    state: Arc<WebhookState>,
) -> anyhow::Result<()> {
    let app = webhook_router(state);

    match tls {
        Some(files) => {
            let config = RustlsConfig::from_pem_file(&files.cert, &files.key)
                .await
                .map_err(|e| anyhow::anyhow!("webhook TLS config error: {e}"))?;
            info!(%addr, "starting webhook server (TLS)");
            axum_server::bind_rustls(addr, config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!(%addr, "starting webhook server (plain HTTP)");
            axum_server::bind(addr)
                .serve(app.into_make_service())
                .await?;
        }
    }
    Ok(())
}

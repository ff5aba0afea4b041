//! GSLB operator - publishes Gslb resources to a Consul catalog or GSLBI driver

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use clap::Parser;
use futures::future::join_all;
use kube::{Client, Config};

use gslb_backend::driver::handshake;
use gslb_backend::{ConnectionSupervisor, ConsulCatalog, DriverSink, RegistrationSink, TonicGslbiClient};
use gslb_common::retry::RetryConfig;
use gslb_common::telemetry::{init_telemetry, TelemetryConfig};
use gslb_common::{ClaimRegistry, InMemoryClaimRegistry};
use gslb_operator::config::{Cli, Commands, RunArgs, SinkKind};
use gslb_operator::controller::KubeClientImpl;
use gslb_operator::controller_runner::{build_content_controllers, build_gslb_controllers};
use gslb_operator::startup::{crds_yaml, ensure_crds_installed, seed_claims, SEED_ATTEMPTS};
use gslb_operator::webhook::{self, WebhookState};

type Supervisor = Pin<Box<dyn Future<Output = gslb_common::Error> + Send>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // kube and reqwest bring ring, axum-server brings aws-lc-rs; pick one explicitly
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("CRITICAL: failed to install rustls crypto provider: {e:?}");
        std::process::exit(1);
    }

    let cli = Cli::parse();

    init_telemetry(TelemetryConfig {
        format: cli.log_format,
        default_filter: None,
    })?;

    match cli.into_command()? {
        Commands::Crd => {
            print!("{}", crds_yaml()?);
            Ok(())
        }
        Commands::Run(args) => run(args).await,
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = Config::infer()
        .await
        .map_err(|e| anyhow::anyhow!("failed to load kubeconfig: {e}"))?;
    config.read_timeout = Some(args.kube_timeout());
    config.write_timeout = Some(args.kube_timeout());
    let client = Client::try_from(config)?;

    if args.install_crds {
        ensure_crds_installed(&client).await?;
    }

    let (sink, supervisor) = build_sink(&args).await?;

    // the registry must reflect stored Gslbs before the webhook answers anything
    let claims = Arc::new(InMemoryClaimRegistry::new());
    let seeded = seed_claims(
        &KubeClientImpl::new(client.clone()),
        claims.as_ref(),
        &RetryConfig::with_max_attempts(SEED_ATTEMPTS),
    )
    .await
    .map_err(|e| anyhow::anyhow!("failed to seed claim registry: {e}"))?;
    tracing::info!(claims = seeded, ready = claims.is_seeded(), "claim registry ready");

    let webhook_state = Arc::new(WebhookState::new(claims));
    let webhook = webhook::serve(args.webhook_addr, args.webhook_tls(), webhook_state);

    tracing::info!("Starting controllers:");
    let mut controllers = build_gslb_controllers(client.clone(), args.resync_period);
    controllers.extend(build_content_controllers(
        client,
        sink,
        args.call_timeout,
        args.resync_period,
    ));

    let supervisor: Supervisor = match supervisor {
        Some(supervisor) => Box::pin(supervisor.run()),
        None => Box::pin(futures::future::pending()),
    };

    tokio::select! {
        _ = join_all(controllers) => {
            tracing::info!("controllers stopped, shutting down");
            Ok(())
        }
        result = webhook => {
            result?;
            anyhow::bail!("webhook server exited")
        }
        e = supervisor => {
            anyhow::bail!("registration sink lost: {e}")
        }
    }
}

/// Build the configured registration sink
///
/// The driver sink is only returned after a successful handshake, together
/// with the supervisor that ends the process if the driver goes away.
async fn build_sink(
    args: &RunArgs,
) -> anyhow::Result<(Arc<dyn RegistrationSink>, Option<ConnectionSupervisor>)> {
    match args.sink {
        SinkKind::Consul => {
            let catalog: Arc<dyn RegistrationSink> = Arc::new(ConsulCatalog::new(args.consul_config())?);
            tracing::info!(address = %args.consul_address, "using Consul catalog sink");
            Ok((catalog, None))
        }
        SinkKind::Driver => {
            let client = Arc::new(TonicGslbiClient::connect(
                &args.driver_address,
                args.driver_handshake_timeout,
            )?);
            let driver = handshake(client.as_ref(), &args.handshake_config())
                .await
                .map_err(|e| anyhow::anyhow!("GSLBI driver handshake failed: {e}"))?;
            tracing::info!(%driver, address = %args.driver_address, "using GSLBI driver sink");

            let supervisor = ConnectionSupervisor::new(
                client.clone(),
                args.driver_probe_interval,
                args.driver_handshake_timeout,
            );
            let sink: Arc<dyn RegistrationSink> = Arc::new(DriverSink::new(client));
            Ok((sink, Some(supervisor)))
        }
    }
}

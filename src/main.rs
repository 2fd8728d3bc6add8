use anyhow::{anyhow, Context, Result};
use net_exporter::config::AppConfig;
use net_exporter::dns::DnsCollector;
use net_exporter::exporter::Exporter;
use net_exporter::network::{NetworkCollector, NetworkConfig};
use net_exporter::registry::KubernetesRegistry;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("initialize tracing subscriber")?;

    if let Err(err) = run().await {
        tracing::error!(error = ?err, "fatal exporter error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let config = AppConfig::load().context("load configuration from environment")?;

    let kube_settings = config
        .kubernetes_settings()
        .context("resolve kubernetes api settings")?;
    let registry = KubernetesRegistry::new(&kube_settings)
        .with_context(|| format!("initialize kubernetes client for {}", kube_settings.api_url))?;
    info!(api = %registry.api_url(), "kubernetes client initialized");

    let dns = DnsCollector::new(config.dns()).context("create dns collector")?;
    info!(hosts = ?dns.hosts(), "dns collector initialized");

    let network = NetworkCollector::new(NetworkConfig {
        dialer: config.dialer(),
        registry: Arc::new(registry),
        namespace: config.namespace.clone(),
        port: config.port.clone(),
        service: config.service.clone(),
    })
    .context("create network collector")?;
    info!(
        namespace = %config.namespace,
        service = %config.service,
        port = %config.port,
        dial_timeout_secs = config.dial_timeout_secs,
        "network collector initialized"
    );

    let mut exporter = Exporter::default();
    exporter
        .register(Arc::new(dns))
        .context("register dns collector")?;
    exporter
        .register(Arc::new(network))
        .context("register network collector")?;

    Arc::new(exporter)
        .serve(config.listen_address, shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl_c listener error; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, exiting");
}

fn init_tracing() -> Result<()> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("tracing subscriber init: {err}"))
}

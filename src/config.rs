// Configuration management module
// Loads settings from NET_EXPORTER_* environment variables on top of built-in
// defaults, and derives the collector and registry settings from them
//
// net-exporter contributors 2026 Oct

use crate::dns::DnsConfig;
use crate::errors::ConfigError;
use crate::network::Dialer;
use crate::registry::KubernetesSettings;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const ENV_PREFIX: &str = "NET_EXPORTER";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Comma-separated DNS names resolved by the DNS collector
    pub hosts: String,
    /// Namespace of the probed service
    pub namespace: String,
    /// Port dialed on the cluster address and every endpoint
    pub port: String,
    /// Name of the probed service
    pub service: String,
    /// Address the metrics endpoint listens on
    pub listen_address: SocketAddr,
    /// Per-dial timeout in seconds
    pub dial_timeout_secs: u64,
    /// Per-lookup DNS timeout in seconds
    pub dns_timeout_secs: u64,
    /// API server override; defaults to the in-cluster address
    pub kube_api_url: Option<Url>,
    /// Service-account token override
    pub kube_token_path: Option<PathBuf>,
    /// Cluster CA override
    pub kube_ca_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load using `vars` instead of the process environment when given.
    pub fn load_from(vars: Option<HashMap<String, String>>) -> Result<Self> {
        let cfg = config::Config::builder()
            .set_default("hosts", "giantswarm.io,kubernetes.default.svc.cluster.local")?
            .set_default("namespace", "monitoring")?
            .set_default("port", "8000")?
            .set_default("service", "net-exporter")?
            .set_default("listen_address", "0.0.0.0:8000")?
            .set_default("dial_timeout_secs", 5)?
            .set_default("dns_timeout_secs", 5)?
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(vars),
            )
            .build()
            .context("build configuration")?;
        let app: Self = cfg
            .try_deserialize()
            .context("deserialize configuration")?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("namespace", &self.namespace),
            ("port", &self.port),
            ("service", &self.service),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{field} must not be empty")));
            }
        }
        if self.dial_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "dial_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.dns_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "dns_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.dns_hosts().is_empty() {
            return Err(ConfigError::Invalid("hosts must list at least one name".into()));
        }
        Ok(())
    }

    pub fn dns_hosts(&self) -> Vec<String> {
        self.hosts
            .split(',')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn dialer(&self) -> Dialer {
        Dialer::new(Duration::from_secs(self.dial_timeout_secs))
    }

    pub fn dns(&self) -> DnsConfig {
        DnsConfig {
            hosts: self.dns_hosts(),
            timeout: Duration::from_secs(self.dns_timeout_secs),
        }
    }

    /// Kubernetes API settings. Without an explicit API url the in-cluster
    /// environment is required.
    pub fn kubernetes_settings(&self) -> Result<KubernetesSettings> {
        let mut settings = match &self.kube_api_url {
            Some(url) => KubernetesSettings {
                api_url: url.clone(),
                token_path: PathBuf::from(crate::registry::SERVICE_ACCOUNT_TOKEN),
                ca_path: None,
                request_timeout: Duration::from_secs(10),
            },
            None => KubernetesSettings::in_cluster()?,
        };
        if let Some(token) = &self.kube_token_path {
            settings.token_path = token.clone();
        }
        if let Some(ca) = &self.kube_ca_path {
            settings.ca_path = Some(ca.clone());
        }
        Ok(settings)
    }
}

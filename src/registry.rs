// Service registry collaborator
// Looks up a service's stable cluster address and its current backing
// endpoint addresses. The Kubernetes implementation talks to the API server
// over HTTPS using the pod's service-account credentials.
//
// net-exporter contributors 2026 Oct

use crate::errors::RegistryError;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::{Certificate, Client};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
pub const SERVICE_ACCOUNT_CA: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Read access to a service registry.
pub trait ServiceRegistry: Send + Sync {
    /// Stable cluster address of the service.
    fn cluster_address<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<String, RegistryError>>;

    /// Addresses of the endpoints currently backing the service.
    fn endpoint_addresses<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>, RegistryError>>;
}

#[derive(Debug, Clone)]
pub struct KubernetesSettings {
    pub api_url: Url,
    pub token_path: PathBuf,
    pub ca_path: Option<PathBuf>,
    pub request_timeout: Duration,
}

impl KubernetesSettings {
    /// Settings for running inside a pod, derived from the standard
    /// `KUBERNETES_SERVICE_HOST`/`KUBERNETES_SERVICE_PORT` variables.
    pub fn in_cluster() -> Result<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .context("KUBERNETES_SERVICE_HOST is not set; not running in a cluster?")?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".into());
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host
        };
        let api_url = Url::parse(&format!("https://{host}:{port}"))
            .with_context(|| format!("build api server url from {host}:{port}"))?;
        Ok(Self {
            api_url,
            token_path: PathBuf::from(SERVICE_ACCOUNT_TOKEN),
            ca_path: Some(PathBuf::from(SERVICE_ACCOUNT_CA)),
            request_timeout: Duration::from_secs(10),
        })
    }
}

#[derive(Debug, Clone)]
pub struct KubernetesRegistry {
    http: Client,
    api_url: Url,
    token: Option<String>,
}

impl KubernetesRegistry {
    pub fn new(settings: &KubernetesSettings) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(settings.request_timeout)
            .no_proxy()
            .use_rustls_tls();
        if let Some(ca_path) = &settings.ca_path {
            let pem = std::fs::read(ca_path)
                .with_context(|| format!("read cluster CA {}", ca_path.display()))?;
            let cert = Certificate::from_pem(&pem).context("parse cluster CA certificate")?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder.build().context("build kubernetes http client")?;
        let token = read_token(&settings.token_path)?;

        Ok(Self {
            http,
            api_url: settings.api_url.clone(),
            token,
        })
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RegistryError> {
        let url = self
            .api_url
            .join(path)
            .map_err(|e| RegistryError::Lookup(format!("bad api path {path}: {e}")))?;
        let mut req = self.http.get(url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        let body = resp.bytes().await?;
        debug!(path = %path, bytes = body.len(), "registry response");
        serde_json::from_slice(&body).map_err(|source| RegistryError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

fn read_token(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(token) => Ok(Some(token.trim().to_string())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("read token {}", path.display())),
    }
}

impl ServiceRegistry for KubernetesRegistry {
    fn cluster_address<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<String, RegistryError>> {
        Box::pin(async move {
            let path = format!("/api/v1/namespaces/{namespace}/services/{name}");
            let service: Service = self.get_json(&path).await?;
            service.cluster_ip().ok_or_else(|| RegistryError::NoClusterAddress {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
        })
    }

    fn endpoint_addresses<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>, RegistryError>> {
        Box::pin(async move {
            let path = format!("/api/v1/namespaces/{namespace}/endpoints/{name}");
            let endpoints: Endpoints = self.get_json(&path).await?;
            Ok(endpoints.ready_ips())
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct Service {
    #[serde(default)]
    spec: ServiceSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceSpec {
    #[serde(rename = "clusterIP")]
    cluster_ip: Option<String>,
}

impl Service {
    fn cluster_ip(self) -> Option<String> {
        self.spec
            .cluster_ip
            .filter(|ip| !ip.is_empty() && !ip.eq_ignore_ascii_case("none"))
    }
}

#[derive(Debug, Default, Deserialize)]
struct Endpoints {
    #[serde(default)]
    subsets: Vec<EndpointSubset>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointSubset {
    /// Ready addresses only; `notReadyAddresses` is ignored.
    #[serde(default)]
    addresses: Vec<EndpointAddress>,
}

#[derive(Debug, Deserialize)]
struct EndpointAddress {
    ip: String,
}

impl Endpoints {
    fn ready_ips(self) -> Vec<String> {
        self.subsets
            .into_iter()
            .flat_map(|subset| subset.addresses)
            .map(|address| address.ip)
            .collect()
    }
}

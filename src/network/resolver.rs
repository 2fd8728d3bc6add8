// Endpoint resolver
// Turns a service name into the flat list of host:port targets for one
// collection cycle: the cluster address first, then every ready endpoint.
//
// net-exporter contributors 2026 Oct

use crate::registry::ServiceRegistry;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

pub struct EndpointResolver {
    registry: Arc<dyn ServiceRegistry>,
    namespace: String,
    service: String,
    port: String,
}

impl EndpointResolver {
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        namespace: impl Into<String>,
        service: impl Into<String>,
        port: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            namespace: namespace.into(),
            service: service.into(),
            port: port.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Resolve this cycle's targets. Any registry failure fails the whole call;
    /// no retry is attempted.
    pub async fn resolve(&self, scrape_id: u64) -> Result<Vec<String>> {
        let cluster_address = self
            .registry
            .cluster_address(&self.namespace, &self.service)
            .await
            .with_context(|| {
                format!(
                    "get service {}/{} from registry",
                    self.namespace, self.service
                )
            })?;
        info!(service = %self.service, scrape_id, "collected service");

        let mut hosts = vec![target(&cluster_address, &self.port)];

        info!(service = %self.service, scrape_id, "getting endpoints from registry");
        let endpoints = self
            .registry
            .endpoint_addresses(&self.namespace, &self.service)
            .await
            .with_context(|| {
                format!(
                    "get endpoints {}/{} from registry",
                    self.namespace, self.service
                )
            })?;
        info!(
            service = %self.service,
            endpoints = endpoints.len(),
            scrape_id,
            "collected endpoints"
        );

        hosts.extend(endpoints.iter().map(|address| target(address, &self.port)));
        Ok(hosts)
    }
}

/// Join an address and a port into a dialable `host:port` string.
/// IPv6 literals are bracketed; the port is passed through verbatim.
pub fn target(address: &str, port: &str) -> String {
    if address.contains(':') && !address.starts_with('[') {
        format!("[{address}]:{port}")
    } else {
        format!("{address}:{port}")
    }
}

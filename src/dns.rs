//! MCS DNS name derivation and port-name resolution
//!
//! Pure string derivation: no cluster API access. The formats follow the
//! Multi-Cluster Services DNS conventions, where every name is qualified by
//! the physical cluster id and the clusterset domain.

use std::sync::Arc;

use tracing::warn;

use crate::{
    PORT_CONTROL_PLANE, PORT_EXTERNAL, PORT_PLAIN, PORT_REPLICATION, PORT_TLS,
};

/// Injected port-name to port-number lookup.
///
/// Port numbers conceptually belong to the stretched cluster's own listener
/// configuration; callers that have it should inject a lookup backed by it.
/// [`standard_port_lookup`] is the compatibility default.
pub type PortLookup = Arc<dyn Fn(&str) -> Option<u16> + Send + Sync>;

/// Standard port table for well-known listener names (case-insensitive)
pub fn standard_port_lookup(port_name: &str) -> Option<u16> {
    match port_name.to_ascii_lowercase().as_str() {
        "replication" => Some(PORT_REPLICATION),
        "plain" => Some(PORT_PLAIN),
        "tls" => Some(PORT_TLS),
        "external" => Some(PORT_EXTERNAL),
        "control-plane" | "controlplane-9090" => Some(PORT_CONTROL_PLANE),
        _ => None,
    }
}

/// Resolves logical port names to numbers via an injected lookup, with the
/// documented fallback chain: lookup, then first purely numeric
/// hyphen-delimited token, then the plain port with a warning.
#[derive(Clone)]
pub struct PortResolver {
    lookup: PortLookup,
}

impl PortResolver {
    /// Create a resolver with a caller-supplied lookup
    pub fn new(lookup: PortLookup) -> Self {
        Self { lookup }
    }

    /// Create a resolver backed by [`standard_port_lookup`]
    pub fn standard() -> Self {
        Self::new(Arc::new(standard_port_lookup))
    }

    /// Resolve a logical port name to a port number
    pub fn resolve(&self, port_name: &str) -> u16 {
        if let Some(port) = (self.lookup)(port_name) {
            return port;
        }

        // Names like "custom-9095" carry their port as a numeric token.
        for token in port_name.split('-') {
            if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(port) = token.parse::<u16>() {
                    return port;
                }
            }
        }

        warn!(port_name = %port_name, default = PORT_PLAIN, "unknown port name, using default");
        PORT_PLAIN
    }
}

/// Derives MCS DNS names from a clusterset domain
#[derive(Clone, Debug)]
pub struct DnsNameFormatter {
    clusterset_domain: String,
}

impl DnsNameFormatter {
    /// Create a formatter for the given clusterset domain
    pub fn new(clusterset_domain: impl Into<String>) -> Self {
        Self {
            clusterset_domain: clusterset_domain.into(),
        }
    }

    /// The clusterset domain this formatter qualifies names with
    pub fn clusterset_domain(&self) -> &str {
        &self.clusterset_domain
    }

    /// `{service}.{clusterId}.{namespace}.svc.{domain}`
    pub fn service_dns_name(&self, namespace: &str, service_name: &str, cluster_id: &str) -> String {
        format!(
            "{}.{}.{}.svc.{}",
            service_name, cluster_id, namespace, self.clusterset_domain
        )
    }

    /// `{pod}.{clusterId}.{service}.{namespace}.svc.{domain}`
    pub fn pod_dns_name(
        &self,
        namespace: &str,
        service_name: &str,
        pod_name: &str,
        cluster_id: &str,
    ) -> String {
        format!(
            "{}.{}.{}.{}.svc.{}",
            pod_name, cluster_id, service_name, namespace, self.clusterset_domain
        )
    }

    /// `*.{clusterId}.{service}.{namespace}.svc.{domain}`
    pub fn wildcard_dns_name(
        &self,
        namespace: &str,
        service_name: &str,
        cluster_id: &str,
    ) -> String {
        format!(
            "*.{}.{}.{}.svc.{}",
            cluster_id, service_name, namespace, self.clusterset_domain
        )
    }
}

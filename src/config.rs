//! Provider configuration
//!
//! The host controller hands the provider an opaque string map at
//! initialization. This module gives it a typed shape with the documented
//! defaults.

use std::collections::BTreeMap;

/// Configuration for the MCS networking provider
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderConfig {
    /// Clusterset DNS domain used in every derived MCS name
    pub clusterset_domain: String,
    /// Whether member namespaces must match across clusters.
    ///
    /// Recorded from configuration but currently advisory: the reconcile
    /// path does not branch on it.
    pub require_namespace_sameness: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            clusterset_domain: crate::DEFAULT_CLUSTERSET_DOMAIN.to_string(),
            require_namespace_sameness: true,
        }
    }
}

impl ProviderConfig {
    /// Build a config from the host's string map.
    ///
    /// Recognized keys: `clustersetDomain`, `requireNamespaceSameness`.
    /// Unknown keys are ignored; an unparseable boolean keeps the default.
    pub fn from_map(config: &BTreeMap<String, String>) -> Self {
        let mut cfg = Self::default();
        if let Some(domain) = config.get("clustersetDomain") {
            cfg.clusterset_domain = domain.clone();
        }
        if let Some(raw) = config.get("requireNamespaceSameness") {
            if let Ok(value) = raw.trim().parse::<bool>() {
                cfg.require_namespace_sameness = value;
            }
        }
        cfg
    }
}

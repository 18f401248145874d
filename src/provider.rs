//! Provider contract and MCS implementation
//!
//! This module implements the networking-resource reconciliation engine for
//! stretched clusters. It follows the controller pattern at per-pod grain:
//! the host loop invokes [`StretchNetworkingProvider::ensure_networking_resources`]
//! once per member pod per pass, and the engine decides which cross-cluster
//! discovery resources must exist, creates or repairs them idempotently, and
//! deduplicates the work that is shared across all pods of one service.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{DynamicObject, ObjectMeta};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ProviderConfig;
use crate::dedup::{ClaimOutcome, ReconciliationDeduplicator};
use crate::dns::{DnsNameFormatter, PortLookup, PortResolver};
use crate::export::{self, ExportResourceGateway};
use crate::registry::{ClusterEndpointRegistry, ClusterMembership, ResolvedCluster};
use crate::{Result, ANNOTATION_CLUSTER_ID, APP_LABEL_VALUE, LABEL_CLUSTER, LABEL_KIND, LABEL_NAME};

/// Identifier of this provider at the host controller's plugin seam
pub const PROVIDER_NAME: &str = "mcs";

/// Value of the kind label on resources managed for a stretched cluster
const KIND_LABEL_VALUE: &str = "StretchedCluster";

// =============================================================================
// Contract types
// =============================================================================

/// The unit of work for one provider invocation: one member pod of a
/// stretched cluster within one reconciliation pass.
#[derive(Clone, Debug)]
pub struct NetworkingTarget {
    /// Opaque id of the control-loop pass. Stable across all pods of one
    /// pass, changes between passes.
    pub reconciliation_id: String,
    /// Namespace of the stretched cluster
    pub namespace: String,
    /// Logical name of the stretched cluster
    pub cluster_name: String,
    /// Name of the member pod being reconciled
    pub pod_name: String,
    /// Physical cluster the pod is scheduled to
    pub cluster_id: String,
    /// Logical port name to port number, one entry per listener
    pub ports: BTreeMap<String, i32>,
}

impl NetworkingTarget {
    /// Name of the shared headless Service covering all broker pods of the
    /// stretched cluster in one physical cluster. The name is identical
    /// across clusters so MCS aggregates the exports into one ServiceImport.
    pub fn broker_service_name(&self) -> String {
        format!("{}-brokers", self.cluster_name)
    }
}

/// One controller-role pod, as supplied by the caller for quorum derivation
#[derive(Clone, Debug)]
pub struct ControllerPodEntry {
    /// Node id of the controller within the quorum
    pub node_id: i32,
    /// Pod name of the controller
    pub pod_name: String,
    /// Physical cluster the controller runs in
    pub cluster_id: String,
}

/// A resource the engine actually created or updated during one invocation
#[derive(Clone, Debug)]
pub enum AppliedResource {
    /// Headless discovery Service in a non-central cluster
    Service(Service),
    /// ServiceExport declaration
    ServiceExport(DynamicObject),
}

impl AppliedResource {
    /// Resource kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Service(_) => "Service",
            Self::ServiceExport(_) => "ServiceExport",
        }
    }

    /// Resource name, if set
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Service(service) => service.metadata.name.as_deref(),
            Self::ServiceExport(export) => export.metadata.name.as_deref(),
        }
    }
}

/// Networking provider contract consumed by the host controller.
///
/// One instance is shared across concurrently reconciled pods; every method
/// is safe under arbitrary interleaving.
#[async_trait]
pub trait StretchNetworkingProvider: Send + Sync {
    /// Ensure the cross-cluster discovery resources for one member pod
    /// exist, returning the resources actually created or updated (empty
    /// when deduplicated or already durable).
    async fn ensure_networking_resources(
        &self,
        target: &NetworkingTarget,
    ) -> Result<Vec<AppliedResource>>;

    /// Best-effort removal of the per-pod discovery resources. ServiceExport
    /// deletion failures are logged and swallowed; Service deletion failures
    /// are the operation's result.
    async fn remove_networking_resources(
        &self,
        namespace: &str,
        pod_name: &str,
        cluster_id: &str,
    ) -> Result<()>;

    /// `{service}.{clusterId}.{namespace}.svc.{domain}`
    fn derive_service_dns_name(
        &self,
        namespace: &str,
        service_name: &str,
        cluster_id: &str,
    ) -> String;

    /// `{pod}.{clusterId}.{service}.{namespace}.svc.{domain}`
    fn derive_pod_dns_name(
        &self,
        namespace: &str,
        service_name: &str,
        pod_name: &str,
        cluster_id: &str,
    ) -> String;

    /// Comma-joined `{listener}://{podDns}:{port}` entries, using the shared
    /// brokers Service for the DNS name. `listeners` maps listener name to
    /// logical port name; caller order is preserved.
    fn derive_advertised_listeners(
        &self,
        namespace: &str,
        cluster_name: &str,
        pod_name: &str,
        cluster_id: &str,
        listeners: &[(String, String)],
    ) -> String;

    /// Comma-joined `{nodeId}@{podDns}:{port}` entries, one per controller,
    /// using per-pod service names. Caller order is authoritative.
    fn derive_quorum_voters(
        &self,
        namespace: &str,
        controllers: &[ControllerPodEntry],
        port_name: &str,
    ) -> String;

    /// Certificate SANs for one member pod: its per-pod MCS DNS name and the
    /// matching wildcard name, in that order.
    fn derive_certificate_sans(
        &self,
        namespace: &str,
        pod_name: &str,
        cluster_id: &str,
    ) -> Vec<String>;

    /// Resolve `{podDns}:{port}` for a pod's per-pod MCS service, from the
    /// central cluster. Fails with `NotFound` if the service is absent and
    /// `PortNotFound` if the port name is not declared on it.
    async fn discover_pod_endpoint(
        &self,
        namespace: &str,
        pod_name: &str,
        cluster_id: &str,
        port_name: &str,
    ) -> Result<String>;

    /// Stable identifier of this provider implementation
    fn provider_identifier(&self) -> &'static str;
}

// =============================================================================
// MCS implementation
// =============================================================================

/// MCS-based networking provider for stretched clusters.
///
/// Creates headless Services and ServiceExport declarations for DNS-based
/// cross-cluster discovery. Works with any MCS implementation (Cilium,
/// Submariner, ...); the provider only emits the declarative resources the
/// fabric consumes and never validates the fabric itself.
pub struct McsNetworkingProvider {
    config: ProviderConfig,
    formatter: DnsNameFormatter,
    ports: PortResolver,
    registry: ClusterEndpointRegistry,
    gateways: HashMap<String, ExportResourceGateway>,
    central_gateway: ExportResourceGateway,
    dedup: ReconciliationDeduplicator,
}

impl McsNetworkingProvider {
    /// Create a provider with the standard port table.
    ///
    /// Builds one export gateway per cluster membership. Fails only on an
    /// invalid membership set; whether the ServiceExport CRD is registered
    /// anywhere is deferred to first use so a missing fabric cannot break
    /// startup.
    pub fn new(config: ProviderConfig, memberships: Vec<ClusterMembership>) -> Result<Self> {
        Self::with_port_lookup(config, memberships, PortResolver::standard())
    }

    /// Create a provider with a caller-supplied port lookup, ideally backed
    /// by the stretched cluster's own listener configuration.
    pub fn with_ports(
        config: ProviderConfig,
        memberships: Vec<ClusterMembership>,
        lookup: PortLookup,
    ) -> Result<Self> {
        Self::with_port_lookup(config, memberships, PortResolver::new(lookup))
    }

    fn with_port_lookup(
        config: ProviderConfig,
        memberships: Vec<ClusterMembership>,
        ports: PortResolver,
    ) -> Result<Self> {
        let gateways: HashMap<String, ExportResourceGateway> = memberships
            .iter()
            .map(|m| {
                (
                    m.cluster_id.clone(),
                    ExportResourceGateway::new(m.handle.clone()),
                )
            })
            .collect();
        let registry = ClusterEndpointRegistry::new(memberships)?;
        let central_gateway = ExportResourceGateway::new(registry.central());
        let formatter = DnsNameFormatter::new(config.clusterset_domain.clone());

        info!(
            clusterset_domain = %config.clusterset_domain,
            require_namespace_sameness = config.require_namespace_sameness,
            "initialized MCS networking provider, ServiceExport operations attempted as needed"
        );

        Ok(Self {
            config,
            formatter,
            ports,
            registry,
            gateways,
            central_gateway,
            dedup: ReconciliationDeduplicator::new(),
        })
    }

    /// The configuration this provider was initialized with
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Build a standalone ServiceExport declaration for callers outside the
    /// main ensure flow, optionally owned by another resource.
    pub fn build_service_export(
        &self,
        service_name: &str,
        namespace: &str,
        labels: BTreeMap<String, String>,
        owner_references: Vec<OwnerReference>,
    ) -> DynamicObject {
        export::build_service_export(
            service_name,
            namespace,
            labels,
            BTreeMap::new(),
            owner_references,
        )
    }

    fn gateway_for<'a>(
        &'a self,
        cluster_id: &str,
        resolved: &ResolvedCluster,
    ) -> &'a ExportResourceGateway {
        if resolved.used_central_fallback {
            &self.central_gateway
        } else {
            self.gateways.get(cluster_id).unwrap_or(&self.central_gateway)
        }
    }

    fn broker_selector(cluster_name: &str) -> BTreeMap<String, String> {
        let mut selector = BTreeMap::new();
        selector.insert(LABEL_CLUSTER.to_string(), cluster_name.to_string());
        selector.insert(LABEL_KIND.to_string(), KIND_LABEL_VALUE.to_string());
        selector.insert(LABEL_NAME.to_string(), format!("{cluster_name}-broker"));
        selector
    }

    fn export_labels(cluster_name: &str) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), APP_LABEL_VALUE.to_string());
        labels.insert(LABEL_CLUSTER.to_string(), cluster_name.to_string());
        labels
    }

    fn cluster_id_annotation(cluster_id: &str) -> BTreeMap<String, String> {
        let mut annotations = BTreeMap::new();
        annotations.insert(ANNOTATION_CLUSTER_ID.to_string(), cluster_id.to_string());
        annotations
    }

    /// Build the headless Service selecting all broker pods of the stretched
    /// cluster within one physical cluster.
    fn build_broker_service(target: &NetworkingTarget, service_name: &str) -> Service {
        let ports: Vec<ServicePort> = target
            .ports
            .iter()
            .map(|(name, port)| ServicePort {
                name: Some(name.clone()),
                port: *port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            })
            .collect();

        let mut labels = Self::broker_selector(&target.cluster_name);
        labels.insert("app".to_string(), APP_LABEL_VALUE.to_string());

        Service {
            metadata: ObjectMeta {
                name: Some(service_name.to_string()),
                namespace: Some(target.namespace.clone()),
                labels: Some(labels),
                annotations: Some(Self::cluster_id_annotation(&target.cluster_id)),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                // Headless: DNS resolves to pod IPs, no virtual IP assigned.
                cluster_ip: Some("None".to_string()),
                ports: Some(ports),
                selector: Some(Self::broker_selector(&target.cluster_name)),
                ..Default::default()
            }),
            status: None,
        }
    }
}

#[async_trait]
impl StretchNetworkingProvider for McsNetworkingProvider {
    #[instrument(skip(self, target), fields(
        reconciliation = %target.reconciliation_id,
        pod = %target.pod_name,
        cluster = %target.cluster_id,
    ))]
    async fn ensure_networking_resources(
        &self,
        target: &NetworkingTarget,
    ) -> Result<Vec<AppliedResource>> {
        let service_name = target.broker_service_name();

        let resolved = self.registry.resolve(&target.cluster_id);
        if resolved.used_central_fallback {
            warn!(
                cluster_id = %target.cluster_id,
                "unknown cluster id, substituting central cluster endpoint"
            );
        }
        let gateway = self.gateway_for(&target.cluster_id, &resolved);

        // One headless Service per physical cluster covers all broker pods,
        // so the per-pod invocations collapse onto one claim per service.
        let dedup_key = format!("{}/{}/{}", target.cluster_id, target.namespace, service_name);
        let namespace = target.namespace.as_str();
        let probe_service = service_name.as_str();
        let outcome = self
            .dedup
            .claim_or_skip(&target.reconciliation_id, &dedup_key, move || async move {
                match gateway.get(namespace, probe_service).await {
                    Ok(existing) => existing.is_some(),
                    Err(err) => {
                        warn!(
                            error = %err,
                            service = %probe_service,
                            "ServiceExport existence probe failed, assuming absent"
                        );
                        false
                    }
                }
            })
            .await;

        match outcome {
            ClaimOutcome::AlreadyClaimed => {
                debug!(service = %service_name, "already handled in this pass, skipping");
                return Ok(Vec::new());
            }
            ClaimOutcome::AlreadyExists => {
                debug!(service = %service_name, "ServiceExport already exists, nothing to do");
                return Ok(Vec::new());
            }
            ClaimOutcome::Claimed => {}
        }

        let mut applied = Vec::new();

        // The central cluster's Service is owned by the stretched cluster's
        // own controller; only remote clusters need one from us. A Service
        // failure is fatal to the operation: the headless Service is required
        // infrastructure.
        if resolved.is_central {
            debug!(service = %service_name, "central cluster owns its Service, skipping");
        } else {
            let service = Self::build_broker_service(target, &service_name);
            let service = resolved.handle.apply_service(&service).await?;
            debug!(service = %service_name, "created/updated headless Service");
            applied.push(AppliedResource::Service(service));
        }

        // ServiceExport goes to every cluster, central included. The export
        // is best-effort infrastructure: a missing MCS fabric must not block
        // the stretched cluster's core pod/volume reconciliation, so a
        // failure here is logged and the partial result returned. The next
        // pass re-probes and retries.
        let export = export::build_service_export(
            &service_name,
            &target.namespace,
            Self::export_labels(&target.cluster_name),
            Self::cluster_id_annotation(&target.cluster_id),
            Vec::new(),
        );
        match gateway.create_or_replace(&export).await {
            Ok(export) => {
                debug!(service = %service_name, "created/updated ServiceExport");
                applied.push(AppliedResource::ServiceExport(export));
            }
            Err(err) => {
                error!(
                    error = %err,
                    service = %service_name,
                    cluster = %target.cluster_id,
                    "failed to create ServiceExport, continuing without it"
                );
            }
        }

        Ok(applied)
    }

    #[instrument(skip(self), fields(pod = %pod_name, cluster = %cluster_id))]
    async fn remove_networking_resources(
        &self,
        namespace: &str,
        pod_name: &str,
        cluster_id: &str,
    ) -> Result<()> {
        let service_name = format!("{pod_name}-mcs");

        let resolved = self.registry.resolve(cluster_id);
        if resolved.used_central_fallback {
            warn!(
                cluster_id = %cluster_id,
                "unknown cluster id, substituting central cluster endpoint"
            );
        }
        let gateway = self.gateway_for(cluster_id, &resolved);

        // Export deletion is best-effort: the fabric may never have been
        // installed.
        match gateway.delete(namespace, &service_name).await {
            Ok(true) => debug!(service = %service_name, "deleted ServiceExport"),
            Ok(false) => debug!(service = %service_name, "ServiceExport already absent"),
            Err(err) => warn!(
                error = %err,
                service = %service_name,
                "failed to delete ServiceExport, continuing"
            ),
        }

        // Service deletion determines the operation's outcome.
        self.registry
            .central()
            .delete_service(namespace, &service_name)
            .await
    }

    fn derive_service_dns_name(
        &self,
        namespace: &str,
        service_name: &str,
        cluster_id: &str,
    ) -> String {
        self.formatter.service_dns_name(namespace, service_name, cluster_id)
    }

    fn derive_pod_dns_name(
        &self,
        namespace: &str,
        service_name: &str,
        pod_name: &str,
        cluster_id: &str,
    ) -> String {
        self.formatter.pod_dns_name(namespace, service_name, pod_name, cluster_id)
    }

    fn derive_advertised_listeners(
        &self,
        namespace: &str,
        cluster_name: &str,
        pod_name: &str,
        cluster_id: &str,
        listeners: &[(String, String)],
    ) -> String {
        let service_name = format!("{cluster_name}-brokers");
        listeners
            .iter()
            .map(|(listener_name, port_name)| {
                let dns = self
                    .formatter
                    .pod_dns_name(namespace, &service_name, pod_name, cluster_id);
                let port = self.ports.resolve(port_name);
                format!("{listener_name}://{dns}:{port}")
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    fn derive_quorum_voters(
        &self,
        namespace: &str,
        controllers: &[ControllerPodEntry],
        port_name: &str,
    ) -> String {
        let port = self.ports.resolve(port_name);
        controllers
            .iter()
            .map(|controller| {
                // Per-pod services: the service name is the pod name.
                let dns = self.formatter.pod_dns_name(
                    namespace,
                    &controller.pod_name,
                    &controller.pod_name,
                    &controller.cluster_id,
                );
                format!("{}@{}:{}", controller.node_id, dns, port)
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    fn derive_certificate_sans(
        &self,
        namespace: &str,
        pod_name: &str,
        cluster_id: &str,
    ) -> Vec<String> {
        let service_name = format!("{pod_name}-mcs");
        vec![
            self.formatter
                .pod_dns_name(namespace, &service_name, pod_name, cluster_id),
            self.formatter
                .wildcard_dns_name(namespace, &service_name, cluster_id),
        ]
    }

    async fn discover_pod_endpoint(
        &self,
        namespace: &str,
        pod_name: &str,
        cluster_id: &str,
        port_name: &str,
    ) -> Result<String> {
        let service_name = format!("{pod_name}-mcs");

        let service = self
            .registry
            .central()
            .get_service(namespace, &service_name)
            .await?
            .ok_or_else(|| {
                crate::Error::not_found(format!("MCS service not found: {service_name}"))
            })?;

        let port = service
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .and_then(|ports| {
                ports
                    .iter()
                    .find(|p| p.name.as_deref() == Some(port_name))
            })
            .ok_or_else(|| crate::Error::port_not_found(port_name))?;

        let dns = self
            .formatter
            .pod_dns_name(namespace, &service_name, pod_name, cluster_id);
        Ok(format!("{}:{}", dns, port.port))
    }

    fn provider_identifier(&self) -> &'static str {
        PROVIDER_NAME
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::registry::MockClusterHandle;
    use crate::Error;

    fn api_error(code: u16, message: &str) -> Error {
        Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: "TestFailure".to_string(),
            code,
        }))
    }

    /// Helper to create a target for pod `pod_name` in cluster `cluster_id`
    fn sample_target(reconciliation_id: &str, pod_name: &str, cluster_id: &str) -> NetworkingTarget {
        let mut ports = BTreeMap::new();
        ports.insert("replication".to_string(), 9091);
        ports.insert("tls".to_string(), 9093);
        NetworkingTarget {
            reconciliation_id: reconciliation_id.to_string(),
            namespace: "ns".to_string(),
            cluster_name: "my-cluster".to_string(),
            pod_name: pod_name.to_string(),
            cluster_id: cluster_id.to_string(),
            ports,
        }
    }

    /// Helper to build a provider from a central mock and named remote mocks
    fn sample_provider(
        central: MockClusterHandle,
        remotes: Vec<(&str, MockClusterHandle)>,
    ) -> McsNetworkingProvider {
        let mut memberships = vec![ClusterMembership::central("central", Arc::new(central))];
        for (cluster_id, handle) in remotes {
            memberships.push(ClusterMembership::remote(cluster_id, Arc::new(handle)));
        }
        McsNetworkingProvider::new(ProviderConfig::default(), memberships)
            .expect("valid membership set")
    }

    fn existing_export() -> DynamicObject {
        export::build_service_export(
            "my-cluster-brokers",
            "ns",
            BTreeMap::new(),
            BTreeMap::new(),
            Vec::new(),
        )
    }

    fn per_pod_service(name: &str, port_name: &str, port: i32) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    name: Some(port_name.to_string()),
                    port,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: None,
        }
    }

    mod ensure {
        use super::*;

        #[tokio::test]
        async fn remote_cluster_gets_headless_service_and_export() {
            let central = MockClusterHandle::new();
            let mut remote = MockClusterHandle::new();
            remote
                .expect_get_export()
                .times(1)
                .returning(|_, _| Ok(None));
            remote
                .expect_apply_service()
                .times(1)
                .withf(|service: &Service| {
                    let spec = service.spec.as_ref().expect("spec");
                    spec.cluster_ip.as_deref() == Some("None")
                        && spec.type_.as_deref() == Some("ClusterIP")
                        && spec
                            .ports
                            .as_ref()
                            .is_some_and(|ports| {
                                ports.len() == 2
                                    && ports.iter().all(|p| p.protocol.as_deref() == Some("TCP"))
                            })
                        && spec
                            .selector
                            .as_ref()
                            .is_some_and(|s| s.get(LABEL_CLUSTER).map(String::as_str) == Some("my-cluster"))
                })
                .returning(|service| Ok(service.clone()));
            remote
                .expect_apply_export()
                .times(1)
                .withf(|export: &DynamicObject| {
                    export.metadata.name.as_deref() == Some("my-cluster-brokers")
                        && export
                            .metadata
                            .annotations
                            .as_ref()
                            .is_some_and(|a| a.get(ANNOTATION_CLUSTER_ID).map(String::as_str) == Some("c1"))
                })
                .returning(|export| Ok(export.clone()));

            let provider = sample_provider(central, vec![("c1", remote)]);
            let target = sample_target("pass-1", "my-cluster-broker-0", "c1");

            let applied = provider
                .ensure_networking_resources(&target)
                .await
                .expect("ensure succeeds");

            assert_eq!(applied.len(), 2);
            assert_eq!(applied[0].kind(), "Service");
            assert_eq!(applied[1].kind(), "ServiceExport");
            assert_eq!(applied[0].name(), Some("my-cluster-brokers"));
        }

        #[tokio::test]
        async fn second_pod_of_same_service_short_circuits() {
            let central = MockClusterHandle::new();
            let mut remote = MockClusterHandle::new();
            remote
                .expect_get_export()
                .times(1)
                .returning(|_, _| Ok(None));
            remote
                .expect_apply_service()
                .times(1)
                .returning(|service| Ok(service.clone()));
            remote
                .expect_apply_export()
                .times(1)
                .returning(|export| Ok(export.clone()));

            let provider = sample_provider(central, vec![("c1", remote)]);

            let applied = provider
                .ensure_networking_resources(&sample_target("pass-1", "my-cluster-broker-0", "c1"))
                .await
                .expect("first pod succeeds");
            assert_eq!(applied.len(), 2);

            // Same pass, different pod, same underlying service: no calls.
            let applied = provider
                .ensure_networking_resources(&sample_target("pass-1", "my-cluster-broker-1", "c1"))
                .await
                .expect("second pod succeeds");
            assert!(applied.is_empty());
        }

        #[tokio::test]
        async fn new_reconciliation_pass_reclaims_the_service() {
            let central = MockClusterHandle::new();
            let mut remote = MockClusterHandle::new();
            remote
                .expect_get_export()
                .times(2)
                .returning(|_, _| Ok(None));
            remote
                .expect_apply_service()
                .times(2)
                .returning(|service| Ok(service.clone()));
            remote
                .expect_apply_export()
                .times(2)
                .returning(|export| Ok(export.clone()));

            let provider = sample_provider(central, vec![("c1", remote)]);

            provider
                .ensure_networking_resources(&sample_target("pass-1", "my-cluster-broker-0", "c1"))
                .await
                .expect("pass-1 succeeds");
            let applied = provider
                .ensure_networking_resources(&sample_target("pass-2", "my-cluster-broker-0", "c1"))
                .await
                .expect("pass-2 succeeds");
            assert_eq!(applied.len(), 2);
        }

        #[tokio::test]
        async fn central_cluster_never_gets_a_service_apply() {
            let mut central = MockClusterHandle::new();
            central
                .expect_get_export()
                .times(1)
                .returning(|_, _| Ok(None));
            central.expect_apply_service().times(0);
            central
                .expect_apply_export()
                .times(1)
                .returning(|export| Ok(export.clone()));

            let provider = sample_provider(central, Vec::new());
            let target = sample_target("pass-1", "my-cluster-broker-0", "central");

            let applied = provider
                .ensure_networking_resources(&target)
                .await
                .expect("ensure succeeds");

            assert_eq!(applied.len(), 1);
            assert_eq!(applied[0].kind(), "ServiceExport");
        }

        #[tokio::test]
        async fn existing_export_short_circuits_service_and_export() {
            let central = MockClusterHandle::new();
            let mut remote = MockClusterHandle::new();
            remote
                .expect_get_export()
                .times(1)
                .returning(|_, _| Ok(Some(existing_export())));

            let provider = sample_provider(central, vec![("c1", remote)]);
            let target = sample_target("pass-1", "my-cluster-broker-0", "c1");

            let applied = provider
                .ensure_networking_resources(&target)
                .await
                .expect("ensure succeeds");
            assert!(applied.is_empty());
        }

        #[tokio::test]
        async fn export_failure_is_swallowed_and_partial_result_returned() {
            let central = MockClusterHandle::new();
            let mut remote = MockClusterHandle::new();
            remote
                .expect_get_export()
                .times(1)
                .returning(|_, _| Ok(None));
            remote
                .expect_apply_service()
                .times(1)
                .returning(|service| Ok(service.clone()));
            remote
                .expect_apply_export()
                .times(1)
                .returning(|_| Err(api_error(404, "serviceexports.multicluster.x-k8s.io not found")));

            let provider = sample_provider(central, vec![("c1", remote)]);
            let target = sample_target("pass-1", "my-cluster-broker-0", "c1");

            let applied = provider
                .ensure_networking_resources(&target)
                .await
                .expect("export failure must not fail the operation");

            assert_eq!(applied.len(), 1);
            assert_eq!(applied[0].kind(), "Service");
        }

        #[tokio::test]
        async fn service_failure_propagates() {
            let central = MockClusterHandle::new();
            let mut remote = MockClusterHandle::new();
            remote
                .expect_get_export()
                .times(1)
                .returning(|_, _| Ok(None));
            remote
                .expect_apply_service()
                .times(1)
                .returning(|_| Err(api_error(500, "apiserver unavailable")));

            let provider = sample_provider(central, vec![("c1", remote)]);
            let target = sample_target("pass-1", "my-cluster-broker-0", "c1");

            let result = provider.ensure_networking_resources(&target).await;
            assert!(matches!(result, Err(Error::Kube(_))));
        }

        #[tokio::test]
        async fn unknown_cluster_id_falls_back_to_central() {
            let mut central = MockClusterHandle::new();
            central
                .expect_get_export()
                .times(1)
                .returning(|_, _| Ok(None));
            central.expect_apply_service().times(0);
            central
                .expect_apply_export()
                .times(1)
                .returning(|export| Ok(export.clone()));

            let provider = sample_provider(central, Vec::new());
            let target = sample_target("pass-1", "my-cluster-broker-0", "no-such-cluster");

            let applied = provider
                .ensure_networking_resources(&target)
                .await
                .expect("fallback is non-fatal");
            assert_eq!(applied.len(), 1);
            assert_eq!(applied[0].kind(), "ServiceExport");
        }

        #[tokio::test]
        async fn failed_probe_is_treated_as_absent() {
            let central = MockClusterHandle::new();
            let mut remote = MockClusterHandle::new();
            remote
                .expect_get_export()
                .times(1)
                .returning(|_, _| Err(api_error(503, "apiserver flake")));
            remote
                .expect_apply_service()
                .times(1)
                .returning(|service| Ok(service.clone()));
            remote
                .expect_apply_export()
                .times(1)
                .returning(|export| Ok(export.clone()));

            let provider = sample_provider(central, vec![("c1", remote)]);
            let target = sample_target("pass-1", "my-cluster-broker-0", "c1");

            // Creation is idempotent apply, so re-creating on a flaky probe
            // is safe; skipping would not be.
            let applied = provider
                .ensure_networking_resources(&target)
                .await
                .expect("ensure succeeds");
            assert_eq!(applied.len(), 2);
        }
    }

    mod discovery {
        use super::*;

        #[tokio::test]
        async fn discover_pod_endpoint_resolves_dns_and_port() {
            let mut central = MockClusterHandle::new();
            central
                .expect_get_service()
                .times(1)
                .withf(|namespace, name| namespace == "ns" && name == "pod-0-mcs")
                .returning(|_, _| Ok(Some(per_pod_service("pod-0-mcs", "tls", 9093))));

            let provider = sample_provider(central, Vec::new());
            let endpoint = provider
                .discover_pod_endpoint("ns", "pod-0", "c1", "tls")
                .await
                .expect("endpoint resolves");

            assert_eq!(endpoint, "pod-0.c1.pod-0-mcs.ns.svc.clusterset.local:9093");
        }

        #[tokio::test]
        async fn discover_pod_endpoint_fails_not_found_for_missing_service() {
            let mut central = MockClusterHandle::new();
            central
                .expect_get_service()
                .times(1)
                .returning(|_, _| Ok(None));

            let provider = sample_provider(central, Vec::new());
            let result = provider.discover_pod_endpoint("ns", "pod-0", "c1", "tls").await;

            assert!(matches!(result, Err(Error::NotFound(_))));
        }

        #[tokio::test]
        async fn discover_pod_endpoint_fails_port_not_found_for_missing_port() {
            let mut central = MockClusterHandle::new();
            central
                .expect_get_service()
                .times(1)
                .returning(|_, _| Ok(Some(per_pod_service("pod-0-mcs", "tls", 9093))));

            let provider = sample_provider(central, Vec::new());
            let result = provider
                .discover_pod_endpoint("ns", "pod-0", "c1", "replication")
                .await;

            assert!(matches!(result, Err(Error::PortNotFound(_))));
        }
    }

    mod removal {
        use super::*;

        #[tokio::test]
        async fn export_delete_failure_does_not_stop_service_deletion() {
            let mut central = MockClusterHandle::new();
            central
                .expect_delete_service()
                .times(1)
                .withf(|namespace, name| namespace == "ns" && name == "pod-0-mcs")
                .returning(|_, _| Ok(()));
            let mut remote = MockClusterHandle::new();
            remote
                .expect_delete_export()
                .times(1)
                .returning(|_, _| Err(api_error(404, "kind not registered")));

            let provider = sample_provider(central, vec![("c1", remote)]);
            provider
                .remove_networking_resources("ns", "pod-0", "c1")
                .await
                .expect("service deletion outcome wins");
        }

        #[tokio::test]
        async fn service_delete_failure_is_the_operations_result() {
            let mut central = MockClusterHandle::new();
            central
                .expect_delete_service()
                .times(1)
                .returning(|_, _| Err(api_error(500, "apiserver unavailable")));
            let mut remote = MockClusterHandle::new();
            remote
                .expect_delete_export()
                .times(1)
                .returning(|_, _| Ok(true));

            let provider = sample_provider(central, vec![("c1", remote)]);
            let result = provider.remove_networking_resources("ns", "pod-0", "c1").await;

            assert!(matches!(result, Err(Error::Kube(_))));
        }
    }

    mod derivation {
        use super::*;

        fn bare_provider() -> McsNetworkingProvider {
            sample_provider(MockClusterHandle::new(), Vec::new())
        }

        #[tokio::test]
        async fn service_and_pod_dns_names_use_mcs_formats() {
            let provider = bare_provider();
            assert_eq!(
                provider.derive_service_dns_name("ns", "svc", "c1"),
                "svc.c1.ns.svc.clusterset.local"
            );
            assert_eq!(
                provider.derive_pod_dns_name("ns", "svc", "pod-0", "c1"),
                "pod-0.c1.svc.ns.svc.clusterset.local"
            );
        }

        #[tokio::test]
        async fn advertised_listeners_use_the_brokers_service() {
            let provider = bare_provider();
            let listeners = vec![
                ("EXTERNAL".to_string(), "external".to_string()),
                ("TLS".to_string(), "tls".to_string()),
            ];
            let advertised =
                provider.derive_advertised_listeners("ns", "my-cluster", "pod-0", "c1", &listeners);
            assert_eq!(
                advertised,
                "EXTERNAL://pod-0.c1.my-cluster-brokers.ns.svc.clusterset.local:9094,\
                TLS://pod-0.c1.my-cluster-brokers.ns.svc.clusterset.local:9093"
            );
        }

        #[tokio::test]
        async fn quorum_voters_preserve_caller_order() {
            let provider = bare_provider();
            let controllers = vec![
                ControllerPodEntry {
                    node_id: 2,
                    pod_name: "ctrl-2".to_string(),
                    cluster_id: "c1".to_string(),
                },
                ControllerPodEntry {
                    node_id: 0,
                    pod_name: "ctrl-0".to_string(),
                    cluster_id: "central".to_string(),
                },
            ];
            let voters = provider.derive_quorum_voters("ns", &controllers, "replication");
            assert_eq!(
                voters,
                "2@ctrl-2.c1.ctrl-2.ns.svc.clusterset.local:9091,\
                0@ctrl-0.central.ctrl-0.ns.svc.clusterset.local:9091"
            );
        }

        #[tokio::test]
        async fn certificate_sans_are_pod_name_then_wildcard() {
            let provider = bare_provider();
            let sans = provider.derive_certificate_sans("ns", "pod-0", "c1");
            assert_eq!(sans.len(), 2);
            assert_eq!(sans[0], "pod-0.c1.pod-0-mcs.ns.svc.clusterset.local");
            assert_eq!(sans[1], "*.c1.pod-0-mcs.ns.svc.clusterset.local");
            assert!(sans[1].starts_with("*."));
        }

        #[tokio::test]
        async fn provider_identifier_is_mcs() {
            let provider = bare_provider();
            assert_eq!(provider.provider_identifier(), "mcs");
        }

        #[tokio::test]
        async fn injected_port_lookup_drives_listener_ports() {
            let provider = McsNetworkingProvider::with_ports(
                ProviderConfig::default(),
                vec![ClusterMembership::central(
                    "central",
                    Arc::new(MockClusterHandle::new()),
                )],
                Arc::new(|name: &str| (name == "tls").then_some(19093)),
            )
            .expect("valid membership set");

            let listeners = vec![("TLS".to_string(), "tls".to_string())];
            let advertised =
                provider.derive_advertised_listeners("ns", "my-cluster", "pod-0", "c1", &listeners);
            assert_eq!(
                advertised,
                "TLS://pod-0.c1.my-cluster-brokers.ns.svc.clusterset.local:19093"
            );
        }
    }
}

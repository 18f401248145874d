//! Cluster endpoint registry
//!
//! One stretched cluster spans several physical Kubernetes clusters, each
//! reachable through its own API endpoint. The host controller owns the
//! credentials and hands the provider one handle per cluster at
//! initialization; this module abstracts those handles behind a trait so the
//! reconcile logic can be exercised against mocks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams};
use kube::discovery::ApiResource;
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::export::{service_export_crd_name, service_export_resource};
use crate::{Error, Result, FIELD_MANAGER};

/// Cluster-API surface the provider needs from one physical cluster.
///
/// Service operations cover the headless discovery Service; export operations
/// are already scoped to the ServiceExport kind by the implementation. Handles
/// are externally owned, thread-safe clients (spec'd by the host), so the
/// trait takes `&self` everywhere.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterHandle: Send + Sync {
    /// Get a Service, or `None` if absent
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>>;

    /// Create or update a Service (server-side apply)
    async fn apply_service(&self, service: &Service) -> Result<Service>;

    /// Delete a Service. Absence is not an error.
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()>;

    /// Get a ServiceExport, or `None` if absent
    async fn get_export(&self, namespace: &str, name: &str) -> Result<Option<DynamicObject>>;

    /// Create or replace a ServiceExport
    async fn apply_export(&self, export: &DynamicObject) -> Result<DynamicObject>;

    /// Delete a ServiceExport. Returns true iff an object was removed.
    async fn delete_export(&self, namespace: &str, name: &str) -> Result<bool>;

    /// Whether the ServiceExport CRD is installed in this cluster
    async fn is_export_kind_registered(&self) -> bool;
}

/// Production [`ClusterHandle`] backed by a kube client
pub struct KubeClusterHandle {
    client: Client,
    export_resource: ApiResource,
}

impl KubeClusterHandle {
    /// Create a handle over an authenticated client for one cluster
    pub fn new(client: Client) -> Self {
        Self {
            client,
            export_resource: service_export_resource(),
        }
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn exports(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.export_resource)
    }

    fn apply_params() -> PatchParams {
        PatchParams::apply(FIELD_MANAGER).force()
    }
}

#[async_trait]
impl ClusterHandle for KubeClusterHandle {
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        Ok(self.services(namespace).get_opt(name).await?)
    }

    async fn apply_service(&self, service: &Service) -> Result<Service> {
        let namespace = service
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| Error::configuration("Service has no metadata.namespace"))?;
        let name = service
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::configuration("Service has no metadata.name"))?;
        Ok(self
            .services(namespace)
            .patch(name, &Self::apply_params(), &Patch::Apply(service))
            .await?)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        match self
            .services(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_export(&self, namespace: &str, name: &str) -> Result<Option<DynamicObject>> {
        Ok(self.exports(namespace).get_opt(name).await?)
    }

    async fn apply_export(&self, export: &DynamicObject) -> Result<DynamicObject> {
        let namespace = export
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| Error::configuration("ServiceExport has no metadata.namespace"))?;
        let name = export.name_any();
        Ok(self
            .exports(namespace)
            .patch(&name, &Self::apply_params(), &Patch::Apply(export))
            .await?)
    }

    async fn delete_export(&self, namespace: &str, name: &str) -> Result<bool> {
        match self
            .exports(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn is_export_kind_registered(&self) -> bool {
        let crds: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        match crds.get_opt(&service_export_crd_name()).await {
            Ok(found) => found.is_some(),
            Err(err) => {
                debug!(error = %err, "ServiceExport CRD probe failed, reporting unregistered");
                false
            }
        }
    }
}

/// One physical cluster participating in the stretch topology
#[derive(Clone)]
pub struct ClusterMembership {
    /// Unique cluster id within the stretch topology
    pub cluster_id: String,
    /// Whether this is the central cluster (exactly one per topology)
    pub is_central: bool,
    /// API handle for this cluster, owned by the host controller
    pub handle: Arc<dyn ClusterHandle>,
}

impl ClusterMembership {
    /// Create a central-cluster membership
    pub fn central(cluster_id: impl Into<String>, handle: Arc<dyn ClusterHandle>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            is_central: true,
            handle,
        }
    }

    /// Create a remote-cluster membership
    pub fn remote(cluster_id: impl Into<String>, handle: Arc<dyn ClusterHandle>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            is_central: false,
            handle,
        }
    }
}

/// A resolved cluster handle for one reconcile target
pub struct ResolvedCluster {
    /// Handle to use for this target
    pub handle: Arc<dyn ClusterHandle>,
    /// Whether the resolved cluster is the central one
    pub is_central: bool,
    /// True when the requested cluster id was unknown and the central
    /// cluster was substituted. Callers surface this at warn level.
    pub used_central_fallback: bool,
}

/// Registry of per-cluster handles, read-only after construction
pub struct ClusterEndpointRegistry {
    central_id: String,
    central: Arc<dyn ClusterHandle>,
    remotes: HashMap<String, Arc<dyn ClusterHandle>>,
}

impl ClusterEndpointRegistry {
    /// Build a registry from the membership set.
    ///
    /// Requires exactly one central membership and unique cluster ids.
    /// No cluster API is touched here: whether the ServiceExport kind is
    /// actually registered anywhere is deliberately deferred to first use.
    pub fn new(memberships: Vec<ClusterMembership>) -> Result<Self> {
        let mut central: Option<(String, Arc<dyn ClusterHandle>)> = None;
        let mut remotes: HashMap<String, Arc<dyn ClusterHandle>> = HashMap::new();

        for membership in memberships {
            if membership.is_central {
                if central.is_some() {
                    return Err(Error::configuration(format!(
                        "more than one central cluster in membership set: {}",
                        membership.cluster_id
                    )));
                }
                central = Some((membership.cluster_id, membership.handle));
            } else if remotes
                .insert(membership.cluster_id.clone(), membership.handle)
                .is_some()
            {
                return Err(Error::configuration(format!(
                    "duplicate cluster id in membership set: {}",
                    membership.cluster_id
                )));
            }
        }

        let (central_id, central) =
            central.ok_or_else(|| Error::configuration("no central cluster in membership set"))?;
        if remotes.contains_key(&central_id) {
            return Err(Error::configuration(format!(
                "duplicate cluster id in membership set: {central_id}"
            )));
        }

        Ok(Self {
            central_id,
            central,
            remotes,
        })
    }

    /// Resolve the handle for a cluster id, substituting the central cluster
    /// for unknown ids (degraded-but-non-fatal, flagged in the result)
    pub fn resolve(&self, cluster_id: &str) -> ResolvedCluster {
        if cluster_id == self.central_id {
            return ResolvedCluster {
                handle: Arc::clone(&self.central),
                is_central: true,
                used_central_fallback: false,
            };
        }
        match self.remotes.get(cluster_id) {
            Some(handle) => ResolvedCluster {
                handle: Arc::clone(handle),
                is_central: false,
                used_central_fallback: false,
            },
            None => ResolvedCluster {
                handle: Arc::clone(&self.central),
                is_central: true,
                used_central_fallback: true,
            },
        }
    }

    /// Handle for the central cluster
    pub fn central(&self) -> Arc<dyn ClusterHandle> {
        Arc::clone(&self.central)
    }

    /// Cluster id of the central cluster
    pub fn central_cluster_id(&self) -> &str {
        &self.central_id
    }

    /// Whether a cluster id is part of the membership set
    pub fn contains(&self, cluster_id: &str) -> bool {
        cluster_id == self.central_id || self.remotes.contains_key(cluster_id)
    }
}

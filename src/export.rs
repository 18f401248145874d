//! ServiceExport resource accessor
//!
//! ServiceExport comes from the Kubernetes Multi-Cluster Services API
//! (<https://github.com/kubernetes-sigs/mcs-api>) and is installed as a CRD
//! separately from this provider. It is addressed as a [`DynamicObject`] with
//! a fixed [`ApiResource`] rather than a generated model type.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use kube::discovery::ApiResource;

use crate::registry::ClusterHandle;
use crate::Result;

/// API group of the ServiceExport resource
pub const SERVICE_EXPORT_GROUP: &str = "multicluster.x-k8s.io";

/// API version of the ServiceExport resource
pub const SERVICE_EXPORT_VERSION: &str = "v1alpha1";

/// Kind of the ServiceExport resource
pub const SERVICE_EXPORT_KIND: &str = "ServiceExport";

/// Plural name of the ServiceExport resource
pub const SERVICE_EXPORT_PLURAL: &str = "serviceexports";

/// The fixed ApiResource for ServiceExport
pub fn service_export_resource() -> ApiResource {
    ApiResource {
        group: SERVICE_EXPORT_GROUP.to_string(),
        version: SERVICE_EXPORT_VERSION.to_string(),
        api_version: format!("{SERVICE_EXPORT_GROUP}/{SERVICE_EXPORT_VERSION}"),
        kind: SERVICE_EXPORT_KIND.to_string(),
        plural: SERVICE_EXPORT_PLURAL.to_string(),
    }
}

/// CRD name the MCS API registers for ServiceExport
pub fn service_export_crd_name() -> String {
    format!("{SERVICE_EXPORT_PLURAL}.{SERVICE_EXPORT_GROUP}")
}

/// Build a ServiceExport declaration.
///
/// A ServiceExport has no spec; exporting is declared purely by the object's
/// existence, with labels identifying the owning stretched cluster and an
/// annotation recording the physical cluster id.
pub fn build_service_export(
    name: &str,
    namespace: &str,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    owner_references: Vec<OwnerReference>,
) -> DynamicObject {
    let mut export = DynamicObject::new(name, &service_export_resource()).within(namespace);
    // ServiceExport has no spec; an empty object keeps the flattened data
    // serializable.
    export.data = serde_json::json!({});
    if !labels.is_empty() {
        export.metadata.labels = Some(labels);
    }
    if !annotations.is_empty() {
        export.metadata.annotations = Some(annotations);
    }
    if !owner_references.is_empty() {
        export.metadata.owner_references = Some(owner_references);
    }
    export
}

/// Thin typed accessor over one cluster handle for the ServiceExport kind
#[derive(Clone)]
pub struct ExportResourceGateway {
    handle: Arc<dyn ClusterHandle>,
}

impl ExportResourceGateway {
    /// Create a gateway over the given cluster handle
    pub fn new(handle: Arc<dyn ClusterHandle>) -> Self {
        Self { handle }
    }

    /// Get a ServiceExport, or `None` if absent. Never errors on not-found.
    pub async fn get(&self, namespace: &str, name: &str) -> Result<Option<DynamicObject>> {
        self.handle.get_export(namespace, name).await
    }

    /// Create or replace a ServiceExport
    pub async fn create_or_replace(&self, export: &DynamicObject) -> Result<DynamicObject> {
        self.handle.apply_export(export).await
    }

    /// Delete a ServiceExport. Returns true iff an object was removed.
    pub async fn delete(&self, namespace: &str, name: &str) -> Result<bool> {
        self.handle.delete_export(namespace, name).await
    }

    /// Whether the ServiceExport CRD is installed in this cluster.
    ///
    /// Diagnostics only: the reconcile path never gates on this, it attempts
    /// the operation and degrades on failure.
    pub async fn is_kind_registered(&self) -> bool {
        self.handle.is_export_kind_registered().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_resource_is_the_mcs_service_export() {
        let ar = service_export_resource();
        assert_eq!(ar.api_version, "multicluster.x-k8s.io/v1alpha1");
        assert_eq!(ar.kind, "ServiceExport");
        assert_eq!(ar.plural, "serviceexports");
        assert_eq!(service_export_crd_name(), "serviceexports.multicluster.x-k8s.io");
    }

    #[test]
    fn build_sets_identity_and_metadata() {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "stretch".to_string());
        let mut annotations = BTreeMap::new();
        annotations.insert(crate::ANNOTATION_CLUSTER_ID.to_string(), "c1".to_string());

        let export = build_service_export("my-brokers", "ns", labels, annotations, Vec::new());

        let types = export.types.as_ref().expect("type meta");
        assert_eq!(types.api_version, "multicluster.x-k8s.io/v1alpha1");
        assert_eq!(types.kind, "ServiceExport");
        assert_eq!(export.metadata.name.as_deref(), Some("my-brokers"));
        assert_eq!(export.metadata.namespace.as_deref(), Some("ns"));
        assert_eq!(
            export
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(crate::ANNOTATION_CLUSTER_ID))
                .map(String::as_str),
            Some("c1")
        );
        assert!(export.metadata.owner_references.is_none());
    }

    #[test]
    fn build_attaches_owner_references_when_given() {
        let owner = OwnerReference {
            api_version: "v1".to_string(),
            kind: "Service".to_string(),
            name: "my-brokers".to_string(),
            uid: "1234".to_string(),
            ..Default::default()
        };

        let export = build_service_export(
            "my-brokers",
            "ns",
            BTreeMap::new(),
            BTreeMap::new(),
            vec![owner],
        );

        let refs = export.metadata.owner_references.expect("owner references");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "my-brokers");
        // Empty maps stay unset rather than serializing as empty objects.
        assert!(export.metadata.labels.is_none());
        assert!(export.metadata.annotations.is_none());
    }
}

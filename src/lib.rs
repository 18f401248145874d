//! Multi-Cluster Services (MCS) networking provider for stretched clusters
//!
//! A stretched cluster is a single logical stateful cluster whose member pods
//! are spread across multiple independently-managed Kubernetes clusters. This
//! crate makes every member pod discoverable by DNS from any cluster in the
//! stretch topology, using the Kubernetes Multi-Cluster Services API
//! (ServiceExport) instead of direct IP routing.
//!
//! # Architecture
//!
//! The provider is a library plugged into a host controller. The host decides
//! *when* to reconcile and invokes [`provider::StretchNetworkingProvider`]
//! once per member pod per reconciliation pass; this crate decides *which*
//! cross-cluster discovery resources must exist (headless Services and
//! ServiceExport declarations), creates or repairs them idempotently, and
//! derives the DNS names, quorum-voter strings, and certificate SANs that
//! depend on them.
//!
//! # Modules
//!
//! - [`provider`] - Provider contract and the MCS implementation
//! - [`registry`] - Cluster endpoint registry and per-cluster API handles
//! - [`export`] - Typed accessor for ServiceExport resources
//! - [`dns`] - DNS name derivation and port-name resolution
//! - [`dedup`] - Reconciliation-scoped work deduplication
//! - [`config`] - Provider configuration
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod config;
pub mod dedup;
pub mod dns;
pub mod error;
pub mod export;
pub mod provider;
pub mod registry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================
// Centralizing these here keeps the provider, the resource builders, and the
// test fixtures consistent.

/// Default clusterset DNS domain for MCS names
pub const DEFAULT_CLUSTERSET_DOMAIN: &str = "clusterset.local";

/// Standard replication port
pub const PORT_REPLICATION: u16 = 9091;

/// Standard plaintext client port
pub const PORT_PLAIN: u16 = 9092;

/// Standard TLS client port
pub const PORT_TLS: u16 = 9093;

/// Standard external listener port
pub const PORT_EXTERNAL: u16 = 9094;

/// Standard control-plane port
pub const PORT_CONTROL_PLANE: u16 = 9090;

/// Label identifying the owning stretched cluster
pub const LABEL_CLUSTER: &str = "stretch.io/cluster";

/// Label identifying the resource kind managed by the stretch controller
pub const LABEL_KIND: &str = "stretch.io/kind";

/// Label carrying the component name within the stretched cluster
pub const LABEL_NAME: &str = "stretch.io/name";

/// Annotation recording which physical cluster a resource was created for
pub const ANNOTATION_CLUSTER_ID: &str = "stretch.io/stretch-cluster-id";

/// Value of the `app` label applied to every managed resource
pub const APP_LABEL_VALUE: &str = "stretch";

/// Field manager used for server-side apply of managed resources
pub const FIELD_MANAGER: &str = "stretch-mcs-provider";

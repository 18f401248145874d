//! Reconciliation-scoped work deduplication
//!
//! The host controller invokes the provider once per member pod, but the
//! discovery resources it manages are shared by every pod of a cluster. This
//! module owns the one piece of shared mutable state in the crate: a claim
//! cache that guarantees at most one invocation per reconciliation pass does
//! the work for a given (cluster, namespace, service) key.

use std::collections::HashSet;
use std::future::Future;

use tokio::sync::Mutex;
use tracing::debug;

/// Result of attempting to claim a unit of work for the current pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller is the first for this key in this pass and the resource is
    /// absent: the caller must create it.
    Claimed,
    /// Another invocation already handled this key in this pass.
    AlreadyClaimed,
    /// The resource already exists in the cluster; nothing to do this pass.
    AlreadyExists,
}

#[derive(Default)]
struct DedupState {
    /// Reconciliation pass the claim set belongs to
    reconciliation_id: Option<String>,
    /// Keys already processed within the current pass
    claimed: HashSet<String>,
}

/// Process-wide claim cache, scoped to one reconciliation pass.
///
/// The clear-if-stale, check, probe, insert sequence executes under a single
/// exclusive scope. The existence probe is awaited while the scope is held:
/// this is what guarantees that at most one caller ever receives
/// [`ClaimOutcome::Claimed`] per (reconciliation id, key) pair, even though
/// the probe itself is not atomic at the cluster API.
#[derive(Default)]
pub struct ReconciliationDeduplicator {
    state: Mutex<DedupState>,
}

impl ReconciliationDeduplicator {
    /// Create an empty deduplicator
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the given key for the current reconciliation pass, or learn why
    /// no work is needed.
    ///
    /// `exists_probe` checks the live cluster for the resource; it runs only
    /// for the first caller of a key within a pass.
    pub async fn claim_or_skip<F, Fut>(
        &self,
        reconciliation_id: &str,
        key: &str,
        exists_probe: F,
    ) -> ClaimOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        let mut state = self.state.lock().await;

        if state.reconciliation_id.as_deref() != Some(reconciliation_id) {
            debug!(
                previous = ?state.reconciliation_id,
                current = %reconciliation_id,
                "new reconciliation pass, clearing claim cache"
            );
            state.claimed.clear();
            state.reconciliation_id = Some(reconciliation_id.to_string());
        }

        if state.claimed.contains(key) {
            return ClaimOutcome::AlreadyClaimed;
        }

        let exists = exists_probe().await;
        state.claimed.insert(key.to_string());

        if exists {
            ClaimOutcome::AlreadyExists
        } else {
            ClaimOutcome::Claimed
        }
    }
}

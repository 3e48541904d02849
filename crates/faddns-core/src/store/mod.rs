// # Record Store
//
// Thread-safe map from host identifier to its latest accepted address
// report, plus the bookkeeping sets the coordinator reconciles against:
//
// - changed:  hosts whose report differs from what the zone file reflects
// - unpaired: changed hosts the last cycle found no placeholder line for
// - forced:   hosts an operator approved for insertion without a placeholder
//
// All four collections live behind a single lock so that a snapshot never
// observes a half-applied submit.
//
// ## Revisions
//
// Every content change bumps the entry's revision. Post-cycle bookkeeping
// only clears a host from `changed`, or marks it unpaired, if its revision
// still matches the snapshot the cycle patched from; a report that lands
// mid-cycle stays pending for the next one.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::coordinator::CycleStatus;
use crate::report::{AddressReport, normalize_host};

/// In-memory record store shared by the ingestion boundary and the
/// reconciliation coordinator
///
/// Cloning is cheap and yields a handle to the same store.
///
/// # Example
///
/// ```rust
/// use faddns_core::{AddressFamily, AddressReport, RecordStore};
///
/// #[tokio::main]
/// async fn main() {
///     let store = RecordStore::new();
///
///     let report = AddressReport::new("alpha", "198.51.100.7")
///         .with_address(AddressFamily::Inet, "203.0.113.5");
///     assert!(store.submit(report).await);
///
///     let snapshot = store.snapshot().await;
///     assert!(snapshot.changed.contains("alpha"));
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    inner: Arc<RwLock<StoreState>>,
}

#[derive(Debug, Default)]
struct StoreState {
    reports: BTreeMap<String, StoredReport>,
    changed: BTreeSet<String>,
    unpaired: BTreeSet<String>,
    forced: BTreeSet<String>,
    next_revision: u64,
    last_cycle: Option<CycleStatus>,
}

#[derive(Debug, Clone)]
struct StoredReport {
    report: AddressReport,
    revision: u64,
}

/// Consistent point-in-time view of the store
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub reports: BTreeMap<String, AddressReport>,
    pub changed: BTreeSet<String>,
    pub unpaired: BTreeSet<String>,
    pub forced: BTreeSet<String>,
    revisions: HashMap<String, u64>,
}

impl Snapshot {
    /// Revision of `host` at the time the snapshot was taken
    pub fn revision(&self, host: &str) -> Option<u64> {
        self.revisions.get(host).copied()
    }
}

/// One host as seen by the dump boundary
#[derive(Debug, Clone)]
pub struct StoreEntry {
    pub report: AddressReport,
    pub changed: bool,
    pub unpaired: bool,
    pub forced: bool,
}

/// Result of applying a finished cycle to the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bookkeeping {
    /// Hosts removed from the change set
    pub reconciled: Vec<String>,
    /// Written hosts that changed again while the cycle ran and stay pending
    pub superseded: Vec<String>,
}

impl RecordStore {
    /// Create a new empty record store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `report` as the latest state of its host.
    ///
    /// The host is added to the change set when the reported content
    /// differs from the stored report. The receive timestamp is refreshed
    /// either way. A changed host leaves the unpaired set until the next
    /// cycle has looked at it. Returns whether the host was marked changed.
    pub async fn submit(&self, mut report: AddressReport) -> bool {
        report.host = normalize_host(&report.host);
        let host = report.host.clone();

        let mut guard = self.inner.write().await;
        let state = &mut *guard;

        if let Some(stored) = state.reports.get_mut(&host)
            && stored.report.same_content(&report)
        {
            stored.report.received_at = report.received_at;
            return false;
        }

        state.next_revision += 1;
        let revision = state.next_revision;
        state
            .reports
            .insert(host.clone(), StoredReport { report, revision });
        state.changed.insert(host.clone());
        // Stale until the next cycle looks for a placeholder again
        state.unpaired.remove(&host);
        debug!("Report for {} changed (revision {})", host, revision);
        true
    }

    /// Take a consistent snapshot of all reports and bookkeeping sets
    pub async fn snapshot(&self) -> Snapshot {
        let guard = self.inner.read().await;
        Snapshot {
            reports: guard
                .reports
                .iter()
                .map(|(host, stored)| (host.clone(), stored.report.clone()))
                .collect(),
            changed: guard.changed.clone(),
            unpaired: guard.unpaired.clone(),
            forced: guard.forced.clone(),
            revisions: guard
                .reports
                .iter()
                .map(|(host, stored)| (host.clone(), stored.revision))
                .collect(),
        }
    }

    /// Remove `host` from the change set
    pub async fn mark_reconciled(&self, host: &str) {
        let mut guard = self.inner.write().await;
        guard.changed.remove(&normalize_host(host));
    }

    /// Approve `host` for insertion even though the zone has no placeholder
    /// line for it. Idempotent; returns whether the host was newly added.
    pub async fn force_add(&self, host: &str) -> bool {
        let mut guard = self.inner.write().await;
        guard.forced.insert(normalize_host(host))
    }

    /// Apply the result of a successful cycle.
    ///
    /// `written` hosts are cleared from the change and force sets unless
    /// they were resubmitted with new content after `snapshot` was taken.
    /// The unpaired set is replaced by the hosts of `unpaired` that were
    /// not resubmitted either.
    pub async fn complete_cycle(
        &self,
        snapshot: &Snapshot,
        written: &BTreeSet<String>,
        unpaired: &BTreeSet<String>,
    ) -> Bookkeeping {
        let mut guard = self.inner.write().await;
        let state = &mut *guard;
        let mut result = Bookkeeping::default();

        for host in written {
            let current = state.reports.get(host).map(|stored| stored.revision);
            if current.is_some() && current == snapshot.revision(host) {
                state.changed.remove(host);
                state.forced.remove(host);
                result.reconciled.push(host.clone());
            } else {
                result.superseded.push(host.clone());
            }
        }

        state.unpaired = unpaired
            .iter()
            .filter(|host| {
                let current = state.reports.get(*host).map(|stored| stored.revision);
                current.is_some() && current == snapshot.revision(host)
            })
            .cloned()
            .collect();
        result
    }

    /// Remember the outcome of the last attempted cycle
    pub async fn record_cycle(&self, status: CycleStatus) {
        self.inner.write().await.last_cycle = Some(status);
    }

    /// Outcome of the last attempted cycle
    pub async fn last_cycle(&self) -> Option<CycleStatus> {
        self.inner.read().await.last_cycle.clone()
    }

    /// Latest report of `host`
    pub async fn get(&self, host: &str) -> Option<AddressReport> {
        let guard = self.inner.read().await;
        guard
            .reports
            .get(&normalize_host(host))
            .map(|stored| stored.report.clone())
    }

    /// All hosts with their bookkeeping membership, sorted by host
    pub async fn entries(&self) -> Vec<StoreEntry> {
        let guard = self.inner.read().await;
        guard
            .reports
            .iter()
            .map(|(host, stored)| StoreEntry {
                report: stored.report.clone(),
                changed: guard.changed.contains(host),
                unpaired: guard.unpaired.contains(host),
                forced: guard.forced.contains(host),
            })
            .collect()
    }

    /// Get the number of hosts in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.reports.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.reports.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::AddressFamily;

    fn alpha(addr: &str) -> AddressReport {
        AddressReport::new("alpha", "198.51.100.7").with_address(AddressFamily::Inet, addr)
    }

    #[tokio::test]
    async fn test_submit_marks_changed_once() {
        let store = RecordStore::new();
        assert!(store.is_empty().await);

        assert!(store.submit(alpha("203.0.113.5")).await);
        store.mark_reconciled("alpha").await;

        // Same content again: timestamp refresh only
        let later = alpha("203.0.113.5").received_at(chrono::Utc::now() + chrono::Duration::hours(1));
        let refreshed_at = later.received_at;
        assert!(!store.submit(later).await);

        let snapshot = store.snapshot().await;
        assert!(snapshot.changed.is_empty());
        assert_eq!(snapshot.reports["alpha"].received_at, refreshed_at);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_submit_replaces_addresses() {
        let store = RecordStore::new();
        store
            .submit(alpha("203.0.113.5").with_address(AddressFamily::Inet6, "2001:db8::5"))
            .await;
        store.submit(alpha("203.0.113.9")).await;

        let report = store.get("ALPHA").await.unwrap();
        assert_eq!(report.addresses.len(), 1);
        assert_eq!(report.addresses[0].value, "203.0.113.9");
    }

    #[tokio::test]
    async fn test_complete_cycle_keeps_superseded_hosts() {
        let store = RecordStore::new();
        store.submit(alpha("203.0.113.5")).await;
        store
            .submit(AddressReport::new("beta", "198.51.100.8").with_address(AddressFamily::Inet, "203.0.113.6"))
            .await;
        store.force_add("beta").await;

        let snapshot = store.snapshot().await;

        // alpha reports a new address while the cycle is running
        store.submit(alpha("203.0.113.77")).await;

        let written: BTreeSet<String> = ["alpha", "beta"].iter().map(|s| s.to_string()).collect();
        let result = store
            .complete_cycle(&snapshot, &written, &BTreeSet::new())
            .await;

        assert_eq!(result.reconciled, vec!["beta".to_string()]);
        assert_eq!(result.superseded, vec!["alpha".to_string()]);

        let after = store.snapshot().await;
        assert!(after.changed.contains("alpha"));
        assert!(after.unpaired.is_empty());
        assert!(!after.changed.contains("beta"));
        assert!(after.forced.is_empty());
    }

    #[tokio::test]
    async fn test_new_content_clears_unpaired() {
        let store = RecordStore::new();
        store.submit(alpha("203.0.113.5")).await;
        let snapshot = store.snapshot().await;
        let unpaired: BTreeSet<String> = ["alpha".to_string()].into();
        store
            .complete_cycle(&snapshot, &BTreeSet::new(), &unpaired)
            .await;
        assert_eq!(store.snapshot().await.unpaired, unpaired);

        // Same content keeps it unpaired, new content does not
        store.submit(alpha("203.0.113.5")).await;
        assert_eq!(store.snapshot().await.unpaired, unpaired);
        store.submit(alpha("203.0.113.6")).await;
        assert!(store.snapshot().await.unpaired.is_empty());
    }

    #[tokio::test]
    async fn test_resubmitted_host_is_not_marked_unpaired() {
        let store = RecordStore::new();
        store.submit(AddressReport::new("alpha", "198.51.100.7")).await;
        let snapshot = store.snapshot().await;

        store.submit(alpha("203.0.113.77")).await;

        let unpaired: BTreeSet<String> = ["alpha".to_string()].into();
        store
            .complete_cycle(&snapshot, &BTreeSet::new(), &unpaired)
            .await;

        let after = store.snapshot().await;
        assert!(after.changed.contains("alpha"));
        assert!(after.unpaired.is_empty());
    }

    #[tokio::test]
    async fn test_force_add_is_idempotent() {
        let store = RecordStore::new();
        assert!(store.force_add("Gamma").await);
        assert!(!store.force_add("gamma").await);
        assert_eq!(store.snapshot().await.forced.len(), 1);
    }
}

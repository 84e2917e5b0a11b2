//! Versioned document store
//!
//! The persistence collaborator is a document store with per-document
//! optimistic versioning. The [`DocumentStore`] trait is the seam the ledger
//! and state machine are written against; [`MemoryStore`] is the in-process
//! implementation used by the service and by tests.
//!
//! # Atomicity
//!
//! [`DocumentStore::commit`] applies a set of writes all-or-nothing: every
//! versioned write names the version it read, and the commit fails with
//! [`LedgerError::StoreConflict`] if any document has moved on. Callers
//! re-read and re-run the whole operation on conflict. A partial commit
//! (balance decremented but acceptor not recorded) is impossible by
//! construction.

use std::sync::Mutex;

use dashmap::DashMap;

use crate::types::{BundleId, KeyBundle, KeyUsageRecord, LedgerError, Request, RequestId};

/// Document version, incremented on every committed write
pub type Version = u64;

/// Outcome of a constraint-backed bundle insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The bundle was created
    Created,
    /// A bundle with the same transaction id already exists
    Duplicate(BundleId),
}

/// One write inside an atomic commit
#[derive(Debug, Clone)]
pub enum Write {
    /// Replace a request document, guarded by its read version
    PutRequest {
        /// Request id
        id: RequestId,
        /// Version the caller read
        expected: Version,
        /// New document contents
        doc: Request,
    },

    /// Replace a bundle document, guarded by its read version
    PutBundle {
        /// Bundle id
        id: BundleId,
        /// Version the caller read
        expected: Version,
        /// New document contents
        doc: KeyBundle,
    },

    /// Append to the key-usage audit log (no version, append-only)
    AppendUsage(KeyUsageRecord),
}

/// Interface to the persistence collaborator
///
/// Reads return the document together with the version to pass back into
/// [`DocumentStore::commit`]. Bundle scans are owner-scoped and sorted
/// oldest purchase first, matching the ledger's consumption order.
pub trait DocumentStore: Send + Sync {
    /// Load a request with its current version
    fn get_request(&self, id: RequestId) -> Result<Option<(Request, Version)>, LedgerError>;

    /// Insert a new request at version 0
    fn insert_request(&self, doc: Request) -> Result<(), LedgerError>;

    /// Load a bundle with its current version
    fn get_bundle(&self, id: BundleId) -> Result<Option<(KeyBundle, Version)>, LedgerError>;

    /// All bundles belonging to `owner`, sorted by `purchased_at` ascending
    ///
    /// Includes drained bundles; spend-candidate filtering is the ledger's
    /// concern, balance audit needs the full set.
    fn bundles_for_owner(&self, owner: &str) -> Result<Vec<(KeyBundle, Version)>, LedgerError>;

    /// Look up a bundle by its external transaction id
    fn find_bundle_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<BundleId>, LedgerError>;

    /// Insert a bundle, enforcing the unique transaction-id constraint
    ///
    /// Returns [`InsertOutcome::Duplicate`] with the existing bundle id if a
    /// bundle for the same transaction already exists; the new document is
    /// discarded in that case. The check-and-insert is atomic.
    fn insert_bundle(&self, doc: KeyBundle) -> Result<InsertOutcome, LedgerError>;

    /// Apply a set of writes atomically
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StoreConflict`] (and applies nothing) if any
    /// versioned write's expected version no longer matches, or
    /// [`LedgerError::NotFound`] if a versioned write names a document that
    /// does not exist.
    fn commit(&self, writes: Vec<Write>) -> Result<(), LedgerError>;

    /// Key-usage audit entries for `owner`, oldest first
    fn usage_for_owner(&self, owner: &str) -> Result<Vec<KeyUsageRecord>, LedgerError>;
}

/// In-memory document store
///
/// Documents live in concurrent maps; reads are lock-free snapshots. Commits
/// serialize on a single mutex: versions are verified first, then all writes
/// apply, so a commit either happens entirely or not at all.
pub struct MemoryStore {
    requests: DashMap<RequestId, (Request, Version)>,
    bundles: DashMap<BundleId, (KeyBundle, Version)>,
    /// Unique index transaction_id -> bundle id, backing idempotent grants
    tx_index: DashMap<String, BundleId>,
    usage: Mutex<Vec<KeyUsageRecord>>,
    commit_lock: Mutex<()>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        MemoryStore {
            requests: DashMap::new(),
            bundles: DashMap::new(),
            tx_index: DashMap::new(),
            usage: Mutex::new(Vec::new()),
            commit_lock: Mutex::new(()),
        }
    }

    fn usage_guard(&self) -> Result<std::sync::MutexGuard<'_, Vec<KeyUsageRecord>>, LedgerError> {
        self.usage
            .lock()
            .map_err(|_| LedgerError::store("usage log lock poisoned"))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn get_request(&self, id: RequestId) -> Result<Option<(Request, Version)>, LedgerError> {
        Ok(self.requests.get(&id).map(|entry| entry.value().clone()))
    }

    fn insert_request(&self, doc: Request) -> Result<(), LedgerError> {
        self.requests.insert(doc.id, (doc, 0));
        Ok(())
    }

    fn get_bundle(&self, id: BundleId) -> Result<Option<(KeyBundle, Version)>, LedgerError> {
        Ok(self.bundles.get(&id).map(|entry| entry.value().clone()))
    }

    fn bundles_for_owner(&self, owner: &str) -> Result<Vec<(KeyBundle, Version)>, LedgerError> {
        let mut bundles: Vec<(KeyBundle, Version)> = self
            .bundles
            .iter()
            .filter(|entry| entry.value().0.owner_id == owner)
            .map(|entry| entry.value().clone())
            .collect();
        bundles.sort_by_key(|(bundle, _)| bundle.purchased_at);
        Ok(bundles)
    }

    fn find_bundle_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<BundleId>, LedgerError> {
        Ok(self.tx_index.get(transaction_id).map(|entry| *entry.value()))
    }

    fn insert_bundle(&self, doc: KeyBundle) -> Result<InsertOutcome, LedgerError> {
        // The entry guard holds the index shard, making check-and-insert
        // atomic: two racing grants for the same transaction cannot both
        // observe a vacant slot.
        match self.tx_index.entry(doc.transaction_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                Ok(InsertOutcome::Duplicate(*existing.get()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let id = doc.id;
                slot.insert(id);
                self.bundles.insert(id, (doc, 0));
                Ok(InsertOutcome::Created)
            }
        }
    }

    fn commit(&self, writes: Vec<Write>) -> Result<(), LedgerError> {
        let _guard = self
            .commit_lock
            .lock()
            .map_err(|_| LedgerError::store("commit lock poisoned"))?;

        // Take the usage log up front so no failure can surface between
        // applying the document writes and appending the audit records.
        let mut usage = if writes
            .iter()
            .any(|write| matches!(write, Write::AppendUsage(_)))
        {
            Some(self.usage_guard()?)
        } else {
            None
        };

        // Verify every version before applying anything.
        for write in &writes {
            match write {
                Write::PutRequest { id, expected, .. } => {
                    let current = self
                        .requests
                        .get(id)
                        .map(|entry| entry.value().1)
                        .ok_or_else(|| LedgerError::not_found("request", id.to_string()))?;
                    if current != *expected {
                        return Err(LedgerError::store_conflict(format!("request {id}")));
                    }
                }
                Write::PutBundle { id, expected, .. } => {
                    let current = self
                        .bundles
                        .get(id)
                        .map(|entry| entry.value().1)
                        .ok_or_else(|| LedgerError::not_found("bundle", id.to_string()))?;
                    if current != *expected {
                        return Err(LedgerError::store_conflict(format!("bundle {id}")));
                    }
                }
                Write::AppendUsage(_) => {}
            }
        }

        for write in writes {
            match write {
                Write::PutRequest { id, expected, doc } => {
                    self.requests.insert(id, (doc, expected + 1));
                }
                Write::PutBundle { id, expected, doc } => {
                    self.bundles.insert(id, (doc, expected + 1));
                }
                Write::AppendUsage(record) => {
                    if let Some(usage) = usage.as_mut() {
                        usage.push(record);
                    }
                }
            }
        }

        Ok(())
    }

    fn usage_for_owner(&self, owner: &str) -> Result<Vec<KeyUsageRecord>, LedgerError> {
        Ok(self
            .usage_guard()?
            .iter()
            .filter(|record| record.owner_id == owner)
            .cloned()
            .collect())
    }
}

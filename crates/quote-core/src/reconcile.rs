//! Reconciliation: merging a fetched remote list into the local collection.
//!
//! A pass works as follows:
//!
//! 1. Remote items are indexed by remote id (first occurrence wins)
//! 2. Each remote item is matched against the local record carrying the same
//!    remote id:
//!    - same text and category: nothing happens
//!    - different: the local state is captured in a conflict record and the
//!      remote text/category overwrite the local record (remote wins)
//!    - no local match: a new local record is staged
//! 3. Local-only records are uploaded one at a time and gain the returned id
//! 4. Staged records are inserted
//! 5. The collection is persisted and the conflict report replaced
//!
//! The synchronous steps live here as methods on [`QuoteCollection`] so they
//! can run under a short lock between the network calls of step 1 and 3.
//! [`crate::session::QuoteSession`] drives the whole pass.

use crate::collection::QuoteCollection;
use crate::conflict::ConflictRecord;
use crate::quote::{normalize_category, Quote, RemoteItem};
use crate::store::KeyValueStore;

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Result of merging one remote snapshot (steps 1 and 2).
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Conflicts found and already resolved in favour of the remote.
    pub conflicts: Vec<ConflictRecord>,
    /// Remote-new records waiting for insertion.
    pub staged: Vec<Quote>,
}

/// A local-only record queued for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub local_id: String,
    pub text: String,
    pub category: String,
}

/// What happened when attaching an uploaded record's new remote id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached,
    /// The record was deleted while the upload was in flight.
    RecordGone,
    /// The record gained a remote id some other way mid-pass.
    AlreadyLinked,
    /// Another record (live or staged) already carries the returned id.
    IdTaken,
}

/// Counts reported at the end of a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub conflict_count: usize,
    pub added_from_remote_count: usize,
    pub uploaded_count: usize,
    pub failed_upload_count: usize,
}

impl<S: KeyValueStore> QuoteCollection<S> {
    /// Compare a remote snapshot against local records (steps 1 and 2).
    ///
    /// Conflicting records are overwritten in place. Remote-new records are
    /// staged, not inserted. Nothing is persisted.
    pub fn merge_remote(&mut self, remote: &[RemoteItem], now: u64) -> MergeOutcome {
        let mut seen = HashSet::new();
        let remote: Vec<&RemoteItem> = remote
            .iter()
            .filter(|item| {
                if item.text.trim().is_empty() {
                    debug!("Ignoring remote id {} with blank text", item.remote_id);
                    return false;
                }
                let first = seen.insert(item.remote_id);
                if !first {
                    debug!("Ignoring repeated remote id {}", item.remote_id);
                }
                first
            })
            .collect();

        let local_index: HashMap<u64, usize> = self
            .quotes
            .iter()
            .enumerate()
            .filter_map(|(i, q)| q.remote_id.map(|id| (id, i)))
            .collect();

        let mut outcome = MergeOutcome::default();
        for item in remote {
            match local_index.get(&item.remote_id) {
                Some(&index) => {
                    let local = &mut self.quotes[index];
                    if local.matches_remote(item) {
                        continue;
                    }
                    debug!(
                        "Conflict on quote {} (remote id {}), remote wins",
                        local.local_id, item.remote_id
                    );
                    outcome
                        .conflicts
                        .push(ConflictRecord::new(local.clone(), item.clone()));
                    local.text = item.text.clone();
                    local.category = normalize_category(Some(&item.category));
                    local.updated_at = now;
                }
                None => outcome.staged.push(Quote::from_remote(item, now)),
            }
        }
        outcome
    }

    /// Local-only records that need a creation round-trip (step 3).
    pub fn pending_uploads(&self) -> Vec<PendingUpload> {
        self.quotes
            .iter()
            .filter(|q| q.remote_id.is_none())
            .map(|q| PendingUpload {
                local_id: q.local_id.clone(),
                text: q.text.clone(),
                category: q.category.clone(),
            })
            .collect()
    }

    /// Link a freshly uploaded record to its remote id.
    ///
    /// `staged` are remote-new records not yet inserted; their ids count as
    /// taken. Nothing is persisted.
    pub fn attach_remote_id(
        &mut self,
        local_id: &str,
        remote_id: u64,
        staged: &[Quote],
        now: u64,
    ) -> AttachOutcome {
        let taken = self
            .quotes
            .iter()
            .chain(staged)
            .any(|q| q.remote_id == Some(remote_id) && q.local_id != local_id);

        let Some(record) = self.find_by_local_id_mut(local_id) else {
            return AttachOutcome::RecordGone;
        };
        if record.remote_id.is_some() {
            return AttachOutcome::AlreadyLinked;
        }
        if taken {
            warn!(
                "Remote id {} returned for quote {} is already linked, leaving it local-only",
                remote_id, local_id
            );
            return AttachOutcome::IdTaken;
        }

        record.remote_id = Some(remote_id);
        record.updated_at = now;
        AttachOutcome::Attached
    }

    /// Insert staged remote-new records (step 4), returning how many landed.
    ///
    /// A staged record whose remote id was claimed during the pass is dropped.
    /// Nothing is persisted.
    pub fn insert_staged(&mut self, staged: Vec<Quote>) -> usize {
        let mut inserted = 0;
        for quote in staged {
            let claimed = quote
                .remote_id
                .is_some_and(|id| self.find_by_remote_id(id).is_some());
            if claimed {
                debug!(
                    "Dropping staged quote for remote id {:?}, already linked",
                    quote.remote_id
                );
                continue;
            }
            self.quotes.push(quote);
            inserted += 1;
        }
        inserted
    }
}

//! Conflict report produced by a reconciliation pass.
//!
//! Remote always wins automatically. Each conflict keeps the local state the
//! pass overwrote so a person can put it back.

use crate::collection::QuoteCollection;
use crate::quote::{Quote, RemoteItem};
use crate::store::KeyValueStore;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RevertError {
    #[error("No conflict at index {0}")]
    NotFound(usize),

    #[error("Conflict {0} was already reverted")]
    AlreadyResolved(usize),

    #[error("Quote {0} no longer exists")]
    RecordMissing(String),
}

/// A matched local/remote pair that disagreed during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    /// Local record as it was before the remote version was applied.
    pub snapshot_before_resolution: Quote,
    /// Remote version that was applied.
    pub remote_version: RemoteItem,
    /// Set once the local version has been manually restored.
    pub resolved: bool,
}

impl ConflictRecord {
    pub fn new(snapshot: Quote, remote: RemoteItem) -> Self {
        Self {
            snapshot_before_resolution: snapshot,
            remote_version: remote,
            resolved: false,
        }
    }

    pub fn local_id(&self) -> &str {
        &self.snapshot_before_resolution.local_id
    }
}

/// Conflicts from the most recent reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConflictReport {
    conflicts: Vec<ConflictRecord>,
}

impl ConflictReport {
    pub fn new(conflicts: Vec<ConflictRecord>) -> Self {
        Self { conflicts }
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ConflictRecord> {
        self.conflicts.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConflictRecord> {
        self.conflicts.iter()
    }

    pub fn unresolved_count(&self) -> usize {
        self.conflicts.iter().filter(|c| !c.resolved).count()
    }

    /// Restore the local version captured by conflict `index`.
    ///
    /// Overwrites the live record's text and category with the snapshot,
    /// refreshes `updated_at`, and persists. The record keeps its remote id, so
    /// the next pass will flag the same conflict again if the remote is
    /// unchanged.
    pub fn revert<S: KeyValueStore>(
        &mut self,
        index: usize,
        collection: &mut QuoteCollection<S>,
        now: u64,
    ) -> Result<Quote, RevertError> {
        let conflict = self
            .conflicts
            .get_mut(index)
            .ok_or(RevertError::NotFound(index))?;
        if conflict.resolved {
            return Err(RevertError::AlreadyResolved(index));
        }

        let snapshot = &conflict.snapshot_before_resolution;
        let record = collection
            .find_by_local_id_mut(&snapshot.local_id)
            .ok_or_else(|| RevertError::RecordMissing(snapshot.local_id.clone()))?;

        record.text = snapshot.text.clone();
        record.category = snapshot.category.clone();
        record.updated_at = now;
        let restored = record.clone();

        conflict.resolved = true;
        collection.persist();

        info!("Reverted conflict {} on quote {}", index, restored.local_id);
        Ok(restored)
    }
}

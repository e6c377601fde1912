//! QuoteSession: the application state for one run.
//!
//! Owns the collection, the conflict report, the selected filter and the
//! event bus, and drives reconciliation passes against a [`RemoteGateway`].
//!
//! Passes are serialized by a single-slot guard. A pass requested while one
//! is running is coalesced: the caller gets [`SyncOutcome::Coalesced`] and
//! the running caller does one more pass before releasing the guard.
//! The collection lock is never held across a network call, so user edits
//! interleave with a pass between its suspension points.

use crate::collection::{ParseError, QuoteCollection, ValidationError};
use crate::conflict::{ConflictReport, RevertError};
use crate::events::{EventBus, QuoteEvent};
use crate::gateway::{NetworkError, RemoteGateway};
use crate::quote::{now_millis, CategoryFilter, Quote};
use crate::reconcile::{AttachOutcome, SyncSummary};
use crate::store::{KeyValueStore, FILTER_KEY};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// How a sync request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The pass (and any coalesced follow-up) finished.
    Completed(SyncSummary),
    /// Another pass was running; it will run once more on our behalf.
    Coalesced,
    /// The remote list couldn't be fetched; local state is unchanged.
    Failed(NetworkError),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Clears the in-progress flag even if the pass future is dropped.
struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct QuoteSession<S: KeyValueStore, G: RemoteGateway> {
    store: Arc<S>,
    collection: Mutex<QuoteCollection<Arc<S>>>,
    conflicts: Mutex<ConflictReport>,
    filter: Mutex<CategoryFilter>,
    gateway: G,
    events: Arc<EventBus>,
    in_progress: AtomicBool,
    rerun_requested: AtomicBool,
}

impl<S: KeyValueStore, G: RemoteGateway> QuoteSession<S, G> {
    /// Load quotes and the saved filter from `store`.
    pub fn load(store: Arc<S>, gateway: G) -> Self {
        let collection = QuoteCollection::load(Arc::clone(&store));
        let filter = match store.get(FILTER_KEY) {
            Ok(Some(saved)) => CategoryFilter::parse(&saved),
            Ok(None) => CategoryFilter::All,
            Err(e) => {
                warn!("Failed to read saved filter: {}", e);
                CategoryFilter::All
            }
        };

        Self {
            store,
            collection: Mutex::new(collection),
            conflicts: Mutex::new(ConflictReport::default()),
            filter: Mutex::new(filter),
            gateway,
            events: Arc::new(EventBus::new()),
            in_progress: AtomicBool::new(false),
            rerun_requested: AtomicBool::new(false),
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Snapshot of every quote.
    pub fn quotes(&self) -> Vec<Quote> {
        lock(&self.collection).all().to_vec()
    }

    /// Snapshot of the quotes matching the current filter.
    pub fn visible_quotes(&self) -> Vec<Quote> {
        self.quotes_in(&self.filter())
    }

    /// Snapshot of the quotes matching `filter`, ignoring the saved one.
    pub fn quotes_in(&self, filter: &CategoryFilter) -> Vec<Quote> {
        lock(&self.collection)
            .filtered(filter)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn find(&self, local_id: &str) -> Option<Quote> {
        lock(&self.collection).find_by_local_id(local_id).cloned()
    }

    pub fn categories(&self) -> Vec<String> {
        lock(&self.collection).categories()
    }

    /// A random quote from the current filter.
    pub fn random_quote(&self) -> Option<Quote> {
        self.random_quote_in(&self.filter())
    }

    pub fn random_quote_in(&self, filter: &CategoryFilter) -> Option<Quote> {
        lock(&self.collection).random_quote(filter).cloned()
    }

    pub fn add_quote(
        &self,
        text: &str,
        category: Option<&str>,
        author: Option<&str>,
    ) -> Result<Quote, ValidationError> {
        let quote = lock(&self.collection).add_with_author(text, category, author)?;
        self.events.emit(QuoteEvent::QuoteAdded {
            local_id: quote.local_id.clone(),
            category: quote.category.clone(),
        });
        Ok(quote)
    }

    pub fn remove_quote(&self, local_id: &str) -> Option<Quote> {
        let removed = lock(&self.collection).remove(local_id)?;
        self.events.emit(QuoteEvent::QuoteRemoved {
            local_id: removed.local_id.clone(),
        });
        Some(removed)
    }

    pub fn export_json(&self) -> Result<String, ParseError> {
        lock(&self.collection).export_json()
    }

    pub fn import_json(&self, json: &str) -> Result<usize, ParseError> {
        let count = lock(&self.collection).import_json(json)?;
        self.events.emit(QuoteEvent::QuotesImported { count });
        Ok(count)
    }

    pub fn filter(&self) -> CategoryFilter {
        lock(&self.filter).clone()
    }

    /// Select a category filter and remember it.
    pub fn set_filter(&self, filter: CategoryFilter) {
        if let Err(e) = self.store.set(FILTER_KEY, filter.as_str()) {
            warn!("Failed to persist filter: {}", e);
        }
        let label = filter.as_str().to_string();
        *lock(&self.filter) = filter;
        self.events.emit(QuoteEvent::FilterChanged { filter: label });
    }

    /// Snapshot of the conflict report from the last pass.
    pub fn conflicts(&self) -> ConflictReport {
        lock(&self.conflicts).clone()
    }

    /// Restore the local version of conflict `index`.
    pub fn revert_conflict(&self, index: usize) -> Result<Quote, RevertError> {
        let restored = {
            let mut collection = lock(&self.collection);
            lock(&self.conflicts).revert(index, &mut *collection, now_millis())?
        };
        self.events.emit(QuoteEvent::ConflictReverted {
            index,
            local_id: restored.local_id.clone(),
        });
        Ok(restored)
    }

    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Run a reconciliation pass now, or coalesce into the running one.
    pub async fn sync_now(&self) -> SyncOutcome {
        if !self.claim_slot() {
            debug!("Sync already in progress, coalescing request");
            return SyncOutcome::Coalesced;
        }
        let mut guard = InProgress(&self.in_progress);

        loop {
            self.rerun_requested.store(false, Ordering::SeqCst);
            let outcome = self.run_pass().await;
            drop(guard);
            if !self.reclaim_for_rerun() {
                return outcome;
            }
            guard = InProgress(&self.in_progress);
            debug!("Running coalesced follow-up pass");
        }
    }

    /// Take the pass slot, or leave a rerun request for its holder.
    ///
    /// Returns true when the caller now holds the slot. A request that
    /// returns false was recorded while the slot was still held, so the
    /// holder sees it after releasing.
    fn claim_slot(&self) -> bool {
        let take = || {
            self.in_progress
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        };
        if take() {
            return true;
        }
        self.rerun_requested.store(true, Ordering::SeqCst);
        // The holder may have released before seeing the request
        take()
    }

    /// After releasing the slot, take it back if a rerun was requested.
    ///
    /// Returns false when there is nothing to rerun or another caller
    /// already took the slot to run it.
    fn reclaim_for_rerun(&self) -> bool {
        self.rerun_requested.load(Ordering::SeqCst)
            && self
                .in_progress
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }

    async fn run_pass(&self) -> SyncOutcome {
        info!("Starting reconciliation pass");
        self.events.emit(QuoteEvent::SyncStarted {
            timestamp: now_millis(),
        });

        let remote = match self.gateway.fetch_remote_list().await {
            Ok(items) => items,
            Err(e) => {
                warn!("Fetching remote quotes failed, skipping this pass: {}", e);
                self.events.emit(QuoteEvent::SyncFailed {
                    reason: e.to_string(),
                    timestamp: now_millis(),
                });
                return SyncOutcome::Failed(e);
            }
        };
        debug!("Fetched {} remote item(s)", remote.len());

        let (merge, pending) = {
            let mut collection = lock(&self.collection);
            let merge = collection.merge_remote(&remote, now_millis());
            (merge, collection.pending_uploads())
        };

        let mut summary = SyncSummary {
            conflict_count: merge.conflicts.len(),
            ..Default::default()
        };

        for upload in pending {
            let remote_id = match self
                .gateway
                .create_remote(&upload.text, &upload.category)
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    warn!(
                        "Uploading quote {} failed, will retry next pass: {}",
                        upload.local_id, e
                    );
                    summary.failed_upload_count += 1;
                    continue;
                }
            };

            let attached = lock(&self.collection).attach_remote_id(
                &upload.local_id,
                remote_id,
                &merge.staged,
                now_millis(),
            );
            match attached {
                AttachOutcome::Attached => {
                    debug!("Quote {} linked to remote id {}", upload.local_id, remote_id);
                    summary.uploaded_count += 1;
                }
                AttachOutcome::IdTaken => summary.failed_upload_count += 1,
                AttachOutcome::RecordGone | AttachOutcome::AlreadyLinked => {
                    debug!("Quote {} changed during upload, ignoring id {}", upload.local_id, remote_id);
                }
            }
        }

        {
            let mut collection = lock(&self.collection);
            summary.added_from_remote_count = collection.insert_staged(merge.staged);
            collection.persist();
        }
        *lock(&self.conflicts) = ConflictReport::new(merge.conflicts);

        if summary.conflict_count > 0 {
            self.events.emit(QuoteEvent::ConflictsDetected {
                count: summary.conflict_count,
            });
        }
        info!(
            "Reconciliation finished: {} conflict(s), {} added from remote, {} uploaded, {} upload(s) pending",
            summary.conflict_count,
            summary.added_from_remote_count,
            summary.uploaded_count,
            summary.failed_upload_count
        );
        self.events.emit(QuoteEvent::SyncCompleted {
            summary,
            timestamp: now_millis(),
        });
        SyncOutcome::Completed(summary)
    }

    /// Flush state to the store before exit.
    pub fn shutdown(&self) {
        lock(&self.collection).persist();
        let filter = self.filter();
        if let Err(e) = self.store.set(FILTER_KEY, filter.as_str()) {
            warn!("Failed to persist filter on shutdown: {}", e);
        }
        info!("Session state flushed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;
    use crate::quote::RemoteItem;
    use crate::store::{InMemoryStore, QUOTES_KEY};
    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    type TestSession = QuoteSession<InMemoryStore, Arc<InMemoryGateway>>;

    fn session_with(stored: &str, remote: Vec<RemoteItem>) -> (TestSession, Arc<InMemoryGateway>) {
        let store = Arc::new(InMemoryStore::with_slot(QUOTES_KEY, stored));
        let gateway = Arc::new(InMemoryGateway::with_items(remote));
        (QuoteSession::load(store, Arc::clone(&gateway)), gateway)
    }

    fn record_events(session: &TestSession) -> (Arc<Mutex<Vec<QuoteEvent>>>, crate::events::Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = session.events().subscribe(move |event| {
            sink.lock().unwrap().push(event.clone());
        });
        (seen, sub)
    }

    fn completed(outcome: SyncOutcome) -> SyncSummary {
        match outcome {
            SyncOutcome::Completed(summary) => summary,
            other => panic!("Expected completed sync, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_conflict_scenario_remote_wins_and_notifies() {
        let (session, _gateway) = session_with(
            r#"[{"localId":"a","remoteId":1,"text":"X","category":"C","updatedAt":1}]"#,
            vec![RemoteItem::new(1, "Y", "C")],
        );
        let (events, _sub) = record_events(&session);

        let summary = completed(session.sync_now().await);

        assert_eq!(summary.conflict_count, 1);
        assert_eq!(session.find("a").unwrap().text, "Y");
        let report = session.conflicts();
        assert_eq!(report.len(), 1);
        assert_eq!(report.get(0).unwrap().snapshot_before_resolution.text, "X");
        assert!(events
            .lock()
            .unwrap()
            .contains(&QuoteEvent::ConflictsDetected { count: 1 }));
    }

    #[tokio::test]
    async fn test_remote_new_scenario() {
        let (session, _gateway) = session_with("[]", vec![RemoteItem::new(7, "Z", "K")]);

        let summary = completed(session.sync_now().await);

        let quotes = session.quotes();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].remote_id, Some(7));
        assert_eq!(quotes[0].text, "Z");
        assert_eq!(quotes[0].category, "K");
        assert_eq!(summary.added_from_remote_count, 1);
        assert!(session.conflicts().is_empty());
    }

    #[tokio::test]
    async fn test_local_only_quote_is_uploaded_and_persisted() {
        let store = Arc::new(InMemoryStore::with_slot(QUOTES_KEY, "[]"));
        let gateway = Arc::new(InMemoryGateway::with_items(vec![RemoteItem::new(3, "r", "R")]));
        let session = QuoteSession::load(Arc::clone(&store), Arc::clone(&gateway));
        let local = session.add_quote("mine", Some("Mine"), None).unwrap();

        let summary = completed(session.sync_now().await);

        assert_eq!(summary.uploaded_count, 1);
        assert_eq!(session.find(&local.local_id).unwrap().remote_id, Some(4));
        assert!(gateway.items().contains(&RemoteItem::new(4, "mine", "Mine")));

        let saved = store.get(QUOTES_KEY).unwrap().unwrap();
        let saved: Vec<Quote> = serde_json::from_str(&saved).unwrap();
        assert_eq!(saved.len(), 2);
        assert!(saved.iter().any(|q| q.remote_id == Some(4)));
    }

    #[tokio::test]
    async fn test_upload_failure_leaves_quote_local_only_for_retry() {
        let (session, gateway) = session_with("[]", vec![]);
        let local = session.add_quote("mine", None, None).unwrap();
        gateway.set_fail_create(true);

        let summary = completed(session.sync_now().await);
        assert_eq!(summary.failed_upload_count, 1);
        assert!(session.find(&local.local_id).unwrap().remote_id.is_none());

        gateway.set_fail_create(false);
        let summary = completed(session.sync_now().await);
        assert_eq!(summary.uploaded_count, 1);
        assert!(session.find(&local.local_id).unwrap().remote_id.is_some());
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_local_state() {
        let (session, gateway) = session_with(
            r#"[{"localId":"a","remoteId":1,"text":"X","category":"C","updatedAt":1}]"#,
            vec![RemoteItem::new(1, "Y", "C")],
        );
        completed(session.sync_now().await);
        let before = session.quotes();
        gateway.set_fail_fetch(true);
        let (events, _sub) = record_events(&session);

        let outcome = session.sync_now().await;

        assert!(matches!(outcome, SyncOutcome::Failed(NetworkError::Request(_))));
        assert_eq!(session.quotes(), before);
        assert_eq!(session.conflicts().len(), 1);
        assert!(events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, QuoteEvent::SyncFailed { .. })));
        assert!(!session.is_syncing());
    }

    #[tokio::test]
    async fn test_clean_pass_replaces_conflict_report() {
        let (session, gateway) = session_with(
            r#"[{"localId":"a","remoteId":1,"text":"X","category":"C","updatedAt":1}]"#,
            vec![RemoteItem::new(1, "Y", "C")],
        );
        completed(session.sync_now().await);
        assert_eq!(session.conflicts().len(), 1);

        gateway.edit(1, "Y", "C");
        let summary = completed(session.sync_now().await);

        assert_eq!(summary.conflict_count, 0);
        assert!(session.conflicts().is_empty());
    }

    #[tokio::test]
    async fn test_revert_is_redetected_next_pass() {
        let (session, _gateway) = session_with(
            r#"[{"localId":"a","remoteId":1,"text":"X","category":"C","updatedAt":1}]"#,
            vec![RemoteItem::new(1, "Y", "C")],
        );
        completed(session.sync_now().await);

        let restored = session.revert_conflict(0).unwrap();
        assert_eq!(restored.text, "X");
        assert_eq!(restored.remote_id, Some(1));
        assert!(session.conflicts().get(0).unwrap().resolved);

        let summary = completed(session.sync_now().await);
        assert_eq!(summary.conflict_count, 1);
        assert_eq!(session.find("a").unwrap().text, "Y");
        assert!(!session.conflicts().get(0).unwrap().resolved);
    }

    #[tokio::test]
    async fn test_no_duplicate_remote_ids_across_passes() {
        let (session, _gateway) = session_with(
            "[]",
            vec![RemoteItem::new(1, "a", "A"), RemoteItem::new(2, "b", "B")],
        );

        completed(session.sync_now().await);
        completed(session.sync_now().await);

        let quotes = session.quotes();
        assert_eq!(quotes.len(), 2);
        for id in [1, 2] {
            assert_eq!(quotes.iter().filter(|q| q.remote_id == Some(id)).count(), 1);
        }
    }

    #[tokio::test]
    async fn test_filter_is_persisted_and_restored() {
        let store = Arc::new(InMemoryStore::with_slot(QUOTES_KEY, "[]"));
        let session = QuoteSession::load(Arc::clone(&store), InMemoryGateway::new());
        session.add_quote("ha", Some("Humor"), None).unwrap();
        session.add_quote("hm", Some("Wisdom"), None).unwrap();

        session.set_filter(CategoryFilter::parse("Humor"));
        assert_eq!(session.visible_quotes().len(), 1);
        assert_eq!(session.random_quote().unwrap().text, "ha");

        // An explicit filter leaves the saved one alone
        let wisdom = CategoryFilter::parse("Wisdom");
        assert_eq!(session.quotes_in(&wisdom).len(), 1);
        assert_eq!(session.random_quote_in(&wisdom).unwrap().text, "hm");
        assert_eq!(session.filter(), CategoryFilter::Category("Humor".into()));

        let reloaded = QuoteSession::load(store, InMemoryGateway::new());
        assert_eq!(reloaded.filter(), CategoryFilter::Category("Humor".into()));
        assert_eq!(reloaded.quotes().len(), 2);
    }

    /// Gateway whose fetches wait for a permit, to hold a pass open.
    struct GatedGateway {
        inner: InMemoryGateway,
        gate: Semaphore,
    }

    #[async_trait]
    impl RemoteGateway for GatedGateway {
        async fn fetch_remote_list(&self) -> crate::gateway::Result<Vec<RemoteItem>> {
            self.gate
                .acquire()
                .await
                .expect("gate closed")
                .forget();
            self.inner.fetch_remote_list().await
        }

        async fn create_remote(&self, text: &str, category: &str) -> crate::gateway::Result<u64> {
            self.inner.create_remote(text, category).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_request_is_coalesced() {
        let gateway = Arc::new(GatedGateway {
            inner: InMemoryGateway::with_items(vec![RemoteItem::new(1, "r", "R")]),
            gate: Semaphore::new(0),
        });
        let store = Arc::new(InMemoryStore::with_slot(QUOTES_KEY, "[]"));
        let session = Arc::new(QuoteSession::load(store, Arc::clone(&gateway)));

        let running = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.sync_now().await }
        });
        // Let the first pass reach the gated fetch
        tokio::task::yield_now().await;
        assert!(session.is_syncing());

        assert_eq!(session.sync_now().await, SyncOutcome::Coalesced);

        gateway.gate.add_permits(2);
        let outcome = running.await.unwrap();

        assert!(matches!(outcome, SyncOutcome::Completed(_)));
        assert_eq!(gateway.inner.fetch_count(), 2);
        assert_eq!(session.quotes().len(), 1);
        assert!(!session.is_syncing());
    }

    #[test]
    fn test_rerun_request_is_seen_after_release() {
        let (session, _gateway) = session_with("[]", vec![]);

        // Runner holds the slot; a request arrives before it releases
        assert!(session.claim_slot());
        assert!(!session.claim_slot());

        // Releasing hands the slot straight back for the follow-up pass
        session.in_progress.store(false, Ordering::SeqCst);
        assert!(session.reclaim_for_rerun());
        assert!(session.is_syncing());

        // Follow-up finished with no new request
        session.rerun_requested.store(false, Ordering::SeqCst);
        session.in_progress.store(false, Ordering::SeqCst);
        assert!(!session.reclaim_for_rerun());
        assert!(!session.is_syncing());
    }

    #[test]
    fn test_request_after_runner_released_takes_the_slot() {
        let (session, _gateway) = session_with("[]", vec![]);

        assert!(session.claim_slot());
        // Runner finds no request and releases
        session.in_progress.store(false, Ordering::SeqCst);
        assert!(!session.reclaim_for_rerun());

        // A late request runs itself instead of coalescing into nothing
        assert!(session.claim_slot());
        assert!(session.is_syncing());
    }

    #[test]
    fn test_requester_takes_over_when_release_races_its_request() {
        let (session, _gateway) = session_with("[]", vec![]);

        assert!(session.claim_slot());
        // Requester saw the slot busy and flagged a rerun; the runner
        // released and also saw the flag, but the requester got there first
        session.rerun_requested.store(true, Ordering::SeqCst);
        session.in_progress.store(false, Ordering::SeqCst);
        assert!(session.claim_slot());

        assert!(!session.reclaim_for_rerun());
        assert!(session.is_syncing());
    }

    #[tokio::test]
    async fn test_pass_after_completed_pass_runs_fresh() {
        let (session, gateway) = session_with("[]", vec![RemoteItem::new(1, "r", "R")]);

        completed(session.sync_now().await);
        completed(session.sync_now().await);

        assert_eq!(gateway.fetch_count(), 2);
        assert!(!session.is_syncing());
    }
}

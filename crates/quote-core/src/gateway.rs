//! RemoteGateway trait for talking to the remote quote list.
//!
//! Implementations:
//! - `InMemoryGateway` - For testing and offline runs
//! - `HttpGateway` (in quote-daemon) - Plain HTTP JSON list endpoint via reqwest
//!
//! A gateway is pure I/O. It never decides what to do with the data.

use crate::quote::RemoteItem;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Unexpected response body: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, NetworkError>;

/// Remote list endpoint.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Fetch the full remote list. The result is the whole remote state.
    async fn fetch_remote_list(&self) -> Result<Vec<RemoteItem>>;

    /// Create a remote record and return the id the endpoint assigned.
    ///
    /// The id is optimistic: the endpoint may not keep the record.
    async fn create_remote(&self, text: &str, category: &str) -> Result<u64>;
}

/// In-memory remote for testing
pub struct InMemoryGateway {
    items: RwLock<Vec<RemoteItem>>,
    next_id: AtomicU64,
    fail_fetch: AtomicBool,
    fail_create: AtomicBool,
    fetch_count: AtomicU64,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    /// Start with an existing remote list. New ids continue after the highest.
    pub fn with_items(items: Vec<RemoteItem>) -> Self {
        let next_id = items.iter().map(|i| i.remote_id).max().unwrap_or(0) + 1;
        Self {
            items: RwLock::new(items),
            next_id: AtomicU64::new(next_id),
            fail_fetch: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            fetch_count: AtomicU64::new(0),
        }
    }

    /// Make subsequent fetches fail (or succeed again).
    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent creations fail (or succeed again).
    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Replace the text and category of a remote item, as another client would.
    pub fn edit(&self, remote_id: u64, text: &str, category: &str) {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        if let Some(item) = items.iter_mut().find(|i| i.remote_id == remote_id) {
            item.text = text.to_string();
            item.category = category.to_string();
        }
    }

    /// Current remote list.
    pub fn items(&self) -> Vec<RemoteItem> {
        self.items.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of fetch attempts so far, failed ones included.
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteGateway for InMemoryGateway {
    async fn fetch_remote_list(&self) -> Result<Vec<RemoteItem>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(NetworkError::Request("remote unreachable".into()));
        }
        Ok(self.items())
    }

    async fn create_remote(&self, text: &str, category: &str) -> Result<u64> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(NetworkError::Status {
                status: 503,
                url: "memory://quotes".into(),
            });
        }
        let remote_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.items
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(RemoteItem::new(remote_id, text, category));
        Ok(remote_id)
    }
}

// Lets tests keep a handle on the gateway a session owns.
#[async_trait]
impl<T: RemoteGateway> RemoteGateway for std::sync::Arc<T> {
    async fn fetch_remote_list(&self) -> Result<Vec<RemoteItem>> {
        (**self).fetch_remote_list().await
    }

    async fn create_remote(&self, text: &str, category: &str) -> Result<u64> {
        (**self).create_remote(text, category).await
    }
}

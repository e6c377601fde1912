//! quote-core: Shared Rust library for the local quote manager.
//!
//! This crate provides the core functionality for:
//! - Storing quotes in an ordered collection backed by a key-value store
//! - Reconciling the collection against a remote list (remote wins)
//! - Reporting and manually reverting conflicts
//! - KeyValueStore and RemoteGateway trait abstractions

pub mod collection;
pub mod conflict;
pub mod events;
pub mod gateway;
pub mod quote;
pub mod reconcile;
pub mod session;
pub mod store;

pub use collection::{ParseError, QuoteCollection, ValidationError};
pub use conflict::{ConflictRecord, ConflictReport, RevertError};
pub use events::{EventBus, QuoteEvent, Subscription};
pub use gateway::{InMemoryGateway, NetworkError, RemoteGateway};
pub use quote::{CategoryFilter, Quote, RemoteItem, UNCATEGORIZED};
pub use reconcile::SyncSummary;
pub use session::{QuoteSession, SyncOutcome};
pub use store::{InMemoryStore, KeyValueStore, StoreError};

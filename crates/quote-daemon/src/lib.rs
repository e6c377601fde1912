//! quote-daemon library: native adapters for the quote manager.
//!
//! Exposes the file store, HTTP gateway, scheduler and console layer so the
//! binary and integration tests share them.

pub mod config;
pub mod console;
pub mod file_store;
pub mod http_gateway;
pub mod scheduler;

pub use config::{Config, ConfigError, ConfigInput};
pub use console::{CommandError, ConsoleCommand};
pub use file_store::FileStore;
pub use http_gateway::{FieldMapping, HttpGateway};
pub use scheduler::{IntervalError, SchedulerState, SyncInterval, SyncScheduler};

//! # Registrator Core
//!
//! Bridges live FreeSWITCH Sofia-SIP registrations into a key/value store, so other
//! systems can discover which endpoints are reachable through which bridge instance.
//!
//! This crate provides:
//! - A pluggable, prefix-scoped K/V store abstraction with a name-keyed backend registry
//! - The registration data model and its JSON value codec
//! - Snapshot reconciliation (minimal add/remove delta)
//! - An event watcher applying register/unregister/expire events incrementally
//! - A periodic syncer correcting drift from lost events
//! - An orchestrator running both loops against one shared store
//!
//! ## Consistency
//!
//! The watcher and the syncer write to the same keys without ordering between
//! them. Every write is a full-value upsert and every delete is idempotent, so
//! both converge; the last write wins.

pub mod config;
pub mod error;
pub mod esl;
pub mod kv;
pub mod orchestrator;
pub mod reconcile;
pub mod syncer;
pub mod types;
pub mod watcher;

pub use config::{RegistratorConfig, SwitchConfig};
pub use error::{RegistratorError, Result};
pub use esl::{EslConnection, RegistrationSource, SwitchEvents};
pub use kv::{available_backends, create_backend, KvConfig, KvStore};
pub use orchestrator::{Registrator, RegistratorReport, SupervisionPolicy};
pub use reconcile::{reconcile, Reconciliation};
pub use syncer::{RegistrationSyncer, SyncConfig, SyncMode, SyncOutcome, SyncReport};
pub use types::{RegistrationKey, RegistrationValue, Registrations};
pub use watcher::{RegistrationWatcher, WatcherConfig, WatcherReport, WatcherState};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

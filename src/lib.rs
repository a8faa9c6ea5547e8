// src/lib.rs
//
// =============================================================================
// LABLOG: LIBRARY ROOT
// =============================================================================
//
// This file declares the module tree and exports public types.

// 1. Declare Modules
pub mod config;
pub mod core;
pub mod error;
pub mod mirror;
pub mod reconciler;
pub mod resolver;
pub mod session;
pub mod store;

// 2. Re-exports (The Public API)

pub use crate::core::{EntryDraft, EntryId, EquipmentCatalog, LogEntry, Quantities};
pub use config::Config;
pub use error::{MirrorError, ReconcileError, StoreError, ValidationError};
pub use mirror::{MirrorAction, MirrorSink, MirrorSync};
pub use reconciler::{EditView, PendingRemoval, Reconciler};
pub use session::SessionStore;
pub use store::{CatalogStoreAdapter, DocumentStore, EntryStoreAdapter, MemoryStore, SqliteStore};

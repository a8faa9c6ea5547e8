// src/store.rs
//
// =============================================================================
// LABLOG: PRIMARY STORE PORT & ADAPTERS (v 0.1 )
// =============================================================================
//
// The Hexagonal Port.
//
// Responsibilities:
// 1. Define the `DocumentStore` trait (generic document operations).
// 2. Catalog Store Adapter: the single `settings/equipment` document.
// 3. Entry Store Adapter: typed CRUD over the `entries` collection.
//
// Backends live in submodules: SQLite for real runs, memory for tests.

use crate::core::{EntryId, EntryRecord, EquipmentCatalog, LogEntry};
use crate::error::{ReconcileError, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryStore, StoreOp};
pub use sqlite::SqliteStore;

pub const ENTRIES: &str = "entries";
pub const SETTINGS: &str = "settings";
pub const CATALOG_DOC: &str = "equipment";

/// Field the entry list is ordered by.
pub const ORDER_FIELD: &str = "timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

// ============================================================================
// 1. THE STORE TRAIT (The Contract)
// ============================================================================

/// Durable, authoritative document store.
///
/// Bodies are JSON objects. Ids are assigned by the store on `insert`.
/// `list_ordered` breaks ties on `field` by write order, in the same direction
/// as `order`: descending puts the most recently written document first.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, collection: &str, body: Value) -> Result<String, StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Create or overwrite.
    async fn put(&self, collection: &str, id: &str, body: Value) -> Result<(), StoreError>;

    /// Overwrite an existing document. Missing documents are `NotFound`.
    async fn update(&self, collection: &str, id: &str, body: Value) -> Result<(), StoreError>;

    /// Deleting an absent document succeeds.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    async fn list_ordered(
        &self,
        collection: &str,
        field: &str,
        order: Order,
    ) -> Result<Vec<(String, Value)>, StoreError>;
}

fn encode<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(StoreError::backend)
}

fn decode<T: DeserializeOwned>(collection: &str, id: &str, body: Value) -> Result<T, StoreError> {
    serde_json::from_value(body).map_err(|e| StoreError::Corrupt {
        collection: collection.to_string(),
        id: id.to_string(),
        reason: e.to_string(),
    })
}

// ============================================================================
// 2. CATALOG STORE ADAPTER
// ============================================================================

#[derive(Clone)]
pub struct CatalogStoreAdapter {
    store: Arc<dyn DocumentStore>,
}

impl CatalogStoreAdapter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// The persisted catalog, or an empty one on first run.
    pub async fn get(&self) -> Result<EquipmentCatalog, StoreError> {
        match self.store.get(SETTINGS, CATALOG_DOC).await? {
            Some(body) => decode(SETTINGS, CATALOG_DOC, body),
            None => Ok(EquipmentCatalog::empty()),
        }
    }

    /// Wholesale replacement. Validation happens before the store is touched,
    /// and the document is written in one `put`.
    pub async fn replace<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<EquipmentCatalog, ReconcileError> {
        let names = EquipmentCatalog::validate_names(names)?;
        let catalog = EquipmentCatalog::new(names, Utc::now());
        self.store
            .put(SETTINGS, CATALOG_DOC, encode(&catalog)?)
            .await?;
        Ok(catalog)
    }

    /// Writes `names` only if no catalog has been persisted yet.
    /// Returns the catalog in effect afterwards.
    pub async fn seed<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<EquipmentCatalog, ReconcileError> {
        let current = self.get().await?;
        if current.updated_at.is_some() || !current.is_empty() {
            return Ok(current);
        }
        self.replace(names).await
    }
}

// ============================================================================
// 3. ENTRY STORE ADAPTER
// ============================================================================

#[derive(Clone)]
pub struct EntryStoreAdapter {
    store: Arc<dyn DocumentStore>,
}

impl EntryStoreAdapter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, record: &EntryRecord) -> Result<EntryId, StoreError> {
        let id = self.store.insert(ENTRIES, encode(record)?).await?;
        Ok(EntryId::new(id))
    }

    pub async fn update(&self, id: &EntryId, record: &EntryRecord) -> Result<(), StoreError> {
        self.store
            .update(ENTRIES, id.as_str(), encode(record)?)
            .await
    }

    pub async fn delete(&self, id: &EntryId) -> Result<(), StoreError> {
        self.store.delete(ENTRIES, id.as_str()).await
    }

    pub async fn get(&self, id: &EntryId) -> Result<Option<LogEntry>, StoreError> {
        match self.store.get(ENTRIES, id.as_str()).await? {
            Some(body) => {
                let record = decode(ENTRIES, id.as_str(), body)?;
                Ok(Some(LogEntry::new(id.clone(), record)))
            }
            None => Ok(None),
        }
    }

    /// All entries, newest first.
    /// Records that no longer decode are skipped with a warning.
    pub async fn list(&self) -> Result<Vec<LogEntry>, StoreError> {
        let rows = self
            .store
            .list_ordered(ENTRIES, ORDER_FIELD, Order::Desc)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, body) in rows {
            match decode::<EntryRecord>(ENTRIES, &id, body) {
                Ok(record) => out.push(LogEntry::new(EntryId::new(id), record)),
                Err(e) => log::warn!("Skipping unreadable entry: {}", e),
            }
        }
        Ok(out)
    }
}

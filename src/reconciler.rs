// src/reconciler.rs
//
// =============================================================================
// LABLOG: RECONCILER (v 0.1 )
// =============================================================================
//
// The only writer of the entry cache the UI renders.
//
// Every operation follows the same order:
// 1. Validate locally. A bad form never reaches the store.
// 2. Await the primary store.
// 3. Only on success: touch the cache, then detach a mirror notification.
//
// A failed store call leaves the cache exactly as it was.

use crate::core::{self, EntryDraft, EntryId, EntryRecord, EquipmentCatalog, LogEntry, Quantities};
use crate::error::{ReconcileError, StoreError};
use crate::mirror::{MirrorAction, MirrorSync};
use crate::resolver;
use crate::store::{CatalogStoreAdapter, DocumentStore, EntryStoreAdapter, ENTRIES};
use std::sync::Arc;

// ============================================================================
// 1. THE CACHE (Derived view, newest first)
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct EntryCache {
    entries: Vec<LogEntry>,
}

impl EntryCache {
    pub fn as_slice(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &EntryId) -> Option<&LogEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    fn replace_all(&mut self, entries: Vec<LogEntry>) {
        self.entries = entries;
        self.resort();
    }

    fn prepend(&mut self, entry: LogEntry) {
        self.entries.insert(0, entry);
        self.resort();
    }

    /// A rewritten entry counts as the latest write, cached or not.
    fn upsert(&mut self, entry: LogEntry) {
        self.entries.retain(|e| e.id != entry.id);
        self.prepend(entry);
    }

    /// Absent ids are a no-op.
    fn remove(&mut self, id: &EntryId) -> Option<LogEntry> {
        let pos = self.entries.iter().position(|e| &e.id == id)?;
        Some(self.entries.remove(pos))
    }

    // Stable: among equal timestamps the latest write stays first, which is
    // also how the store lists ties.
    fn resort(&mut self) {
        self.entries
            .sort_by(|a, b| b.record.timestamp.cmp(&a.record.timestamp));
    }
}

// ============================================================================
// 2. EDIT SUPPORT
// ============================================================================

/// Everything the edit screen needs for one historical entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EditView {
    pub entry: LogEntry,
    pub catalog: EquipmentCatalog,
    /// Catalog names followed by retired names the entry still references.
    pub names: Vec<String>,
    pub deprecated: Vec<String>,
    /// Prefilled selection over `names`.
    pub quantities: Quantities,
}

impl EditView {
    pub fn is_deprecated(&self) -> bool {
        !self.deprecated.is_empty()
    }
}

// ============================================================================
// 3. THE RECONCILER
// ============================================================================

pub struct Reconciler {
    catalog: CatalogStoreAdapter,
    entries: EntryStoreAdapter,
    mirror: MirrorSync,
    cache: EntryCache,
}

impl Reconciler {
    pub fn new(catalog: CatalogStoreAdapter, entries: EntryStoreAdapter, mirror: MirrorSync) -> Self {
        Self {
            catalog,
            entries,
            mirror,
            cache: EntryCache::default(),
        }
    }

    /// Both adapters over one store handle.
    pub fn with_store(store: Arc<dyn DocumentStore>, mirror: MirrorSync) -> Self {
        Self::new(
            CatalogStoreAdapter::new(Arc::clone(&store)),
            EntryStoreAdapter::new(store),
            mirror,
        )
    }

    pub fn entries(&self) -> &[LogEntry] {
        self.cache.as_slice()
    }

    pub fn entry(&self, id: &EntryId) -> Option<&LogEntry> {
        self.cache.get(id)
    }

    pub fn catalog_store(&self) -> &CatalogStoreAdapter {
        &self.catalog
    }

    /// Rebuilds the cache from the store. On failure the old cache stays.
    pub async fn load(&mut self) -> Result<usize, StoreError> {
        match self.entries.list().await {
            Ok(entries) => {
                let n = entries.len();
                self.cache.replace_all(entries);
                log::info!("Loaded {} entries", n);
                Ok(n)
            }
            Err(e) => {
                log::warn!("Error loading entries: {}", e);
                Err(e)
            }
        }
    }

    pub async fn catalog(&self) -> Result<EquipmentCatalog, StoreError> {
        self.catalog.get().await
    }

    /// New entry. The cache shows it only once the store has an id for it.
    pub async fn submit(&mut self, draft: EntryDraft) -> Result<LogEntry, ReconcileError> {
        draft.validate()?;

        let record = EntryRecord::from_draft(draft, core::now());
        let id = self.entries.create(&record).await.map_err(|e| {
            log::warn!("Error saving entry: {}", e);
            e
        })?;

        let entry = LogEntry::new(id, record);
        self.cache.prepend(entry.clone());
        log::info!("Saved entry {} ({})", entry.id, entry.record.summary());

        // Detached.
        let _ = self.mirror.notify(&entry, MirrorAction::Add);
        Ok(entry)
    }

    /// Full replacement of the user fields with a fresh timestamp.
    pub async fn edit(
        &mut self,
        id: &EntryId,
        draft: EntryDraft,
    ) -> Result<LogEntry, ReconcileError> {
        draft.validate()?;

        let base = match self.cache.get(id) {
            Some(cached) => cached.record.clone(),
            None => {
                self.entries
                    .get(id)
                    .await?
                    .ok_or_else(|| StoreError::NotFound {
                        collection: ENTRIES.to_string(),
                        id: id.to_string(),
                    })?
                    .record
            }
        };

        let record = base.revise(draft, core::now());
        self.entries.update(id, &record).await.map_err(|e| {
            log::warn!("Error updating entry {}: {}", id, e);
            e
        })?;

        let entry = LogEntry::new(id.clone(), record);
        self.cache.upsert(entry.clone());
        log::info!("Updated entry {} ({})", entry.id, entry.record.summary());

        let _ = self.mirror.notify(&entry, MirrorAction::Update);
        Ok(entry)
    }

    /// First phase of a delete. Nothing touches the store until the
    /// returned handle is confirmed.
    pub fn request_removal(&mut self, id: EntryId) -> PendingRemoval<'_> {
        PendingRemoval {
            reconciler: self,
            id,
        }
    }

    /// Replaces the catalog. On success the caller's in-progress selection
    /// is cleared; stored entries are never touched.
    pub async fn update_catalog<S: AsRef<str>>(
        &self,
        names: &[S],
        selection: &mut Quantities,
    ) -> Result<EquipmentCatalog, ReconcileError> {
        let catalog = self.catalog.replace(names).await.map_err(|e| {
            if let ReconcileError::Store(err) = &e {
                log::warn!("Error saving equipment list: {}", err);
            }
            e
        })?;

        selection.clear();
        log::info!("Equipment list now has {} items", catalog.len());
        Ok(catalog)
    }

    /// Combined catalog/entry view for editing `id`.
    pub async fn edit_view(&self, id: &EntryId) -> Result<EditView, ReconcileError> {
        let entry = match self.cache.get(id) {
            Some(cached) => cached.clone(),
            None => self.entries.get(id).await?.ok_or_else(|| StoreError::NotFound {
                collection: ENTRIES.to_string(),
                id: id.to_string(),
            })?,
        };
        let catalog = self.catalog.get().await?;

        let deprecated = resolver::deprecated_names(&catalog, &entry);
        if !deprecated.is_empty() {
            log::info!(
                "Entry {} references retired equipment: {}",
                entry.id,
                deprecated.join(", ")
            );
        }

        Ok(EditView {
            names: resolver::combined_view(&catalog, &entry),
            quantities: resolver::editable_quantities(&catalog, &entry),
            deprecated,
            entry,
            catalog,
        })
    }
}

// ============================================================================
// 4. TWO-PHASE REMOVAL
// ============================================================================

/// An unconfirmed delete. Dropping or cancelling it has no effect.
#[must_use = "a removal does nothing until confirmed"]
pub struct PendingRemoval<'a> {
    reconciler: &'a mut Reconciler,
    id: EntryId,
}

impl PendingRemoval<'_> {
    pub fn id(&self) -> &EntryId {
        &self.id
    }

    /// The cached copy, for the confirmation prompt.
    pub fn preview(&self) -> Option<&LogEntry> {
        self.reconciler.cache.get(&self.id)
    }

    pub fn cancel(self) {
        log::debug!("Delete of {} cancelled", self.id);
    }

    /// Deletes from the store, then from the cache. Returns the cached copy
    /// if there was one; an uncached id is not an error.
    pub async fn confirm(self) -> Result<Option<LogEntry>, StoreError> {
        let r = self.reconciler;
        r.entries.delete(&self.id).await.map_err(|e| {
            log::warn!("Error deleting entry {}: {}", self.id, e);
            e
        })?;

        let removed = r.cache.remove(&self.id);
        log::info!("Deleted entry {}", self.id);

        let _ = r.mirror.notify_removed(&self.id, removed.as_ref());
        Ok(removed)
    }
}

// src/resolver.rs
//
// Catalog-Entry Consistency Resolver.
//
// The catalog moves on, historical entries do not. When an old entry is
// edited, every name it recorded must stay visible so that saving never
// silently drops a quantity for equipment that has since been retired.

use crate::core::{EquipmentCatalog, LogEntry, Quantities};
use std::collections::HashSet;

/// Catalog names first (catalog order), then names only the entry knows.
pub fn combined_view(catalog: &EquipmentCatalog, entry: &LogEntry) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::with_capacity(catalog.len() + entry.record.quantities.len());

    let recorded = entry.record.quantities.keys();
    for name in catalog.names.iter().chain(recorded) {
        if seen.insert(name.as_str()) {
            out.push(name.clone());
        }
    }
    out
}

/// Names the entry references that the catalog no longer lists.
pub fn deprecated_names(catalog: &EquipmentCatalog, entry: &LogEntry) -> Vec<String> {
    entry
        .record
        .quantities
        .keys()
        .filter(|name| !catalog.contains(name))
        .cloned()
        .collect()
}

/// Advisory only; editing proceeds either way.
pub fn is_deprecated(catalog: &EquipmentCatalog, entry: &LogEntry) -> bool {
    !deprecated_names(catalog, entry).is_empty()
}

/// Starting selection for the edit form: one slot per name in the combined
/// view, prefilled with what the entry recorded.
pub fn editable_quantities(catalog: &EquipmentCatalog, entry: &LogEntry) -> Quantities {
    combined_view(catalog, entry)
        .into_iter()
        .map(|name| {
            let qty = entry.record.quantities.get(&name).copied().unwrap_or(0);
            (name, qty)
        })
        .collect()
}

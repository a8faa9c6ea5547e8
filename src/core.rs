// src/core.rs
//
// =============================================================================
// LABLOG: CORE SCHEMA AUTHORITY (v 0.1 )
// =============================================================================
//
// The data contracts shared by the store adapters, the mirror and the UI.
//
// Design Principles:
// 1. Newtype Pattern: store-assigned ids cannot be confused with names.
// 2. Non-negative quantities by construction (u32).
// 3. Historical entries may reference equipment the catalog no longer lists.

use crate::error::ValidationError;
use chrono::{DateTime, Local, SubsecRound, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Equipment name -> units used, in the order the names were offered.
pub type Quantities = IndexMap<String, u32>;

pub const NONE_SELECTED: &str = "None selected";

// ============================================================================
// 1. IDENTITY
// ============================================================================

/// Assigned by the primary store on creation. Immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for EntryId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

// ============================================================================
// 2. EQUIPMENT CATALOG
// ============================================================================

/// The editable list of equipment offered for new selections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentCatalog {
    pub names: Vec<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl EquipmentCatalog {
    /// First-run state: nothing persisted yet.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(names: Vec<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            names,
            updated_at: Some(updated_at),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Case-sensitive membership.
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Normalizes a user-supplied replacement list.
    /// Trims each name, then rejects empty lists, blank names and duplicates.
    pub fn validate_names<S: AsRef<str>>(names: &[S]) -> Result<Vec<String>, ValidationError> {
        if names.is_empty() {
            return Err(ValidationError::EmptyCatalog);
        }

        let mut seen = HashSet::with_capacity(names.len());
        let mut out = Vec::with_capacity(names.len());
        for raw in names {
            let name = raw.as_ref().trim();
            if name.is_empty() {
                return Err(ValidationError::BlankName);
            }
            if !seen.insert(name.to_string()) {
                return Err(ValidationError::DuplicateName(name.to_string()));
            }
            out.push(name.to_string());
        }
        Ok(out)
    }
}

// ============================================================================
// 3. FORM DATA (What the user typed)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDraft {
    pub date: String,
    #[serde(default)]
    pub quantities: Quantities,
    pub names: String,
    pub affiliation: String,
}

impl Default for EntryDraft {
    fn default() -> Self {
        Self {
            date: today(),
            quantities: Quantities::new(),
            names: String::new(),
            affiliation: String::new(),
        }
    }
}

impl EntryDraft {
    pub fn new(names: impl Into<String>, affiliation: impl Into<String>) -> Self {
        Self {
            names: names.into(),
            affiliation: affiliation.into(),
            ..Self::default()
        }
    }

    pub fn with_quantity(mut self, equipment: impl Into<String>, qty: u32) -> Self {
        self.quantities.insert(equipment.into(), qty);
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    /// Runs the save-time checks in the order the form reports them.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.names.trim().is_empty()
            || self.affiliation.trim().is_empty()
            || self.quantities.is_empty()
        {
            return Err(ValidationError::MissingFields);
        }
        if !self.quantities.values().any(|&qty| qty > 0) {
            return Err(ValidationError::NoQuantity);
        }
        Ok(())
    }
}

// ============================================================================
// 4. LOG ENTRY (What the store holds)
// ============================================================================

/// The stored body of an entry. The id lives outside the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRecord {
    pub date: String,
    pub quantities: Quantities,
    pub names: String,
    pub affiliation: String,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    pub formatted_timestamp: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl EntryRecord {
    /// A brand-new record stamped at `now`.
    pub fn from_draft(draft: EntryDraft, now: DateTime<Utc>) -> Self {
        Self {
            date: draft.date,
            quantities: draft.quantities,
            names: draft.names,
            affiliation: draft.affiliation,
            timestamp: now,
            formatted_timestamp: format_timestamp(now),
            created_at: now,
            updated_at: None,
        }
    }

    /// Full replacement of the user fields. `created_at` survives,
    /// the timestamp is refreshed.
    pub fn revise(&self, draft: EntryDraft, now: DateTime<Utc>) -> Self {
        Self {
            date: draft.date,
            quantities: draft.quantities,
            names: draft.names,
            affiliation: draft.affiliation,
            timestamp: now,
            formatted_timestamp: format_timestamp(now),
            created_at: self.created_at,
            updated_at: Some(now),
        }
    }

    pub fn summary(&self) -> String {
        equipment_summary(&self.quantities)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: EntryId,
    #[serde(flatten)]
    pub record: EntryRecord,
}

impl LogEntry {
    pub fn new(id: EntryId, record: EntryRecord) -> Self {
        Self { id, record }
    }

    /// Back to an editable form, e.g. to prefill the edit screen.
    pub fn to_draft(&self) -> EntryDraft {
        EntryDraft {
            date: self.record.date.clone(),
            quantities: self.record.quantities.clone(),
            names: self.record.names.clone(),
            affiliation: self.record.affiliation.clone(),
        }
    }
}

// ============================================================================
// 5. DISPLAY HELPERS
// ============================================================================

/// "Microscope: 2, Pipette: 1". Zero quantities are omitted.
pub fn equipment_summary(quantities: &Quantities) -> String {
    let parts: Vec<String> = quantities
        .iter()
        .filter(|&(_, &qty)| qty > 0)
        .map(|(name, qty)| format!("{}: {}", name, qty))
        .collect();

    if parts.is_empty() {
        NONE_SELECTED.to_string()
    } else {
        parts.join(", ")
    }
}

/// en-US style local time, e.g. "Oct 18, 2026, 02:05:09 PM".
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local)
        .format("%b %-d, %Y, %I:%M:%S %p")
        .to_string()
}

/// Current instant at millisecond precision, the resolution stored on disk.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Local calendar date as YYYY-MM-DD.
pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Fixed-width ISO instants ("2026-10-18T14:05:09.120Z") so that string
/// order equals time order inside the store.
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn summary_skips_zero_quantities() {
        let mut q = Quantities::new();
        q.insert("Microscope".into(), 2);
        q.insert("Pipette".into(), 0);
        assert_eq!(equipment_summary(&q), "Microscope: 2");
    }

    #[test]
    fn summary_follows_selection_order() {
        let catalog = EquipmentCatalog::new(vec!["Pipette".into(), "Microscope".into()], now());
        let mut q: Quantities = catalog.names.iter().map(|n| (n.clone(), 0)).collect();
        q.insert("Microscope".into(), 2);
        q.insert("Pipette".into(), 1);
        assert_eq!(equipment_summary(&q), "Pipette: 1, Microscope: 2");
    }

    #[test]
    fn summary_of_nothing_is_none_selected() {
        let mut q = Quantities::new();
        q.insert("Beaker".into(), 0);
        assert_eq!(equipment_summary(&q), NONE_SELECTED);
        assert_eq!(equipment_summary(&Quantities::new()), NONE_SELECTED);
    }

    #[test]
    fn draft_validation_order() {
        let blank = EntryDraft::new("", "Chem").with_quantity("Beaker", 1);
        assert_eq!(blank.validate(), Err(ValidationError::MissingFields));

        let no_selection = EntryDraft::new("A", "B");
        assert_eq!(no_selection.validate(), Err(ValidationError::MissingFields));

        let all_zero = EntryDraft::new("A", "B").with_quantity("Beaker", 0);
        assert_eq!(all_zero.validate(), Err(ValidationError::NoQuantity));

        let ok = EntryDraft::new("A", "B")
            .with_quantity("Beaker", 0)
            .with_quantity("Pipette", 3);
        assert_eq!(ok.validate(), Ok(()));
    }

    #[test]
    fn catalog_names_are_trimmed_and_unique() {
        let names = EquipmentCatalog::validate_names(&[" Microscope ", "Pipette"]).unwrap();
        assert_eq!(names, vec!["Microscope", "Pipette"]);

        assert_eq!(
            EquipmentCatalog::validate_names::<&str>(&[]),
            Err(ValidationError::EmptyCatalog)
        );
        assert_eq!(
            EquipmentCatalog::validate_names(&["Pipette", "  "]),
            Err(ValidationError::BlankName)
        );
        assert_eq!(
            EquipmentCatalog::validate_names(&["Pipette", "Pipette "]),
            Err(ValidationError::DuplicateName("Pipette".into()))
        );
        // Case-sensitive: these are different instruments.
        assert!(EquipmentCatalog::validate_names(&["pipette", "Pipette"]).is_ok());
    }

    #[test]
    fn revise_keeps_creation_time() {
        let t0 = now();
        let rec = EntryRecord::from_draft(EntryDraft::new("A", "B").with_quantity("X", 1), t0);
        let t1 = t0 + chrono::Duration::seconds(30);
        let revised = rec.revise(EntryDraft::new("C", "D").with_quantity("Y", 2), t1);

        assert_eq!(revised.created_at, t0);
        assert_eq!(revised.timestamp, t1);
        assert_eq!(revised.updated_at, Some(t1));
        assert_eq!(revised.names, "C");
        assert!(!revised.quantities.contains_key("X"));
    }

    #[test]
    fn entry_serializes_with_camel_case_keys() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 18, 14, 5, 9).unwrap();
        let entry = LogEntry::new(
            EntryId::new("abc"),
            EntryRecord::from_draft(EntryDraft::new("A", "B").with_quantity("X", 1), ts),
        );
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["id"], "abc");
        assert_eq!(v["timestamp"], "2026-10-18T14:05:09.000Z");
        assert!(v.get("formattedTimestamp").is_some());
        assert!(v.get("createdAt").is_some());
        assert!(v.get("updatedAt").is_none());
    }

    #[test]
    fn quantities_keep_their_order_through_json() {
        let rec = EntryRecord::from_draft(
            EntryDraft::new("A", "B")
                .with_quantity("Pipette", 1)
                .with_quantity("Beaker", 0)
                .with_quantity("Microscope", 2),
            now(),
        );
        let text = serde_json::to_string(&rec).unwrap();
        let back: EntryRecord = serde_json::from_str(&text).unwrap();
        let names: Vec<&str> = back.quantities.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["Pipette", "Beaker", "Microscope"]);

        // through an untyped Value too, as the store does
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let back: EntryRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back.summary(), "Pipette: 1, Microscope: 2");
    }
}

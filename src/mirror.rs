// src/mirror.rs
//
// =============================================================================
// LABLOG: MIRROR SYNC (v 0.1 )
// =============================================================================
//
// Best-effort propagation of entry mutations to the reporting sink.
//
// Contract:
// - At-most-once. No retry, no queue, no acknowledgement.
// - `notify` spawns a task and returns immediately. Callers drop the handle.
// - Every failure stops here: it is logged and discarded.
// - With an opaque transport, "Ok" only means the request left the process.

use crate::core::{equipment_summary, EntryId, LogEntry};
use crate::error::MirrorError;
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

// ============================================================================
// 1. WIRE FORMAT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorAction {
    Add,
    Update,
    Delete,
}

impl fmt::Display for MirrorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MirrorAction::Add => "add",
            MirrorAction::Update => "update",
            MirrorAction::Delete => "delete",
        })
    }
}

/// Flattened, spreadsheet-friendly copy of an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorRecord {
    pub id: String,
    pub date: String,
    /// "Microscope: 2, Pipette: 1" rather than the raw mapping.
    pub equipment: String,
    pub names: String,
    pub affiliation: String,
    pub timestamp: String,
    pub action: MirrorAction,
}

impl MirrorRecord {
    pub fn from_entry(entry: &LogEntry, action: MirrorAction) -> Self {
        let rec = &entry.record;
        Self {
            id: entry.id.to_string(),
            date: rec.date.clone(),
            equipment: equipment_summary(&rec.quantities),
            names: rec.names.clone(),
            affiliation: rec.affiliation.clone(),
            timestamp: rec.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            action,
        }
    }

    /// A delete for an entry we hold no copy of.
    pub fn tombstone(id: &EntryId) -> Self {
        Self {
            id: id.to_string(),
            date: String::new(),
            equipment: String::new(),
            names: String::new(),
            affiliation: String::new(),
            timestamp: crate::core::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            action: MirrorAction::Delete,
        }
    }
}

// ============================================================================
// 2. SINKS (The Contract + Implementations)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Sent; the transport cannot tell us what happened next.
    Dispatched,
    /// The sink answered with a 2xx.
    Accepted,
}

#[async_trait]
pub trait MirrorSink: Send + Sync {
    async fn deliver(&self, record: &MirrorRecord) -> Result<Delivery, MirrorError>;
}

/// JSON `POST` to a fixed endpoint.
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
    observe_response: bool,
}

impl HttpSink {
    pub fn new(url: impl Into<String>, observe_response: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            observe_response,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl MirrorSink for HttpSink {
    async fn deliver(&self, record: &MirrorRecord) -> Result<Delivery, MirrorError> {
        let resp = self.client.post(&self.url).json(record).send().await?;

        if !self.observe_response {
            return Ok(Delivery::Dispatched);
        }

        let status = resp.status();
        if status.is_success() {
            Ok(Delivery::Accepted)
        } else {
            Err(MirrorError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

/// Used when no mirror endpoint is configured.
pub struct DisabledSink;

#[async_trait]
impl MirrorSink for DisabledSink {
    async fn deliver(&self, record: &MirrorRecord) -> Result<Delivery, MirrorError> {
        log::debug!("Mirror disabled; dropping {} for {}", record.action, record.id);
        Ok(Delivery::Dispatched)
    }
}

// ============================================================================
// 3. THE DISPATCHER
// ============================================================================

#[derive(Clone)]
pub struct MirrorSync {
    sink: Arc<dyn MirrorSink>,
}

impl MirrorSync {
    pub fn new(sink: Arc<dyn MirrorSink>) -> Self {
        Self { sink }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledSink))
    }

    pub fn http(url: impl Into<String>, observe_response: bool) -> Self {
        Self::new(Arc::new(HttpSink::new(url, observe_response)))
    }

    /// Fire-and-forget. Dropping the returned handle detaches the task.
    pub fn notify(&self, entry: &LogEntry, action: MirrorAction) -> JoinHandle<()> {
        self.dispatch(MirrorRecord::from_entry(entry, action))
    }

    /// Delete notification, using the last cached copy when there is one.
    pub fn notify_removed(&self, id: &EntryId, cached: Option<&LogEntry>) -> JoinHandle<()> {
        let record = match cached {
            Some(entry) => MirrorRecord::from_entry(entry, MirrorAction::Delete),
            None => MirrorRecord::tombstone(id),
        };
        self.dispatch(record)
    }

    fn dispatch(&self, record: MirrorRecord) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            match sink.deliver(&record).await {
                Ok(Delivery::Accepted) => {
                    log::debug!("Mirror accepted {} for {}", record.action, record.id)
                }
                Ok(Delivery::Dispatched) => {
                    log::debug!("Mirror dispatched {} for {}", record.action, record.id)
                }
                Err(e) => log::warn!(
                    "Mirror sync failed for {} ({}): {}",
                    record.id,
                    record.action,
                    e
                ),
            }
        })
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use lablog::mirror::{Delivery, MirrorRecord, MirrorSink, MirrorSync};
use lablog::store::{DocumentStore, MemoryStore};
use lablog::{MirrorError, Reconciler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Forwards every record to a channel the test can read.
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<MirrorRecord>,
}

#[async_trait]
impl MirrorSink for RecordingSink {
    async fn deliver(&self, record: &MirrorRecord) -> Result<Delivery, MirrorError> {
        let _ = self.tx.send(record.clone());
        Ok(Delivery::Accepted)
    }
}

/// Always fails, counting attempts.
#[derive(Default)]
pub struct FailingSink {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl MirrorSink for FailingSink {
    async fn deliver(&self, _record: &MirrorRecord) -> Result<Delivery, MirrorError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(MirrorError::Unavailable("sink is down".into()))
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub app: Reconciler,
    pub mirrored: mpsc::UnboundedReceiver<MirrorRecord>,
}

/// Reconciler over a fresh MemoryStore with a recording mirror.
pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let (tx, rx) = mpsc::unbounded_channel();
    let mirror = MirrorSync::new(Arc::new(RecordingSink { tx }));
    let app = Reconciler::with_store(store.clone() as Arc<dyn DocumentStore>, mirror);
    Harness {
        store,
        app,
        mirrored: rx,
    }
}

/// Reconciler over a fresh MemoryStore whose mirror always fails.
pub fn failing_harness() -> (Arc<MemoryStore>, Arc<FailingSink>, Reconciler) {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(FailingSink::default());
    let mirror = MirrorSync::new(sink.clone());
    let app = Reconciler::with_store(store.clone() as Arc<dyn DocumentStore>, mirror);
    (store, sink, app)
}

pub async fn next_record(rx: &mut mpsc::UnboundedReceiver<MirrorRecord>) -> MirrorRecord {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("mirror notification timed out")
        .expect("mirror channel closed")
}

/// Lets detached tasks on the current-thread runtime run to completion.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

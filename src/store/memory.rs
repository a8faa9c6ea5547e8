// src/store/memory.rs
//
// In-process DocumentStore.
//
// Same contract as the SQLite backend, plus two hooks for exercising the
// Reconciler: a call log (to prove an operation never reached the store)
// and scripted failures per operation.

use super::{DocumentStore, Order};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Insert,
    Get,
    Put,
    Update,
    Delete,
    List,
}

#[derive(Debug, Clone)]
enum Fault {
    Once(String),
    Always(String),
}

#[derive(Debug, Clone)]
struct Doc {
    /// Write order: bumped by every insert, put and update.
    rev: u64,
    collection: String,
    id: String,
    body: Value,
}

#[derive(Default)]
struct Inner {
    next_rev: u64,
    docs: Vec<Doc>,
    calls: Vec<StoreOp>,
    faults: HashMap<StoreOp, Fault>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not wedge every later call.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The next `op` fails with `message`, later ones succeed again.
    pub fn fail_next(&self, op: StoreOp, message: impl Into<String>) {
        self.lock().faults.insert(op, Fault::Once(message.into()));
    }

    pub fn fail_always(&self, op: StoreOp, message: impl Into<String>) {
        self.lock().faults.insert(op, Fault::Always(message.into()));
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Every operation attempted so far, failed ones included.
    pub fn calls(&self) -> Vec<StoreOp> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, op: StoreOp) -> usize {
        self.lock().calls.iter().filter(|&&c| c == op).count()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.lock()
            .docs
            .iter()
            .filter(|d| d.collection == collection)
            .count()
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Logs the call, then applies any scripted fault.
    fn enter(&self, op: StoreOp) -> Result<MutexGuard<'_, Inner>, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(op);
        match inner.faults.get(&op).cloned() {
            Some(Fault::Once(msg)) => {
                inner.faults.remove(&op);
                Err(StoreError::Backend(msg))
            }
            Some(Fault::Always(msg)) => Err(StoreError::Backend(msg)),
            None => Ok(inner),
        }
    }
}

impl Inner {
    fn position(&self, collection: &str, id: &str) -> Option<usize> {
        self.docs
            .iter()
            .position(|d| d.collection == collection && d.id == id)
    }

    fn bump(&mut self) -> u64 {
        self.next_rev += 1;
        self.next_rev
    }

    fn push(&mut self, collection: &str, id: &str, body: Value) {
        let rev = self.bump();
        self.docs.push(Doc {
            rev,
            collection: collection.to_string(),
            id: id.to_string(),
            body,
        });
    }
}

/// Null < bool < number < string, the way SQLite orders json_extract results
/// closely enough for timestamps and counters.
fn compare_field(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, body: Value) -> Result<String, StoreError> {
        let mut inner = self.enter(StoreOp::Insert)?;
        let id = Uuid::new_v4().to_string();
        inner.push(collection, &id, body);
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let inner = self.enter(StoreOp::Get)?;
        Ok(inner
            .position(collection, id)
            .map(|i| inner.docs[i].body.clone()))
    }

    async fn put(&self, collection: &str, id: &str, body: Value) -> Result<(), StoreError> {
        let mut inner = self.enter(StoreOp::Put)?;
        match inner.position(collection, id) {
            Some(i) => {
                let rev = inner.bump();
                let doc = &mut inner.docs[i];
                doc.body = body;
                doc.rev = rev;
            }
            None => inner.push(collection, id, body),
        }
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, body: Value) -> Result<(), StoreError> {
        let mut inner = self.enter(StoreOp::Update)?;
        match inner.position(collection, id) {
            Some(i) => {
                let rev = inner.bump();
                let doc = &mut inner.docs[i];
                doc.body = body;
                doc.rev = rev;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut inner = self.enter(StoreOp::Delete)?;
        inner
            .docs
            .retain(|d| !(d.collection == collection && d.id == id));
        Ok(())
    }

    async fn list_ordered(
        &self,
        collection: &str,
        field: &str,
        order: Order,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let inner = self.enter(StoreOp::List)?;
        let mut docs: Vec<&Doc> = inner
            .docs
            .iter()
            .filter(|d| d.collection == collection)
            .collect();

        docs.sort_by(|a, b| {
            let ord = compare_field(a.body.get(field), b.body.get(field))
                .then(a.rev.cmp(&b.rev));
            match order {
                Order::Asc => ord,
                Order::Desc => ord.reverse(),
            }
        });

        Ok(docs
            .into_iter()
            .map(|d| (d.id.clone(), d.body.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn scripted_failure_fires_once() {
        let store = MemoryStore::new();
        store.fail_next(StoreOp::Insert, "boom");

        let err = store.insert("c", json!({})).await.unwrap_err();
        assert_eq!(err, StoreError::Backend("boom".into()));
        assert!(store.insert("c", json!({})).await.is_ok());
        assert_eq!(store.call_count(StoreOp::Insert), 2);
        assert_eq!(store.len("c"), 1);
    }

    #[tokio::test]
    async fn ties_follow_write_order() {
        let store = MemoryStore::new();
        let a = store.insert("c", json!({"t": "1"})).await.unwrap();
        let b = store.insert("c", json!({"t": "2"})).await.unwrap();
        let c = store.insert("c", json!({"t": "1"})).await.unwrap();
        let d = store.insert("c", json!({})).await.unwrap();

        let ids: Vec<String> = store
            .list_ordered("c", "t", Order::Desc)
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![b.clone(), c.clone(), a.clone(), d.clone()]);

        // rewriting `a` makes it the latest write among its ties
        store.update("c", &a, json!({"t": "1"})).await.unwrap();
        let ids: Vec<String> = store
            .list_ordered("c", "t", Order::Desc)
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![b, a, c, d]);
    }

    #[tokio::test]
    async fn put_keeps_original_position() {
        let store = MemoryStore::new();
        store.put("settings", "equipment", json!({"n": 1})).await.unwrap();
        store.put("settings", "equipment", json!({"n": 2})).await.unwrap();

        assert_eq!(store.len("settings"), 1);
        assert_eq!(
            store.get("settings", "equipment").await.unwrap(),
            Some(json!({"n": 2}))
        );
    }
}

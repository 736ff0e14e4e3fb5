//! Realtime database seam
//!
//! The backing store is a hierarchical key-value real-time database
//! addressed by slash-separated paths (`bookings/{id}`). Everything
//! above this module talks to the `RealtimeDatabase` trait; the
//! in-memory implementation below backs tests and local development
//! and can inject the failure modes the gateway must survive.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};

/// Remote operation failure
///
/// Permission denial is the latching condition; everything else is
/// transient and retryable on the next call.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("permission denied at {path}")]
    PermissionDenied { path: String },

    #[error("remote unavailable: {0}")]
    Unavailable(String),
}

impl RemoteError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

/// What a transaction closure wants done with the current value
pub enum TxnUpdate {
    /// Replace the value at the path
    Write(Value),
    /// Leave the path untouched and abort the transaction
    Abort,
}

/// Outcome of a conditional write
///
/// `Ambiguous` is the backing store's "not committed" signal: the
/// library could not tell whether the write landed. Callers must not
/// treat it as failure; the submission protocol reconciles it.
#[derive(Debug, Clone, PartialEq)]
pub enum TxnOutcome {
    Committed(Value),
    Aborted,
    Ambiguous,
}

/// Transaction closure: current value in, decision out.
///
/// May be invoked more than once if the store retries internally.
pub type TxnUpdateFn<'a> = &'a (dyn Fn(Option<Value>) -> TxnUpdate + Send + Sync);

/// Hierarchical real-time key-value database
#[async_trait]
pub trait RealtimeDatabase: Send + Sync {
    /// Point read at a path. `None` when the path is absent.
    async fn get(&self, path: &str) -> Result<Option<Value>, RemoteError>;

    /// Full-document replace at a path
    async fn set(&self, path: &str, value: Value) -> Result<(), RemoteError>;

    /// Multi-path write: each entry replaces `{path}/{child}`
    async fn update_children(
        &self,
        path: &str,
        children: BTreeMap<String, Value>,
    ) -> Result<(), RemoteError>;

    /// Conditional write: read the path, apply `update`, commit if it
    /// returns `Write`. The store may retry the closure internally and
    /// may report `Ambiguous` even when data was persisted.
    async fn run_transaction(
        &self,
        path: &str,
        update: TxnUpdateFn<'_>,
    ) -> Result<TxnOutcome, RemoteError>;

    /// Push-based change subscription: the receiver yields the current
    /// value at `path` after every write under it.
    async fn subscribe(&self, path: &str) -> Result<broadcast::Receiver<Value>, RemoteError>;
}

// =============================================================================
// In-memory implementation
// =============================================================================

const SUBSCRIPTION_BUFFER: usize = 64;

#[derive(Default)]
struct Faults {
    read_denied: Vec<String>,
    write_denied: Vec<String>,
    fail_reads: u32,
    fail_writes: u32,
    ambiguous_transactions: u32,
}

fn path_matches(prefixes: &[String], path: &str) -> bool {
    prefixes.iter().any(|prefix| {
        path == prefix || path.starts_with(&format!("{}/", prefix))
    })
}

/// In-memory hierarchical database for tests and local development
///
/// Supports injected permission denials (by path prefix), transient
/// failures (next N calls), and the ambiguous-transaction artifact:
/// the write is applied but the outcome is reported as `Ambiguous`,
/// modeling at-least-once transaction retry in the real store.
pub struct MemoryRealtimeDatabase {
    tree: RwLock<Value>,
    subscribers: RwLock<HashMap<String, broadcast::Sender<Value>>>,
    faults: std::sync::Mutex<Faults>,
}

impl Default for MemoryRealtimeDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRealtimeDatabase {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(Value::Object(serde_json::Map::new())),
            subscribers: RwLock::new(HashMap::new()),
            faults: std::sync::Mutex::new(Faults::default()),
        }
    }

    // -------------------------------------------------------------------------
    // Failure injection
    // -------------------------------------------------------------------------

    /// Deny reads at `path` and everything under it
    pub fn deny_reads(&self, path: &str) {
        self.faults
            .lock()
            .expect("faults mutex poisoned")
            .read_denied
            .push(path.to_string());
    }

    /// Deny writes at `path` and everything under it
    pub fn deny_writes(&self, path: &str) {
        self.faults
            .lock()
            .expect("faults mutex poisoned")
            .write_denied
            .push(path.to_string());
    }

    /// Fail the next `n` reads with a transient error
    pub fn fail_reads(&self, n: u32) {
        self.faults.lock().expect("faults mutex poisoned").fail_reads = n;
    }

    /// Fail the next `n` writes with a transient error
    pub fn fail_writes(&self, n: u32) {
        self.faults.lock().expect("faults mutex poisoned").fail_writes = n;
    }

    /// Apply the next `n` transactions but report them as `Ambiguous`
    pub fn ambiguous_next_transactions(&self, n: u32) {
        self.faults
            .lock()
            .expect("faults mutex poisoned")
            .ambiguous_transactions = n;
    }

    /// Clear all injected faults
    pub fn clear_faults(&self) {
        *self.faults.lock().expect("faults mutex poisoned") = Faults::default();
    }

    // -------------------------------------------------------------------------
    // Fault checks
    // -------------------------------------------------------------------------

    fn check_read(&self, path: &str) -> Result<(), RemoteError> {
        let mut faults = self.faults.lock().expect("faults mutex poisoned");
        if path_matches(&faults.read_denied, path) {
            return Err(RemoteError::PermissionDenied {
                path: path.to_string(),
            });
        }
        if faults.fail_reads > 0 {
            faults.fail_reads -= 1;
            return Err(RemoteError::Unavailable("injected read failure".to_string()));
        }
        Ok(())
    }

    fn check_write(&self, path: &str) -> Result<(), RemoteError> {
        let mut faults = self.faults.lock().expect("faults mutex poisoned");
        if path_matches(&faults.write_denied, path) {
            return Err(RemoteError::PermissionDenied {
                path: path.to_string(),
            });
        }
        if faults.fail_writes > 0 {
            faults.fail_writes -= 1;
            return Err(RemoteError::Unavailable(
                "injected write failure".to_string(),
            ));
        }
        Ok(())
    }

    fn take_ambiguous(&self) -> bool {
        let mut faults = self.faults.lock().expect("faults mutex poisoned");
        if faults.ambiguous_transactions > 0 {
            faults.ambiguous_transactions -= 1;
            true
        } else {
            false
        }
    }

    // -------------------------------------------------------------------------
    // Tree navigation
    // -------------------------------------------------------------------------

    fn value_at<'v>(tree: &'v Value, path: &str) -> Option<&'v Value> {
        let mut current = tree;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    fn write_at(tree: &mut Value, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut current = tree;
        for (i, segment) in segments.iter().enumerate() {
            if !current.is_object() {
                *current = Value::Object(serde_json::Map::new());
            }
            let map = current.as_object_mut().expect("object just ensured");
            if i == segments.len() - 1 {
                map.insert((*segment).to_string(), value);
                return;
            }
            current = map
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
        }
    }

    async fn notify(&self, written_path: &str) {
        let tree = self.tree.read().await;
        let subscribers = self.subscribers.read().await;
        for (sub_path, sender) in subscribers.iter() {
            let related = written_path == sub_path
                || written_path.starts_with(&format!("{}/", sub_path))
                || sub_path.starts_with(&format!("{}/", written_path));
            if !related {
                continue;
            }
            let snapshot = Self::value_at(&tree, sub_path)
                .cloned()
                .unwrap_or(Value::Null);
            // Lagging receivers drop oldest messages; senders never block.
            let _ = sender.send(snapshot);
        }
    }
}

#[async_trait]
impl RealtimeDatabase for MemoryRealtimeDatabase {
    async fn get(&self, path: &str) -> Result<Option<Value>, RemoteError> {
        self.check_read(path)?;
        let tree = self.tree.read().await;
        Ok(Self::value_at(&tree, path).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), RemoteError> {
        self.check_write(path)?;
        {
            let mut tree = self.tree.write().await;
            Self::write_at(&mut tree, path, value);
        }
        self.notify(path).await;
        Ok(())
    }

    async fn update_children(
        &self,
        path: &str,
        children: BTreeMap<String, Value>,
    ) -> Result<(), RemoteError> {
        self.check_write(path)?;
        // Multi-path writes are atomic: one denied child fails the batch
        for child in children.keys() {
            self.check_write(&format!("{}/{}", path, child))?;
        }
        {
            let mut tree = self.tree.write().await;
            for (child, value) in children {
                Self::write_at(&mut tree, &format!("{}/{}", path, child), value);
            }
        }
        self.notify(path).await;
        Ok(())
    }

    async fn run_transaction(
        &self,
        path: &str,
        update: TxnUpdateFn<'_>,
    ) -> Result<TxnOutcome, RemoteError> {
        self.check_read(path)?;
        self.check_write(path)?;

        let decision = {
            let mut tree = self.tree.write().await;
            let current = Self::value_at(&tree, path).cloned();
            match update(current) {
                TxnUpdate::Abort => None,
                TxnUpdate::Write(value) => {
                    Self::write_at(&mut tree, path, value.clone());
                    Some(value)
                }
            }
        };

        match decision {
            None => Ok(TxnOutcome::Aborted),
            Some(value) => {
                self.notify(path).await;
                if self.take_ambiguous() {
                    Ok(TxnOutcome::Ambiguous)
                } else {
                    Ok(TxnOutcome::Committed(value))
                }
            }
        }
    }

    async fn subscribe(&self, path: &str) -> Result<broadcast::Receiver<Value>, RemoteError> {
        self.check_read(path)?;
        let mut subscribers = self.subscribers.write().await;
        let sender = subscribers
            .entry(path.to_string())
            .or_insert_with(|| broadcast::channel(SUBSCRIPTION_BUFFER).0);
        Ok(sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_and_get_roundtrip_nested_paths() {
        let db = MemoryRealtimeDatabase::new();
        db.set("bookings/b1", json!({"petName": "Max"}))
            .await
            .unwrap();

        let child = db.get("bookings/b1").await.unwrap().unwrap();
        assert_eq!(child["petName"], "Max");

        let collection = db.get("bookings").await.unwrap().unwrap();
        assert!(collection.as_object().unwrap().contains_key("b1"));

        assert!(db.get("bookings/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn denied_prefix_rejects_reads_below_it() {
        let db = MemoryRealtimeDatabase::new();
        db.deny_reads("bookings");

        let err = db.get("bookings/b1").await.unwrap_err();
        assert!(err.is_permission_denied());

        // Other collections are unaffected
        assert!(db.get("groomers").await.is_ok());
    }

    #[tokio::test]
    async fn transient_failures_are_consumed() {
        let db = MemoryRealtimeDatabase::new();
        db.fail_reads(1);

        assert!(matches!(
            db.get("bookings").await,
            Err(RemoteError::Unavailable(_))
        ));
        assert!(db.get("bookings").await.is_ok());
    }

    #[tokio::test]
    async fn transaction_commits_and_aborts() {
        let db = MemoryRealtimeDatabase::new();
        let outcome = db
            .run_transaction("bookings", &|_current| {
                TxnUpdate::Write(json!({"b1": {"petName": "Max"}}))
            })
            .await
            .unwrap();
        assert!(matches!(outcome, TxnOutcome::Committed(_)));

        let outcome = db
            .run_transaction("bookings", &|current| {
                assert!(current.is_some());
                TxnUpdate::Abort
            })
            .await
            .unwrap();
        assert_eq!(outcome, TxnOutcome::Aborted);
    }

    #[tokio::test]
    async fn ambiguous_transaction_applies_the_write() {
        let db = MemoryRealtimeDatabase::new();
        db.ambiguous_next_transactions(1);

        let outcome = db
            .run_transaction("bookings", &|_| {
                TxnUpdate::Write(json!({"b1": {"petName": "Bella"}}))
            })
            .await
            .unwrap();
        assert_eq!(outcome, TxnOutcome::Ambiguous);

        // The data landed even though the outcome was ambiguous
        let collection = db.get("bookings").await.unwrap().unwrap();
        assert_eq!(collection["b1"]["petName"], "Bella");
    }

    #[tokio::test]
    async fn subscribers_receive_snapshots_after_writes() {
        let db = MemoryRealtimeDatabase::new();
        let mut rx = db.subscribe("bookings").await.unwrap();

        db.set("bookings/b1", json!({"petName": "Max"}))
            .await
            .unwrap();

        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot["b1"]["petName"], "Max");
    }
}

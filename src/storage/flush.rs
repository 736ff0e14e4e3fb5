//! Debounced batched writes
//!
//! Coalesces bursts of UI-driven updates into a single local-store
//! flush: a pending queue plus one trailing debounce timer. Each
//! enqueue re-arms the timer; when it fires, every queued key is
//! written. A failed key never blocks the rest of the queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;

use crate::storage::local::LocalStore;

/// Trailing-debounce write scheduler over the local store
pub struct BatchedWriter {
    store: Arc<LocalStore>,
    debounce: Duration,
    pending: Arc<Mutex<HashMap<String, Value>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl BatchedWriter {
    pub fn new(store: Arc<LocalStore>, debounce: Duration) -> Self {
        Self {
            store,
            debounce,
            pending: Arc::new(Mutex::new(HashMap::new())),
            timer: Mutex::new(None),
        }
    }

    /// Queue a write, replacing any queued value for the same key,
    /// and re-arm the trailing flush timer.
    pub fn enqueue<T: serde::Serialize>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(key, %error, "failed to encode batched write");
                return;
            }
        };

        {
            let mut pending = self.pending.lock().expect("pending mutex poisoned");
            pending.insert(key.to_string(), value);
        }

        let store = Arc::clone(&self.store);
        let pending = Arc::clone(&self.pending);
        let debounce = self.debounce;

        let mut timer = self.timer.lock().expect("timer mutex poisoned");
        if let Some(handle) = timer.take() {
            handle.abort();
        }
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            flush_pending(&store, &pending);
        }));
    }

    /// Flush everything queued without waiting for the timer
    pub fn flush_now(&self) {
        {
            let mut timer = self.timer.lock().expect("timer mutex poisoned");
            if let Some(handle) = timer.take() {
                handle.abort();
            }
        }
        flush_pending(&self.store, &self.pending);
    }

    /// Number of writes currently queued
    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("pending mutex poisoned").len()
    }
}

fn flush_pending(store: &LocalStore, pending: &Mutex<HashMap<String, Value>>) {
    let drained: Vec<(String, Value)> = {
        let mut pending = pending.lock().expect("pending mutex poisoned");
        pending.drain().collect()
    };

    for (key, value) in drained {
        if !store.set_immediate(&key, &value) {
            // One bad key must not starve the rest of the queue
            tracing::warn!(key, "batched flush failed for key");
        }
    }
}

impl Drop for BatchedWriter {
    fn drop(&mut self) {
        if let Ok(mut timer) = self.timer.lock() {
            if let Some(handle) = timer.take() {
                handle.abort();
            }
        }
    }
}

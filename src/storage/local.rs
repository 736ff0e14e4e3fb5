//! Quota-limited local store
//!
//! Synchronous JSON key-value store standing in for the browser's
//! `localStorage`: ~5 MB ceiling, exact-key lookup and enumeration
//! only, values stored as serialized JSON strings. Read paths never
//! raise; corrupt or absent entries come back as `None`.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::data::{Booking, BookingStatus};

/// Well-known local store keys
pub mod keys {
    /// Persisted bookings snapshot (fallback copy of the remote list)
    pub const BOOKINGS: &str = "groombook.bookings";
    /// Persisted customers snapshot
    pub const CUSTOMERS: &str = "groombook.customers";
    /// Persisted groomers snapshot
    pub const GROOMERS: &str = "groombook.groomers";
    /// Persisted packages snapshot
    pub const PACKAGES: &str = "groombook.packages";
    /// Append-only security log (JSON array under one key)
    pub const SECURITY_LOG: &str = "groombook.security_log";
    /// Navigation/history breadcrumbs
    pub const HISTORY: &str = "groombook.history";
    /// Short-lived action locks
    pub const LOCKS: &str = "groombook.locks";
    /// Transient submission status
    pub const SUBMISSION_STATUS: &str = "groombook.submission_status";
}

/// Keys dropped (in order) when the store runs out of quota
const EVICTION_ORDER: [&str; 4] = [
    keys::SECURITY_LOG,
    keys::LOCKS,
    keys::SUBMISSION_STATUS,
    keys::HISTORY,
];

#[derive(Default)]
struct Inner {
    entries: HashMap<String, String>,
    usage_bytes: usize,
}

impl Inner {
    fn put(&mut self, key: &str, value: String) {
        if let Some(old) = self.entries.insert(key.to_string(), value) {
            self.usage_bytes -= key.len() + old.len();
        }
        let stored = self.entries.get(key).expect("entry just inserted");
        self.usage_bytes += key.len() + stored.len();
    }

    fn drop_key(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(old) => {
                self.usage_bytes -= key.len() + old.len();
                true
            }
            None => false,
        }
    }
}

/// Quota-limited synchronous key-value store
pub struct LocalStore {
    inner: Mutex<Inner>,
    quota_bytes: usize,
}

impl LocalStore {
    pub fn new(quota_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            quota_bytes,
        }
    }

    /// Read and parse a value. Absent or corrupt entries return `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let raw = inner.entries.get(key)?;
        match serde_json::from_str(raw) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::debug!(key, %error, "ignoring corrupt local store entry");
                None
            }
        }
    }

    /// Raw serialized entry, if present
    pub fn get_raw(&self, key: &str) -> Option<String> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner.entries.get(key).cloned()
    }

    /// Write synchronously.
    ///
    /// On quota overflow runs the emergency eviction routine and
    /// retries exactly once. Returns `false` when the retry also fails
    /// (the value simply does not fit); never panics or raises.
    pub fn set_immediate<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(error) => {
                tracing::warn!(key, %error, "failed to encode local store value");
                return false;
            }
        };
        self.set_immediate_raw(key, raw)
    }

    fn set_immediate_raw(&self, key: &str, raw: String) -> bool {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        self.store_raw(&mut inner, key, raw)
    }

    /// Read-modify-write under a single lock acquisition.
    ///
    /// `f` receives the parsed current value (absent or corrupt entries
    /// come through as `None`) and returns the replacement; returning
    /// `None` removes the key. No other store operation can interleave
    /// between the read and the write. Quota handling matches
    /// `set_immediate`.
    pub fn update<T, F>(&self, key: &str, f: F) -> bool
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> Option<T>,
    {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let current = inner
            .entries
            .get(key)
            .and_then(|raw| serde_json::from_str(raw).ok());

        match f(current) {
            Some(value) => match serde_json::to_string(&value) {
                Ok(raw) => self.store_raw(&mut inner, key, raw),
                Err(error) => {
                    tracing::warn!(key, %error, "failed to encode local store value");
                    false
                }
            },
            None => {
                inner.drop_key(key);
                true
            }
        }
    }

    fn store_raw(&self, inner: &mut Inner, key: &str, raw: String) -> bool {
        if self.fits(inner, key, &raw) {
            inner.put(key, raw);
            return true;
        }

        self.emergency_evict(inner);

        if self.fits(inner, key, &raw) {
            inner.put(key, raw);
            true
        } else {
            tracing::warn!(
                key,
                value_bytes = raw.len(),
                usage_bytes = inner.usage_bytes,
                quota_bytes = self.quota_bytes,
                "local store write failed after emergency eviction"
            );
            false
        }
    }

    fn fits(&self, inner: &Inner, key: &str, raw: &str) -> bool {
        let replaced = inner
            .entries
            .get(key)
            .map(|old| key.len() + old.len())
            .unwrap_or(0);
        inner.usage_bytes - replaced + key.len() + raw.len() <= self.quota_bytes
    }

    /// Drop low-priority keys, then trim the persisted bookings
    /// snapshot down to pending/confirmed/in-progress records.
    fn emergency_evict(&self, inner: &mut Inner) {
        use crate::metrics::LOCAL_STORE_EVICTIONS_TOTAL;

        for key in EVICTION_ORDER {
            if inner.drop_key(key) {
                LOCAL_STORE_EVICTIONS_TOTAL.with_label_values(&[key]).inc();
                tracing::info!(key, "evicted local store key under quota pressure");
            }
        }

        let Some(raw) = inner.entries.get(keys::BOOKINGS).cloned() else {
            return;
        };
        let Ok(bookings) = serde_json::from_str::<Vec<Booking>>(&raw) else {
            // Corrupt snapshot is worthless as a fallback anyway
            inner.drop_key(keys::BOOKINGS);
            return;
        };

        let trimmed: Vec<Booking> = bookings
            .into_iter()
            .filter(|b| {
                matches!(
                    b.status,
                    BookingStatus::Pending | BookingStatus::Confirmed | BookingStatus::InProgress
                )
            })
            .collect();
        if let Ok(raw) = serde_json::to_string(&trimmed) {
            inner.put(keys::BOOKINGS, raw);
            LOCAL_STORE_EVICTIONS_TOTAL
                .with_label_values(&[keys::BOOKINGS])
                .inc();
        }
    }

    pub fn remove(&self, key: &str) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.drop_key(key);
    }

    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner.entries.keys().cloned().collect()
    }

    pub fn usage_bytes(&self) -> usize {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner.usage_bytes
    }
}

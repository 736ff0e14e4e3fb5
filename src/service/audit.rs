//! Security event logging
//!
//! Client-side audit trail for security-relevant actions. Entries are
//! kept in a capped FIFO list and persisted under a single local store
//! key, so the log survives restarts but can never grow without bound.

use std::sync::{Arc, Mutex};

use crate::config::SecurityLogConfig;
use crate::data::{Clock, SecurityLevel, SecurityLogEntry};
use crate::storage::{LocalStore, keys};

/// Capped FIFO security log persisted in the local store
pub struct SecurityLog {
    local: Arc<LocalStore>,
    clock: Arc<dyn Clock>,
    max_entries: usize,
    entries: Mutex<Vec<SecurityLogEntry>>,
}

impl SecurityLog {
    /// Load the persisted log, dropping it silently if corrupt
    pub fn new(config: &SecurityLogConfig, local: Arc<LocalStore>, clock: Arc<dyn Clock>) -> Self {
        let entries: Vec<SecurityLogEntry> = local.get(keys::SECURITY_LOG).unwrap_or_default();
        Self {
            local,
            clock,
            max_entries: config.max_entries,
            entries: Mutex::new(entries),
        }
    }

    /// Record a security event.
    ///
    /// When the log is at capacity the oldest entry is dropped first.
    /// Persistence failures are tolerated; the in-memory log is the
    /// source of truth for the session.
    pub fn record(
        &self,
        action: &str,
        level: SecurityLevel,
        user_id: Option<&str>,
        session_id: &str,
        detail: Option<&str>,
    ) {
        let entry = SecurityLogEntry {
            timestamp: self.clock.now(),
            action: action.to_string(),
            level,
            user_id: user_id.map(str::to_string),
            session_id: session_id.to_string(),
            detail: detail.map(str::to_string),
        };

        tracing::debug!(action, level = level.as_str(), "security event recorded");

        let snapshot = {
            let mut entries = self.entries.lock().expect("security log mutex poisoned");
            entries.push(entry);
            while entries.len() > self.max_entries {
                entries.remove(0);
            }
            entries.clone()
        };

        self.local.set_immediate(keys::SECURITY_LOG, &snapshot);
    }

    /// All entries, oldest first
    pub fn entries(&self) -> Vec<SecurityLogEntry> {
        self.entries.lock().expect("security log mutex poisoned").clone()
    }

    /// Entries at or above the given severity, oldest first
    pub fn entries_at_least(&self, level: SecurityLevel) -> Vec<SecurityLogEntry> {
        self.entries
            .lock()
            .expect("security log mutex poisoned")
            .iter()
            .filter(|e| e.level >= level)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("security log mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the full entry list (retention sweeps use this)
    pub(crate) fn replace_entries(&self, entries: Vec<SecurityLogEntry>) {
        let snapshot = {
            let mut current = self.entries.lock().expect("security log mutex poisoned");
            *current = entries;
            current.clone()
        };
        self.local.set_immediate(keys::SECURITY_LOG, &snapshot);
    }
}

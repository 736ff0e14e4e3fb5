//! Storage retention sweeps
//!
//! Periodically prunes aged records from the local store. Each
//! retention category is swept independently, so corrupt data in one
//! category never prevents the others from being cleaned:
//!
//! - settled bookings (completed, cancelled, no-show) past 90 days
//! - history breadcrumbs past 30 days
//! - security log entries past 7 days
//! - action locks past 1 day

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::config::RetentionConfig;
use crate::data::{ActionLock, Booking, Clock, HistoryEntry};
use crate::service::audit::SecurityLog;
use crate::storage::{LocalStore, keys};

/// Per-category counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub bookings_pruned: usize,
    pub history_pruned: usize,
    pub security_log_pruned: usize,
    pub locks_pruned: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.bookings_pruned + self.history_pruned + self.security_log_pruned + self.locks_pruned
    }
}

/// Retention janitor over the local store
pub struct StorageJanitor {
    local: Arc<LocalStore>,
    audit: Arc<SecurityLog>,
    clock: Arc<dyn Clock>,
    bookings_retention: ChronoDuration,
    history_retention: ChronoDuration,
    security_log_retention: ChronoDuration,
    locks_retention: ChronoDuration,
    sweep_interval: Duration,
}

impl StorageJanitor {
    pub fn new(
        config: &RetentionConfig,
        local: Arc<LocalStore>,
        audit: Arc<SecurityLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            local,
            audit,
            clock,
            bookings_retention: ChronoDuration::days(config.completed_bookings_days as i64),
            history_retention: ChronoDuration::days(config.history_days as i64),
            security_log_retention: ChronoDuration::days(config.security_log_days as i64),
            locks_retention: ChronoDuration::days(config.action_locks_days as i64),
            sweep_interval: Duration::from_secs(config.sweep_interval_seconds),
        }
    }

    /// Run one retention sweep across all categories.
    ///
    /// Categories are failure-isolated: a corrupt entry in one never
    /// aborts the sweep of the others.
    pub fn sweep(&self) -> SweepReport {
        use crate::metrics::JANITOR_PRUNED_TOTAL;
        let now = self.clock.now();

        let report = SweepReport {
            bookings_pruned: self.sweep_bookings(now),
            history_pruned: self.sweep_history(now),
            security_log_pruned: self.sweep_security_log(now),
            locks_pruned: self.sweep_locks(now),
        };

        JANITOR_PRUNED_TOTAL
            .with_label_values(&["bookings"])
            .inc_by(report.bookings_pruned as u64);
        JANITOR_PRUNED_TOTAL
            .with_label_values(&["history"])
            .inc_by(report.history_pruned as u64);
        JANITOR_PRUNED_TOTAL
            .with_label_values(&["security_log"])
            .inc_by(report.security_log_pruned as u64);
        JANITOR_PRUNED_TOTAL
            .with_label_values(&["locks"])
            .inc_by(report.locks_pruned as u64);

        if report.total() > 0 {
            tracing::info!(
                bookings = report.bookings_pruned,
                history = report.history_pruned,
                security_log = report.security_log_pruned,
                locks = report.locks_pruned,
                "retention sweep pruned records"
            );
        }
        report
    }

    /// Settled bookings whose service date has aged out. Active
    /// bookings are kept regardless of age.
    fn sweep_bookings(&self, now: DateTime<Utc>) -> usize {
        let Some(bookings) = self.local.get::<Vec<Booking>>(keys::BOOKINGS) else {
            return 0;
        };
        let cutoff = (now - self.bookings_retention).date_naive();

        let before = bookings.len();
        let kept: Vec<Booking> = bookings
            .into_iter()
            .filter(|b| !(b.status.is_settled() && b.date < cutoff))
            .collect();
        let pruned = before - kept.len();
        if pruned > 0 {
            self.local.set_immediate(keys::BOOKINGS, &kept);
        }
        pruned
    }

    fn sweep_history(&self, now: DateTime<Utc>) -> usize {
        let Some(history) = self.local.get::<Vec<HistoryEntry>>(keys::HISTORY) else {
            return 0;
        };
        let cutoff = now - self.history_retention;

        let before = history.len();
        let kept: Vec<HistoryEntry> = history
            .into_iter()
            .filter(|e| e.timestamp >= cutoff)
            .collect();
        let pruned = before - kept.len();
        if pruned > 0 {
            self.local.set_immediate(keys::HISTORY, &kept);
        }
        pruned
    }

    fn sweep_security_log(&self, now: DateTime<Utc>) -> usize {
        let entries = self.audit.entries();
        let cutoff = now - self.security_log_retention;

        let before = entries.len();
        let kept: Vec<_> = entries
            .into_iter()
            .filter(|e| e.timestamp >= cutoff)
            .collect();
        let pruned = before - kept.len();
        if pruned > 0 {
            self.audit.replace_entries(kept);
        }
        pruned
    }

    fn sweep_locks(&self, now: DateTime<Utc>) -> usize {
        let Some(locks) = self.local.get::<Vec<ActionLock>>(keys::LOCKS) else {
            return 0;
        };
        let cutoff = now - self.locks_retention;

        let before = locks.len();
        let kept: Vec<ActionLock> = locks
            .into_iter()
            .filter(|l| l.acquired_at >= cutoff)
            .collect();
        let pruned = before - kept.len();
        if pruned > 0 {
            self.local.set_immediate(keys::LOCKS, &kept);
        }
        pruned
    }

    /// Periodic sweep loop; spawn with `tokio::spawn`
    pub async fn run(self: Arc<Self>) {
        use rand::Rng;

        // Jitter up to 10% so a fleet of clients does not sweep in step
        let jitter = rand::thread_rng().gen_range(0..=self.sweep_interval.as_secs() / 10);
        let mut ticker =
            tokio::time::interval(self.sweep_interval + Duration::from_secs(jitter));
        ticker.tick().await; // first tick fires immediately

        loop {
            ticker.tick().await;
            self.sweep();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    use crate::config::SecurityLogConfig;
    use crate::data::{
        BookingStatus, CostBreakdown, EntityId, ManualClock, PaymentChoice, SecurityLevel,
    };

    fn booking(date: NaiveDate, status: BookingStatus) -> Booking {
        Booking {
            id: EntityId::new().0,
            date,
            time: "10:00 AM".to_string(),
            pet_name: "Max".to_string(),
            pet_type: "dog".to_string(),
            user_id: Some("user-1".to_string()),
            email: None,
            customer_name: None,
            owner_name: None,
            package_id: None,
            package_name: None,
            add_ons: vec![],
            single_services: vec![],
            cost: CostBreakdown::default(),
            status,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
            server_generated: false,
            payment_choice: PaymentChoice::PayLater,
            proof_of_payment: None,
            customer_notification: None,
        }
    }

    fn janitor(now: DateTime<Utc>) -> (StorageJanitor, Arc<LocalStore>, Arc<SecurityLog>) {
        let local = Arc::new(LocalStore::new(256 * 1024));
        let clock = Arc::new(ManualClock::new(now));
        let audit = Arc::new(SecurityLog::new(
            &SecurityLogConfig { max_entries: 500 },
            Arc::clone(&local),
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));
        let janitor = StorageJanitor::new(
            &RetentionConfig {
                completed_bookings_days: 90,
                history_days: 30,
                security_log_days: 7,
                action_locks_days: 1,
                sweep_interval_seconds: 3600,
            },
            Arc::clone(&local),
            Arc::clone(&audit),
            clock,
        );
        (janitor, local, audit)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn old_settled_bookings_are_pruned_but_active_ones_survive() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let (janitor, local, _) = janitor(now);

        local.set_immediate(
            keys::BOOKINGS,
            &vec![
                booking(date(2025, 1, 1), BookingStatus::Completed), // 151 days old
                booking(date(2025, 1, 1), BookingStatus::Pending),   // old but active
                booking(date(2025, 5, 1), BookingStatus::Completed), // inside 90 days
            ],
        );

        let report = janitor.sweep();
        assert_eq!(report.bookings_pruned, 1);

        let kept: Vec<Booking> = local.get(keys::BOOKINGS).unwrap();
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().any(|b| b.status == BookingStatus::Pending));
    }

    #[test]
    fn each_category_uses_its_own_window() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let (janitor, local, audit) = janitor(now);

        local.set_immediate(
            keys::HISTORY,
            &vec![
                HistoryEntry {
                    timestamp: now - ChronoDuration::days(40),
                    description: "old".to_string(),
                },
                HistoryEntry {
                    timestamp: now - ChronoDuration::days(5),
                    description: "recent".to_string(),
                },
            ],
        );
        local.set_immediate(
            keys::LOCKS,
            &vec![
                ActionLock {
                    key: "stale".to_string(),
                    acquired_at: now - ChronoDuration::days(2),
                },
                ActionLock {
                    key: "fresh".to_string(),
                    acquired_at: now - ChronoDuration::hours(2),
                },
            ],
        );
        audit.record("kept", SecurityLevel::Info, None, "s", None);

        let report = janitor.sweep();
        assert_eq!(report.history_pruned, 1);
        assert_eq!(report.locks_pruned, 1);
        assert_eq!(report.security_log_pruned, 0);

        let locks: Vec<ActionLock> = local.get(keys::LOCKS).unwrap();
        assert_eq!(locks.len(), 1);
        assert_eq!(locks[0].key, "fresh");
    }

    #[test]
    fn corrupt_category_does_not_abort_the_others() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let (janitor, local, _) = janitor(now);

        // Corrupt bookings snapshot, valid stale lock
        local.set_immediate(keys::BOOKINGS, &"definitely not bookings");
        local.set_immediate(
            keys::LOCKS,
            &vec![ActionLock {
                key: "stale".to_string(),
                acquired_at: now - ChronoDuration::days(3),
            }],
        );

        let report = janitor.sweep();
        assert_eq!(report.bookings_pruned, 0);
        assert_eq!(report.locks_pruned, 1);
    }

    #[test]
    fn empty_store_sweeps_cleanly() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let (janitor, _, _) = janitor(now);
        assert_eq!(janitor.sweep(), SweepReport::default());
    }
}

//! Duplicate-prevention submission protocol
//!
//! Creating a booking is a three-stage protocol rather than a plain
//! write:
//!
//! 1. fast local pre-check against the already-fetched list
//! 2. transactional insert whose update closure re-checks the
//!    precondition against the live collection
//! 3. reconciliation of ambiguous transaction outcomes by searching
//!    for a just-created matching record inside a short grace window
//!
//! A short-lived action lock in the local store guards against
//! double-submit from the same session (double-click, double-tap).

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use serde_json::Value;

use crate::config::{ReconciliationConfig, RemoteConfig};
use crate::data::{
    ActionLock, Booking, Clock, EntityId, RealtimeDatabase, RemoteError, Resource, SecurityLevel,
    TxnOutcome, TxnUpdate,
};
use crate::error::{AppError, Result};
use crate::service::audit::SecurityLog;
use crate::service::events::{EventBus, GatewayEvent};
use crate::service::gateway::BookingGateway;
use crate::storage::{LocalStore, keys};

/// An existing active booking that blocked a submission
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateConflict {
    pub booking_id: String,
    pub pet_name: String,
    pub date: chrono::NaiveDate,
    pub time: String,
}

/// Result of a non-erroring submission attempt
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// The booking was created and is durable remotely
    Created(Booking),
    /// An equivalent active booking already exists
    Blocked(DuplicateConflict),
}

/// Two bookings conflict when the same customer identity books the
/// same pet for the same date and time slot, and the existing booking
/// is still active. Cancelled bookings never block a resubmission.
pub fn find_conflict(existing: &[Booking], candidate: &Booking) -> Option<DuplicateConflict> {
    let candidate_identity = candidate.identity_key()?;

    existing
        .iter()
        .filter(|b| b.status.is_active())
        .filter(|b| b.identity_key().as_deref() == Some(candidate_identity.as_str()))
        .find(|b| {
            b.pet_name == candidate.pet_name && b.date == candidate.date && b.time == candidate.time
        })
        .map(|b| DuplicateConflict {
            booking_id: b.id.clone(),
            pet_name: b.pet_name.clone(),
            date: b.date,
            time: b.time.clone(),
        })
}

/// Booking submission service implementing the duplicate-prevention
/// protocol on top of the gateway
pub struct SubmissionService {
    remote: Arc<dyn RealtimeDatabase>,
    gateway: Arc<BookingGateway>,
    local: Arc<LocalStore>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    audit: Arc<SecurityLog>,
    grace_window: ChronoDuration,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl SubmissionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &ReconciliationConfig,
        remote_config: &RemoteConfig,
        remote: Arc<dyn RealtimeDatabase>,
        gateway: Arc<BookingGateway>,
        local: Arc<LocalStore>,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
        audit: Arc<SecurityLog>,
    ) -> Self {
        Self {
            remote,
            gateway,
            local,
            clock,
            events,
            audit,
            grace_window: ChronoDuration::seconds(config.grace_window_seconds as i64),
            read_timeout: Duration::from_secs(remote_config.read_timeout_seconds),
            write_timeout: Duration::from_secs(remote_config.write_timeout_seconds),
        }
    }

    /// Submit a booking through the full duplicate-prevention protocol.
    ///
    /// Returns [`SubmissionOutcome::Blocked`] when an equivalent active
    /// booking already exists; this is an expected outcome, not an
    /// error. Errors mean the submission could not be attempted or its
    /// outcome could not be determined.
    pub async fn submit(&self, mut draft: Booking) -> Result<SubmissionOutcome> {
        if draft.pet_name.trim().is_empty() {
            return Err(AppError::Validation("pet name is required".to_string()));
        }
        if draft.time.trim().is_empty() {
            return Err(AppError::Validation("time slot is required".to_string()));
        }
        if draft.identity_key().is_none() {
            return Err(AppError::Validation(
                "booking needs a customer identity (user id, email or name)".to_string(),
            ));
        }

        if draft.id.trim().is_empty() {
            draft.id = EntityId::new().0;
        }
        draft.created_at = self.clock.now();
        draft.server_generated = true;
        draft.cost.sanitize();

        let lock_key = submission_lock_key(&draft);
        if !self.acquire_lock(&lock_key) {
            self.audit.record(
                "submission_lock_contended",
                SecurityLevel::Warning,
                draft.user_id.as_deref(),
                &lock_key,
                Some("a submission for the same slot is already in flight"),
            );
            return Err(AppError::Transient(
                "a submission for this slot is already in progress".to_string(),
            ));
        }

        // Transient status survives a mid-submission reload
        self.local
            .set_immediate(keys::SUBMISSION_STATUS, &format!("in_flight:{}", draft.id));

        let result = self.submit_locked(&draft).await;
        self.release_lock(&lock_key);

        let status = match &result {
            Ok(SubmissionOutcome::Created(b)) => format!("created:{}", b.id),
            Ok(SubmissionOutcome::Blocked(_)) => "blocked".to_string(),
            Err(_) => "failed".to_string(),
        };
        self.local.set_immediate(keys::SUBMISSION_STATUS, &status);
        result
    }

    async fn submit_locked(&self, draft: &Booking) -> Result<SubmissionOutcome> {
        // Stage 1: cheap pre-check against the list we already have
        let existing = self.gateway.fetch_bookings().await;
        if let Some(conflict) = find_conflict(&existing, draft) {
            return Ok(self.blocked(draft, conflict, "pre-check"));
        }

        // Stage 2: transactional insert re-checking the live collection
        let candidate_json = serde_json::to_value(draft)?;
        let candidate = draft.clone();
        let update = move |current: Option<Value>| -> TxnUpdate {
            let mut children = match current {
                Some(Value::Object(children)) => children,
                _ => serde_json::Map::new(),
            };

            let live: Vec<Booking> = children
                .values()
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect();
            if find_conflict(&live, &candidate).is_some() {
                return TxnUpdate::Abort;
            }

            children.insert(candidate.id.clone(), candidate_json.clone());
            TxnUpdate::Write(Value::Object(children))
        };

        let outcome = tokio::time::timeout(
            self.write_timeout,
            self.remote
                .run_transaction(Resource::Bookings.remote_path(), &update),
        )
        .await
        .map_err(|_| AppError::Transient("booking transaction timed out".to_string()))?
        .map_err(|error| match error {
            RemoteError::PermissionDenied { .. } => AppError::PermissionDenied(Resource::Bookings),
            RemoteError::Unavailable(reason) => AppError::Transient(reason),
        })?;

        match outcome {
            TxnOutcome::Committed(_) => Ok(self.created(draft.clone(), false)),
            TxnOutcome::Aborted => {
                // The closure saw a conflict the pre-check missed; fetch
                // the details for the caller.
                let live = self.gateway.fetch_bookings().await;
                let conflict = find_conflict(&live, draft).unwrap_or(DuplicateConflict {
                    booking_id: String::new(),
                    pet_name: draft.pet_name.clone(),
                    date: draft.date,
                    time: draft.time.clone(),
                });
                Ok(self.blocked(draft, conflict, "transaction"))
            }
            TxnOutcome::Ambiguous => self.reconcile_ambiguous(draft).await,
        }
    }

    /// Stage 3: the transaction reported an indeterminate outcome.
    ///
    /// Re-read the live collection and look for a matching record that
    /// was server-generated within the grace window; that record is
    /// our own write surfacing through a retry artifact, so the
    /// submission succeeded. A matching record older than the window
    /// is a genuine pre-existing duplicate.
    async fn reconcile_ambiguous(&self, draft: &Booking) -> Result<SubmissionOutcome> {
        let read = tokio::time::timeout(
            self.read_timeout,
            self.remote.get(Resource::Bookings.remote_path()),
        )
        .await;
        let live = match read {
            Ok(Ok(Some(Value::Object(children)))) => children
                .values()
                .filter_map(|v| serde_json::from_value::<Booking>(v.clone()).ok())
                .collect::<Vec<_>>(),
            Ok(Ok(_)) => Vec::new(),
            Ok(Err(error)) => {
                return Err(AppError::Transient(format!(
                    "could not verify booking outcome: {error}"
                )));
            }
            Err(_) => {
                return Err(AppError::Transient(
                    "could not verify booking outcome: verification read timed out".to_string(),
                ));
            }
        };

        let matched = find_conflict(&live, draft)
            .and_then(|c| live.iter().find(|b| b.id == c.booking_id).cloned());

        if let Some(record) = matched {
            let age = self.clock.now() - record.created_at;
            if record.server_generated && age >= ChronoDuration::zero() && age <= self.grace_window
            {
                use crate::metrics::AMBIGUOUS_COMMITS_RECONCILED_TOTAL;
                AMBIGUOUS_COMMITS_RECONCILED_TOTAL.inc();
                self.audit.record(
                    "ambiguous_commit_reconciled",
                    SecurityLevel::Warning,
                    draft.user_id.as_deref(),
                    &submission_lock_key(draft),
                    Some(&record.id),
                );
                tracing::info!(id = %record.id, "ambiguous booking commit reconciled as created");
                return Ok(self.created(record, true));
            }
        }

        Err(AppError::DuplicateBooking {
            pet_name: draft.pet_name.clone(),
            date: draft.date,
            time: draft.time.clone(),
        })
    }

    fn created(&self, booking: Booking, reconciled: bool) -> SubmissionOutcome {
        use crate::metrics::BOOKINGS_CREATED_TOTAL;
        BOOKINGS_CREATED_TOTAL.inc();

        if !reconciled {
            self.audit.record(
                "booking_submitted",
                SecurityLevel::Info,
                booking.user_id.as_deref(),
                &submission_lock_key(&booking),
                Some(&booking.id),
            );
        }
        self.events.emit(GatewayEvent::BookingCreated {
            id: booking.id.clone(),
        });
        SubmissionOutcome::Created(booking)
    }

    fn blocked(
        &self,
        draft: &Booking,
        conflict: DuplicateConflict,
        stage: &str,
    ) -> SubmissionOutcome {
        use crate::metrics::DUPLICATES_BLOCKED_TOTAL;
        DUPLICATES_BLOCKED_TOTAL.inc();

        tracing::info!(
            pet_name = %conflict.pet_name,
            date = %conflict.date,
            time = %conflict.time,
            stage,
            "duplicate booking blocked"
        );
        self.audit.record(
            "duplicate_blocked",
            SecurityLevel::Warning,
            draft.user_id.as_deref(),
            &submission_lock_key(draft),
            Some(stage),
        );
        self.events.emit(GatewayEvent::SubmissionBlocked {
            pet_name: conflict.pet_name.clone(),
            date: conflict.date,
            time: conflict.time.clone(),
        });
        SubmissionOutcome::Blocked(conflict)
    }

    // =========================================================================
    // Session action locks
    // =========================================================================

    fn acquire_lock(&self, key: &str) -> bool {
        let now = self.clock.now();
        let grace_window = self.grace_window;
        let mut acquired = false;

        // Single read-modify-write so two concurrent submissions cannot
        // both observe a free slot.
        self.local
            .update(keys::LOCKS, |locks: Option<Vec<ActionLock>>| {
                let mut locks = locks.unwrap_or_default();

                if let Some(held) = locks.iter().find(|l| l.key == key) {
                    // A stale lock (older than the grace window) means a
                    // crashed or abandoned submission and may be taken over.
                    if now - held.acquired_at <= grace_window {
                        return Some(locks);
                    }
                    locks.retain(|l| l.key != key);
                }

                locks.push(ActionLock {
                    key: key.to_string(),
                    acquired_at: now,
                });
                acquired = true;
                Some(locks)
            });

        acquired
    }

    fn release_lock(&self, key: &str) {
        self.local
            .update(keys::LOCKS, |locks: Option<Vec<ActionLock>>| {
                let mut locks = locks.unwrap_or_default();
                locks.retain(|l| l.key != key);
                Some(locks)
            });
    }
}

/// One lock per (identity, pet, date, time) tuple
fn submission_lock_key(booking: &Booking) -> String {
    let identity = booking.identity_key().unwrap_or_default();
    format!(
        "submit:{identity}:{}:{}:{}",
        booking.pet_name, booking.date, booking.time
    )
}

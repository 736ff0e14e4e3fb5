//! End-to-end tests for the duplicate-prevention submission protocol

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use serde_json::Value;
use tokio::sync::broadcast;

use groombook::BookingEngine;
use groombook::config::AppConfig;
use groombook::data::{
    ActionLock, BookingStatus, Clock, ManualClock, RealtimeDatabase, RemoteError, TxnOutcome,
    TxnUpdateFn,
};
use groombook::error::AppError;
use groombook::service::{GatewayEvent, SubmissionOutcome};
use groombook::storage::keys;

use common::{TestEngine, booking, date};

#[tokio::test]
async fn duplicate_active_booking_is_blocked() {
    let t = TestEngine::new();
    let existing = booking("Max", date(2025, 6, 1), "10:00 AM", BookingStatus::Confirmed);
    t.seed_remote_booking(&existing).await;

    let mut events = t.engine.events.subscribe();

    let outcome = t
        .engine
        .submission
        .submit(booking(
            "Max",
            date(2025, 6, 1),
            "10:00 AM",
            BookingStatus::Pending,
        ))
        .await
        .unwrap();

    let SubmissionOutcome::Blocked(conflict) = outcome else {
        panic!("expected the duplicate to be blocked");
    };
    assert_eq!(conflict.booking_id, existing.id);
    assert_eq!(conflict.pet_name, "Max");

    // Listeners are told why nothing was created
    let mut saw_blocked = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, GatewayEvent::SubmissionBlocked { ref pet_name, .. } if pet_name == "Max")
        {
            saw_blocked = true;
        }
    }
    assert!(saw_blocked);

    // The audit trail records the block
    let entries = t.engine.audit.entries();
    assert!(entries.iter().any(|e| e.action == "duplicate_blocked"));
}

#[tokio::test]
async fn same_pet_different_date_is_allowed() {
    let t = TestEngine::new();
    t.seed_remote_booking(&booking(
        "Max",
        date(2025, 6, 1),
        "10:00 AM",
        BookingStatus::Confirmed,
    ))
    .await;

    let outcome = t
        .engine
        .submission
        .submit(booking(
            "Max",
            date(2025, 6, 8),
            "10:00 AM",
            BookingStatus::Pending,
        ))
        .await
        .unwrap();

    let SubmissionOutcome::Created(created) = outcome else {
        panic!("a different date must not conflict");
    };
    assert!(created.server_generated);

    let remote = t.db.get("bookings").await.unwrap().unwrap();
    assert_eq!(remote.as_object().unwrap().len(), 2);
}

#[tokio::test]
async fn cancelled_booking_does_not_block_resubmission() {
    let t = TestEngine::new();
    t.seed_remote_booking(&booking(
        "Max",
        date(2025, 6, 1),
        "10:00 AM",
        BookingStatus::CancelledByCustomer,
    ))
    .await;

    let outcome = t
        .engine
        .submission
        .submit(booking(
            "Max",
            date(2025, 6, 1),
            "10:00 AM",
            BookingStatus::Pending,
        ))
        .await
        .unwrap();

    assert!(matches!(outcome, SubmissionOutcome::Created(_)));
}

#[tokio::test]
async fn transaction_recheck_catches_conflicts_the_precheck_missed() {
    let t = TestEngine::new();

    // Warm the cache with an unrelated booking so the pre-check runs
    // against a list that predates the conflict.
    t.seed_remote_booking(&booking(
        "Luna",
        date(2025, 6, 3),
        "9:00 AM",
        BookingStatus::Confirmed,
    ))
    .await;
    assert_eq!(t.engine.gateway.fetch_bookings().await.len(), 1);

    // Another client creates the conflicting booking behind our back
    t.seed_remote_booking(&booking(
        "Max",
        date(2025, 6, 1),
        "10:00 AM",
        BookingStatus::Confirmed,
    ))
    .await;

    let outcome = t
        .engine
        .submission
        .submit(booking(
            "Max",
            date(2025, 6, 1),
            "10:00 AM",
            BookingStatus::Pending,
        ))
        .await
        .unwrap();

    let SubmissionOutcome::Blocked(conflict) = outcome else {
        panic!("the transactional re-check must catch the conflict");
    };
    assert_eq!(conflict.pet_name, "Max");
    assert_eq!(conflict.time, "10:00 AM");
}

#[tokio::test]
async fn ambiguous_transaction_outcome_is_reconciled_as_created() {
    let t = TestEngine::new();
    t.db.ambiguous_next_transactions(1);

    let outcome = t
        .engine
        .submission
        .submit(booking(
            "Bella",
            date(2025, 7, 1),
            "2:00 PM",
            BookingStatus::Pending,
        ))
        .await
        .unwrap();

    let SubmissionOutcome::Created(created) = outcome else {
        panic!("an applied-but-ambiguous write must reconcile as created");
    };
    assert_eq!(created.pet_name, "Bella");

    // The booking really is durable remotely
    let remote = t.db.get("bookings").await.unwrap().unwrap();
    assert_eq!(remote.as_object().unwrap().len(), 1);

    let entries = t.engine.audit.entries();
    assert!(
        entries
            .iter()
            .any(|e| e.action == "ambiguous_commit_reconciled")
    );
}

#[tokio::test]
async fn held_action_lock_rejects_a_second_submission() {
    let t = TestEngine::new();

    let draft = booking("Max", date(2025, 6, 1), "10:00 AM", BookingStatus::Pending);
    t.engine.local.set_immediate(
        keys::LOCKS,
        &vec![ActionLock {
            key: "submit:uid:user-1:Max:2025-06-01:10:00 AM".to_string(),
            acquired_at: t.clock.now(),
        }],
    );

    let error = t.engine.submission.submit(draft).await.unwrap_err();
    assert!(matches!(error, AppError::Transient(_)));
}

#[tokio::test]
async fn stale_action_lock_is_taken_over() {
    let t = TestEngine::new();

    t.engine.local.set_immediate(
        keys::LOCKS,
        &vec![ActionLock {
            key: "submit:uid:user-1:Max:2025-06-01:10:00 AM".to_string(),
            acquired_at: t.clock.now() - ChronoDuration::seconds(60),
        }],
    );

    let outcome = t
        .engine
        .submission
        .submit(booking(
            "Max",
            date(2025, 6, 1),
            "10:00 AM",
            BookingStatus::Pending,
        ))
        .await
        .unwrap();
    assert!(matches!(outcome, SubmissionOutcome::Created(_)));

    // The lock was released after the submission finished
    let locks: Vec<ActionLock> = t.engine.local.get(keys::LOCKS).unwrap();
    assert!(locks.is_empty());
}

#[tokio::test]
async fn submission_without_identity_is_rejected() {
    let t = TestEngine::new();

    let mut draft = booking("Max", date(2025, 6, 1), "10:00 AM", BookingStatus::Pending);
    draft.user_id = None;
    draft.email = None;
    draft.customer_name = None;
    draft.owner_name = None;

    let error = t.engine.submission.submit(draft).await.unwrap_err();
    assert!(matches!(error, AppError::Validation(_)));
}

/// Remote double whose calls never complete
struct StalledDatabase;

#[async_trait::async_trait]
impl RealtimeDatabase for StalledDatabase {
    async fn get(&self, _path: &str) -> Result<Option<Value>, RemoteError> {
        std::future::pending().await
    }

    async fn set(&self, _path: &str, _value: Value) -> Result<(), RemoteError> {
        std::future::pending().await
    }

    async fn update_children(
        &self,
        _path: &str,
        _children: BTreeMap<String, Value>,
    ) -> Result<(), RemoteError> {
        std::future::pending().await
    }

    async fn run_transaction(
        &self,
        _path: &str,
        _update: TxnUpdateFn<'_>,
    ) -> Result<TxnOutcome, RemoteError> {
        std::future::pending().await
    }

    async fn subscribe(&self, _path: &str) -> Result<broadcast::Receiver<Value>, RemoteError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_remote_times_out_instead_of_wedging_the_submission() {
    let clock = Arc::new(ManualClock::new(common::test_now()));
    let engine = BookingEngine::with_clock(
        AppConfig::for_tests(),
        Arc::new(StalledDatabase) as Arc<dyn RealtimeDatabase>,
        clock as Arc<dyn Clock>,
    );

    // The pre-check read and the transaction both hang forever; bounded
    // calls must surface a retryable error rather than block.
    let error = engine
        .submission
        .submit(booking(
            "Max",
            date(2025, 6, 1),
            "10:00 AM",
            BookingStatus::Pending,
        ))
        .await
        .unwrap_err();
    assert!(matches!(error, AppError::Transient(_)));
}

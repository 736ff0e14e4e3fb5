//! Shared test harness
//!
//! Wires a full engine against the in-memory database with a manual
//! clock so tests control time explicitly.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use groombook::BookingEngine;
use groombook::config::AppConfig;
use groombook::data::{
    Booking, BookingStatus, Clock, CostBreakdown, EntityId, ManualClock, MemoryRealtimeDatabase,
    PaymentChoice, RealtimeDatabase,
};

pub struct TestEngine {
    pub engine: BookingEngine,
    pub db: Arc<MemoryRealtimeDatabase>,
    pub clock: Arc<ManualClock>,
}

impl TestEngine {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(test_now()));
        let db = Arc::new(MemoryRealtimeDatabase::new());
        let engine = BookingEngine::with_clock(
            AppConfig::for_tests(),
            Arc::clone(&db) as Arc<dyn RealtimeDatabase>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Self { engine, db, clock }
    }

    /// Write a booking straight into the remote tree, bypassing the
    /// engine entirely
    pub async fn seed_remote_booking(&self, booking: &Booking) {
        let value = serde_json::to_value(booking).expect("booking serializes");
        self.db
            .set(&format!("bookings/{}", booking.id), value)
            .await
            .expect("seeding must succeed");
    }
}

pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A plausible booking draft for user-1's dog Max
pub fn booking(pet: &str, date: NaiveDate, time: &str, status: BookingStatus) -> Booking {
    Booking {
        id: EntityId::new().0,
        date,
        time: time.to_string(),
        pet_name: pet.to_string(),
        pet_type: "dog".to_string(),
        user_id: Some("user-1".to_string()),
        email: Some("owner@example.com".to_string()),
        customer_name: Some("Pat Owner".to_string()),
        owner_name: None,
        package_id: Some("pkg-basic".to_string()),
        package_name: Some("Basic Groom".to_string()),
        add_ons: vec![],
        single_services: vec![],
        cost: CostBreakdown {
            subtotal: 80.0,
            booking_fee: 20.0,
            balance_on_visit: 60.0,
        },
        status,
        created_at: test_now(),
        server_generated: false,
        payment_choice: PaymentChoice::PayLater,
        proof_of_payment: None,
        customer_notification: None,
    }
}

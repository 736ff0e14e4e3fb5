//! Dashboard read model
//!
//! Aggregations over the gateway's bookings list for the studio
//! dashboard. All reads go through the gateway fallback chain, so an
//! offline session still renders from the last known snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration as ChronoDuration;

use crate::config::ReconciliationConfig;
use crate::data::{Booking, BookingStatus, Clock};
use crate::service::gateway::BookingGateway;

/// Aggregate counts and revenue for the dashboard header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardStats {
    /// Booking count per status wire name
    pub by_status: BTreeMap<&'static str, usize>,
    pub active: usize,
    pub total: usize,
    /// Subtotal plus booking fee across non-cancelled bookings
    pub revenue: f64,
}

pub struct DashboardService {
    gateway: Arc<BookingGateway>,
    clock: Arc<dyn Clock>,
    recent_confirmation_window: ChronoDuration,
}

impl DashboardService {
    pub fn new(
        config: &ReconciliationConfig,
        gateway: Arc<BookingGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            clock,
            recent_confirmation_window: ChronoDuration::hours(
                config.recent_confirmation_window_hours as i64,
            ),
        }
    }

    /// Aggregate stats over the full bookings list.
    ///
    /// Cancelled bookings are excluded from revenue; no-shows still
    /// count, the slot was held for them.
    pub async fn stats(&self) -> DashboardStats {
        let bookings = self.gateway.fetch_bookings().await;
        Self::stats_for(&bookings)
    }

    pub(crate) fn stats_for(bookings: &[Booking]) -> DashboardStats {
        let mut stats = DashboardStats {
            total: bookings.len(),
            ..DashboardStats::default()
        };
        for booking in bookings {
            *stats.by_status.entry(booking.status.as_str()).or_default() += 1;
            if booking.status.is_active() {
                stats.active += 1;
            }
            if !booking.status.is_cancelled() {
                stats.revenue += booking.cost.subtotal + booking.cost.booking_fee;
            }
        }
        stats
    }

    /// All bookings belonging to one customer identity, newest service
    /// date first
    pub async fn customer_bookings(&self, identity_key: &str) -> Vec<Booking> {
        let mut bookings: Vec<Booking> = self
            .gateway
            .fetch_bookings()
            .await
            .into_iter()
            .filter(|b| b.identity_key().as_deref() == Some(identity_key))
            .collect();
        bookings.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.time.cmp(&a.time)));
        bookings
    }

    /// Active bookings with a service date within the next `days`
    /// days (today included), soonest first
    pub async fn upcoming(&self, days: u32) -> Vec<Booking> {
        let today = self.clock.now().date_naive();
        let horizon = today + ChronoDuration::days(days as i64);

        let mut bookings: Vec<Booking> = self
            .gateway
            .fetch_bookings()
            .await
            .into_iter()
            .filter(|b| b.status.is_active() && b.date >= today && b.date <= horizon)
            .collect();
        bookings.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.time.cmp(&b.time)));
        bookings
    }

    /// Confirmed bookings created inside the recent-confirmation
    /// window, for the "just booked" dashboard strip
    pub async fn recently_confirmed(&self) -> Vec<Booking> {
        let cutoff = self.clock.now() - self.recent_confirmation_window;
        let mut bookings: Vec<Booking> = self
            .gateway
            .fetch_bookings()
            .await
            .into_iter()
            .filter(|b| b.status == BookingStatus::Confirmed && b.created_at >= cutoff)
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        bookings
    }
}

//! Service layer
//!
//! Handles:
//! - Remote booking gateway with fallback chain and access latches
//! - Duplicate-prevention submission protocol
//! - Storage retention sweeps
//! - Security event logging
//! - Dashboard aggregations
//! - Typed gateway events

pub mod audit;
pub mod dashboard;
pub mod events;
pub mod gateway;
pub mod janitor;
pub mod submission;

pub use audit::SecurityLog;
pub use dashboard::{DashboardService, DashboardStats};
pub use events::{EventBus, GatewayEvent};
pub use gateway::{BookingGateway, BookingSubscription, ResourceAccess};
pub use janitor::{StorageJanitor, SweepReport};
pub use submission::{DuplicateConflict, SubmissionOutcome, SubmissionService, find_conflict};

//! Data models
//!
//! Rust structs representing remote database entities and locally
//! persisted records. All models use ULID for IDs and chrono for
//! timestamps. Wire names are camelCase to match the hierarchical
//! database's JSON documents.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Create from existing string
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Resources
// =============================================================================

/// Logical resources served by the gateway
///
/// Each resource has its own cache slot, TTL, remote collection path
/// and local snapshot key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Bookings,
    Customers,
    Groomers,
    Packages,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bookings => "bookings",
            Self::Customers => "customers",
            Self::Groomers => "groomers",
            Self::Packages => "packages",
        }
    }

    /// Remote collection path in the hierarchical database
    pub fn remote_path(&self) -> &'static str {
        self.as_str()
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Booking
// =============================================================================

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    CancelledByCustomer,
    CancelledByAdmin,
    CancelledBySystem,
    NoShow,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::InProgress => "inProgress",
            Self::Completed => "completed",
            Self::CancelledByCustomer => "cancelledByCustomer",
            Self::CancelledByAdmin => "cancelledByAdmin",
            Self::CancelledBySystem => "cancelledBySystem",
            Self::NoShow => "noShow",
        }
    }

    /// True for any of the cancelled variants
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::CancelledByCustomer | Self::CancelledByAdmin | Self::CancelledBySystem
        )
    }

    /// An active booking occupies its slot for duplicate checks
    pub fn is_active(&self) -> bool {
        !self.is_cancelled()
    }

    /// Settled bookings are eligible for local archival
    pub fn is_settled(&self) -> bool {
        self.is_cancelled() || matches!(self, Self::Completed | Self::NoShow)
    }
}

/// How the customer chose to pay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaymentChoice {
    PayNow,
    PayLater,
}

/// Cost breakdown for a booking
///
/// Every field must be a finite number before persistence; the
/// hierarchical database cannot represent NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    #[serde(default)]
    pub subtotal: f64,
    #[serde(default)]
    pub booking_fee: f64,
    #[serde(default)]
    pub balance_on_visit: f64,
}

impl CostBreakdown {
    /// Replace non-finite fields with safe values.
    ///
    /// Subtotal and fee fall back to 0; the balance is re-derived from
    /// them when it is itself non-finite.
    pub fn sanitize(&mut self) {
        if !self.subtotal.is_finite() {
            self.subtotal = 0.0;
        }
        if !self.booking_fee.is_finite() {
            self.booking_fee = 0.0;
        }
        if !self.balance_on_visit.is_finite() {
            self.balance_on_visit = (self.subtotal - self.booking_fee).max(0.0);
        }
    }

    pub fn is_sanitized(&self) -> bool {
        self.subtotal.is_finite()
            && self.booking_fee.is_finite()
            && self.balance_on_visit.is_finite()
    }
}

/// A purchased add-on (e.g. nail trim)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOn {
    pub label: String,
    pub price: f64,
}

/// A standalone service outside a package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleService {
    pub service_id: String,
    pub label: String,
    pub price: f64,
}

/// In-app notification shown to the customer on their dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerNotification {
    pub message: String,
    /// Presentation hint: "info", "success", "warning", "error"
    pub kind: String,
    pub seen: bool,
}

/// A grooming appointment
///
/// The central entity. Keyed by `id` in the remote `bookings/`
/// collection. Never physically deleted; cancellation is a status
/// transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    /// Appointment calendar date
    pub date: NaiveDate,
    /// Display string: a single time ("10:00 AM") or a range
    /// ("10:00 AM - 11:30 AM")
    pub time: String,
    pub pet_name: String,
    pub pet_type: String,
    /// Owning user, if authenticated at submission time
    pub user_id: Option<String>,
    /// Fallback identity keys when `user_id` is absent
    pub email: Option<String>,
    pub customer_name: Option<String>,
    pub owner_name: Option<String>,
    pub package_id: Option<String>,
    pub package_name: Option<String>,
    #[serde(default)]
    pub add_ons: Vec<AddOn>,
    #[serde(default)]
    pub single_services: Vec<SingleService>,
    #[serde(default)]
    pub cost: CostBreakdown,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    /// Set by the trusted transactional creation path
    #[serde(default)]
    pub server_generated: bool,
    pub payment_choice: PaymentChoice,
    /// Storage reference for the uploaded proof-of-payment image
    pub proof_of_payment: Option<String>,
    pub customer_notification: Option<CustomerNotification>,
}

impl Booking {
    /// Identity key used for duplicate matching.
    ///
    /// Prefers `user_id`, then `email`, then customer/owner name
    /// (case-insensitive for the name fallbacks). Returns `None` when
    /// the booking carries no identity at all.
    pub fn identity_key(&self) -> Option<String> {
        if let Some(user_id) = self.user_id.as_deref().filter(|v| !v.trim().is_empty()) {
            return Some(format!("uid:{}", user_id.trim()));
        }
        if let Some(email) = self.email.as_deref().filter(|v| !v.trim().is_empty()) {
            return Some(format!("email:{}", email.trim().to_ascii_lowercase()));
        }
        let name = self
            .customer_name
            .as_deref()
            .or(self.owner_name.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())?;
        Some(format!("name:{}", name.to_ascii_lowercase()))
    }
}

// =============================================================================
// Reference entities
// =============================================================================

/// A registered customer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A groomer on staff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Groomer {
    pub id: String,
    pub name: String,
    /// Working days and specialties as free-form display strings
    pub specialties: Vec<String>,
    pub active: bool,
}

/// A grooming package offered by the studio
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroomingPackage {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub description: Option<String>,
}

// =============================================================================
// Locally persisted records
// =============================================================================

/// Severity of a security log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Info,
    Warning,
    Critical,
}

impl SecurityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Append-only audit record of a booking action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityLogEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub level: SecurityLevel,
    pub user_id: Option<String>,
    pub session_id: String,
    pub detail: Option<String>,
}

/// A navigation/history breadcrumb aged out after 30 days
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

/// A short-lived lock guarding an in-flight user action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLock {
    pub key: String,
    pub acquired_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking() -> Booking {
        Booking {
            id: EntityId::new().0,
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            time: "10:00 AM".to_string(),
            pet_name: "Max".to_string(),
            pet_type: "dog".to_string(),
            user_id: Some("user-1".to_string()),
            email: Some("Owner@Example.com".to_string()),
            customer_name: Some("Pat Owner".to_string()),
            owner_name: None,
            package_id: None,
            package_name: None,
            add_ons: vec![],
            single_services: vec![],
            cost: CostBreakdown::default(),
            status: BookingStatus::Pending,
            created_at: Utc::now(),
            server_generated: false,
            payment_choice: PaymentChoice::PayLater,
            proof_of_payment: None,
            customer_notification: None,
        }
    }

    #[test]
    fn status_wire_names_are_camel_case() {
        let json = serde_json::to_string(&BookingStatus::CancelledByCustomer).unwrap();
        assert_eq!(json, "\"cancelledByCustomer\"");
        let parsed: BookingStatus = serde_json::from_str("\"inProgress\"").unwrap();
        assert_eq!(parsed, BookingStatus::InProgress);
    }

    #[test]
    fn cancelled_variants_are_not_active() {
        assert!(BookingStatus::Pending.is_active());
        assert!(BookingStatus::Confirmed.is_active());
        assert!(BookingStatus::NoShow.is_active());
        assert!(!BookingStatus::CancelledByCustomer.is_active());
        assert!(!BookingStatus::CancelledByAdmin.is_active());
        assert!(!BookingStatus::CancelledBySystem.is_active());
    }

    #[test]
    fn sanitize_replaces_non_finite_cost_fields() {
        let mut cost = CostBreakdown {
            subtotal: 80.0,
            booking_fee: 20.0,
            balance_on_visit: f64::NAN,
        };
        cost.sanitize();
        assert_eq!(cost.balance_on_visit, 60.0);

        let mut cost = CostBreakdown {
            subtotal: f64::INFINITY,
            booking_fee: f64::NAN,
            balance_on_visit: f64::NAN,
        };
        cost.sanitize();
        assert_eq!(cost.subtotal, 0.0);
        assert_eq!(cost.booking_fee, 0.0);
        assert_eq!(cost.balance_on_visit, 0.0);
        assert!(cost.is_sanitized());
    }

    #[test]
    fn identity_key_prefers_user_id_then_email_then_name() {
        let b = booking();
        assert_eq!(b.identity_key().unwrap(), "uid:user-1");

        let mut b = booking();
        b.user_id = None;
        assert_eq!(b.identity_key().unwrap(), "email:owner@example.com");

        let mut b = booking();
        b.user_id = None;
        b.email = None;
        assert_eq!(b.identity_key().unwrap(), "name:pat owner");

        let mut b = booking();
        b.user_id = None;
        b.email = None;
        b.customer_name = None;
        assert!(b.identity_key().is_none());
    }

    #[test]
    fn booking_roundtrips_with_camel_case_fields() {
        let b = booking();
        let value = serde_json::to_value(&b).unwrap();
        assert!(value.get("petName").is_some());
        assert!(value.get("createdAt").is_some());
        assert!(value.get("serverGenerated").is_some());
        let back: Booking = serde_json::from_value(value).unwrap();
        assert_eq!(back.pet_name, b.pet_name);
        assert_eq!(back.status, b.status);
    }
}

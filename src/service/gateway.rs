//! Remote booking gateway
//!
//! The single path through which the engine reads and writes bookings
//! and the related reference resources. Hides the backing database
//! behind a fallback discipline:
//!
//! - reads: fresh cache, then remote, then stale cache, then the
//!   persisted local snapshot, then an empty list
//! - permission denial latches per session (separately for reads and
//!   writes) and is never retried; transient errors are retried on the
//!   next call
//! - booking writes require remote durability and always propagate
//!   failures; reference resources may fall back to local persistence

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;

use crate::config::RemoteConfig;
use crate::data::{
    Booking, Customer, Groomer, GroomingPackage, RealtimeDatabase, RemoteError, Resource,
    ResourceCache, SecurityLevel,
};
use crate::error::{AppError, Result};
use crate::service::audit::SecurityLog;
use crate::service::events::{EventBus, GatewayEvent};
use crate::storage::{LocalStore, keys};

/// Session access state for a resource
///
/// One-way transition into `PermissionDenied`: once latched, remote
/// attempts are skipped for the rest of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceAccess {
    #[default]
    Unknown,
    Available,
    PermissionDenied,
}

fn snapshot_key(resource: Resource) -> &'static str {
    match resource {
        Resource::Bookings => keys::BOOKINGS,
        Resource::Customers => keys::CUSTOMERS,
        Resource::Groomers => keys::GROOMERS,
        Resource::Packages => keys::PACKAGES,
    }
}

/// Decode a remote collection snapshot (map of id -> document) into a
/// list, skipping corrupt children instead of failing the read.
fn decode_collection<T: DeserializeOwned>(resource: Resource, value: Value) -> Vec<T> {
    let Value::Object(children) = value else {
        return Vec::new();
    };

    let mut items = Vec::with_capacity(children.len());
    for (id, child) in children {
        match serde_json::from_value(child) {
            Ok(item) => items.push(item),
            Err(error) => {
                tracing::debug!(resource = %resource, id, %error, "skipping corrupt remote child");
            }
        }
    }
    items
}

/// Handle for a live bookings subscription
///
/// Yields the recomputed full list after every remote change. Dropping
/// the handle (or calling [`BookingSubscription::unsubscribe`]) stops
/// the listener; no callbacks fire afterwards.
pub struct BookingSubscription {
    receiver: mpsc::Receiver<Vec<Booking>>,
    task: JoinHandle<()>,
}

impl BookingSubscription {
    /// Wait for the next recomputed bookings list
    pub async fn recv(&mut self) -> Option<Vec<Booking>> {
        self.receiver.recv().await
    }

    /// Stop the listener explicitly.
    ///
    /// The receiver stays usable: once the listener task is gone its
    /// sender is dropped, so `recv` drains anything already buffered
    /// and then returns `None`.
    pub fn unsubscribe(&mut self) {
        self.task.abort();
    }
}

impl Drop for BookingSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl tokio_stream::Stream for BookingSubscription {
    type Item = Vec<Booking>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

/// Gateway over the realtime database for bookings and reference data
pub struct BookingGateway {
    remote: Arc<dyn RealtimeDatabase>,
    cache: Arc<ResourceCache>,
    local: Arc<LocalStore>,
    events: Arc<EventBus>,
    audit: Arc<SecurityLog>,
    read_timeout: Duration,
    write_timeout: Duration,
    read_access: RwLock<HashMap<Resource, ResourceAccess>>,
    /// Separate latch: a read denial must not block writes, and vice versa
    write_access: RwLock<ResourceAccess>,
}

impl BookingGateway {
    pub fn new(
        config: &RemoteConfig,
        remote: Arc<dyn RealtimeDatabase>,
        cache: Arc<ResourceCache>,
        local: Arc<LocalStore>,
        events: Arc<EventBus>,
        audit: Arc<SecurityLog>,
    ) -> Self {
        Self {
            remote,
            cache,
            local,
            events,
            audit,
            read_timeout: Duration::from_secs(config.read_timeout_seconds),
            write_timeout: Duration::from_secs(config.write_timeout_seconds),
            read_access: RwLock::new(HashMap::new()),
            write_access: RwLock::new(ResourceAccess::Unknown),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetch the bookings list through the fallback chain.
    ///
    /// Callers must tolerate an empty list as the final fallback and
    /// must not assume absence means "no bookings exist".
    pub async fn fetch_bookings(&self) -> Vec<Booking> {
        let list: Vec<Booking> = self.fetch_resource(Resource::Bookings).await;
        self.events.emit(GatewayEvent::BookingsRefreshed {
            count: list.len(),
        });
        list
    }

    pub async fn fetch_customers(&self) -> Vec<Customer> {
        self.fetch_resource(Resource::Customers).await
    }

    pub async fn fetch_groomers(&self) -> Vec<Groomer> {
        self.fetch_resource(Resource::Groomers).await
    }

    pub async fn fetch_packages(&self) -> Vec<GroomingPackage> {
        self.fetch_resource(Resource::Packages).await
    }

    async fn fetch_resource<T>(&self, resource: Resource) -> Vec<T>
    where
        T: DeserializeOwned + Serialize,
    {
        if let Some(list) = self.cache.get::<T>(resource).await {
            return list;
        }

        if self.read_access_state(resource).await == ResourceAccess::PermissionDenied {
            // Latched: skip the remote attempt for the rest of the session
            return self.snapshot_or_empty(resource);
        }

        use crate::metrics::REMOTE_READS_TOTAL;
        let read = tokio::time::timeout(
            self.read_timeout,
            self.remote.get(resource.remote_path()),
        )
        .await;

        match read {
            Ok(Ok(value)) => {
                REMOTE_READS_TOTAL
                    .with_label_values(&[resource.as_str(), "ok"])
                    .inc();
                self.set_read_access(resource, ResourceAccess::Available)
                    .await;
                let list: Vec<T> = decode_collection(resource, value.unwrap_or(Value::Null));
                self.cache.set(resource, &list).await;
                self.local.set_immediate(snapshot_key(resource), &list);
                list
            }
            Ok(Err(error)) if error.is_permission_denied() => {
                REMOTE_READS_TOTAL
                    .with_label_values(&[resource.as_str(), "permission_denied"])
                    .inc();
                tracing::warn!(resource = %resource, "remote read denied; latching for session");
                self.set_read_access(resource, ResourceAccess::PermissionDenied)
                    .await;
                self.audit.record(
                    "read_access_denied",
                    SecurityLevel::Critical,
                    None,
                    "gateway",
                    Some(resource.as_str()),
                );
                self.snapshot_or_empty(resource)
            }
            Ok(Err(error)) => {
                REMOTE_READS_TOTAL
                    .with_label_values(&[resource.as_str(), "transient"])
                    .inc();
                tracing::warn!(resource = %resource, %error, "remote read failed; falling back");
                self.stale_or_snapshot(resource).await
            }
            Err(_elapsed) => {
                REMOTE_READS_TOTAL
                    .with_label_values(&[resource.as_str(), "timeout"])
                    .inc();
                tracing::warn!(resource = %resource, "remote read timed out; falling back");
                self.stale_or_snapshot(resource).await
            }
        }
    }

    fn snapshot_or_empty<T: DeserializeOwned>(&self, resource: Resource) -> Vec<T> {
        self.local
            .get::<Vec<T>>(snapshot_key(resource))
            .unwrap_or_default()
    }

    async fn stale_or_snapshot<T: DeserializeOwned>(&self, resource: Resource) -> Vec<T> {
        if let Some(list) = self.cache.get_stale::<T>(resource).await {
            return list;
        }
        self.snapshot_or_empty(resource)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Create a booking keyed by its id.
    ///
    /// Never navigates; emits a notification event on both the success
    /// and the attempted-but-failed path so listeners can refresh
    /// views optimistically. Bookings require remote durability, so
    /// failures propagate instead of falling back to local-only
    /// persistence.
    pub async fn create_booking(&self, mut booking: Booking) -> Result<Booking> {
        if booking.id.trim().is_empty() {
            return Err(AppError::Validation("booking id is required".to_string()));
        }
        booking.cost.sanitize();

        self.write_booking(&booking).await?;

        use crate::metrics::BOOKINGS_CREATED_TOTAL;
        BOOKINGS_CREATED_TOTAL.inc();
        self.events.emit(GatewayEvent::BookingCreated {
            id: booking.id.clone(),
        });
        Ok(booking)
    }

    /// Overwrite an existing booking.
    ///
    /// Sanitizes numeric cost fields before the write; on success the
    /// bookings cache entry is invalidated so the next fetch goes
    /// remote regardless of TTL.
    pub async fn update_booking(&self, mut booking: Booking) -> Result<Booking> {
        if booking.id.trim().is_empty() {
            return Err(AppError::Validation(
                "cannot update a booking without an id".to_string(),
            ));
        }
        booking.cost.sanitize();

        self.write_booking(&booking).await?;

        self.events.emit(GatewayEvent::BookingUpdated {
            id: booking.id.clone(),
        });
        Ok(booking)
    }

    /// Write every booking as an independent child record.
    ///
    /// Per-child writes keep per-record write permissions meaningful.
    /// If any child fails, a single bulk multi-path write is attempted
    /// as a last resort, and the final error is surfaced; this path
    /// never falls back to local-only persistence.
    pub async fn save_bookings(&self, bookings: &[Booking]) -> Result<()> {
        use crate::metrics::REMOTE_WRITES_TOTAL;

        if self.write_access_state().await == ResourceAccess::PermissionDenied {
            // Latched: don't hammer a database that already said no
            let error = AppError::PermissionDenied(Resource::Bookings);
            error.record("save_bookings");
            return Err(error);
        }

        let mut sanitized: Vec<Booking> = bookings.to_vec();
        for booking in &mut sanitized {
            if booking.id.trim().is_empty() {
                return Err(AppError::Validation(
                    "cannot save a booking without an id".to_string(),
                ));
            }
            booking.cost.sanitize();
        }

        let mut last_error: Option<RemoteError> = None;
        let mut any_succeeded = false;

        for booking in &sanitized {
            let path = format!("{}/{}", Resource::Bookings.remote_path(), booking.id);
            let payload = serde_json::to_value(booking)?;
            let write =
                tokio::time::timeout(self.write_timeout, self.remote.set(&path, payload)).await;

            match write {
                Ok(Ok(())) => {
                    any_succeeded = true;
                    self.merge_into_snapshot(booking);
                }
                Ok(Err(error)) => {
                    tracing::warn!(id = %booking.id, %error, "per-child booking write failed");
                    if error.is_permission_denied() {
                        self.latch_write_denied().await;
                    }
                    last_error = Some(error);
                }
                Err(_elapsed) => {
                    tracing::warn!(id = %booking.id, "per-child booking write timed out");
                    last_error = Some(RemoteError::Unavailable("write timed out".to_string()));
                }
            }
        }

        if any_succeeded {
            self.cache.invalidate(Resource::Bookings).await;
        }

        let Some(child_error) = last_error else {
            REMOTE_WRITES_TOTAL
                .with_label_values(&[Resource::Bookings.as_str(), "ok"])
                .inc();
            self.events.emit(GatewayEvent::BookingsRefreshed {
                count: sanitized.len(),
            });
            return Ok(());
        };

        // Last resort: one bulk multi-path write of the full set
        let mut children = BTreeMap::new();
        for booking in &sanitized {
            children.insert(booking.id.clone(), serde_json::to_value(booking)?);
        }
        let bulk = tokio::time::timeout(
            self.write_timeout,
            self.remote
                .update_children(Resource::Bookings.remote_path(), children),
        )
        .await;

        match bulk {
            Ok(Ok(())) => {
                REMOTE_WRITES_TOTAL
                    .with_label_values(&[Resource::Bookings.as_str(), "bulk_fallback"])
                    .inc();
                self.cache.invalidate(Resource::Bookings).await;
                for booking in &sanitized {
                    self.merge_into_snapshot(booking);
                }
                self.events.emit(GatewayEvent::BookingsRefreshed {
                    count: sanitized.len(),
                });
                Ok(())
            }
            Ok(Err(error)) => {
                REMOTE_WRITES_TOTAL
                    .with_label_values(&[Resource::Bookings.as_str(), "failed"])
                    .inc();
                if error.is_permission_denied() {
                    self.latch_write_denied().await;
                }
                tracing::error!(%error, child_error = %child_error, "bulk booking write failed");
                Err(self.map_write_error(error))
            }
            Err(_elapsed) => {
                REMOTE_WRITES_TOTAL
                    .with_label_values(&[Resource::Bookings.as_str(), "timeout"])
                    .inc();
                Err(AppError::Transient("bulk write timed out".to_string()))
            }
        }
    }

    async fn write_booking(&self, booking: &Booking) -> Result<()> {
        use crate::metrics::REMOTE_WRITES_TOTAL;

        if self.write_access_state().await == ResourceAccess::PermissionDenied {
            // Latched: don't hammer a database that already said no
            let error = AppError::PermissionDenied(Resource::Bookings);
            error.record("write_booking");
            self.events.emit(GatewayEvent::BookingWriteFailed {
                id: booking.id.clone(),
                reason: "permission denied (latched)".to_string(),
            });
            return Err(error);
        }

        let path = format!("{}/{}", Resource::Bookings.remote_path(), booking.id);
        let payload = serde_json::to_value(booking)?;
        let write = tokio::time::timeout(self.write_timeout, self.remote.set(&path, payload)).await;

        match write {
            Ok(Ok(())) => {
                REMOTE_WRITES_TOTAL
                    .with_label_values(&[Resource::Bookings.as_str(), "ok"])
                    .inc();
                self.cache.invalidate(Resource::Bookings).await;
                self.merge_into_snapshot(booking);
                Ok(())
            }
            Ok(Err(error)) => {
                REMOTE_WRITES_TOTAL
                    .with_label_values(&[Resource::Bookings.as_str(), "failed"])
                    .inc();
                if error.is_permission_denied() {
                    self.latch_write_denied().await;
                }
                self.events.emit(GatewayEvent::BookingWriteFailed {
                    id: booking.id.clone(),
                    reason: error.to_string(),
                });
                Err(self.map_write_error(error))
            }
            Err(_elapsed) => {
                REMOTE_WRITES_TOTAL
                    .with_label_values(&[Resource::Bookings.as_str(), "timeout"])
                    .inc();
                self.events.emit(GatewayEvent::BookingWriteFailed {
                    id: booking.id.clone(),
                    reason: "write timed out".to_string(),
                });
                Err(AppError::Transient("booking write timed out".to_string()))
            }
        }
    }

    fn map_write_error(&self, error: RemoteError) -> AppError {
        match error {
            RemoteError::PermissionDenied { .. } => AppError::PermissionDenied(Resource::Bookings),
            RemoteError::Unavailable(reason) => AppError::Transient(reason),
        }
    }

    /// Replace-or-append the booking in the persisted local snapshot
    fn merge_into_snapshot(&self, booking: &Booking) {
        let mut snapshot: Vec<Booking> = self.local.get(keys::BOOKINGS).unwrap_or_default();
        match snapshot.iter_mut().find(|b| b.id == booking.id) {
            Some(existing) => *existing = booking.clone(),
            None => snapshot.push(booking.clone()),
        }
        self.local.set_immediate(keys::BOOKINGS, &snapshot);
    }

    // =========================================================================
    // Subscription
    // =========================================================================

    /// Subscribe to the remote bookings collection.
    ///
    /// Every remote change recomputes the full list, updates the
    /// shared cache and persisted snapshot as a side effect, and
    /// yields the list to the subscriber.
    pub async fn subscribe_bookings(self: &Arc<Self>) -> Result<BookingSubscription> {
        let mut remote_rx = self
            .remote
            .subscribe(Resource::Bookings.remote_path())
            .await
            .map_err(|error| match error {
                RemoteError::PermissionDenied { .. } => {
                    AppError::PermissionDenied(Resource::Bookings)
                }
                RemoteError::Unavailable(reason) => AppError::Transient(reason),
            })?;

        let (tx, rx) = mpsc::channel(16);
        let gateway = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                match remote_rx.recv().await {
                    Ok(snapshot) => {
                        let list: Vec<Booking> =
                            decode_collection(Resource::Bookings, snapshot);
                        gateway.cache.set(Resource::Bookings, &list).await;
                        gateway.local.set_immediate(keys::BOOKINGS, &list);
                        gateway.events.emit(GatewayEvent::BookingsRefreshed {
                            count: list.len(),
                        });
                        if tx.send(list).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "bookings subscription lagged; continuing");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(BookingSubscription { receiver: rx, task })
    }

    // =========================================================================
    // Access state
    // =========================================================================

    pub async fn read_access_state(&self, resource: Resource) -> ResourceAccess {
        let access = self.read_access.read().await;
        access.get(&resource).copied().unwrap_or_default()
    }

    pub async fn write_access_state(&self) -> ResourceAccess {
        *self.write_access.read().await
    }

    async fn set_read_access(&self, resource: Resource, state: ResourceAccess) {
        let mut access = self.read_access.write().await;
        let current = access.entry(resource).or_default();
        // PermissionDenied is a one-way latch for the session
        if *current != ResourceAccess::PermissionDenied {
            *current = state;
        }
    }

    async fn latch_write_denied(&self) {
        let mut access = self.write_access.write().await;
        if *access == ResourceAccess::PermissionDenied {
            return;
        }
        *access = ResourceAccess::PermissionDenied;
        tracing::warn!("booking writes denied; latching for session");
        self.audit.record(
            "write_access_denied",
            SecurityLevel::Critical,
            None,
            "gateway",
            Some(Resource::Bookings.as_str()),
        );
    }
}

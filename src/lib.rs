//! groombook - resilient booking engine for a pet-grooming studio
//!
//! Client-side booking logic over an unreliable hierarchical realtime
//! database: cached reads with local fallbacks, transactional
//! duplicate-safe booking creation, quota-limited local persistence
//! and retention sweeps.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     BookingEngine                       │
//! ├──────────────┬───────────────┬──────────────────────────┤
//! │  Submission  │   Dashboard   │         Janitor          │
//! │  (txn +      │  (aggregated  │  (retention sweeps)      │
//! │   reconcile) │   views)      │                          │
//! ├──────────────┴───────────────┴──────────────────────────┤
//! │             BookingGateway (fallback chain)             │
//! │   fresh cache → remote → stale cache → snapshot → []    │
//! ├─────────────┬─────────────────────┬─────────────────────┤
//! │ResourceCache│  RealtimeDatabase   │ LocalStore (quota,  │
//! │ (TTL slots) │  (trait + memory)   │  eviction, flush)   │
//! └─────────────┴─────────────────────┴─────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `config`: Configuration loading and validation
//! - `data`: Models, cache, clock and the remote database seam
//! - `storage`: Quota-limited local store and debounced writes
//! - `service`: Gateway, submission, janitor, audit, dashboard
//! - `error`: Application error types
//! - `metrics`: Prometheus instrumentation

pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::data::{Clock, RealtimeDatabase, ResourceCache, SystemClock};
use crate::service::{
    BookingGateway, DashboardService, EventBus, SecurityLog, StorageJanitor, SubmissionService,
};
use crate::storage::{BatchedWriter, LocalStore};

/// Fully wired booking engine
///
/// Owns every service over one remote database handle and one local
/// store. Cheap to share; all fields are `Arc`s.
pub struct BookingEngine {
    pub config: AppConfig,
    pub local: Arc<LocalStore>,
    pub writer: Arc<BatchedWriter>,
    pub cache: Arc<ResourceCache>,
    pub events: Arc<EventBus>,
    pub audit: Arc<SecurityLog>,
    pub gateway: Arc<BookingGateway>,
    pub submission: Arc<SubmissionService>,
    pub janitor: Arc<StorageJanitor>,
    pub dashboard: Arc<DashboardService>,
}

impl BookingEngine {
    /// Wire the engine against a remote database using the system clock
    pub fn new(config: AppConfig, remote: Arc<dyn RealtimeDatabase>) -> Self {
        Self::with_clock(config, remote, Arc::new(SystemClock))
    }

    /// Wire the engine with an injected clock (tests use a manual one)
    pub fn with_clock(
        config: AppConfig,
        remote: Arc<dyn RealtimeDatabase>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let local = Arc::new(LocalStore::new(config.local_store.quota_bytes));
        let writer = Arc::new(BatchedWriter::new(
            Arc::clone(&local),
            Duration::from_millis(config.local_store.flush_debounce_ms),
        ));
        let cache = Arc::new(ResourceCache::new(&config.cache, Arc::clone(&clock)));
        let events = Arc::new(EventBus::new());
        let audit = Arc::new(SecurityLog::new(
            &config.security_log,
            Arc::clone(&local),
            Arc::clone(&clock),
        ));
        let gateway = Arc::new(BookingGateway::new(
            &config.remote,
            Arc::clone(&remote),
            Arc::clone(&cache),
            Arc::clone(&local),
            Arc::clone(&events),
            Arc::clone(&audit),
        ));
        let submission = Arc::new(SubmissionService::new(
            &config.reconciliation,
            &config.remote,
            Arc::clone(&remote),
            Arc::clone(&gateway),
            Arc::clone(&local),
            Arc::clone(&clock),
            Arc::clone(&events),
            Arc::clone(&audit),
        ));
        let janitor = Arc::new(StorageJanitor::new(
            &config.retention,
            Arc::clone(&local),
            Arc::clone(&audit),
            Arc::clone(&clock),
        ));
        let dashboard = Arc::new(DashboardService::new(
            &config.reconciliation,
            Arc::clone(&gateway),
            Arc::clone(&clock),
        ));

        Self {
            config,
            local,
            writer,
            cache,
            events,
            audit,
            gateway,
            submission,
            janitor,
            dashboard,
        }
    }

    /// Spawn the periodic retention sweep loop
    pub fn spawn_janitor(&self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(Arc::clone(&self.janitor).run())
    }
}

/// Initialize tracing from the logging configuration.
///
/// Safe to call once per process; embedding applications that install
/// their own subscriber should skip this.
pub fn init_tracing(config: &config::LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("groombook={}", config.level)));

    if config.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

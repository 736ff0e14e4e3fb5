//! Data layer module
//!
//! Handles all data access and caching:
//! - Realtime database seam (trait + in-memory backend)
//! - Resource cache (volatile, TTL-based)
//! - Injected clock
//! - Entity models

mod cache;
mod clock;
mod models;
mod remote;

pub use cache::ResourceCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use models::*;
pub use remote::{
    MemoryRealtimeDatabase, RealtimeDatabase, RemoteError, TxnOutcome, TxnUpdate, TxnUpdateFn,
};

//! Local persistence module
//!
//! Handles:
//! - Quota-limited synchronous key-value store (the browser-storage analog)
//! - Debounced batched writes into that store

pub mod local;

mod flush;

pub use flush::BatchedWriter;
pub use local::{LocalStore, keys};

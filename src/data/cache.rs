//! Resource cache
//!
//! One slot per logical resource (bookings, customers, groomers,
//! packages), each with its own TTL. The cache is an explicit service
//! object owned by the gateway: no global state, clock injected, and
//! invalidation is an explicit operation rather than a TTL side effect.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use crate::config::CacheConfig;
use crate::data::clock::Clock;
use crate::data::models::Resource;

/// A cached resource list with its fetch timestamp
#[derive(Debug, Clone)]
struct Slot {
    payload: serde_json::Value,
    item_count: usize,
    fetched_at: DateTime<Utc>,
}

/// TTL-based cache over the gateway's resource lists
pub struct ResourceCache {
    clock: Arc<dyn Clock>,
    ttls: HashMap<Resource, Duration>,
    slots: RwLock<HashMap<Resource, Slot>>,
}

impl ResourceCache {
    /// Create a cache with per-resource TTLs from configuration
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let mut ttls = HashMap::new();
        ttls.insert(
            Resource::Bookings,
            Duration::seconds(config.bookings_ttl_seconds as i64),
        );
        ttls.insert(
            Resource::Customers,
            Duration::seconds(config.customers_ttl_seconds as i64),
        );
        ttls.insert(
            Resource::Groomers,
            Duration::seconds(config.groomers_ttl_seconds as i64),
        );
        ttls.insert(
            Resource::Packages,
            Duration::seconds(config.packages_ttl_seconds as i64),
        );

        Self {
            clock,
            ttls,
            slots: RwLock::new(HashMap::new()),
        }
    }

    fn ttl(&self, resource: Resource) -> Duration {
        self.ttls
            .get(&resource)
            .copied()
            .unwrap_or_else(|| Duration::seconds(30))
    }

    /// Get the cached list if fresh (age < TTL) and non-empty.
    ///
    /// An empty cached list never counts as a hit: the fallback
    /// discipline treats "we cached nothing" the same as a miss so a
    /// remote read gets another chance.
    pub async fn get<T: DeserializeOwned>(&self, resource: Resource) -> Option<Vec<T>> {
        let result = {
            let slots = self.slots.read().await;
            slots.get(&resource).and_then(|slot| {
                let age = self.clock.now() - slot.fetched_at;
                if slot.item_count > 0 && age < self.ttl(resource) {
                    serde_json::from_value(slot.payload.clone()).ok()
                } else {
                    None
                }
            })
        };

        use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};
        if result.is_some() {
            CACHE_HITS_TOTAL.with_label_values(&[resource.as_str()]).inc();
        } else {
            CACHE_MISSES_TOTAL
                .with_label_values(&[resource.as_str()])
                .inc();
        }

        result
    }

    /// Get the cached list regardless of age.
    ///
    /// Fallback path for transient remote failures: a stale answer is
    /// better than none.
    pub async fn get_stale<T: DeserializeOwned>(&self, resource: Resource) -> Option<Vec<T>> {
        let slots = self.slots.read().await;
        slots
            .get(&resource)
            .filter(|slot| slot.item_count > 0)
            .and_then(|slot| serde_json::from_value(slot.payload.clone()).ok())
    }

    /// Store a freshly fetched list, stamped with the injected clock
    pub async fn set<T: Serialize>(&self, resource: Resource, items: &[T]) {
        let payload = match serde_json::to_value(items) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(resource = %resource, %error, "failed to encode cache payload");
                return;
            }
        };

        let mut slots = self.slots.write().await;
        slots.insert(
            resource,
            Slot {
                payload,
                item_count: items.len(),
                fetched_at: self.clock.now(),
            },
        );

        use crate::metrics::CACHE_SIZE;
        CACHE_SIZE
            .with_label_values(&[resource.as_str()])
            .set(items.len() as i64);
    }

    /// Drop the slot so the next `get` misses regardless of TTL
    pub async fn invalidate(&self, resource: Resource) {
        let mut slots = self.slots.write().await;
        slots.remove(&resource);

        use crate::metrics::CACHE_SIZE;
        CACHE_SIZE.with_label_values(&[resource.as_str()]).set(0);
    }

    /// Age of the cached slot, if present
    pub async fn age(&self, resource: Resource) -> Option<Duration> {
        let slots = self.slots.read().await;
        slots
            .get(&resource)
            .map(|slot| self.clock.now() - slot.fetched_at)
    }
}

//! Cache en memoria para registros VIN
//!
//! Memoización de 10 minutos para el forwarder de telemetría, que resuelve
//! el mismo VIN en cada mensaje del stream.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::models::vin::Vin;

const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

struct CachedVin {
    record: Vin,
    cached_at: Instant,
}

pub struct VinCache {
    entries: RwLock<HashMap<String, CachedVin>>,
    ttl: Duration,
}

impl Default for VinCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl VinCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn get(&self, vin: &str) -> Option<Vin> {
        let entries = self.entries.read().await;
        match entries.get(vin) {
            Some(cached) if cached.cached_at.elapsed() < self.ttl => {
                debug!("Cache hit para VIN: {}", vin);
                Some(cached.record.clone())
            }
            _ => {
                debug!("Cache miss para VIN: {}", vin);
                None
            }
        }
    }

    pub async fn set(&self, record: Vin) {
        let mut entries = self.entries.write().await;
        entries.insert(
            record.vin.clone(),
            CachedVin {
                record,
                cached_at: Instant::now(),
            },
        );
    }

    /// Eliminar entradas expiradas
    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let initial = entries.len();
        entries.retain(|_, cached| cached.cached_at.elapsed() < self.ttl);
        initial - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::status;

    #[tokio::test]
    async fn test_cache_set_and_get() {
        let cache = VinCache::default();
        let record = Vin::new("1FTFW1ET5DFA12345", status::MINT_SUCCESS);

        cache.set(record.clone()).await;
        let cached = cache.get("1FTFW1ET5DFA12345").await;
        assert!(cached.is_some());
        assert_eq!(cached.unwrap().onboarding_status, status::MINT_SUCCESS);
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let cache = VinCache::default();
        assert!(cache.get("UNKNOWNVIN1234567").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_expiry() {
        let cache = VinCache::new(Duration::from_millis(10));
        cache.set(Vin::new("1FTFW1ET5DFA12345", 0)).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get("1FTFW1ET5DFA12345").await.is_none());
        assert_eq!(cache.cleanup_expired().await, 1);
    }
}

//! Consumer Admission (C7, spec §4.7).
//!
//! One token bucket per API key held in a `DashMap`, following the
//! teacher's Design Notes (§9: "supervised actor/one-per-key task") and its
//! use of `dashmap` for shared concurrent state
//! (`tools/cache_tools.rs`-style in-memory caches).

use crate::error::CoreError;
use crate::model::{Consumer, RateLimitConfig};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;

#[derive(Debug)]
struct TokenBucket {
    config: RateLimitConfig,
    tokens: f64,
    last_refill: std::time::Instant,
}

impl TokenBucket {
    fn new(config: RateLimitConfig) -> Self {
        let capacity = config.capacity as f64;
        Self { config, tokens: capacity, last_refill: std::time::Instant::now() }
    }

    fn refill(&mut self) {
        let elapsed_ms = self.last_refill.elapsed().as_millis() as u64;
        if elapsed_ms == 0 {
            return;
        }
        let ticks = elapsed_ms / self.config.milliseconds_for_updates.max(1);
        if ticks == 0 {
            return;
        }
        let added_per_tick = (self.config.milliseconds_for_updates
            / self.config.milliseconds_per_request.max(1)) as f64;
        self.tokens = (self.tokens + added_per_tick * ticks as f64).min(self.config.capacity as f64);
        self.last_refill += std::time::Duration::from_millis(ticks * self.config.milliseconds_for_updates);
    }

    /// Attempts to consume one token. Returns `Ok(())` if admitted, or the
    /// retry-after seconds derived from `millisecondsPerRequest` otherwise.
    fn try_admit(&mut self) -> Result<(), u64> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let retry_after_secs = (self.config.milliseconds_per_request as f64 / 1000.0).ceil() as u64;
            Err(retry_after_secs.max(1))
        }
    }
}

pub struct ConsumerRegistry {
    consumers: DashMap<String, Consumer>,
    api_key_index: DashMap<String, String>,
    buckets: DashMap<String, Arc<Mutex<TokenBucket>>>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self {
            consumers: DashMap::new(),
            api_key_index: DashMap::new(),
            buckets: DashMap::new(),
        }
    }

    pub fn create(
        &self,
        name: String,
        allowed_apis: Vec<String>,
        rate_limit: RateLimitConfig,
    ) -> Result<Consumer, CoreError> {
        if self.consumers.contains_key(&name) {
            return Err(CoreError::Conflict(format!("consumer '{name}' already exists")));
        }
        let api_key = generate_api_key();
        let consumer = Consumer {
            name: name.clone(),
            api_key: api_key.clone(),
            allowed_apis,
            rate_limit: rate_limit.clone(),
            is_active: true,
            total_calls: Default::default(),
            monthly_calls: Default::default(),
        };
        self.consumers.insert(name.clone(), consumer.clone());
        self.api_key_index.insert(api_key, name.clone());
        self.buckets.insert(name, Arc::new(Mutex::new(TokenBucket::new(rate_limit))));
        Ok(consumer)
    }

    pub fn find_by_api_key(&self, api_key: &str) -> Option<Consumer> {
        let name = self.api_key_index.get(api_key)?;
        self.consumers.get(name.value()).map(|c| c.clone())
    }

    pub fn find_by_name(&self, name: &str) -> Option<Consumer> {
        self.consumers.get(name).map(|c| c.clone())
    }

    pub fn delete(&self, name: &str) -> Option<Consumer> {
        self.buckets.remove(name);
        if let Some((_, consumer)) = self.consumers.remove(name) {
            self.api_key_index.remove(&consumer.api_key);
            Some(consumer)
        } else {
            None
        }
    }

    pub fn list(&self) -> Vec<Consumer> {
        self.consumers.iter().map(|c| c.clone()).collect()
    }

    /// Replaces a consumer's `allowedAPIs` list (spec §6 `PATCH /consumers/:name`).
    pub fn update_allowed_apis(&self, name: &str, allowed_apis: Vec<String>) -> Result<Consumer, CoreError> {
        let mut consumer = self
            .consumers
            .get_mut(name)
            .ok_or_else(|| CoreError::NotFound(format!("consumer '{name}'")))?;
        consumer.allowed_apis = allowed_apis;
        Ok(consumer.clone())
    }

    /// Admits a request for `api` under the given API key (spec §4.7).
    pub fn admit(&self, api_key: &str, api: &str) -> Result<(), CoreError> {
        let Some(consumer) = self.find_by_api_key(api_key) else {
            return Err(CoreError::Unauthorized);
        };
        if !consumer.allowed_apis.iter().any(|a| a == api) {
            return Err(CoreError::Forbidden(format!("api '{api}' not allowed for consumer '{}'", consumer.name)));
        }
        let bucket = self
            .buckets
            .get(&consumer.name)
            .ok_or_else(|| CoreError::InternalError("missing token bucket".to_string()))?
            .clone();
        let mut bucket = bucket.lock();
        bucket.try_admit().map_err(|retry_after_secs| CoreError::RateLimited { retry_after_secs })
    }

    /// Records a successful downstream response (status `< 500`) against
    /// the consumer's call counters (spec §4.7). 5xx responses are never
    /// passed here.
    pub fn record_success(&self, consumer_name: &str, api: &str) {
        if let Some(mut consumer) = self.consumers.get_mut(consumer_name) {
            *consumer.total_calls.entry(api.to_string()).or_insert(0) += 1;
            let month_key = format!("{}:{}", Utc::now().format("%Y-%m"), api);
            *consumer.monthly_calls.entry(month_key).or_insert(0) += 1;
        }
    }
}

impl Default for ConsumerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

const API_KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// 32-char base62 string drawn from a cryptographic RNG (spec §4.7).
fn generate_api_key() -> String {
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| API_KEY_ALPHABET[rng.gen_range(0..API_KEY_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_rejects_disallowed_api() {
        let registry = ConsumerRegistry::new();
        let consumer = registry
            .create("acme".to_string(), vec!["getAgentResult".to_string()], RateLimitConfig::default())
            .unwrap();
        let err = registry.admit(&consumer.api_key, "getCommunityNote").unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[test]
    fn admit_unauthorized_for_unknown_key() {
        let registry = ConsumerRegistry::new();
        let err = registry.admit("nonexistent-key", "getAgentResult").unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized));
    }

    #[test]
    fn s6_rate_limit_then_retry_after() {
        let registry = ConsumerRegistry::new();
        let config = RateLimitConfig { capacity: 1, milliseconds_per_request: 1000, milliseconds_for_updates: 1000 };
        let consumer = registry
            .create("acme".to_string(), vec!["getAgentResult".to_string()], config)
            .unwrap();

        registry.admit(&consumer.api_key, "getAgentResult").unwrap();
        let err = registry.admit(&consumer.api_key, "getAgentResult").unwrap_err();
        match err {
            CoreError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 1),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn api_keys_are_32_char_base62() {
        let key = generate_api_key();
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn create_rejects_duplicate_names() {
        let registry = ConsumerRegistry::new();
        registry.create("acme".to_string(), vec![], RateLimitConfig::default()).unwrap();
        let err = registry.create("acme".to_string(), vec![], RateLimitConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn successful_calls_increment_total_and_monthly_counters() {
        let registry = ConsumerRegistry::new();
        let consumer = registry
            .create("acme".to_string(), vec!["getAgentResult".to_string()], RateLimitConfig::default())
            .unwrap();
        registry.record_success(&consumer.name, "getAgentResult");
        let updated = registry.find_by_name(&consumer.name).unwrap();
        assert_eq!(*updated.total_calls.get("getAgentResult").unwrap(), 1);
    }
}

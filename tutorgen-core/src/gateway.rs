//! Single-call boundary to the language model.
//!
//! [`LlmGateway::call`] is the only way the pipeline reaches a provider. It
//! answers from the response cache when it can, collapses concurrent calls
//! that share a cache key into one round-trip (failures included), bounds
//! every round-trip with a timeout, and retries transient failures with
//! jittered exponential backoff.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::cache::{cache_key, ResponseCache};
use crate::contract::LlmProvider;
use crate::error::{GatewayError, ProviderError};

/// Retry and timeout settings for provider round-trips.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles on every further failure.
    pub base_delay: Duration,
    /// Upper bound of the backoff before jitter is added.
    pub max_delay: Duration,
    /// Bound on a single round-trip.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            call_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    ///
    /// `min(base * 2^(attempt-1), max)` plus up to half of that as jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let capped = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter_ms = fastrand::u64(0..=(capped.as_millis() as u64) / 2);
        capped + Duration::from_millis(jitter_ms)
    }
}

/// Counters since the gateway was created.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GatewayStats {
    pub provider_calls: u64,
    pub cache_hits: u64,
    pub retries: u64,
}

pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
    cache: ResponseCache,
    policy: RetryPolicy,
    /// Per-key slot holding the outcome of the round-trip in flight, so
    /// waiters share it whether it succeeded or failed.
    inflight: DashMap<String, Arc<Mutex<Option<Result<String, GatewayError>>>>>,
    provider_calls: AtomicU64,
    cache_hits: AtomicU64,
    retries: AtomicU64,
}

impl LlmGateway {
    pub fn new(provider: Arc<dyn LlmProvider>, cache: ResponseCache, policy: RetryPolicy) -> Self {
        Self {
            provider,
            cache,
            policy,
            inflight: DashMap::new(),
            provider_calls: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }

    /// Call the model, keyed by the SHA-256 of the prompt.
    pub async fn call(&self, prompt: &str) -> Result<String, GatewayError> {
        self.call_with_key(prompt, None).await
    }

    /// Call the model with an explicit cache key, or the prompt hash when `None`.
    pub async fn call_with_key(
        &self,
        prompt: &str,
        key: Option<&str>,
    ) -> Result<String, GatewayError> {
        let key = match key {
            Some(k) => k.to_owned(),
            None => cache_key(prompt),
        };

        if let Some(hit) = self.lookup(&key) {
            return Ok(hit);
        }

        let slot = self.inflight.entry(key.clone()).or_default().clone();
        let mut settled = slot.lock().await;

        // The caller that held the slot before us already settled this key.
        if let Some(outcome) = settled.as_ref() {
            debug!(key = %key, ok = outcome.is_ok(), "Reusing outcome of a concurrent call");
            return outcome.clone();
        }
        if let Some(hit) = self.lookup(&key) {
            return Ok(hit);
        }

        debug!(key = %key, prompt_chars = prompt.len(), "Cache miss, calling provider");
        let outcome = self.round_trip(prompt).await;
        if let Ok(response) = &outcome {
            if let Err(e) = self.cache.insert(key.clone(), response.clone()) {
                warn!(key = %key, error = %e, "Failed to persist response cache entry");
            }
        }
        *settled = Some(outcome.clone());
        // Retire the slot only if it is still the one we settled.
        self.inflight.remove_if(&key, |_, current| Arc::ptr_eq(current, &slot));
        drop(settled);
        outcome
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let hit = self.cache.get(key)?;
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Response cache hit");
        Some(hit)
    }

    async fn round_trip(&self, prompt: &str) -> Result<String, GatewayError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.provider_calls.fetch_add(1, Ordering::Relaxed);

            let outcome =
                match tokio::time::timeout(self.policy.call_timeout, self.provider.complete(prompt))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout),
                };

            let err = match outcome {
                Ok(text) => return Ok(text),
                Err(err) => err,
            };

            if !err.is_transient() {
                error!(attempt, error = %err, kind = err.kind(), "Fatal provider error, not retrying");
                return Err(GatewayError {
                    attempts: attempt,
                    source: err,
                });
            }
            if attempt >= self.policy.max_attempts {
                error!(attempt, error = %err, kind = err.kind(), "Provider retries exhausted");
                return Err(GatewayError {
                    attempts: attempt,
                    source: err,
                });
            }

            let mut delay = self.policy.backoff(attempt);
            if let ProviderError::RateLimited {
                retry_after: Some(hint),
            } = &err
            {
                delay = delay.max(*hint);
            }
            self.retries.fetch_add(1, Ordering::Relaxed);
            warn!(
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient provider error, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

//! Outbound send budget.
//!
//! A token bucket per `provider:identifier` key. [`RateLimitedClient`] consults
//! the limiter before every send and fails fast with
//! [`SmsError::RateLimited`] instead of calling the vendor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sms_core::{SendRequest, SendResponse, SmsClient, SmsError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Configuration for rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum number of sends per window
    pub max_requests: u32,
    /// Window duration in seconds
    pub window_seconds: u64,
    /// Whether to enable rate limiting
    pub enabled: bool,
    /// Per-provider rate limits keyed by provider key (overrides global settings)
    pub per_provider: HashMap<String, ProviderRateLimit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRateLimit {
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_seconds: 60,
            enabled: true,
            per_provider: HashMap::new(),
        }
    }
}

/// Rate limiter implementation using token bucket algorithm
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Arc<Mutex<HashMap<String, TokenBucket>>>,
}

#[derive(Debug)]
struct TokenBucket {
    tokens: u32,
    last_refill: Instant,
    last_used: Instant,
    max_tokens: u32,
    refill_rate: f64, // tokens per second
}

impl TokenBucket {
    fn new(max_tokens: u32, window_seconds: u64) -> Self {
        let refill_rate = max_tokens as f64 / window_seconds.max(1) as f64;
        let now = Instant::now();
        Self {
            tokens: max_tokens,
            last_refill: now,
            last_used: now,
            max_tokens,
            refill_rate,
        }
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        self.last_used = Instant::now();

        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        if self.tokens >= self.max_tokens {
            self.last_refill = now;
            return;
        }

        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        let tokens_to_add = (elapsed * self.refill_rate).floor() as u32;
        if tokens_to_add > 0 {
            self.tokens = self.tokens.saturating_add(tokens_to_add).min(self.max_tokens);
            // Keep the fractional remainder so slow steady traffic still refills.
            let consumed = saturating_secs(tokens_to_add as f64 / self.refill_rate);
            self.last_refill = self.last_refill.checked_add(consumed).unwrap_or(now).min(now);
        }
    }

    fn retry_after(&self) -> Duration {
        if self.refill_rate <= 0.0 {
            return Duration::MAX;
        }
        let elapsed = self.last_refill.elapsed().as_secs_f64();
        let wait = (1.0 / self.refill_rate - elapsed).max(0.0);
        saturating_secs(wait.ceil().max(1.0))
    }
}

fn saturating_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn buckets(&self) -> MutexGuard<'_, HashMap<String, TokenBucket>> {
        // A panic while holding the lock cannot leave a bucket half-updated.
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check if a send should be rate limited
    pub async fn check_rate_limit(&self, key: &str) -> RateLimitResult {
        if !self.config.enabled {
            return RateLimitResult::Allowed;
        }

        // Determine rate limit settings for this key
        let (max_requests, window_seconds) =
            if let Some(provider_limit) = self.get_provider_limit(key) {
                (provider_limit.max_requests, provider_limit.window_seconds)
            } else {
                (self.config.max_requests, self.config.window_seconds)
            };

        let mut buckets = self.buckets();
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(max_requests, window_seconds));

        if bucket.try_consume() {
            debug!("Rate limit check passed for key: {}", key);
            RateLimitResult::Allowed
        } else {
            let retry_after = bucket.retry_after();
            warn!(
                "Rate limit exceeded for key: {}, retry after {:?}",
                key, retry_after
            );
            RateLimitResult::Limited { retry_after }
        }
    }

    fn get_provider_limit(&self, key: &str) -> Option<&ProviderRateLimit> {
        // Keys look like "provider:identifier"
        let provider = key.split(':').next()?;
        self.config.per_provider.get(provider)
    }

    /// Drop buckets unused for longer than `max_idle`, returning how many were removed.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let mut buckets = self.buckets();
        let before = buckets.len();
        buckets.retain(|key, bucket| {
            if bucket.last_used.elapsed() > max_idle {
                debug!("Cleaning up idle rate limit bucket for key: {}", key);
                false
            } else {
                true
            }
        });
        before - buckets.len()
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.buckets().len()
    }
}

/// Result of rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    Limited { retry_after: Duration },
}

/// Builds the bucket key for a send.
pub trait KeyGenerator {
    fn generate_key(&self, provider: &str, identifier: &str) -> String {
        format!("{}:{}", provider, identifier)
    }
}

/// Default key generator implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyGenerator;

impl KeyGenerator for DefaultKeyGenerator {}

/// An [`SmsClient`] that spends a token from a shared [`RateLimiter`] before each send.
///
/// The bucket key is `provider:identifier`, where the identifier is usually the
/// registry name of the client, so two accounts of the same vendor get separate
/// buckets while sharing the vendor's per-provider limit.
pub struct RateLimitedClient<C> {
    inner: C,
    limiter: Arc<RateLimiter>,
    key: String,
}

impl<C: SmsClient> RateLimitedClient<C> {
    pub fn new(inner: C, limiter: Arc<RateLimiter>, identifier: &str) -> Self {
        Self::with_key_generator(inner, limiter, identifier, &DefaultKeyGenerator)
    }

    pub fn with_key_generator(
        inner: C,
        limiter: Arc<RateLimiter>,
        identifier: &str,
        keys: &impl KeyGenerator,
    ) -> Self {
        let key = keys.generate_key(inner.provider(), identifier);
        Self {
            inner,
            limiter,
            key,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

#[async_trait]
impl<C: SmsClient> SmsClient for RateLimitedClient<C> {
    fn provider(&self) -> &'static str {
        self.inner.provider()
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        match self.limiter.check_rate_limit(&self.key).await {
            RateLimitResult::Allowed => self.inner.send(req).await,
            RateLimitResult::Limited { retry_after } => Err(SmsError::RateLimited(retry_after)),
        }
    }
}

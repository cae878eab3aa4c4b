//! Core rate limiter engine.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{FloodgateError, Result};
use crate::store::{Event, EventStore};

use super::cache::{CacheEntry, CounterCache};
use super::key::CounterKey;
use super::policy::{Policy, Strategy};

/// Default capacity of the counter cache.
const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Outcome of a rate limit check.
///
/// Denial is an expected outcome of correct operation, not an error; the
/// error type is reserved for caller mistakes and infrastructure failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The request is within the limit and has been recorded
    Admitted {
        /// Requests left in the current window after this one
        remaining: u64,
        /// Instant the current window resets
        reset_time: DateTime<Utc>,
    },
    /// The request would exceed the limit; nothing was recorded
    Denied {
        /// Requests counted in the current window
        used: u64,
        /// The limit that was hit
        limit: u64,
        /// The window the limit applies over
        window: Duration,
        /// How long the caller should wait before retrying
        retry_after: Duration,
    },
}

impl Decision {
    /// Whether the request was admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }
}

/// Behavior when the event store fails during an otherwise-admissible
/// request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    /// Surface the store error; no decision is returned
    #[default]
    Closed,
    /// Admit without a durable record
    Open,
}

/// The core rate limiter engine.
///
/// This struct is thread-safe; wrap it in an `Arc` and share it across
/// tasks. All durable state lives in the injected event store, all
/// ephemeral state in the internal counter cache.
pub struct RateLimiter {
    /// Durable log of admitted requests
    store: Arc<dyn EventStore>,
    /// Fast-path windowed counters
    cache: CounterCache,
    /// Source of "now" for all window arithmetic
    clock: Arc<dyn Clock>,
    /// What to do when the store cannot record an admissible request
    fail_mode: FailMode,
    /// Per-key locks serializing the count-then-record sequence
    locks: DashMap<CounterKey, Arc<Mutex<()>>>,
}

impl RateLimiter {
    /// Create an engine over the given event store, with the system clock,
    /// fail-closed store handling, and the default cache capacity.
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            cache: CounterCache::new(DEFAULT_CACHE_CAPACITY),
            clock: Arc::new(SystemClock::new()),
            fail_mode: FailMode::default(),
            locks: DashMap::new(),
        }
    }

    /// Substitute the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Choose the store failure policy.
    pub fn with_fail_mode(mut self, fail_mode: FailMode) -> Self {
        self.fail_mode = fail_mode;
        self
    }

    /// Resize the counter cache.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = CounterCache::new(capacity);
        self
    }

    /// Check whether one more request is admissible for this caller.
    ///
    /// On admission the request is recorded in the event store before the
    /// decision is returned; denial records nothing. Checks for the same
    /// (identifier, endpoint, strategy) key are serialized so concurrent
    /// callers cannot both be admitted at the last slot; checks for other
    /// keys proceed independently.
    pub async fn check(
        &self,
        identifier: &str,
        endpoint: &str,
        policy: &Policy,
        use_cache: bool,
    ) -> Result<Decision> {
        validate(identifier, policy)?;

        let key = CounterKey::new(identifier, endpoint, policy.strategy);

        trace!(
            key = %key,
            limit = policy.limit,
            window_secs = policy.window.as_secs(),
            "Checking rate limit"
        );

        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let anchor = policy.strategy.anchor(now, policy.window);

        // Fast path: a live cache entry for the current window or bucket.
        let cached = if use_cache {
            match self.cache.get(&key, now) {
                Some(entry) if entry_is_current(policy.strategy, &entry, anchor) => Some(entry),
                Some(_) => {
                    // Window rolled over since the entry was written.
                    trace!(key = %key, "Discarding stale counter cache entry");
                    self.cache.remove(&key);
                    None
                }
                None => None,
            }
        } else {
            None
        };

        let current = match cached {
            Some(entry) => entry.count,
            None => {
                let (start, end) = policy.strategy.count_range(now, policy.window);
                let count = self
                    .store
                    .count_in_range(identifier, endpoint, start, end)
                    .await?;
                debug!(key = %key, count, "Recomputed window count from event store");
                count
            }
        };

        if current >= policy.limit {
            debug!(
                key = %key,
                count = current,
                limit = policy.limit,
                "Rate limit exceeded"
            );
            return Ok(Decision::Denied {
                used: current,
                limit: policy.limit,
                window: policy.window,
                retry_after: policy.strategy.retry_after(now, policy.window),
            });
        }

        // Durable write first: the cache must never report an admit the
        // store has no event for.
        if let Err(e) = self.store.record(Event::new(identifier, endpoint, now)).await {
            match self.fail_mode {
                FailMode::Closed => return Err(e),
                FailMode::Open => {
                    warn!(
                        key = %key,
                        error = %e,
                        "Event store write failed; admitting without a durable record"
                    );
                    return Ok(Decision::Admitted {
                        remaining: policy.limit - current - 1,
                        reset_time: policy.strategy.reset_time(now, policy.window),
                    });
                }
            }
        }

        if use_cache {
            let expires_at = policy.strategy.reset_time(now, policy.window);
            let refreshed = cached.is_some()
                && self.cache.increment(&key, anchor, expires_at).is_some();
            if !refreshed {
                self.cache
                    .put(key, CacheEntry::new(anchor, current + 1, expires_at), now);
            }
        }

        Ok(Decision::Admitted {
            remaining: policy.limit - current - 1,
            reset_time: policy.strategy.reset_time(now, policy.window),
        })
    }

    /// Number of entries currently in the counter cache.
    pub fn cache_entries(&self) -> usize {
        self.cache.len()
    }

    /// Clear the counter cache.
    ///
    /// This is primarily useful for testing; decisions fall back to the
    /// event store until the cache warms again.
    pub fn clear_cache(&self) {
        self.cache.purge_expired(DateTime::<Utc>::MAX_UTC);
    }

    fn key_lock(&self, key: &CounterKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Whether a live cache entry still describes the current window.
///
/// A sliding anchor trails `now` continuously, so a live entry is always
/// current modulo the bounded staleness its TTL allows; a fixed entry must
/// sit in the current bucket exactly.
fn entry_is_current(strategy: Strategy, entry: &CacheEntry, anchor: DateTime<Utc>) -> bool {
    match strategy {
        Strategy::Sliding => true,
        Strategy::Fixed => entry.anchor == anchor,
    }
}

fn validate(identifier: &str, policy: &Policy) -> Result<()> {
    if identifier.is_empty() {
        return Err(FloodgateError::validation(
            "identifier",
            "identifier must be non-empty",
        ));
    }
    if policy.limit == 0 {
        return Err(FloodgateError::validation(
            "limit",
            "limit must be a positive integer",
        ));
    }
    if policy.window.is_zero() {
        return Err(FloodgateError::validation(
            "window",
            "window must be a positive duration",
        ));
    }
    Ok(())
}

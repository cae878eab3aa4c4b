//! Durable event log backing the rate limiter.

mod jsonl;
mod memory;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single admitted request.
///
/// Events are immutable: created exactly once per admitted request and never
/// mutated or deleted by the engine. Duplicate timestamps are legal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Caller-scoping key (network address, account id, API key)
    pub identifier: String,
    /// The protected operation/resource
    pub endpoint: String,
    /// When the request was admitted
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create a new event.
    pub fn new(
        identifier: impl Into<String>,
        endpoint: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            endpoint: endpoint.into(),
            timestamp,
        }
    }
}

/// Trait for event store implementations.
///
/// This trait abstracts over the backing log so the engine and tests can
/// substitute implementations without touching decision logic. Reads must
/// reflect all previously completed writes for the same identifier: the
/// engine depends on `count_in_range` for correctness whenever the counter
/// cache is cold or disabled.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event durably.
    ///
    /// Fails with `StoreUnavailable` if the backing medium cannot accept
    /// the write.
    async fn record(&self, event: Event) -> Result<()>;

    /// Count events for an identifier+endpoint pair with
    /// `start <= timestamp < end`.
    async fn count_in_range(
        &self,
        identifier: &str,
        endpoint: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64>;

    /// List events for an identifier with `start <= timestamp <= end`,
    /// ordered by timestamp ascending.
    ///
    /// Used by the stats aggregator, not by the engine's hot path; the
    /// inclusive upper bound lets a report taken at instant `now` see
    /// events recorded at exactly `now`.
    async fn list_in_range(
        &self,
        identifier: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>>;
}

//! In-memory event store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{Event, EventStore};
use crate::error::Result;

/// Event store holding the full log in memory.
///
/// Suitable for tests and single-process embedding. Not durable across
/// restarts; use `JsonlStore` when the log must survive.
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: RwLock<Vec<Event>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of recorded events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether the store holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn record(&self, event: Event) -> Result<()> {
        self.events.write().push(event);
        Ok(())
    }

    async fn count_in_range(
        &self,
        identifier: &str,
        endpoint: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64> {
        let events = self.events.read();
        let count = events
            .iter()
            .filter(|e| {
                e.identifier == identifier
                    && e.endpoint == endpoint
                    && e.timestamp >= start
                    && e.timestamp < end
            })
            .count();
        Ok(count as u64)
    }

    async fn list_in_range(
        &self,
        identifier: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let events = self.events.read();
        let mut matched: Vec<Event> = events
            .iter()
            .filter(|e| e.identifier == identifier && e.timestamp >= start && e.timestamp <= end)
            .cloned()
            .collect();
        matched.sort_by_key(|e| e.timestamp);
        Ok(matched)
    }
}

//! Usage reporting over the event store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::store::{Event, EventStore};

/// Most recent requests included in a report.
const RECENT_LIMIT: usize = 10;

/// Per-endpoint usage within a report's time range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUsage {
    /// The protected operation/resource
    pub endpoint: String,
    /// Requests admitted in the time range
    pub count: u64,
    /// Timestamp of the most recent request
    pub last_request: DateTime<Utc>,
}

/// Usage summary for one identifier over a trailing time range.
#[derive(Debug, Clone)]
pub struct UsageReport {
    /// The identifier the report covers
    pub identifier: String,
    /// Requested range length in hours
    pub time_range_hours: u32,
    /// Start of the range
    pub start_time: DateTime<Utc>,
    /// End of the range
    pub end_time: DateTime<Utc>,
    /// Total admitted requests in the range
    pub total_requests: u64,
    /// Per-endpoint breakdown, busiest endpoint first
    pub by_endpoint: Vec<EndpointUsage>,
    /// Most recent requests, newest first
    pub recent_requests: Vec<Event>,
}

/// Read-only reporting over the event store.
///
/// Reports are computed from the durable log alone; the counter cache is
/// never consulted, so totals are exact historical counts rather than
/// windowed approximations, and reporting never affects engine decisions.
pub struct StatsAggregator {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
}

impl StatsAggregator {
    /// Create an aggregator over the given event store.
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Substitute the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Summarize an identifier's usage over the trailing `hours`.
    pub async fn stats(&self, identifier: &str, hours: u32) -> Result<UsageReport> {
        let end_time = self.clock.now();
        let start_time = end_time - chrono::Duration::hours(i64::from(hours));

        trace!(identifier = %identifier, hours, "Computing usage report");

        let events = self
            .store
            .list_in_range(identifier, start_time, end_time)
            .await?;
        let total_requests = events.len() as u64;

        let mut groups: HashMap<&str, EndpointUsage> = HashMap::new();
        for event in &events {
            groups
                .entry(event.endpoint.as_str())
                .and_modify(|usage| {
                    usage.count += 1;
                    if event.timestamp > usage.last_request {
                        usage.last_request = event.timestamp;
                    }
                })
                .or_insert_with(|| EndpointUsage {
                    endpoint: event.endpoint.clone(),
                    count: 1,
                    last_request: event.timestamp,
                });
        }

        let mut by_endpoint: Vec<EndpointUsage> = groups.into_values().collect();
        by_endpoint.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.endpoint.cmp(&b.endpoint))
        });

        // `list_in_range` is ascending; the report wants newest first.
        let mut recent_requests = events;
        recent_requests.reverse();
        recent_requests.truncate(RECENT_LIMIT);

        Ok(UsageReport {
            identifier: identifier.to_string(),
            time_range_hours: hours,
            start_time,
            end_time,
            total_requests,
            by_endpoint,
            recent_requests,
        })
    }
}

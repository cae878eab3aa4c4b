//! JSON wire shapes for the HTTP-facing layer.
//!
//! The embedding service maps engine decisions and usage reports onto these
//! bodies; field names, field order, and the timestamp format are part of
//! the public contract and must not drift. Timestamps render as ISO-8601
//! UTC with microsecond precision.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::stats::UsageReport;

/// Render a timestamp in the wire format.
///
/// `2024-05-01T12:00:00.000000+00:00`: microseconds always present, offset
/// spelled out rather than `Z`.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Body of a 200 response for an admitted request.
///
/// The demo shape carries only the message and quota metadata; the
/// custom-policy shape additionally echoes the identifier and policy.
#[derive(Debug, Clone, Serialize)]
pub struct AdmittedResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub remaining_requests: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_seconds: Option<u64>,
    pub reset_time: String,
}

impl AdmittedResponse {
    /// Demo-endpoint shape.
    pub fn demo(message: impl Into<String>, remaining: u64, reset_time: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            identifier: None,
            remaining_requests: remaining,
            limit: None,
            window_seconds: None,
            reset_time: format_timestamp(reset_time),
        }
    }

    /// Custom-policy shape, echoing the caller's identifier and policy.
    pub fn custom(
        identifier: impl Into<String>,
        limit: u64,
        window: Duration,
        remaining: u64,
        reset_time: DateTime<Utc>,
    ) -> Self {
        Self {
            message: "Request allowed".to_string(),
            identifier: Some(identifier.into()),
            remaining_requests: remaining,
            limit: Some(limit),
            window_seconds: Some(window.as_secs()),
            reset_time: format_timestamp(reset_time),
        }
    }
}

/// Body of a 429 response for a denied request.
#[derive(Debug, Clone, Serialize)]
pub struct DeniedResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub limit: u64,
    pub window_seconds: u64,
    pub retry_after: u64,
}

impl DeniedResponse {
    /// Build the demo shape from the fields of a denial.
    pub fn new(used: u64, limit: u64, window: Duration, retry_after: Duration) -> Self {
        Self {
            error: "Rate limit exceeded".to_string(),
            message: format!(
                "Rate limit exceeded: {}/{} requests in {}s",
                used,
                limit,
                window.as_secs()
            ),
            identifier: None,
            limit,
            window_seconds: window.as_secs(),
            retry_after: retry_after.as_secs(),
        }
    }

    /// Extend to the custom-policy shape.
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}

/// One endpoint's row in a stats response.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointEntry {
    pub endpoint: String,
    pub count: u64,
    pub last_request: String,
}

/// One recent request in a stats response.
#[derive(Debug, Clone, Serialize)]
pub struct RecentRequest {
    pub endpoint: String,
    pub timestamp: String,
}

/// Body of a 200 stats response.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub identifier: String,
    pub time_range_hours: u32,
    pub start_time: String,
    pub end_time: String,
    pub total_requests: u64,
    pub by_endpoint: Vec<EndpointEntry>,
    pub recent_requests: Vec<RecentRequest>,
}

impl From<&UsageReport> for StatsResponse {
    fn from(report: &UsageReport) -> Self {
        Self {
            identifier: report.identifier.clone(),
            time_range_hours: report.time_range_hours,
            start_time: format_timestamp(report.start_time),
            end_time: format_timestamp(report.end_time),
            total_requests: report.total_requests,
            by_endpoint: report
                .by_endpoint
                .iter()
                .map(|usage| EndpointEntry {
                    endpoint: usage.endpoint.clone(),
                    count: usage.count,
                    last_request: format_timestamp(usage.last_request),
                })
                .collect(),
            recent_requests: report
                .recent_requests
                .iter()
                .map(|event| RecentRequest {
                    endpoint: event.endpoint.clone(),
                    timestamp: format_timestamp(event.timestamp),
                })
                .collect(),
        }
    }
}

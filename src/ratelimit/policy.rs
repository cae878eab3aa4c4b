//! Rate limit policies and window strategies.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Windowing strategy for counting requests.
///
/// The strategy is selected once at the start of a check; all window
/// arithmetic for the chosen variant lives here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Count events in a window trailing the current instant
    #[default]
    Sliding,
    /// Count events in discrete, deterministic time buckets
    Fixed,
}

impl Strategy {
    /// Start of the current window or bucket.
    ///
    /// For fixed windows the bucket boundary floors whole epoch seconds, so
    /// two callers checking at the same instant compute the same anchor. A
    /// request arriving exactly on a boundary belongs to the new bucket.
    pub fn anchor(&self, now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
        match self {
            Strategy::Sliding => now
                .checked_sub_signed(to_chrono(window))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            Strategy::Fixed => {
                let window_secs = window.as_secs().max(1) as i64;
                let start_secs = now.timestamp().div_euclid(window_secs) * window_secs;
                DateTime::from_timestamp(start_secs, 0).unwrap_or(now)
            }
        }
    }

    /// Half-open range `[start, end)` the engine counts over.
    pub fn count_range(&self, now: DateTime<Utc>, window: Duration) -> (DateTime<Utc>, DateTime<Utc>) {
        let anchor = self.anchor(now, window);
        match self {
            Strategy::Sliding => (anchor, now),
            Strategy::Fixed => (anchor, saturating_add(anchor, window)),
        }
    }

    /// Instant the current window resets.
    pub fn reset_time(&self, now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
        match self {
            Strategy::Sliding => saturating_add(now, window),
            Strategy::Fixed => saturating_add(self.anchor(now, window), window),
        }
    }

    /// How long a denied caller should wait before retrying.
    ///
    /// Sliding denials report the full window length (the externally
    /// documented contract), fixed denials the remainder of the current
    /// bucket.
    pub fn retry_after(&self, now: DateTime<Utc>, window: Duration) -> Duration {
        match self {
            Strategy::Sliding => window,
            Strategy::Fixed => (self.reset_time(now, window) - now)
                .to_std()
                .unwrap_or_default(),
        }
    }

    /// Stable lowercase name, matching the serde form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Sliding => "sliding",
            Strategy::Fixed => "fixed",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn to_chrono(window: Duration) -> chrono::Duration {
    chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX)
}

fn saturating_add(instant: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    instant
        .checked_add_signed(to_chrono(window))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A rate limit policy, supplied with each check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Maximum requests allowed in the time window
    pub limit: u64,
    /// Time window for the limit
    pub window: Duration,
    /// Windowing strategy
    pub strategy: Strategy,
}

impl Policy {
    /// Create a sliding-window policy.
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window,
            strategy: Strategy::Sliding,
        }
    }

    /// Select a different windowing strategy.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Window length in whole seconds, as rendered on the wire.
    pub fn window_secs(&self) -> u64 {
        self.window.as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_sliding_anchor_trails_now() {
        let now = ts(1000);
        let anchor = Strategy::Sliding.anchor(now, Duration::from_secs(60));
        assert_eq!(anchor, ts(940));
    }

    #[test]
    fn test_fixed_anchor_floors_to_bucket() {
        let window = Duration::from_secs(60);
        assert_eq!(Strategy::Fixed.anchor(ts(1234), window), ts(1200));
        assert_eq!(Strategy::Fixed.anchor(ts(1259), window), ts(1200));
        // Exactly on the boundary belongs to the new bucket.
        assert_eq!(Strategy::Fixed.anchor(ts(1260), window), ts(1260));
    }

    #[test]
    fn test_fixed_anchor_is_caller_independent() {
        let window = Duration::from_secs(60);
        let a = Strategy::Fixed.anchor(ts(1201), window);
        let b = Strategy::Fixed.anchor(ts(1202), window);
        assert_eq!(a, b);
    }

    #[test]
    fn test_count_ranges() {
        let window = Duration::from_secs(60);
        let now = ts(1234);

        let (start, end) = Strategy::Sliding.count_range(now, window);
        assert_eq!((start, end), (ts(1174), ts(1234)));

        let (start, end) = Strategy::Fixed.count_range(now, window);
        assert_eq!((start, end), (ts(1200), ts(1260)));
    }

    #[test]
    fn test_reset_and_retry() {
        let window = Duration::from_secs(60);
        let now = ts(1234);

        assert_eq!(Strategy::Sliding.reset_time(now, window), ts(1294));
        assert_eq!(Strategy::Sliding.retry_after(now, window), window);

        // 26 seconds left in the bucket that started at 1200.
        assert_eq!(Strategy::Fixed.reset_time(now, window), ts(1260));
        assert_eq!(
            Strategy::Fixed.retry_after(now, window),
            Duration::from_secs(26)
        );
    }

    #[test]
    fn test_strategy_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&Strategy::Sliding).unwrap(), "\"sliding\"");
        assert_eq!(
            serde_json::from_str::<Strategy>("\"fixed\"").unwrap(),
            Strategy::Fixed
        );
    }

    #[test]
    fn test_policy_builder() {
        let policy = Policy::new(5, Duration::from_secs(60)).with_strategy(Strategy::Fixed);
        assert_eq!(policy.limit, 5);
        assert_eq!(policy.window_secs(), 60);
        assert_eq!(policy.strategy, Strategy::Fixed);
    }
}

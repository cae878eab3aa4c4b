//! JSON-lines event store.
//!
//! One event per line, appended and flushed on every record so the log
//! survives process restarts. The full log is replayed into memory on open;
//! queries never touch the file.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use super::{Event, EventStore};
use crate::error::{FloodgateError, Result};

/// Durable event store backed by an append-only JSON-lines file.
pub struct JsonlStore {
    path: PathBuf,
    file: Mutex<File>,
    /// In-memory replica of the log, kept in append order
    events: RwLock<Vec<Event>>,
}

impl JsonlStore {
    /// Open a store at the given path, creating the file if absent and
    /// replaying any existing records.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut events = Vec::new();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Event>(&line) {
                    Ok(event) => events.push(event),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping malformed event record");
                    }
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        info!(
            path = %path.display(),
            events = events.len(),
            "Opened event log"
        );

        Ok(Self {
            path,
            file: Mutex::new(file),
            events: RwLock::new(events),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
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
impl EventStore for JsonlStore {
    async fn record(&self, event: Event) -> Result<()> {
        let line = serde_json::to_string(&event)
            .map_err(|e| FloodgateError::StoreUnavailable(e.to_string()))?;

        // The write and flush must both land before the in-memory replica
        // (and therefore any caller) can observe the event.
        {
            let mut file = self.file.lock();
            writeln!(file, "{}", line)
                .map_err(|e| FloodgateError::StoreUnavailable(e.to_string()))?;
            file.flush()
                .map_err(|e| FloodgateError::StoreUnavailable(e.to_string()))?;
        }

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

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_record_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::open(dir.path().join("events.jsonl")).unwrap();

        store.record(Event::new("alice", "/api/ping/", ts(100))).await.unwrap();
        store.record(Event::new("alice", "/api/ping/", ts(150))).await.unwrap();

        let count = store
            .count_in_range("alice", "/api/ping/", ts(100), ts(200))
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_reopen_replays_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        {
            let store = JsonlStore::open(&path).unwrap();
            store.record(Event::new("alice", "/api/ping/", ts(100))).await.unwrap();
            store.record(Event::new("bob", "/api/ping/", ts(110))).await.unwrap();
        }

        let reopened = JsonlStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);

        let events = reopened.list_in_range("alice", ts(0), ts(200)).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].endpoint, "/api/ping/");
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        {
            let store = JsonlStore::open(&path).unwrap();
            store.record(Event::new("alice", "/api/ping/", ts(100))).await.unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(file, "not json").unwrap();
        }

        let reopened = JsonlStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[tokio::test]
    async fn test_open_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.jsonl");

        let store = JsonlStore::open(&path).unwrap();
        assert!(store.is_empty());
        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
    }
}

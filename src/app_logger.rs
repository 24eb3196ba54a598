//! Activity log: recent analysis statuses kept in a fixed-capacity ring.
//!
//! Every pass pushes the status it ended with. The sidebar reads the ring
//! through `GET_ACTIVITY`; the CLI prints it after `watch` exits.

use serde::{Deserialize, Serialize};

use crate::error_classification::{Status, StatusLevel};

/// A single status line recorded for a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: u64,
    pub timestamp_ms: i64,
    pub level: StatusLevel,
    pub url: String,
    pub message: String,
}

pub const ACTIVITY_CAPACITY: usize = 200;

/// Fixed-capacity circular buffer of activity entries.
pub struct ActivityLog {
    entries: Vec<Option<ActivityEntry>>,
    capacity: usize,
    /// Write position (wraps around)
    write_pos: usize,
    /// Number of entries currently stored (<= capacity)
    count: usize,
    next_id: u64,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(ACTIVITY_CAPACITY)
    }
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || None);
        Self {
            entries,
            capacity,
            write_pos: 0,
            count: 0,
            next_id: 1,
        }
    }

    /// Record the status a pass over `url` ended with. Returns the entry ID.
    pub fn record(&mut self, url: &str, status: &Status) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        self.entries[self.write_pos] = Some(ActivityEntry {
            id,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            level: status.level,
            url: url.to_string(),
            message: status.message.clone(),
        });
        self.write_pos = (self.write_pos + 1) % self.capacity;
        if self.count < self.capacity {
            self.count += 1;
        }

        id
    }

    /// The most recent `limit` entries, oldest first. `0` means all of them.
    pub fn entries(&self, limit: usize) -> Vec<ActivityEntry> {
        if self.count == 0 {
            return Vec::new();
        }
        let take = if limit == 0 { self.count } else { limit.min(self.count) };

        // Oldest slot: 0 until the ring is full, then the next write position
        let start = if self.count < self.capacity { 0 } else { self.write_pos };

        (self.count - take..self.count)
            .filter_map(|i| self.entries[(start + i) % self.capacity].clone())
            .collect()
    }

    pub fn clear(&mut self) {
        for slot in self.entries.iter_mut() {
            *slot = None;
        }
        self.write_pos = 0;
        self.count = 0;
        // next_id stays monotonic
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(message: &str) -> Status {
        Status::new(StatusLevel::Info, message)
    }

    #[test]
    fn record_assigns_monotonic_ids() {
        let mut log = ActivityLog::new(10);
        assert_eq!(log.record("https://a", &status("first")), 1);
        assert_eq!(log.record("https://b", &status("second")), 2);
        assert_eq!(log.record("https://c", &Status::found(3)), 3);
    }

    #[test]
    fn entries_with_limit_return_most_recent_in_order() {
        let mut log = ActivityLog::new(10);
        for m in ["a", "b", "c"] {
            log.record("https://x", &status(m));
        }
        let messages: Vec<_> = log.entries(2).into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["b", "c"]);
        assert_eq!(log.entries(100).len(), 3);
    }

    #[test]
    fn ring_wraps_and_drops_oldest() {
        let mut log = ActivityLog::new(3);
        for i in 0..10 {
            log.record("https://x", &status(&format!("msg-{i}")));
        }
        assert_eq!(log.len(), 3);
        let messages: Vec<_> = log.entries(0).into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["msg-7", "msg-8", "msg-9"]);
    }

    #[test]
    fn clear_keeps_ids_monotonic() {
        let mut log = ActivityLog::new(10);
        log.record("https://x", &status("a"));
        log.record("https://x", &status("b"));
        log.clear();
        assert!(log.is_empty());
        assert!(log.entries(0).is_empty());
        assert_eq!(log.record("https://x", &status("after-clear")), 3);
    }

    #[test]
    fn entry_carries_status_fields() {
        let mut log = ActivityLog::default();
        log.record("https://gitlab.example.com/grp/svc", &Status::app_not_found());
        let entry = &log.entries(0)[0];
        assert_eq!(entry.level, StatusLevel::Warning);
        assert_eq!(entry.url, "https://gitlab.example.com/grp/svc");
        assert_eq!(entry.message, "App not found in config service");
        assert!(entry.timestamp_ms > 0);
    }
}

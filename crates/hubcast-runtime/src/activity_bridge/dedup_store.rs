use std::collections::{HashMap, HashSet, VecDeque};

use hubcast_core::parse_rfc3339_to_unix_ms;

/// Default size of each per-repository seen-id window.
pub const DEFAULT_PROCESSED_EVENT_CAP: usize = 100;

#[derive(Debug, Default)]
struct RepoWindow {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

#[derive(Debug)]
/// Per-repository insertion-ordered window of already-delivered event ids.
///
/// The window always retains the most recently seen `cap` ids; older ids are
/// evicted first. State is process-local and lost on restart, with the
/// baseline poll re-establishing it.
pub struct ProcessedEventStore {
    cap: usize,
    windows: HashMap<String, RepoWindow>,
}

impl ProcessedEventStore {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            windows: HashMap::new(),
        }
    }

    pub fn contains(&self, repo_slug: &str, event_id: &str) -> bool {
        self.windows
            .get(repo_slug)
            .is_some_and(|window| window.seen.contains(event_id))
    }

    /// Records an id as seen. Returns true when the id was newly inserted,
    /// false when it was already present.
    pub fn insert(&mut self, repo_slug: &str, event_id: &str) -> bool {
        let window = self.windows.entry(repo_slug.to_string()).or_default();
        if window.seen.contains(event_id) {
            return false;
        }
        window.order.push_back(event_id.to_string());
        window.seen.insert(event_id.to_string());
        while window.order.len() > self.cap {
            if let Some(evicted) = window.order.pop_front() {
                window.seen.remove(&evicted);
            }
        }
        true
    }

    pub fn seen_count(&self, repo_slug: &str) -> usize {
        self.windows
            .get(repo_slug)
            .map(|window| window.order.len())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
/// Read boundary of one notification thread, taken from the feed-supplied
/// `last_read_at` timestamp at observation time.
pub struct NotificationCursor {
    last_read_at: Option<String>,
    last_read_unix_ms: Option<u64>,
}

impl NotificationCursor {
    pub fn from_last_read_at(last_read_at: Option<&str>) -> Self {
        Self {
            last_read_at: last_read_at.map(str::to_string),
            last_read_unix_ms: last_read_at.and_then(parse_rfc3339_to_unix_ms),
        }
    }

    /// Raw boundary timestamp, suitable for a `since` query parameter.
    pub fn since(&self) -> Option<&str> {
        self.last_read_at.as_deref()
    }

    /// Comments created at or before the boundary were already seen.
    /// Unparseable creation times count as new rather than silently dropped.
    pub fn is_already_seen(&self, created_at: &str) -> bool {
        match (self.last_read_unix_ms, parse_rfc3339_to_unix_ms(created_at)) {
            (Some(boundary), Some(created)) => created <= boundary,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{NotificationCursor, ProcessedEventStore};

    #[test]
    fn unit_processed_event_store_dedups_per_repository() {
        let mut store = ProcessedEventStore::new(100);
        assert!(store.insert("octo/widget", "1"));
        assert!(!store.insert("octo/widget", "1"));
        assert!(store.insert("octo/gadget", "1"));
        assert!(store.contains("octo/widget", "1"));
        assert!(!store.contains("octo/widget", "2"));
    }

    #[test]
    fn regression_processed_event_store_evicts_oldest_beyond_cap() {
        let mut store = ProcessedEventStore::new(100);
        for index in 0..150 {
            assert!(store.insert("octo/widget", &index.to_string()));
        }
        assert_eq!(store.seen_count("octo/widget"), 100);
        for index in 0..50 {
            assert!(!store.contains("octo/widget", &index.to_string()));
        }
        for index in 50..150 {
            assert!(store.contains("octo/widget", &index.to_string()));
        }
    }

    #[test]
    fn unit_notification_cursor_filters_at_or_before_boundary() {
        let cursor = NotificationCursor::from_last_read_at(Some("2026-02-01T00:00:10Z"));
        assert!(cursor.is_already_seen("2026-02-01T00:00:09Z"));
        assert!(cursor.is_already_seen("2026-02-01T00:00:10Z"));
        assert!(!cursor.is_already_seen("2026-02-01T00:00:11Z"));
        assert!(!cursor.is_already_seen("garbage"));
        assert_eq!(cursor.since(), Some("2026-02-01T00:00:10Z"));
    }

    #[test]
    fn unit_notification_cursor_without_boundary_sees_nothing() {
        let cursor = NotificationCursor::from_last_read_at(None);
        assert!(!cursor.is_already_seen("2026-02-01T00:00:09Z"));
        assert_eq!(cursor.since(), None);
    }
}

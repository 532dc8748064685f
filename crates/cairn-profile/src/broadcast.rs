use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Tracks, per user, the thread root of their most recent broadcast
/// command, so consecutive commands from the same user within the
/// configured window stay threaded together instead of starting a new
/// conversation each time. In-memory only — not persisted — per the
/// decision recorded in DESIGN.md that thread correlation for `!all` is a
/// best-effort UX nicety, not durable state.
#[derive(Default)]
pub struct BroadcastTracker {
    threads: DashMap<String, (String, DateTime<Utc>)>,
}

impl BroadcastTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when `text` (already trimmed) begins with `trigger`.
    pub fn is_trigger(text: &str, trigger: &str) -> bool {
        text.trim_start().starts_with(trigger)
    }

    /// Strips the trigger and any immediately following command
    /// punctuation/whitespace, returning the remaining text to process as
    /// a mention.
    pub fn strip_trigger<'a>(text: &'a str, trigger: &str) -> &'a str {
        text.trim_start()
            .strip_prefix(trigger)
            .unwrap_or(text)
            .trim_start_matches([':', ' ', '-'])
    }

    /// Returns the thread root to reuse for `user`'s command right now, if
    /// their previous command landed within `window_minutes`; otherwise
    /// `None`, signalling that a fresh thread should be started.
    pub fn thread_for(&self, user: &str, now: DateTime<Utc>, window_minutes: i64) -> Option<String> {
        self.threads.get(user).and_then(|entry| {
            let (root, last) = entry.value().clone();
            if now - last <= chrono::Duration::minutes(window_minutes) {
                Some(root)
            } else {
                None
            }
        })
    }

    pub fn record(&self, user: &str, thread_root: &str, now: DateTime<Utc>) {
        self.threads.insert(user.to_string(), (thread_root.to_string(), now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_commands_within_window_reuse_thread() {
        let tracker = BroadcastTracker::new();
        let t0 = Utc::now();
        tracker.record("alice", "root-1", t0);

        let t1 = t0 + chrono::Duration::minutes(5);
        assert_eq!(tracker.thread_for("alice", t1, 10), Some("root-1".to_string()));

        let t2 = t0 + chrono::Duration::minutes(15);
        assert_eq!(tracker.thread_for("alice", t2, 10), None);
    }

    #[test]
    fn trigger_detection_and_stripping() {
        assert!(BroadcastTracker::is_trigger("!all hello", "!all"));
        assert!(!BroadcastTracker::is_trigger("hello !all", "!all"));
        assert_eq!(BroadcastTracker::strip_trigger("!all: hello", "!all"), "hello");
    }
}

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Per-conversation cool-down that suppresses automated replies after the
/// seller answers by hand.
///
/// A paused conversation stays silent for the configured window; sending a
/// manual reply again restarts the window. Expired entries are evicted
/// lazily on the next lookup, so long-idle conversations cost one map slot
/// at most until they are next seen.
pub struct PauseGate {
    window: Duration,
    paused: DashMap<String, Instant>,
}

impl PauseGate {
    pub fn new(window: Duration) -> Self {
        Self { window, paused: DashMap::new() }
    }

    /// Start (or restart) the cool-down for a conversation.
    pub fn pause(&self, conversation_id: &str) {
        self.paused.insert(conversation_id.to_owned(), Instant::now());
    }

    /// Whether automated replies are currently suppressed for a conversation.
    pub fn is_paused(&self, conversation_id: &str) -> bool {
        let expired = match self.paused.get(conversation_id) {
            Some(entry) => entry.elapsed() >= self.window,
            None => return false,
        };
        // The read guard is dropped above; removing here cannot deadlock.
        if expired {
            self.paused.remove(conversation_id);
            return false;
        }
        true
    }

    /// Lift the cool-down early, if one is active.
    pub fn resume(&self, conversation_id: &str) {
        self.paused.remove(conversation_id);
    }

    /// Number of conversations with a recorded pause, expired or not.
    pub fn len(&self) -> usize {
        self.paused.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paused.is_empty()
    }
}

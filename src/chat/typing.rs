//! Typing presence: outbound throttle and the registry of remote typists

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Suppression window for outbound signals and lifetime of a remote entry
pub const TYPING_WINDOW: Duration = Duration::from_secs(3);

/// Rate-limits outbound `Typing` events to one per window.
#[derive(Debug, Clone)]
pub struct TypingThrottle {
    window: Duration,
    suppressed_until: Option<Instant>,
}

impl TypingThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            suppressed_until: None,
        }
    }

    /// Returns true when a keystroke at `now` should emit a signal, and
    /// starts a new suppression window if so.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if let Some(until) = self.suppressed_until {
            if now < until {
                return false;
            }
        }
        self.suppressed_until = Some(now + self.window);
        true
    }

    /// Cancel the current window (after a text message went out)
    pub fn reset(&mut self) {
        self.suppressed_until = None;
    }

    pub fn is_suppressed(&self, now: Instant) -> bool {
        self.suppressed_until.is_some_and(|until| now < until)
    }
}

impl Default for TypingThrottle {
    fn default() -> Self {
        Self::new(TYPING_WINDOW)
    }
}

/// Remote senders currently typing, each with its own expiry deadline
#[derive(Debug, Clone)]
pub struct TypingRegistry {
    ttl: Duration,
    deadlines: HashMap<String, Instant>,
}

impl TypingRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            deadlines: HashMap::new(),
        }
    }

    /// Mark `sender` as typing, replacing any earlier deadline
    pub fn mark(&mut self, sender: &str, now: Instant) {
        self.deadlines.insert(sender.to_string(), now + self.ttl);
    }

    /// Forget `sender` (their message arrived). Returns whether they were listed.
    pub fn clear(&mut self, sender: &str) -> bool {
        self.deadlines.remove(sender).is_some()
    }

    /// Drop entries whose deadline is at or before `now`; returns removed names
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let mut expired: Vec<String> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(name, _)| name.clone())
            .collect();
        expired.sort();
        for name in &expired {
            self.deadlines.remove(name);
        }
        expired
    }

    /// Earliest pending deadline, for scheduling the next `expire`
    pub fn next_expiry(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    pub fn is_typing(&self, sender: &str, now: Instant) -> bool {
        self.deadlines
            .get(sender)
            .is_some_and(|deadline| now < *deadline)
    }

    /// Names still typing at `now`, sorted
    pub fn typing(&self, now: Instant) -> Vec<String> {
        let mut names: Vec<String> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| now < **deadline)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

impl Default for TypingRegistry {
    fn default() -> Self {
        Self::new(TYPING_WINDOW)
    }
}

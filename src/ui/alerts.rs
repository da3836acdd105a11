//! Dismissible alerts raised by mutations and failed loads.
//!
//! Nothing recovers automatically: an error becomes an alert and stays until
//! dismissed or pushed out by newer alerts.

use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub id: u64,
    pub level: AlertLevel,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Queue {
    alerts: Vec<Alert>,
    next_id: u64,
}

/// Bounded, oldest-first alert queue shared between a screen and its workers.
#[derive(Debug)]
pub struct AlertCenter {
    capacity: usize,
    queue: Mutex<Queue>,
}

impl AlertCenter {
    /// `capacity` is clamped to at least one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queue: Mutex::new(Queue::default()),
        }
    }

    /// Push an alert, evicting the oldest at capacity. Returns its id.
    pub fn push(&self, level: AlertLevel, message: impl Into<String>) -> u64 {
        let mut queue = self.queue.lock();
        let id = queue.next_id;
        queue.next_id += 1;
        queue.alerts.push(Alert {
            id,
            level,
            message: message.into(),
            raised_at: Utc::now(),
        });
        let overflow = queue.alerts.len().saturating_sub(self.capacity);
        queue.alerts.drain(..overflow);
        id
    }

    pub fn push_success(&self, message: impl Into<String>) -> u64 {
        self.push(AlertLevel::Success, message)
    }

    pub fn push_error(&self, message: impl Into<String>) -> u64 {
        self.push(AlertLevel::Error, message)
    }

    /// Returns `false` if the alert was already gone.
    pub fn dismiss(&self, id: u64) -> bool {
        let mut queue = self.queue.lock();
        let before = queue.alerts.len();
        queue.alerts.retain(|alert| alert.id != id);
        queue.alerts.len() != before
    }

    pub fn clear(&self) {
        self.queue.lock().alerts.clear();
    }

    /// Oldest first.
    #[must_use]
    pub fn active(&self) -> Vec<Alert> {
        self.queue.lock().alerts.clone()
    }

    #[must_use]
    pub fn latest(&self) -> Option<Alert> {
        self.queue.lock().alerts.last().cloned()
    }

    /// Remove and return everything queued.
    pub fn drain(&self) -> Vec<Alert> {
        std::mem::take(&mut self.queue.lock().alerts)
    }
}

impl Default for AlertCenter {
    fn default() -> Self {
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let center = AlertCenter::new(3);
        let a = center.push_success("saved");
        let b = center.push_error("failed");
        assert!(b > a);
        assert_eq!(center.latest().unwrap().level, AlertLevel::Error);
    }

    #[test]
    fn oldest_evicted_at_capacity() {
        let center = AlertCenter::new(2);
        center.push(AlertLevel::Info, "one");
        center.push(AlertLevel::Info, "two");
        center.push(AlertLevel::Warning, "three");
        let messages: Vec<String> = center.active().into_iter().map(|a| a.message).collect();
        assert_eq!(messages, vec!["two", "three"]);
    }

    #[test]
    fn dismiss_by_id() {
        let center = AlertCenter::default();
        let id = center.push_error("Unable to reach the server");
        assert!(center.dismiss(id));
        assert!(!center.dismiss(id));
        assert!(center.active().is_empty());
    }

    #[test]
    fn zero_capacity_still_keeps_latest() {
        let center = AlertCenter::new(0);
        center.push_success("a");
        center.push_success("b");
        assert_eq!(center.drain().len(), 1);
        assert!(center.active().is_empty());
    }
}

//! One-shot deferred tasks keyed by generation tokens.
//!
//! Every scheduled task gets a fresh, never reused token. The owner keeps the token
//! of the task it still cares about and compares it when the task comes due; a
//! mismatch means the task is stale.

use serde::Serialize;
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TimerToken(u64);

impl TimerToken {
    pub fn generation(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct Scheduled<T> {
    token: TimerToken,
    due: Instant,
    task: T,
}

#[derive(Debug)]
pub struct TaskScheduler<T> {
    next_generation: u64,
    pending: Vec<Scheduled<T>>,
}

impl<T> TaskScheduler<T> {
    pub fn new() -> Self {
        Self {
            next_generation: 1,
            pending: Vec::new(),
        }
    }

    pub fn schedule(&mut self, due: Instant, task: T) -> TimerToken {
        let token = TimerToken(self.next_generation);
        self.next_generation += 1;
        self.pending.push(Scheduled { token, due, task });
        token
    }

    /// Returns false if the task already fired or was cancelled
    pub fn cancel(&mut self, token: TimerToken) -> bool {
        let before = self.pending.len();
        self.pending.retain(|s| s.token != token);
        self.pending.len() != before
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.pending.iter().map(|s| s.due).min()
    }

    /// Remove and return every task due at or before `now`, earliest first
    pub fn take_due(&mut self, now: Instant) -> Vec<(TimerToken, T)> {
        let mut due = Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].due <= now {
                due.push(self.pending.swap_remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by_key(|s| (s.due, s.token));
        due.into_iter().map(|s| (s.token, s.task)).collect()
    }
}

impl<T> Default for TaskScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_tokens_are_unique() {
        let mut scheduler = TaskScheduler::new();
        let now = Instant::now();
        let a = scheduler.schedule(now, "a");
        let b = scheduler.schedule(now, "b");
        assert_ne!(a, b);
        assert!(b.generation() > a.generation());
    }

    #[test]
    fn test_take_due_in_order() {
        let mut scheduler = TaskScheduler::new();
        let t0 = Instant::now();
        scheduler.schedule(t0 + Duration::from_millis(300), "late");
        scheduler.schedule(t0 + Duration::from_millis(100), "early");
        scheduler.schedule(t0 + Duration::from_secs(5), "future");

        assert!(scheduler.take_due(t0).is_empty());
        assert_eq!(scheduler.next_due(), Some(t0 + Duration::from_millis(100)));

        let fired: Vec<_> = scheduler
            .take_due(t0 + Duration::from_millis(500))
            .into_iter()
            .map(|(_, t)| t)
            .collect();
        assert_eq!(fired, vec!["early", "late"]);
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_cancel() {
        let mut scheduler = TaskScheduler::new();
        let t0 = Instant::now();
        let token = scheduler.schedule(t0, ());
        assert!(scheduler.cancel(token));
        assert!(!scheduler.cancel(token));
        assert!(scheduler.take_due(t0).is_empty());

        scheduler.schedule(t0, ());
        scheduler.clear();
        assert!(scheduler.is_empty());
    }
}

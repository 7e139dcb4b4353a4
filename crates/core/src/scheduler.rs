// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer and scheduling management.
//!
//! Timers are keyed by id so a re-armed timer replaces the previous one and a
//! pending timer can be cancelled by name. The dispatcher loop polls
//! [`Scheduler::fired`] on its tick; nothing fires spontaneously, which keeps
//! timer-driven behavior fully controllable from tests via a fake clock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Timer<M> {
    fires_at: Instant,
    message: M,
}

/// Manages timers for a dispatcher loop.
#[derive(Debug, Default)]
pub struct Scheduler<M> {
    timers: HashMap<String, Timer<M>>,
}

impl<M> Scheduler<M> {
    /// Create a new scheduler
    pub fn new() -> Self {
        Self { timers: HashMap::new() }
    }

    /// Set a timer. Replaces any pending timer with the same id.
    pub fn set_timer(&mut self, id: impl Into<String>, message: M, duration: Duration, now: Instant) {
        self.timers.insert(id.into(), Timer { fires_at: now + duration, message });
    }

    /// Cancel a timer
    pub fn cancel_timer(&mut self, id: &str) {
        self.timers.remove(id);
    }

    /// Cancel all timers matching a prefix
    pub fn cancel_timers_with_prefix(&mut self, prefix: &str) {
        self.timers.retain(|id, _| !id.starts_with(prefix));
    }

    /// Remove every pending timer.
    pub fn clear(&mut self) {
        self.timers.clear();
    }

    /// Whether a timer with the given id is pending.
    pub fn is_scheduled(&self, id: &str) -> bool {
        self.timers.contains_key(id)
    }

    /// Drain all timers that have fired, in deadline order.
    pub fn fired(&mut self, now: Instant) -> Vec<M> {
        let mut due: Vec<(String, Instant)> = self
            .timers
            .iter()
            .filter(|(_, t)| t.fires_at <= now)
            .map(|(id, t)| (id.clone(), t.fires_at))
            .collect();
        due.sort_by_key(|(_, fires_at)| *fires_at);

        due.into_iter()
            .filter_map(|(id, _)| self.timers.remove(&id).map(|t| t.message))
            .collect()
    }

    /// Get the next timer fire time
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|t| t.fires_at).min()
    }

    /// Check if there are any pending timers
    pub fn has_timers(&self) -> bool {
        !self.timers.is_empty()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

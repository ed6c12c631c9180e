//! Shared clock and timer queue.
//!
//! Every component that needs "now" reads it from a [`Clock`] handed to it at
//! construction. During a backtest the clock is overridden to the timestamp of
//! the event being replayed, which makes runs deterministic; timers due at or
//! before the new time fire synchronously on the calling thread.

use crate::domain::error::HorseError;
use chrono::DateTime;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub type TimerCallback = Box<dyn FnOnce(&Clock) + Send>;

/// When a timer should fire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum When {
    /// Absolute epoch timestamp.
    At(f64),
    /// Seconds from now.
    In(f64),
}

#[derive(Debug, Clone, Copy)]
struct TimerKey {
    ts: f64,
    priority: i32,
    seq: u64,
}

impl PartialEq for TimerKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimerKey {}

impl PartialOrd for TimerKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ts
            .total_cmp(&other.ts)
            .then(self.priority.cmp(&other.priority))
            .then(self.seq.cmp(&other.seq))
    }
}

struct Timer {
    label: String,
    callback: TimerCallback,
}

#[derive(Default)]
struct TimerQueue {
    entries: BTreeMap<TimerKey, Timer>,
    next_seq: u64,
}

#[derive(Default)]
pub struct Clock {
    override_ts: Mutex<Option<f64>>,
    timers: Mutex<TimerQueue>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock frozen at `ts` until overridden again.
    pub fn fixed(ts: f64) -> Self {
        let clock = Self::new();
        clock.set_override(Some(ts));
        clock
    }

    pub fn time(&self) -> f64 {
        match *self.lock_override() {
            Some(ts) => ts,
            None => system_time(),
        }
    }

    pub fn is_overridden(&self) -> bool {
        self.lock_override().is_some()
    }

    /// Pin the answer to [`Clock::time`] (or release it with `None`) and fire
    /// whatever timers have become due.
    pub fn override_time(&self, ts: Option<f64>) {
        self.set_override(ts);
        self.run_timers();
    }

    pub fn printable(&self) -> String {
        printable_ts(self.time())
    }

    pub fn set_timer(
        &self,
        label: &str,
        when: When,
        priority: i32,
        callback: TimerCallback,
    ) -> Result<(), HorseError> {
        let now = self.time();
        let ts = match when {
            When::In(delay) => now + delay,
            When::At(ts) => ts,
        };
        // must lie strictly ahead, or a re-arming callback never leaves run_timers
        if ts.is_nan() || ts <= now {
            return Err(HorseError::InvalidArgument {
                reason: format!("timer '{label}' would not fire in the future"),
            });
        }

        let mut queue = self.lock_timers();
        if queue.entries.values().any(|t| t.label == label) {
            return Err(HorseError::InvalidArgument {
                reason: format!("timer '{label}' is already scheduled"),
            });
        }
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.entries.insert(
            TimerKey { ts, priority, seq },
            Timer {
                label: label.to_string(),
                callback,
            },
        );
        Ok(())
    }

    pub fn pending_timers(&self) -> usize {
        self.lock_timers().entries.len()
    }

    /// Run every overdue timer in (timestamp, priority) order. The queue lock
    /// is released before each callback so callbacks may schedule new timers.
    pub fn run_timers(&self) {
        loop {
            let now = self.time();
            let due = {
                let mut queue = self.lock_timers();
                match queue.entries.first_key_value() {
                    Some((key, _)) if key.ts <= now => queue.entries.pop_first(),
                    _ => None,
                }
            };
            match due {
                Some((_, timer)) => (timer.callback)(self),
                None => break,
            }
        }
    }

    /// Sleep for `secs`, firing timers at the instants they fall due. When the
    /// clock is overridden time advances virtually and no real sleeping occurs.
    pub fn sleep(&self, secs: f64) {
        let mut remaining = secs;
        while remaining > 0.0 {
            let now = self.time();
            let wait = match self.next_due() {
                Some(due) if due < now + remaining => (due - now).max(0.0),
                _ => remaining,
            };
            self.advance(wait);
            self.run_timers();
            remaining -= wait;
        }
    }

    /// Drop all pending timers.
    pub fn reset_timers(&self) {
        self.lock_timers().entries.clear();
    }

    fn next_due(&self) -> Option<f64> {
        self.lock_timers()
            .entries
            .first_key_value()
            .map(|(key, _)| key.ts)
    }

    fn advance(&self, secs: f64) {
        let mut guard = self.lock_override();
        match guard.as_mut() {
            Some(ts) => *ts += secs,
            None => {
                drop(guard);
                std::thread::sleep(Duration::from_secs_f64(secs));
            }
        }
    }

    fn set_override(&self, ts: Option<f64>) {
        *self.lock_override() = ts;
    }

    fn lock_override(&self) -> std::sync::MutexGuard<'_, Option<f64>> {
        self.override_ts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_timers(&self) -> std::sync::MutexGuard<'_, TimerQueue> {
        self.timers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock")
            .field("override_ts", &*self.lock_override())
            .field("pending_timers", &self.pending_timers())
            .finish()
    }
}

fn system_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// `2014-10-25t22:20:09` style rendering of an epoch timestamp, `-` if it
/// cannot be represented.
pub fn printable_ts(ts: f64) -> String {
    let secs = ts.floor() as i64;
    match DateTime::from_timestamp(secs, 0) {
        Some(dt) => dt.format("%Y-%m-%dt%H:%M:%S").to_string(),
        None => "-".to_string(),
    }
}

//! Start-timestamp policy for published activities
//!
//! The host renders an "elapsed" counter from the start timestamp attached to
//! each activity. Resolution order, first match wins:
//!
//! 1. `manualTimestamp`: absolute override
//! 2. `manualDurationSeconds`: `now - duration`, re-evaluated on every call
//! 3. `now` for a fresh reload that asks for a reset, otherwise the
//!    session's last refresh anchor

use crate::config::ConfigurationSnapshot;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of wall-clock time in epoch seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Settable clock for tests. Clones share the same instant.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now)),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Session timing owned by the lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    process_start_time: i64,
    last_refresh_time: i64,
}

impl SessionTiming {
    /// Timing for a process that started at `process_start_time`; the anchor
    /// starts there.
    pub fn new(process_start_time: i64) -> Self {
        Self {
            process_start_time,
            last_refresh_time: process_start_time,
        }
    }

    pub fn process_start_time(&self) -> i64 {
        self.process_start_time
    }

    pub fn last_refresh_time(&self) -> i64 {
        self.last_refresh_time
    }

    /// Move the anchor. Only the state machine calls this, on a reload that
    /// requests a reset.
    pub(crate) fn mark_refresh(&mut self, now: i64) {
        self.last_refresh_time = now;
    }
}

/// Why an activity is being published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// A configuration reload just happened.
    Fresh,
    /// Startup or resume: keep the existing anchor.
    Carry,
}

/// Resolve the start timestamp for an activity. Pure and total.
pub fn resolve_start_timestamp(
    snapshot: &ConfigurationSnapshot,
    timing: &SessionTiming,
    refresh: Refresh,
    now: i64,
) -> i64 {
    if let Some(timestamp) = snapshot.manual_timestamp {
        return timestamp;
    }

    if let Some(duration) = snapshot.manual_duration_seconds {
        return now.saturating_sub(duration);
    }

    match refresh {
        Refresh::Fresh if snapshot.refresh_time_on_reload => now,
        _ => timing.last_refresh_time(),
    }
}

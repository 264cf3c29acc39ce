//! Authoritative timer state and its transitions.
//!
//! The timer never reads the clock itself: every operation takes the current
//! [`Instant`] so the arithmetic stays deterministic under test.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::events::ServerMessage;

/// Timer status as seen by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Stopped,
    Running,
    Paused,
}

impl TimerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerStatus::Stopped => "stopped",
            TimerStatus::Running => "running",
            TimerStatus::Paused => "paused",
        }
    }
}

/// Stopwatch state.
///
/// `start_epoch` is the instant the current running interval resumed and
/// `paused_elapsed` the time banked before it, so while running the elapsed
/// value is `paused_elapsed + (now - start_epoch)`. This is the same zero-point
/// as `now - paused_elapsed` without ever subtracting from an `Instant`.
#[derive(Debug, Clone)]
pub struct TimerState {
    status: TimerStatus,
    start_epoch: Instant,
    paused_elapsed: Duration,
}

impl TimerState {
    pub fn new(now: Instant) -> Self {
        Self {
            status: TimerStatus::Stopped,
            start_epoch: now,
            paused_elapsed: Duration::ZERO,
        }
    }

    pub fn status(&self) -> TimerStatus {
        self.status
    }

    /// Start or resume counting. Returns `false` if already running.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.status == TimerStatus::Running {
            return false;
        }
        self.start_epoch = now;
        self.status = TimerStatus::Running;
        true
    }

    /// Freeze the elapsed value. Only a running timer is affected.
    pub fn pause(&mut self, now: Instant) -> bool {
        if self.status != TimerStatus::Running {
            return false;
        }
        self.paused_elapsed = self.elapsed(now);
        self.status = TimerStatus::Paused;
        true
    }

    /// Back to zero and stopped. A stopped timer is left untouched.
    pub fn reset(&mut self) -> bool {
        if self.status == TimerStatus::Stopped {
            return false;
        }
        self.paused_elapsed = Duration::ZERO;
        self.status = TimerStatus::Stopped;
        true
    }

    /// Pause when running, otherwise start (resuming a paused timer).
    pub fn toggle_pause(&mut self, now: Instant) -> bool {
        if self.status == TimerStatus::Running {
            self.pause(now)
        } else {
            self.start(now)
        }
    }

    /// Administrative override of the elapsed value; status is unchanged.
    pub fn set_elapsed(&mut self, elapsed: Duration, now: Instant) {
        self.paused_elapsed = elapsed;
        self.start_epoch = now;
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.status {
            TimerStatus::Stopped => Duration::ZERO,
            TimerStatus::Running => {
                self.paused_elapsed + now.saturating_duration_since(self.start_epoch)
            }
            TimerStatus::Paused => self.paused_elapsed,
        }
    }

    /// Canonical status push for the current state
    pub fn message(&self, now: Instant) -> ServerMessage {
        match self.status {
            TimerStatus::Stopped => ServerMessage::Stop,
            status => ServerMessage::Status {
                status,
                seconds: self.elapsed(now).as_secs_f64(),
            },
        }
    }
}

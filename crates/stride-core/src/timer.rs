//! Per-habit timer state machine.
//!
//! Wall-clock based and threadless: every transition takes the caller's
//! `now` and elapsed time is derived from the persisted `started_at`, never
//! from a ticking task. A machine serialized mid-run and deserialized in a
//! fresh process (or after a crash) therefore resumes with the correct
//! elapsed balance for free.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::habit::HabitId;

/// Runtime phase of a habit's timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum TimerPhase {
    /// No session in progress and no retained balance.
    Idle,
    /// Clock running since `started_at`, on top of `base_elapsed_secs`
    /// accumulated before this session.
    Running {
        /// Whether this session is allowed to run past the daily goal.
        overrun: bool,
        started_at: DateTime<Utc>,
        base_elapsed_secs: u64,
    },
    /// Session stopped with its balance retained in memory, not committed.
    Paused { elapsed_secs: u64 },
}

/// One habit's timer. The coordinator keeps exactly one per habit id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitTimer {
    habit_id: HabitId,
    phase: TimerPhase,
}

impl HabitTimer {
    pub fn new(habit_id: HabitId) -> Self {
        Self {
            habit_id,
            phase: TimerPhase::Idle,
        }
    }

    pub fn habit_id(&self) -> HabitId {
        self.habit_id
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, TimerPhase::Running { .. })
    }

    /// Enters `Running` from `Idle` or `Paused`. A `start` while already
    /// running is a no-op and returns `None`, so duplicate gesture delivery
    /// cannot restart the clock or double-register a session.
    ///
    /// `initial_elapsed_secs` is the caller's authoritative balance for the
    /// new session, normally the habit's committed minutes for the day.
    pub fn start(
        &mut self,
        allow_overrun: bool,
        initial_elapsed_secs: u64,
        now: DateTime<Utc>,
    ) -> Option<TimerPhase> {
        match self.phase {
            TimerPhase::Running { .. } => None,
            TimerPhase::Idle | TimerPhase::Paused { .. } => {
                self.phase = TimerPhase::Running {
                    overrun: allow_overrun,
                    started_at: now,
                    base_elapsed_secs: initial_elapsed_secs,
                };
                Some(self.phase)
            }
        }
    }

    /// Leaves `Running`, yielding the total elapsed seconds for the session.
    ///
    /// With `save_progress` the balance is handed to the caller to commit and
    /// the machine returns to `Idle`; without it the balance is retained as
    /// `Paused`. Pausing while not running is a no-op. A wall clock that
    /// moved backward contributes zero, never a negative delta.
    pub fn pause(&mut self, save_progress: bool, now: DateTime<Utc>) -> Option<u64> {
        match self.phase {
            TimerPhase::Running {
                started_at,
                base_elapsed_secs,
                ..
            } => {
                let elapsed = base_elapsed_secs.saturating_add(elapsed_since(started_at, now));
                self.phase = if save_progress {
                    TimerPhase::Idle
                } else {
                    TimerPhase::Paused {
                        elapsed_secs: elapsed,
                    }
                };
                Some(elapsed)
            }
            TimerPhase::Idle | TimerPhase::Paused { .. } => None,
        }
    }

    /// Elapsed seconds as of `now`, without transitioning.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        match self.phase {
            TimerPhase::Idle => 0,
            TimerPhase::Paused { elapsed_secs } => elapsed_secs,
            TimerPhase::Running {
                started_at,
                base_elapsed_secs,
                ..
            } => base_elapsed_secs.saturating_add(elapsed_since(started_at, now)),
        }
    }
}

/// Wall-clock delta in whole seconds, clamped at zero.
fn elapsed_since(started_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    now.signed_duration_since(started_at).num_seconds().max(0) as u64
}

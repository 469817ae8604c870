use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::habit::HabitId;

/// Every applied mutation produces an Event.
/// The coordinator replies with it and broadcasts it to in-process
/// subscribers; the CLI prints it as JSON for scripting surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HabitEvent {
    TimerStarted {
        habit_id: HabitId,
        /// Whether this session may run past the daily goal.
        overrun: bool,
        base_elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        habit_id: HabitId,
        session_secs: u64,
        minutes_today: u32,
        goal_met: bool,
        at: DateTime<Utc>,
    },
    /// A pause pushed today's minutes to (or past) the goal for the first
    /// time today.
    GoalCompleted {
        habit_id: HabitId,
        minutes_today: u32,
        current_streak: u32,
        longest_streak: u32,
        at: DateTime<Utc>,
    },
    /// A count habit logged a completion.
    HabitIncremented {
        habit_id: HabitId,
        total_completions: u32,
        current_streak: u32,
        longest_streak: u32,
        at: DateTime<Utc>,
    },
}

impl HabitEvent {
    pub fn habit_id(&self) -> HabitId {
        match self {
            HabitEvent::TimerStarted { habit_id, .. }
            | HabitEvent::TimerPaused { habit_id, .. }
            | HabitEvent::GoalCompleted { habit_id, .. }
            | HabitEvent::HabitIncremented { habit_id, .. } => *habit_id,
        }
    }
}

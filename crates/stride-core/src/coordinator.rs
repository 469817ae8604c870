//! Per-process timer coordination.
//!
//! Every external start/pause/increment intent funnels through one actor
//! task that owns the store connection and the per-habit timer registry.
//! Commands are applied strictly in arrival order and each caller awaits the
//! fully applied result over a oneshot, so a pause can never observe a
//! half-initialized start and per-habit ordering holds by construction.
//!
//! The registry is persisted as JSON under a kv key in the store. A
//! short-lived process that starts a timer writes `started_at` down and may
//! then exit; the next process, loading the registry at spawn, recovers the
//! running session and derives its elapsed time from the persisted clock.
//! Crash recovery is the same path: nothing ticks in the background, so a
//! dead process costs nothing but the file it already wrote.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::events::HabitEvent;
use crate::export::SnapshotExporter;
use crate::habit::{Habit, HabitId, HabitKind};
use crate::storage::HabitStore;
use crate::streak::{self, StreakComputation};
use crate::timer::{HabitTimer, TimerPhase};

const REGISTRY_KEY: &str = "timer_registry";
const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 64;

/// Narrow capability surface external intent adapters depend on. Widgets,
/// shortcuts and other gesture sources get these three verbs and nothing
/// else.
#[allow(async_fn_in_trait)]
pub trait HabitIntents {
    async fn start_timer(&self, raw_id: &str) -> Option<HabitEvent>;
    async fn pause_timer(&self, raw_id: &str) -> Option<HabitEvent>;
    async fn increment(&self, raw_id: &str) -> Option<HabitEvent>;
}

/// Runtime view of one habit's timer for status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct TimerStatus {
    pub habit_id: HabitId,
    pub name: String,
    pub phase: TimerPhase,
    pub elapsed_secs: u64,
    pub timer_minutes_today: u32,
    pub goal_value: u32,
    pub timer_goal_met_today: bool,
}

enum Command {
    Toggle {
        raw_id: String,
        should_run: bool,
        reply: oneshot::Sender<Option<HabitEvent>>,
    },
    Increment {
        raw_id: String,
        reply: oneshot::Sender<Option<HabitEvent>>,
    },
    Status {
        raw_id: String,
        reply: oneshot::Sender<Option<TimerStatus>>,
    },
}

/// Cloneable handle to the per-process coordinator actor.
///
/// Spawn one per process and thread the handle through every entry point;
/// there is deliberately no process-wide instance to reach for.
#[derive(Clone)]
pub struct TimerCoordinator {
    tx: mpsc::Sender<Command>,
    events: broadcast::Sender<HabitEvent>,
}

impl TimerCoordinator {
    /// Spawns the coordination actor onto the current tokio runtime,
    /// recovering the timer registry persisted by earlier processes.
    pub fn spawn(store: HabitStore, exporter: Option<SnapshotExporter>) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let timers = load_registry(&store);
        info!(recovered = timers.len(), "timer coordinator started");
        let worker = Worker {
            store,
            timers,
            exporter,
            events: events.clone(),
        };
        tokio::spawn(worker.run(rx));
        Self { tx, events }
    }

    /// Sets the habit's timer running or pauses it, committing progress.
    ///
    /// Malformed ids, unknown habits and non-timer habits are silent no-ops
    /// answering `None`, as is a start while already running or a pause
    /// while idle. When the future resolves the transition and any store
    /// write it implies are fully applied.
    pub async fn toggle(&self, raw_id: &str, should_run: bool) -> Option<HabitEvent> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Toggle {
                raw_id: raw_id.to_string(),
                should_run,
                reply,
            })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    /// Logs one completion for a count habit and recomputes its streak.
    pub async fn increment(&self, raw_id: &str) -> Option<HabitEvent> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Increment {
                raw_id: raw_id.to_string(),
                reply,
            })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    /// Current timer state for a timer habit, without transitioning.
    pub async fn status(&self, raw_id: &str) -> Option<TimerStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Status {
                raw_id: raw_id.to_string(),
                reply,
            })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    /// Subscribe to applied-mutation events.
    pub fn subscribe(&self) -> broadcast::Receiver<HabitEvent> {
        self.events.subscribe()
    }
}

impl HabitIntents for TimerCoordinator {
    async fn start_timer(&self, raw_id: &str) -> Option<HabitEvent> {
        self.toggle(raw_id, true).await
    }

    async fn pause_timer(&self, raw_id: &str) -> Option<HabitEvent> {
        self.toggle(raw_id, false).await
    }

    async fn increment(&self, raw_id: &str) -> Option<HabitEvent> {
        TimerCoordinator::increment(self, raw_id).await
    }
}

struct Worker {
    store: HabitStore,
    timers: HashMap<HabitId, HabitTimer>,
    exporter: Option<SnapshotExporter>,
    events: broadcast::Sender<HabitEvent>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Toggle {
                    raw_id,
                    should_run,
                    reply,
                } => {
                    let _ = reply.send(self.handle_toggle(&raw_id, should_run));
                }
                Command::Increment { raw_id, reply } => {
                    let _ = reply.send(self.handle_increment(&raw_id));
                }
                Command::Status { raw_id, reply } => {
                    let _ = reply.send(self.handle_status(&raw_id));
                }
            }
        }
        debug!("timer coordinator stopped");
    }

    fn handle_toggle(&mut self, raw_id: &str, should_run: bool) -> Option<HabitEvent> {
        let id = parse_id(raw_id)?;
        // Always act on a fresh row; the gesture may be seconds old and
        // another process may have written in between.
        let habit = self.fetch_habit(&id, HabitKind::Timer)?;
        let now = Utc::now();
        let event = if should_run {
            self.apply_start(&habit, now)
        } else {
            self.apply_pause(habit, now)
        };
        if let Some(event) = &event {
            self.notify(event);
        }
        event
    }

    fn handle_increment(&mut self, raw_id: &str) -> Option<HabitEvent> {
        let id = parse_id(raw_id)?;
        let mut habit = self.fetch_habit(&id, HabitKind::Count)?;
        let now = Utc::now();
        let today = habit.timer_date;
        match self.commit_completion(&mut habit, today) {
            Ok(streaks) => {
                let event = HabitEvent::HabitIncremented {
                    habit_id: habit.id,
                    total_completions: habit.total_completions,
                    current_streak: streaks.current_streak,
                    longest_streak: streaks.longest_streak,
                    at: now,
                };
                self.notify(&event);
                Some(event)
            }
            Err(e) => {
                warn!(habit_id = %habit.id, error = %e, "store write failed, increment abandoned");
                None
            }
        }
    }

    fn handle_status(&self, raw_id: &str) -> Option<TimerStatus> {
        let id = parse_id(raw_id)?;
        let habit = self.fetch_habit(&id, HabitKind::Timer)?;
        let now = Utc::now();
        // Peek only; a status query must not register a machine.
        let (phase, elapsed_secs) = match self.timers.get(&id) {
            Some(timer) => (timer.phase(), timer.elapsed_secs(now)),
            None => (TimerPhase::Idle, 0),
        };
        Some(TimerStatus {
            habit_id: habit.id,
            name: habit.name,
            phase,
            elapsed_secs,
            timer_minutes_today: habit.timer_minutes_today,
            goal_value: habit.goal_value,
            timer_goal_met_today: habit.timer_goal_met_today,
        })
    }

    fn apply_start(&mut self, habit: &Habit, now: DateTime<Utc>) -> Option<HabitEvent> {
        let allow_overrun = habit.allow_overrun();
        let base_elapsed_secs = u64::from(habit.timer_minutes_today) * 60;
        let timer = self
            .timers
            .entry(habit.id)
            .or_insert_with(|| HabitTimer::new(habit.id));
        if timer.start(allow_overrun, base_elapsed_secs, now).is_none() {
            debug!(habit_id = %habit.id, "start while running ignored");
            return None;
        }
        self.persist_registry();
        Some(HabitEvent::TimerStarted {
            habit_id: habit.id,
            overrun: allow_overrun,
            base_elapsed_secs,
            at: now,
        })
    }

    fn apply_pause(&mut self, mut habit: Habit, now: DateTime<Utc>) -> Option<HabitEvent> {
        let timer = self
            .timers
            .entry(habit.id)
            .or_insert_with(|| HabitTimer::new(habit.id));
        if let TimerPhase::Running { started_at, .. } = timer.phase() {
            if now < started_at {
                debug!(habit_id = %habit.id, "wall clock moved backward during session, clamping");
            }
        }
        let before = timer.clone();
        let session_secs = match timer.pause(true, now) {
            Some(secs) => secs,
            None => {
                debug!(habit_id = %habit.id, "pause while not running ignored");
                return None;
            }
        };

        let session_minutes = u32::try_from(session_secs / 60).unwrap_or(u32::MAX);
        // Committed minutes never go down; a stale or clamped session can
        // only fail to add.
        habit.timer_minutes_today = habit.timer_minutes_today.max(session_minutes);
        let newly_met =
            !habit.timer_goal_met_today && habit.timer_minutes_today >= habit.goal_value;
        if habit.timer_minutes_today >= habit.goal_value {
            habit.timer_goal_met_today = true;
        }

        let today = habit.timer_date;
        let outcome: Result<Option<StreakComputation>, StoreError> = if newly_met {
            self.commit_completion(&mut habit, today).map(Some)
        } else {
            self.store.save(&habit).map(|()| None)
        };

        match outcome {
            Ok(streaks) => {
                self.persist_registry();
                let event = match streaks {
                    Some(streaks) => HabitEvent::GoalCompleted {
                        habit_id: habit.id,
                        minutes_today: habit.timer_minutes_today,
                        current_streak: streaks.current_streak,
                        longest_streak: streaks.longest_streak,
                        at: now,
                    },
                    None => HabitEvent::TimerPaused {
                        habit_id: habit.id,
                        session_secs,
                        minutes_today: habit.timer_minutes_today,
                        goal_met: habit.timer_goal_met_today,
                        at: now,
                    },
                };
                Some(event)
            }
            Err(e) => {
                // Roll the machine back so the session is not lost; the user
                // can pause again once the store recovers.
                self.timers.insert(habit.id, before);
                warn!(habit_id = %habit.id, error = %e, "store write failed, pause abandoned");
                None
            }
        }
    }

    /// Logs a completion and folds the recomputed streaks into the habit,
    /// persisting both in one transaction.
    fn commit_completion(
        &mut self,
        habit: &mut Habit,
        today: NaiveDate,
    ) -> Result<StreakComputation, StoreError> {
        let mut dates = self.store.completion_dates(&habit.id)?;
        dates.insert(today);
        let streaks = streak::recompute(&habit.schedule, &dates, today, habit.longest_streak);
        habit.current_streak = streaks.current_streak;
        habit.longest_streak = streaks.longest_streak;
        habit.total_completions = habit.total_completions.saturating_add(1);
        habit.last_completed_date = Some(today);
        self.store.save_with_completion(habit, today)?;
        Ok(streaks)
    }

    fn fetch_habit(&self, id: &HabitId, kind: HabitKind) -> Option<Habit> {
        match self.store.fetch_by_id(id) {
            Ok(Some(habit)) if habit.kind == kind => Some(habit),
            Ok(Some(habit)) => {
                debug!(habit_id = %id, kind = habit.kind.as_str(), "wrong habit kind, ignored");
                None
            }
            Ok(None) => {
                debug!(habit_id = %id, "unknown habit, ignored");
                None
            }
            Err(e) => {
                warn!(habit_id = %id, error = %e, "habit fetch failed, request abandoned");
                None
            }
        }
    }

    fn notify(&self, event: &HabitEvent) {
        // No subscribers is fine; delivery is best effort.
        let _ = self.events.send(event.clone());
        if let Some(exporter) = &self.exporter {
            exporter.schedule_sync();
        }
    }

    fn persist_registry(&self) {
        match serde_json::to_string(&self.timers) {
            Ok(json) => {
                if let Err(e) = self.store.kv_set(REGISTRY_KEY, &json) {
                    warn!(error = %e, "timer registry not persisted");
                }
            }
            Err(e) => warn!(error = %e, "timer registry not serializable"),
        }
    }
}

fn parse_id(raw: &str) -> Option<HabitId> {
    match HabitId::parse(raw) {
        Ok(id) => Some(id),
        Err(e) => {
            debug!(raw_id = raw, error = %e, "malformed habit id, ignored");
            None
        }
    }
}

fn load_registry(store: &HabitStore) -> HashMap<HabitId, HabitTimer> {
    match store.kv_get(REGISTRY_KEY) {
        Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!(error = %e, "timer registry unreadable, starting empty");
            HashMap::new()
        }),
        Ok(None) => HashMap::new(),
        Err(e) => {
            warn!(error = %e, "timer registry unavailable, starting empty");
            HashMap::new()
        }
    }
}

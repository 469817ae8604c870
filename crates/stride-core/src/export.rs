//! Cross-process state export with debounce support.
//!
//! Maintains a JSON snapshot of per-habit state for surfaces that render
//! without opening the store (status bars, widgets, scripting). Refresh
//! requests are debounced so a burst of mutations collapses into one file
//! write, and the file is replaced via temp-file-plus-rename so a reader
//! always sees the last fully written snapshot, never a partial one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{CoreError, StoreError};
use crate::habit::{Habit, HabitId, HabitKind};
use crate::storage::{ExportConfig, HabitStore};

pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// Default snapshot location inside the data directory.
pub fn default_snapshot_path() -> std::io::Result<PathBuf> {
    Ok(crate::storage::data_dir()?.join(SNAPSHOT_FILE))
}

/// Per-habit entry in the exported snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitSnapshot {
    pub id: HabitId,
    pub name: String,
    pub kind: HabitKind,
    pub goal_value: u32,
    pub timer_minutes_today: u32,
    pub timer_goal_met_today: bool,
    pub current_streak: u32,
}

impl From<&Habit> for HabitSnapshot {
    fn from(habit: &Habit) -> Self {
        Self {
            id: habit.id,
            name: habit.name.clone(),
            kind: habit.kind,
            goal_value: habit.goal_value,
            timer_minutes_today: habit.timer_minutes_today,
            timer_goal_met_today: habit.timer_goal_met_today,
            current_streak: habit.current_streak,
        }
    }
}

/// The exported file: every habit plus a generation stamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub habits: Vec<HabitSnapshot>,
}

enum ExportMsg {
    /// Debounced refresh request.
    Poke,
    /// Immediate write; the sender is acked once the file is replaced.
    WriteNow(oneshot::Sender<()>),
}

/// Cloneable handle to the export worker. One worker per process; it owns
/// its own store connection like any other surface.
#[derive(Clone)]
pub struct SnapshotExporter {
    tx: mpsc::Sender<ExportMsg>,
    path: PathBuf,
    writes: Arc<AtomicU64>,
}

impl SnapshotExporter {
    /// Spawns the export worker onto the current tokio runtime.
    pub fn spawn(store: HabitStore, path: PathBuf, config: &ExportConfig) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let writes = Arc::new(AtomicU64::new(0));
        let worker = ExportWorker {
            store,
            path: path.clone(),
            debounce: Duration::from_millis(config.debounce_ms),
            pretty: config.pretty,
            writes: Arc::clone(&writes),
        };
        tokio::spawn(worker.run(rx));
        Self { tx, path, writes }
    }

    /// Writes an initial snapshot immediately, so a fresh surface has a file
    /// to read before any mutation happens.
    pub async fn bootstrap(&self) {
        self.write_now().await;
    }

    /// Requests a debounced snapshot refresh. Fire-and-forget; dropping the
    /// request is acceptable because a later write carries the same state.
    pub fn schedule_sync(&self) {
        if self.tx.try_send(ExportMsg::Poke).is_err() {
            debug!("export queue full or closed, refresh request dropped");
        }
    }

    /// Forces a write and waits for it. Short-lived processes call this
    /// before exiting so a pending debounce window cannot swallow their
    /// final state.
    pub async fn flush(&self) {
        self.write_now().await;
    }

    async fn write_now(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(ExportMsg::WriteNow(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.path
    }

    /// Number of completed file writes. Exposed for tests and diagnostics.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

struct ExportWorker {
    store: HabitStore,
    path: PathBuf,
    debounce: Duration,
    pretty: bool,
    writes: Arc<AtomicU64>,
}

impl ExportWorker {
    async fn run(self, mut rx: mpsc::Receiver<ExportMsg>) {
        while let Some(msg) = rx.recv().await {
            let mut acks = Vec::new();
            match msg {
                ExportMsg::WriteNow(ack) => acks.push(ack),
                ExportMsg::Poke => {
                    tokio::time::sleep(self.debounce).await;
                    // Everything that queued up during the window rides on
                    // this one write.
                    while let Ok(extra) = rx.try_recv() {
                        if let ExportMsg::WriteNow(ack) = extra {
                            acks.push(ack);
                        }
                    }
                }
            }
            self.write_snapshot();
            for ack in acks {
                let _ = ack.send(());
            }
        }
    }

    fn write_snapshot(&self) {
        let snapshot = match self.build() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "snapshot build failed, keeping previous file");
                return;
            }
        };
        match self.persist(&snapshot) {
            Ok(()) => {
                let total = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(writes = total, habits = snapshot.habits.len(), "snapshot written");
            }
            Err(e) => warn!(error = %e, "snapshot write failed, keeping previous file"),
        }
    }

    fn build(&self) -> Result<Snapshot, StoreError> {
        let habits = self.store.list_habits()?;
        Ok(Snapshot {
            generated_at: Utc::now(),
            habits: habits.iter().map(HabitSnapshot::from).collect(),
        })
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<(), CoreError> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(snapshot)?
        } else {
            serde_json::to_vec(snapshot)?
        };
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::habit::SchedulePolicy;
    use chrono::Local;
    use tempfile::TempDir;

    fn test_config(debounce_ms: u64) -> ExportConfig {
        ExportConfig {
            debounce_ms,
            pretty: true,
        }
    }

    fn seeded_store(dir: &TempDir) -> (HabitStore, Habit) {
        let db_path = dir.path().join("stride.db");
        let store = HabitStore::open(&db_path).unwrap();
        let mut habit = Habit::new(
            "Reading",
            HabitKind::Timer,
            15,
            SchedulePolicy::Daily,
            Local::now().date_naive(),
        );
        habit.timer_minutes_today = 7;
        habit.current_streak = 3;
        store.insert_habit(&habit).unwrap();
        // A second connection for the worker, as in a real process.
        let worker_store = HabitStore::open(&db_path).unwrap();
        (worker_store, habit)
    }

    #[tokio::test]
    async fn bootstrap_writes_snapshot_immediately() {
        let dir = TempDir::new().unwrap();
        let (store, habit) = seeded_store(&dir);
        let path = dir.path().join(SNAPSHOT_FILE);

        let exporter = SnapshotExporter::spawn(store, path.clone(), &test_config(10_000));
        exporter.bootstrap().await;

        let snapshot: Snapshot =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(snapshot.habits.len(), 1);
        let entry = &snapshot.habits[0];
        assert_eq!(entry.id, habit.id);
        assert_eq!(entry.timer_minutes_today, 7);
        assert_eq!(entry.current_streak, 3);
        assert_eq!(exporter.write_count(), 1);
    }

    #[tokio::test]
    async fn burst_of_refreshes_collapses_into_one_write() {
        let dir = TempDir::new().unwrap();
        let (store, _) = seeded_store(&dir);
        let path = dir.path().join(SNAPSHOT_FILE);

        let exporter = SnapshotExporter::spawn(store, path.clone(), &test_config(50));
        for _ in 0..5 {
            exporter.schedule_sync();
        }
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(exporter.write_count(), 1);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn flush_rides_on_a_pending_window() {
        let dir = TempDir::new().unwrap();
        let (store, _) = seeded_store(&dir);
        let path = dir.path().join(SNAPSHOT_FILE);

        let exporter = SnapshotExporter::spawn(store, path.clone(), &test_config(50));
        exporter.schedule_sync();
        exporter.flush().await;

        assert_eq!(exporter.write_count(), 1);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn rewrite_replaces_file_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("stride.db");
        let (store, _) = seeded_store(&dir);
        let path = dir.path().join(SNAPSHOT_FILE);

        let exporter = SnapshotExporter::spawn(store, path.clone(), &test_config(10));
        exporter.bootstrap().await;
        let first: Snapshot =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        let writer = HabitStore::open(&db_path).unwrap();
        let habit = Habit::new(
            "Stretch",
            HabitKind::Count,
            1,
            SchedulePolicy::Daily,
            Local::now().date_naive(),
        );
        writer.insert_habit(&habit).unwrap();
        exporter.flush().await;

        let second: Snapshot =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(second.habits.len(), first.habits.len() + 1);
        assert!(second.generated_at >= first.generated_at);
        assert!(!path.with_extension("json.tmp").exists());
    }
}

//! SQLite-backed habit store.
//!
//! Single source of truth shared by every execution context. Each surface
//! opens its own connection to the same file; cross-process writes are
//! serialized by SQLite itself with a busy timeout. Holds the habit rows,
//! the append-only completion log, and a small kv table used to persist
//! coordinator runtime state between processes.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{CoreError, StoreError};
use crate::habit::{CompletionId, Habit, HabitId, HabitKind};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const HABIT_COLUMNS: &str = "id, name, kind, goal_value, schedule, timer_minutes_today, \
     timer_date, timer_goal_met_today, current_streak, longest_streak, total_completions, \
     last_completed_date, created_at";

pub struct HabitStore {
    conn: Connection,
}

impl HabitStore {
    /// Opens (and migrates) the store in the default data directory.
    pub fn open_default() -> Result<Self, CoreError> {
        let path = super::data_dir()?.join("stride.db");
        Ok(Self::open(path)?)
    }

    /// Opens (and migrates) the store at an explicit path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store for tests.
    #[cfg(test)]
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::OpenFailed {
            path: std::path::PathBuf::from(":memory:"),
            source,
        })?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS habits (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    goal_value INTEGER NOT NULL,
                    schedule TEXT NOT NULL,
                    timer_minutes_today INTEGER NOT NULL DEFAULT 0,
                    timer_date TEXT NOT NULL,
                    timer_goal_met_today INTEGER NOT NULL DEFAULT 0,
                    current_streak INTEGER NOT NULL DEFAULT 0,
                    longest_streak INTEGER NOT NULL DEFAULT 0,
                    total_completions INTEGER NOT NULL DEFAULT 0,
                    last_completed_date TEXT,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS completions (
                    id TEXT PRIMARY KEY,
                    habit_id TEXT NOT NULL REFERENCES habits(id),
                    completed_on TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_completions_habit
                    ON completions(habit_id, completed_on);
                CREATE TABLE IF NOT EXISTS kv (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );",
            )
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))
    }

    pub fn insert_habit(&self, habit: &Habit) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO habits (id, name, kind, goal_value, schedule, timer_minutes_today, \
             timer_date, timer_goal_met_today, current_streak, longest_streak, \
             total_completions, last_completed_date, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                habit.id.to_string(),
                habit.name,
                habit.kind.as_str(),
                habit.goal_value,
                habit.schedule.to_string(),
                habit.timer_minutes_today,
                habit.timer_date.to_string(),
                habit.timer_goal_met_today,
                habit.current_streak,
                habit.longest_streak,
                habit.total_completions,
                habit.last_completed_date.map(|d| d.to_string()),
                habit.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetches a habit, rolling its daily progress over if the stored
    /// `timer_date` falls behind the current local day.
    pub fn fetch_by_id(&self, id: &HabitId) -> Result<Option<Habit>, StoreError> {
        self.fetch_as_of(id, Local::now().date_naive())
    }

    /// Like [`fetch_by_id`](Self::fetch_by_id) with an explicit notion of
    /// today, so rollover behavior stays testable.
    pub fn fetch_as_of(&self, id: &HabitId, today: NaiveDate) -> Result<Option<Habit>, StoreError> {
        let habit = self
            .conn
            .query_row(
                &format!("SELECT {HABIT_COLUMNS} FROM habits WHERE id = ?1"),
                params![id.to_string()],
                habit_from_row,
            )
            .optional()?;
        match habit {
            Some(mut habit) => {
                self.roll_day(&mut habit, today)?;
                Ok(Some(habit))
            }
            None => Ok(None),
        }
    }

    /// All habits ordered by creation, each rolled to the current local day.
    pub fn list_habits(&self) -> Result<Vec<Habit>, StoreError> {
        self.list_as_of(Local::now().date_naive())
    }

    pub fn list_as_of(&self, today: NaiveDate) -> Result<Vec<Habit>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {HABIT_COLUMNS} FROM habits ORDER BY created_at"))?;
        let rows = stmt.query_map([], habit_from_row)?;
        let mut habits = Vec::new();
        for row in rows {
            let mut habit = row?;
            self.roll_day(&mut habit, today)?;
            habits.push(habit);
        }
        Ok(habits)
    }

    /// Zeroes the per-day timer fields once the stored day is in the past.
    /// Streak fields are left alone; they only move on completions.
    fn roll_day(&self, habit: &mut Habit, today: NaiveDate) -> Result<(), StoreError> {
        if habit.timer_date >= today {
            return Ok(());
        }
        habit.timer_minutes_today = 0;
        habit.timer_goal_met_today = false;
        habit.timer_date = today;
        self.conn.execute(
            "UPDATE habits SET timer_minutes_today = 0, timer_goal_met_today = 0, \
             timer_date = ?1 WHERE id = ?2",
            params![today.to_string(), habit.id.to_string()],
        )?;
        Ok(())
    }

    /// Persists the mutable progress fields of an existing habit.
    pub fn save(&self, habit: &Habit) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE habits SET timer_minutes_today = ?1, timer_date = ?2, \
             timer_goal_met_today = ?3, current_streak = ?4, longest_streak = ?5, \
             total_completions = ?6, last_completed_date = ?7 WHERE id = ?8",
            params![
                habit.timer_minutes_today,
                habit.timer_date.to_string(),
                habit.timer_goal_met_today,
                habit.current_streak,
                habit.longest_streak,
                habit.total_completions,
                habit.last_completed_date.map(|d| d.to_string()),
                habit.id.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Persists habit progress and logs a completion in one transaction, so
    /// a goal can never land without its completion row or vice versa.
    pub fn save_with_completion(
        &mut self,
        habit: &Habit,
        completed_on: NaiveDate,
    ) -> Result<CompletionId, StoreError> {
        let completion_id = CompletionId::new();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO completions (id, habit_id, completed_on) VALUES (?1, ?2, ?3)",
            params![
                completion_id.to_string(),
                habit.id.to_string(),
                completed_on.to_string()
            ],
        )?;
        tx.execute(
            "UPDATE habits SET timer_minutes_today = ?1, timer_date = ?2, \
             timer_goal_met_today = ?3, current_streak = ?4, longest_streak = ?5, \
             total_completions = ?6, last_completed_date = ?7 WHERE id = ?8",
            params![
                habit.timer_minutes_today,
                habit.timer_date.to_string(),
                habit.timer_goal_met_today,
                habit.current_streak,
                habit.longest_streak,
                habit.total_completions,
                habit.last_completed_date.map(|d| d.to_string()),
                habit.id.to_string(),
            ],
        )?;
        tx.commit()?;
        Ok(completion_id)
    }

    /// Appends a bare completion row without touching habit progress.
    pub fn create_completion(
        &self,
        habit_id: &HabitId,
        completed_on: NaiveDate,
    ) -> Result<CompletionId, StoreError> {
        let completion_id = CompletionId::new();
        self.conn.execute(
            "INSERT INTO completions (id, habit_id, completed_on) VALUES (?1, ?2, ?3)",
            params![
                completion_id.to_string(),
                habit_id.to_string(),
                completed_on.to_string()
            ],
        )?;
        Ok(completion_id)
    }

    /// Distinct days on which the habit was completed.
    pub fn completion_dates(&self, habit_id: &HabitId) -> Result<BTreeSet<NaiveDate>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT completed_on FROM completions WHERE habit_id = ?1")?;
        let rows = stmt.query_map(params![habit_id.to_string()], |row| {
            row.get::<_, String>(0)
        })?;
        let mut dates = BTreeSet::new();
        for raw in rows {
            let raw = raw?;
            let date = raw
                .parse::<NaiveDate>()
                .map_err(|e| StoreError::QueryFailed(format!("bad completion date {raw:?}: {e}")))?;
            dates.insert(date);
        }
        Ok(dates)
    }

    pub fn completion_count(&self, habit_id: &HabitId) -> Result<u64, StoreError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM completions WHERE habit_id = ?1",
            params![habit_id.to_string()],
            |row| row.get::<_, u64>(0),
        )?;
        Ok(count)
    }

    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

fn habit_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Habit> {
    let id: String = row.get(0)?;
    let kind: String = row.get(2)?;
    let schedule: String = row.get(4)?;
    let timer_date: String = row.get(6)?;
    let last_completed: Option<String> = row.get(11)?;
    let created_at: String = row.get(12)?;

    Ok(Habit {
        id: HabitId::parse(&id).map_err(|e| bad_column(0, e.into()))?,
        name: row.get(1)?,
        kind: HabitKind::parse(&kind)
            .ok_or_else(|| bad_column(2, format!("unknown habit kind {kind:?}").into()))?,
        goal_value: row.get(3)?,
        schedule: schedule.parse().map_err(|e: crate::habit::ParsePolicyError| {
            bad_column(4, e.into())
        })?,
        timer_minutes_today: row.get(5)?,
        timer_date: timer_date.parse().map_err(|e: chrono::ParseError| bad_column(6, e.into()))?,
        timer_goal_met_today: row.get(7)?,
        current_streak: row.get(8)?,
        longest_streak: row.get(9)?,
        total_completions: row.get(10)?,
        last_completed_date: match last_completed {
            Some(raw) => Some(
                raw.parse()
                    .map_err(|e: chrono::ParseError| bad_column(11, e.into()))?,
            ),
            None => None,
        },
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| bad_column(12, e.into()))?
            .with_timezone(&Utc),
    })
}

fn bad_column(index: usize, err: Box<dyn std::error::Error + Send + Sync>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, err)
}

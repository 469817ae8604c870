//! # Stride Core Library
//!
//! This library provides the core business logic for the Stride habit
//! tracker. It implements a CLI-first philosophy where all operations are
//! available via a standalone CLI binary, with graphical and widget surfaces
//! being thin layers over the same core library and its exported snapshot.
//!
//! ## Architecture
//!
//! - **Timer**: A wall-clock-based state machine per habit; elapsed time is
//!   derived from the persisted start instant, never from a background tick
//! - **Coordinator**: A per-process actor that serializes every timer and
//!   increment intent, owns the store connection and recovers running
//!   sessions left behind by earlier processes
//! - **Streaks**: Pure backward day-walk over the completion history
//! - **Storage**: SQLite-based habit and completion storage plus TOML-based
//!   configuration
//! - **Export**: Debounced JSON snapshot for surfaces without store access
//!
//! ## Key Components
//!
//! - [`TimerCoordinator`]: Serialized intent handling and crash recovery
//! - [`HabitTimer`]: Core timer state machine
//! - [`HabitStore`]: Habit and completion persistence
//! - [`SnapshotExporter`]: Cross-process snapshot maintenance
//! - [`Config`]: Application configuration management

pub mod coordinator;
pub mod error;
pub mod events;
pub mod export;
pub mod habit;
pub mod storage;
pub mod streak;
pub mod timer;

pub use coordinator::{HabitIntents, TimerCoordinator, TimerStatus};
pub use error::{ConfigError, CoreError, StoreError};
pub use events::HabitEvent;
pub use export::{HabitSnapshot, Snapshot, SnapshotExporter};
pub use habit::{Completion, CompletionId, Habit, HabitId, HabitKind, SchedulePolicy};
pub use storage::{data_dir, Config, HabitStore};
pub use streak::StreakComputation;
pub use timer::{HabitTimer, TimerPhase};

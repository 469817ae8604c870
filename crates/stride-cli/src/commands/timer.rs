use clap::Subcommand;
use stride_core::{Config, HabitIntents};

use super::coordinator_with_exporter;

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a habit's timer
    Start {
        /// Habit id
        habit_id: String,
    },
    /// Pause a habit's timer, committing elapsed minutes
    Pause {
        /// Habit id
        habit_id: String,
    },
    /// Print the timer state as JSON
    Status {
        /// Habit id
        habit_id: String,
    },
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let config = Config::load()?;
        let (coordinator, exporter) = coordinator_with_exporter(&config)?;

        match action {
            TimerAction::Start { habit_id } => {
                // A no-op (unknown id, wrong kind, already running) prints
                // nothing and still exits zero.
                if let Some(event) = coordinator.start_timer(&habit_id).await {
                    println!("{}", serde_json::to_string_pretty(&event)?);
                    exporter.flush().await;
                }
            }
            TimerAction::Pause { habit_id } => {
                if let Some(event) = coordinator.pause_timer(&habit_id).await {
                    println!("{}", serde_json::to_string_pretty(&event)?);
                    exporter.flush().await;
                }
            }
            TimerAction::Status { habit_id } => {
                if let Some(status) = coordinator.status(&habit_id).await {
                    println!("{}", serde_json::to_string_pretty(&status)?);
                }
            }
        }
        Ok(())
    })
}

use chrono::Local;
use clap::Subcommand;
use stride_core::{Config, Habit, HabitKind, HabitStore, SchedulePolicy};

use super::coordinator_with_exporter;

#[derive(Subcommand)]
pub enum HabitAction {
    /// Create a habit
    Add {
        /// Habit name
        name: String,
        /// Track elapsed minutes against a daily minute goal
        #[arg(long)]
        timer: bool,
        /// Daily goal: minutes for timer habits, completions otherwise
        #[arg(long)]
        goal: Option<u32>,
        /// Schedule: daily, weekdays, weekends, weekly or custom:mon,wed,fri
        #[arg(long, default_value = "daily")]
        schedule: String,
    },
    /// List habits as JSON
    List,
    /// Log one completion for a count habit
    Increment {
        /// Habit id
        habit_id: String,
    },
}

pub fn run(action: HabitAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        HabitAction::Add {
            name,
            timer,
            goal,
            schedule,
        } => {
            let config = Config::load()?;
            let store = HabitStore::open_default()?;
            let schedule: SchedulePolicy = schedule.parse()?;
            let kind = if timer {
                HabitKind::Timer
            } else {
                HabitKind::Count
            };
            let goal_value = goal.unwrap_or_else(|| match kind {
                HabitKind::Timer => config.timer.default_goal_minutes,
                HabitKind::Count => 1,
            });
            let habit = Habit::new(name, kind, goal_value, schedule, Local::now().date_naive());
            store.insert_habit(&habit)?;
            println!("{}", serde_json::to_string_pretty(&habit)?);
        }
        HabitAction::List => {
            let store = HabitStore::open_default()?;
            let habits = store.list_habits()?;
            println!("{}", serde_json::to_string_pretty(&habits)?);
        }
        HabitAction::Increment { habit_id } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(async {
                let config = Config::load()?;
                let (coordinator, exporter) = coordinator_with_exporter(&config)?;
                if let Some(event) = coordinator.increment(&habit_id).await {
                    println!("{}", serde_json::to_string_pretty(&event)?);
                    exporter.flush().await;
                }
                Ok::<(), Box<dyn std::error::Error>>(())
            })?;
        }
    }
    Ok(())
}

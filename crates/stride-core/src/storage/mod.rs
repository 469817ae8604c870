mod config;
pub mod database;

pub use config::{Config, ExportConfig, TimerConfig};
pub use database::HabitStore;

use std::path::PathBuf;

/// Returns `~/.config/stride[-dev]/` based on STRIDE_ENV.
///
/// Set STRIDE_ENV=dev to use the development data directory, or point
/// STRIDE_DATA_DIR at an explicit directory (tests and sandboxed surfaces
/// rely on this).
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let dir = match std::env::var_os("STRIDE_DATA_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("STRIDE_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("stride-dev")
            } else {
                base_dir.join("stride")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

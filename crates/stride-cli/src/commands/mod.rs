pub mod config;
pub mod export;
pub mod habit;
pub mod timer;

use stride_core::export::default_snapshot_path;
use stride_core::{Config, HabitStore, SnapshotExporter, TimerCoordinator};

/// Wires up the full per-process stack: coordinator plus snapshot exporter,
/// each on its own store connection.
pub(crate) fn coordinator_with_exporter(
    config: &Config,
) -> Result<(TimerCoordinator, SnapshotExporter), Box<dyn std::error::Error>> {
    let exporter = SnapshotExporter::spawn(
        HabitStore::open_default()?,
        default_snapshot_path()?,
        &config.export,
    );
    let coordinator = TimerCoordinator::spawn(HabitStore::open_default()?, Some(exporter.clone()));
    Ok((coordinator, exporter))
}

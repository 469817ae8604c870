use clap::Subcommand;
use stride_core::export::default_snapshot_path;
use stride_core::{Config, HabitStore, SnapshotExporter};

#[derive(Subcommand)]
pub enum ExportAction {
    /// Write an initial snapshot immediately
    Bootstrap,
    /// Refresh the snapshot through the debounce window
    Sync,
    /// Print the snapshot file path
    Path,
}

pub fn run(action: ExportAction) -> Result<(), Box<dyn std::error::Error>> {
    if let ExportAction::Path = action {
        println!("{}", default_snapshot_path()?.display());
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let config = Config::load()?;
        let exporter = SnapshotExporter::spawn(
            HabitStore::open_default()?,
            default_snapshot_path()?,
            &config.export,
        );
        match action {
            ExportAction::Bootstrap => exporter.bootstrap().await,
            // The process has to outlive the debounce window, so a CLI sync
            // waits for the write it requested.
            _ => {
                exporter.schedule_sync();
                exporter.flush().await;
            }
        }
        println!("{}", exporter.snapshot_path().display());
        Ok(())
    })
}

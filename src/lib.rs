pub mod config;
pub mod error;
pub mod fleet;
pub mod printer;
pub mod spoolman;
pub mod tracking;
pub mod usage;

pub use config::{MemorySettings, SettingsReader, SyncSettings, TomlSettings};
pub use error::{Result, SpoolSyncError};
pub use fleet::{FleetSyncOrchestrator, SkippedTray, SyncResult, TraySyncOutcome};
pub use printer::{PrinterInfo, PrinterState, PrinterStateProvider};
pub use spoolman::{InventoryApi, MemoryInventory, SpoolmanClient, SpoolmanService};
pub use tracking::{
    ActivePrintRecord, ActivePrintTracker, ArchivePathResolver, QueueSlotMappingReader,
    UsageReport, UsageReportingEngine,
};

/// Install the global `tracing` subscriber, filtered by `RUST_LOG` and
/// defaulting to `info`. Does nothing if a subscriber is already set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

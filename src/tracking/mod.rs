//! Per-print usage tracking.
//!
//! At print start [`ActivePrintTracker::store`] snapshots the planned usage,
//! per-layer extrusion and AMS identities into SQLite. At the terminal state
//! the row is read back, turned into Spoolman decrements by
//! [`UsageReportingEngine`], and deleted.

pub mod reporting;
pub mod store;
pub mod tracker;
pub mod types;

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

pub use reporting::UsageReportingEngine;
pub use store::TrackingStore;
pub use tracker::ActivePrintTracker;
pub use types::{ActivePrintRecord, SlotUsageReport, UsageReport};

/// Locates the sliced 3MF of an archived print.
#[async_trait]
pub trait ArchivePathResolver: Send + Sync {
    async fn archive_path(&self, archive_id: i64) -> Option<PathBuf>;
}

/// Reads the slot-to-tray override stored on the active queue item.
#[async_trait]
pub trait QueueSlotMappingReader: Send + Sync {
    /// Raw JSON as stored, if the item has a mapping.
    async fn slot_mapping(&self, printer_id: i64, archive_id: i64) -> Option<String>;
}

/// Parse a queue slot mapping such as `[2, -1, 0]`.
///
/// Anything but a JSON array is ignored with a warning. Elements that are
/// not integers become `-1` (default mapping).
pub fn parse_slot_mapping(raw: &str) -> Option<Vec<i32>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) if !items.is_empty() => Some(
            items
                .iter()
                .map(|v| v.as_i64().and_then(|n| i32::try_from(n).ok()).unwrap_or(-1))
                .collect(),
        ),
        Ok(Value::Array(_)) => None,
        Ok(other) => {
            warn!("Ignoring slot mapping that is not a list: {}", other);
            None
        }
        Err(e) => {
            warn!("Ignoring malformed slot mapping {:?}: {}", raw, e);
            None
        }
    }
}

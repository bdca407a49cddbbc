use serde::{Deserialize, Serialize};

use crate::printer::AmsTraySnapshot;
use crate::usage::{FilamentProperties, FilamentUsage, LayerUsage};

/// Tracking row for one in-progress print, keyed by `(printer_id, archive_id)`.
///
/// Captured at print start so the usage report at the end does not depend on
/// the archive still being readable or the AMS still looking the same.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePrintRecord {
    pub printer_id: i64,
    pub archive_id: i64,
    pub filament_usage: Vec<FilamentUsage>,
    pub ams_trays: AmsTraySnapshot,
    /// Queue override: index is `slot - 1`, `-1` means default mapping.
    pub slot_to_tray: Option<Vec<i32>>,
    pub layer_usage: LayerUsage,
    pub filament_properties: FilamentProperties,
    pub created_at: String,
}

impl ActivePrintRecord {
    pub fn slot_mapping(&self) -> Option<&[i32]> {
        self.slot_to_tray.as_deref()
    }
}

/// One spool decrement issued by a usage report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotUsageReport {
    pub slot_id: u32,
    pub global_tray_id: u32,
    pub spool_id: i64,
    pub grams: f64,
}

/// Outcome of a full or partial usage report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageReport {
    pub reported: Vec<SlotUsageReport>,
    pub errors: Vec<String>,
}

impl UsageReport {
    pub fn total_grams(&self) -> f64 {
        self.reported.iter().map(|r| r.grams).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.reported.is_empty() && self.errors.is_empty()
    }
}

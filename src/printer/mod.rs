//! Printer state as seen by the sync core.
//!
//! The MQTT connection lives in the host application; it hands over
//! snapshots through [`PrinterStateProvider`].

pub mod ams;

use async_trait::async_trait;
use serde_json::Value;

pub use ams::{
    build_tray_snapshot, external_tray, resolve_global_tray_id, AmsLayout, AmsTray,
    AmsTraySnapshot, AmsUnit, TrayIdentity, TrayKind, EXTERNAL_SPOOL_TRAY_ID, HT_AMS_ID_START,
};

/// A point-in-time copy of one printer's live status.
#[derive(Debug, Clone, Default)]
pub struct PrinterState {
    pub connected: bool,
    /// Raw `ams` report, in whatever shape the printer sent.
    pub raw_ams: Option<Value>,
    /// Raw `vt_tray` report for the external spool holder.
    pub raw_vt_tray: Option<Value>,
    pub current_layer: i64,
    pub total_layers: i64,
}

impl PrinterState {
    pub fn ams_layout(&self) -> AmsLayout {
        AmsLayout::from_raw(self.raw_ams.as_ref())
    }

    /// Every tray in report order, followed by the external spool.
    pub fn all_trays(&self) -> Vec<AmsTray> {
        let mut trays: Vec<AmsTray> = self.ams_layout().trays().cloned().collect();
        trays.extend(external_tray(self.raw_vt_tray.as_ref()));
        trays
    }

    pub fn tray_snapshot(&self) -> AmsTraySnapshot {
        build_tray_snapshot(&self.all_trays())
    }
}

/// Identification of a configured printer.
#[derive(Debug, Clone, PartialEq)]
pub struct PrinterInfo {
    pub id: i64,
    pub name: String,
}

/// Access to live printer state owned by the host application.
#[async_trait]
pub trait PrinterStateProvider: Send + Sync {
    /// Current state of one printer; `None` if it is unknown.
    async fn printer_state(&self, printer_id: i64) -> Option<PrinterState>;

    /// All configured printers, in display order.
    async fn list_printers(&self) -> Vec<PrinterInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_trays_includes_external() {
        let state = PrinterState {
            connected: true,
            raw_ams: Some(json!([{"id": "0", "tray": [{"id": "0", "tray_type": "PLA"}]}])),
            raw_vt_tray: Some(json!({"id": "254", "tray_type": "PETG"})),
            ..Default::default()
        };
        let trays = state.all_trays();
        assert_eq!(trays.len(), 2);
        assert_eq!(trays[1].kind, TrayKind::External);

        let snapshot = state.tray_snapshot();
        assert!(snapshot.contains_key(&0));
        assert!(snapshot.contains_key(&EXTERNAL_SPOOL_TRAY_ID));
    }

    #[test]
    fn test_disconnected_default() {
        let state = PrinterState::default();
        assert!(!state.connected);
        assert!(state.all_trays().is_empty());
    }
}

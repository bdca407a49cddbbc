use std::sync::Arc;

use tracing::{debug, info, warn};

use super::types::{ActivePrintRecord, SlotUsageReport, UsageReport};
use crate::config::{SettingsReader, SyncSettings};
use crate::error::Result;
use crate::printer::{resolve_global_tray_id, PrinterStateProvider};
use crate::spoolman::{find_spool_by_tag, resolve_spool_tag, InventoryApi, Spool, SpoolmanService};
use crate::usage::{cumulative_usage_at_layer, mm_to_grams, DEFAULT_DENSITY_G_CM3, DEFAULT_DIAMETER_MM};

/// Amount to charge a slot, before or after density is known.
#[derive(Debug, Clone, Copy)]
enum SlotAmount {
    Grams(f64),
    /// Extruded length, converted once the slot's spool is known.
    Millimetres(f64),
}

/// Turns tracking rows into Spoolman usage decrements.
pub struct UsageReportingEngine {
    service: Arc<SpoolmanService>,
    printers: Arc<dyn PrinterStateProvider>,
    settings: Arc<dyn SettingsReader>,
}

impl UsageReportingEngine {
    pub fn new(
        service: Arc<SpoolmanService>,
        printers: Arc<dyn PrinterStateProvider>,
        settings: Arc<dyn SettingsReader>,
    ) -> Self {
        Self {
            service,
            printers,
            settings,
        }
    }

    /// Charge every slot its full planned usage. Used when a print
    /// completes.
    pub async fn report_full(&self, record: &ActivePrintRecord) -> Result<UsageReport> {
        let api = self.service.client()?;
        let slots = record
            .filament_usage
            .iter()
            .filter(|u| u.used_g > 0.0)
            .map(|u| (u.slot_id, SlotAmount::Grams(u.used_g)))
            .collect();

        self.report_slots(api.as_ref(), record, slots).await
    }

    /// Charge what was actually printed before a print stopped early.
    ///
    /// Uses the layer snapshot closest to (not above) the printer's current
    /// layer when the G-code had layer data; otherwise scales each slot's
    /// total by `current_layer / total_layers`.
    pub async fn report_partial(&self, record: &ActivePrintRecord) -> Result<UsageReport> {
        let settings = SyncSettings::load(self.settings.as_ref()).await;
        if !settings.report_partial_usage {
            debug!("Partial usage reporting disabled");
            return Ok(UsageReport::default());
        }

        let api = self.service.client()?;

        let Some(state) = self.printers.printer_state(record.printer_id).await else {
            info!(
                "No state for printer {}, skipping partial usage",
                record.printer_id
            );
            return Ok(UsageReport::default());
        };
        if state.current_layer <= 0 {
            info!(
                "Print on printer {} stopped before layer 1, nothing to report",
                record.printer_id
            );
            return Ok(UsageReport::default());
        }

        let slots: Vec<(u32, SlotAmount)> = if !record.layer_usage.is_empty() {
            let layer = u32::try_from(state.current_layer).unwrap_or(u32::MAX);
            let cumulative = cumulative_usage_at_layer(&record.layer_usage, layer);
            info!(
                "Partial usage at layer {} from layer data: {} channel(s)",
                layer,
                cumulative.len()
            );
            cumulative
                .into_iter()
                .filter(|(_, mm)| *mm > 0.0)
                .map(|(channel, mm)| (channel + 1, SlotAmount::Millimetres(mm)))
                .collect()
        } else {
            if state.total_layers <= 0 {
                warn!(
                    "No layer data and no layer count for printer {}, skipping partial usage",
                    record.printer_id
                );
                return Ok(UsageReport::default());
            }
            let ratio = (state.current_layer as f64 / state.total_layers as f64).min(1.0);
            info!(
                "No layer data, estimating partial usage linearly at {:.1}%",
                ratio * 100.0
            );
            record
                .filament_usage
                .iter()
                .filter(|u| u.used_g > 0.0)
                .map(|u| (u.slot_id, SlotAmount::Grams(u.used_g * ratio)))
                .collect()
        };

        self.report_slots(api.as_ref(), record, slots).await
    }

    async fn report_slots(
        &self,
        api: &dyn InventoryApi,
        record: &ActivePrintRecord,
        slots: Vec<(u32, SlotAmount)>,
    ) -> Result<UsageReport> {
        let mut report = UsageReport::default();
        if slots.is_empty() {
            return Ok(report);
        }

        let spools = api.list_spools().await?;

        for (slot_id, amount) in slots {
            let global_tray_id = resolve_global_tray_id(slot_id, record.slot_mapping());
            let Some(tray) = record.ams_trays.get(&global_tray_id) else {
                debug!(
                    "Slot {} maps to tray {} which was not loaded at print start",
                    slot_id, global_tray_id
                );
                continue;
            };
            let Some(tag) = resolve_spool_tag(&tray.tray_uuid, &tray.tag_uid) else {
                debug!(
                    "Tray {} has no Bambu Lab tag, not reporting slot {}",
                    global_tray_id, slot_id
                );
                continue;
            };
            let Some(spool) = find_spool_by_tag(api, &tag, Some(spools.as_slice())).await? else {
                report.errors.push(format!(
                    "No Spoolman spool found for tag {} (slot {}, tray {})",
                    tag, slot_id, global_tray_id
                ));
                continue;
            };

            let grams = match amount {
                SlotAmount::Grams(grams) => grams,
                SlotAmount::Millimetres(mm) => self.convert_length(record, slot_id, &spool, mm),
            };
            if grams <= 0.0 {
                continue;
            }

            match api.use_spool_weight(spool.id, grams).await {
                Ok(_) => {
                    info!(
                        "Reported {:.2}g on spool {} (slot {}, tray {})",
                        grams, spool.id, slot_id, global_tray_id
                    );
                    report.reported.push(SlotUsageReport {
                        slot_id,
                        global_tray_id,
                        spool_id: spool.id,
                        grams,
                    });
                }
                Err(e) => {
                    warn!("Failed to report usage on spool {}: {}", spool.id, e);
                    report
                        .errors
                        .push(format!("Spool {} (slot {}): {}", spool.id, slot_id, e));
                }
            }
        }

        Ok(report)
    }

    /// Density comes from the spool's filament first, then the slicer's
    /// properties, then the PLA default.
    fn convert_length(&self, record: &ActivePrintRecord, slot_id: u32, spool: &Spool, mm: f64) -> f64 {
        let properties = record.filament_properties.get(&slot_id);
        let density = Some(spool.filament.density)
            .filter(|d| *d > 0.0)
            .or_else(|| properties.map(|p| p.density_g_cm3))
            .unwrap_or(DEFAULT_DENSITY_G_CM3);
        let diameter = properties
            .map(|p| p.diameter_mm)
            .unwrap_or(DEFAULT_DIAMETER_MM);
        mm_to_grams(mm, diameter, density)
    }
}

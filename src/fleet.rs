//! Fleet-wide AMS to Spoolman synchronization.
//!
//! One pass lists every Spoolman spool exactly once and threads that list
//! through every tray of every printer, so a fleet with many trays costs a
//! single read. Tray failures are collected, never raised.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{SettingsReader, SyncSettings};
use crate::error::{Result, SpoolSyncError};
use crate::printer::{AmsLayout, AmsTray, PrinterInfo, PrinterState, PrinterStateProvider};
use crate::spoolman::tag::{normalize_tag, tray_tags};
use crate::spoolman::{clear_location_for_removed_spools, sync_ams_tray, InventoryApi, Spool, SpoolmanService};

/// A loaded tray that was not synced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedTray {
    pub printer: String,
    pub location: String,
    pub reason: String,
}

/// What happened to one tray during a pass.
#[derive(Debug, Clone)]
pub enum TraySyncOutcome {
    Empty,
    Synced(Box<Spool>),
    Skipped(SkippedTray),
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncResult {
    pub success: bool,
    pub synced_count: usize,
    pub skipped_count: usize,
    pub skipped: Vec<SkippedTray>,
    pub errors: Vec<String>,
    /// Spools whose location was cleared because they left their printer.
    pub cleared_count: usize,
}

impl SyncResult {
    fn record(&mut self, outcome: TraySyncOutcome) {
        match outcome {
            TraySyncOutcome::Empty => {}
            TraySyncOutcome::Synced(_) => self.synced_count += 1,
            TraySyncOutcome::Skipped(skipped) => {
                self.skipped_count += 1;
                self.skipped.push(skipped);
            }
            TraySyncOutcome::Failed(error) => self.errors.push(error),
        }
    }

    fn finish(mut self) -> Self {
        self.success = self.errors.is_empty();
        self
    }
}

pub struct FleetSyncOrchestrator {
    service: Arc<SpoolmanService>,
    printers: Arc<dyn PrinterStateProvider>,
    settings: Arc<dyn SettingsReader>,
}

impl FleetSyncOrchestrator {
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

    /// Sync one printer. Fails if Spoolman is not configured or the
    /// printer is not connected.
    pub async fn sync_printer(&self, printer_id: i64) -> Result<SyncResult> {
        let api = self.service.client()?;
        let state = self
            .printers
            .printer_state(printer_id)
            .await
            .filter(|s| s.connected)
            .ok_or(SpoolSyncError::PrinterNotConnected(printer_id))?;

        let info = self
            .printers
            .list_printers()
            .await
            .into_iter()
            .find(|p| p.id == printer_id)
            .unwrap_or_else(|| PrinterInfo {
                id: printer_id,
                name: format!("Printer {}", printer_id),
            });

        let settings = SyncSettings::load(self.settings.as_ref()).await;
        Ok(self
            .sync_batch(api.as_ref(), vec![(info, state)], &settings)
            .await)
    }

    /// Sync every connected printer. Disconnected printers are skipped.
    pub async fn sync_all(&self) -> Result<SyncResult> {
        let api = self.service.client()?;

        let mut targets = Vec::new();
        for info in self.printers.list_printers().await {
            match self.printers.printer_state(info.id).await {
                Some(state) if state.connected => targets.push((info, state)),
                _ => debug!("Printer {} ({}) not connected, skipping", info.name, info.id),
            }
        }

        let settings = SyncSettings::load(self.settings.as_ref()).await;
        Ok(self.sync_batch(api.as_ref(), targets, &settings).await)
    }

    async fn sync_batch(
        &self,
        api: &dyn InventoryApi,
        targets: Vec<(PrinterInfo, PrinterState)>,
        settings: &SyncSettings,
    ) -> SyncResult {
        let mut result = SyncResult::default();
        if targets.is_empty() {
            return result.finish();
        }

        let mut spools = match api.list_spools().await {
            Ok(spools) => spools,
            Err(e) => {
                warn!("Failed to list Spoolman spools: {}", e);
                result.errors.push(format!("Failed to list spools: {}", e));
                return result.finish();
            }
        };
        debug!("Fleet sync: {} printer(s), {} spool(s)", targets.len(), spools.len());

        for (info, state) in targets {
            let layout = state.ams_layout();
            let trays = state.all_trays();
            if layout == AmsLayout::Unrecognized && trays.is_empty() {
                debug!("No usable AMS data for {}, skipping", info.name);
                continue;
            }

            let mut seen_tags = HashSet::new();
            for tray in &trays {
                let tags = tray_tags(tray);
                seen_tags.extend(tags.iter().map(|t| normalize_tag(t)));
                let outcome = sync_tray(
                    api,
                    tray,
                    &info.name,
                    !tags.is_empty(),
                    settings.disable_weight_sync,
                    &mut spools,
                )
                .await;
                result.record(outcome);
            }

            // An unparsed AMS report says nothing about which spools left.
            if layout == AmsLayout::Unrecognized {
                debug!("AMS report for {} not recognized, keeping spool locations", info.name);
                continue;
            }
            result.cleared_count +=
                clear_location_for_removed_spools(api, &info.name, &seen_tags, &mut spools).await;
        }

        let result = result.finish();
        info!(
            "Fleet sync done: {} synced, {} skipped, {} cleared, {} error(s)",
            result.synced_count,
            result.skipped_count,
            result.cleared_count,
            result.errors.len()
        );
        result
    }
}

async fn sync_tray(
    api: &dyn InventoryApi,
    tray: &AmsTray,
    printer_name: &str,
    identified: bool,
    disable_weight_sync: bool,
    spools: &mut Vec<Spool>,
) -> TraySyncOutcome {
    if tray.is_empty() {
        return TraySyncOutcome::Empty;
    }
    let location = tray.location_label();

    if !identified {
        return TraySyncOutcome::Skipped(SkippedTray {
            printer: printer_name.to_string(),
            location,
            reason: format!("{} is not a Bambu Lab spool (no RFID tag)", tray.tray_type),
        });
    }

    match sync_ams_tray(api, tray, printer_name, disable_weight_sync, Some(spools)).await {
        Ok(Some(spool)) => TraySyncOutcome::Synced(Box::new(spool)),
        Ok(None) => TraySyncOutcome::Skipped(SkippedTray {
            printer: printer_name.to_string(),
            location,
            reason: "No usable spool identifier".to_string(),
        }),
        Err(e) => {
            warn!("Failed to sync {} {}: {}", printer_name, location, e);
            TraySyncOutcome::Failed(format!("{} {}: {}", printer_name, location, e))
        }
    }
}

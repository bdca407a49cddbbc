use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::reporting::UsageReportingEngine;
use super::store::TrackingStore;
use super::types::{ActivePrintRecord, UsageReport};
use super::{parse_slot_mapping, ArchivePathResolver, QueueSlotMappingReader};
use crate::config::{SettingsReader, SyncSettings};
use crate::error::{Result, SpoolSyncError};
use crate::printer::PrinterState;
use crate::usage::analyze_print_job;

/// Captures filament usage at print start and reports it at print end.
pub struct ActivePrintTracker {
    db_path: PathBuf,
    settings: Arc<dyn SettingsReader>,
    reporter: Arc<UsageReportingEngine>,
    archives: Option<Arc<dyn ArchivePathResolver>>,
    slot_mappings: Option<Arc<dyn QueueSlotMappingReader>>,
}

impl ActivePrintTracker {
    pub fn new(
        db_path: impl Into<PathBuf>,
        settings: Arc<dyn SettingsReader>,
        reporter: Arc<UsageReportingEngine>,
    ) -> Self {
        Self {
            db_path: db_path.into(),
            settings,
            reporter,
            archives: None,
            slot_mappings: None,
        }
    }

    pub fn with_archives(mut self, archives: Arc<dyn ArchivePathResolver>) -> Self {
        self.archives = Some(archives);
        self
    }

    pub fn with_slot_mappings(mut self, mappings: Arc<dyn QueueSlotMappingReader>) -> Self {
        self.slot_mappings = Some(mappings);
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn with_store<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut TrackingStore) -> Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut store = TrackingStore::new(&db_path)?;
            op(&mut store)
        })
        .await
        .map_err(|e| SpoolSyncError::Database(format!("Tracking task panicked: {}", e)))?
    }

    /// Record usage data for a print that just started.
    ///
    /// Returns `Ok(false)` without touching the database when tracking is
    /// off, the 3MF is missing or unreadable, or it plans no filament use.
    pub async fn store(
        &self,
        printer_id: i64,
        archive_id: i64,
        three_mf_path: &Path,
        printer_state: &PrinterState,
    ) -> Result<bool> {
        let settings = SyncSettings::load(self.settings.as_ref()).await;
        if !settings.tracking_enabled() {
            debug!("Usage tracking disabled, not storing print {}", archive_id);
            return Ok(false);
        }
        if !three_mf_path.is_file() {
            info!("3MF for archive {} not found at {:?}", archive_id, three_mf_path);
            return Ok(false);
        }

        let path = three_mf_path.to_path_buf();
        let analysis = tokio::task::spawn_blocking(move || analyze_print_job(&path))
            .await
            .map_err(|e| SpoolSyncError::ThreeMf(format!("3MF task panicked: {}", e)))?;
        let analysis = match analysis {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Failed to analyze 3MF for archive {}: {:#}", archive_id, e);
                return Ok(false);
            }
        };
        if analysis.filament_usage.is_empty() {
            info!("Archive {} reports no filament usage, not tracking", archive_id);
            return Ok(false);
        }
        if analysis.layer_usage.is_empty() {
            debug!(
                "No per-layer data in archive {}, partial reports will be linear",
                archive_id
            );
        }

        let slot_to_tray = match &self.slot_mappings {
            Some(reader) => reader
                .slot_mapping(printer_id, archive_id)
                .await
                .and_then(|raw| parse_slot_mapping(&raw)),
            None => None,
        };

        let record = ActivePrintRecord {
            printer_id,
            archive_id,
            filament_usage: analysis.filament_usage,
            ams_trays: printer_state.tray_snapshot(),
            slot_to_tray,
            layer_usage: analysis.layer_usage,
            filament_properties: analysis.properties,
            created_at: Utc::now().to_rfc3339(),
        };
        let slots = record.filament_usage.len();
        let layers = record.layer_usage.len();

        self.with_store(move |store| store.replace(&record)).await?;
        info!(
            "Tracking print on printer {} (archive {}): {} slot(s), {} layer snapshot(s)",
            printer_id, archive_id, slots, layers
        );
        Ok(true)
    }

    /// [`store`](Self::store) with the 3MF located through the archive
    /// resolver.
    pub async fn store_for_archive(
        &self,
        printer_id: i64,
        archive_id: i64,
        printer_state: &PrinterState,
    ) -> Result<bool> {
        let Some(archives) = &self.archives else {
            debug!("No archive resolver configured");
            return Ok(false);
        };
        let Some(path) = archives.archive_path(archive_id).await else {
            info!("Archive {} has no 3MF file", archive_id);
            return Ok(false);
        };
        self.store(printer_id, archive_id, &path, printer_state).await
    }

    pub async fn load(&self, printer_id: i64, archive_id: i64) -> Result<Option<ActivePrintRecord>> {
        self.with_store(move |store| store.get(printer_id, archive_id))
            .await
    }

    /// Failed or cancelled print: report what was printed so far, then drop
    /// the row. The row is deleted even when reporting fails.
    pub async fn cleanup(&self, printer_id: i64, archive_id: i64) -> Result<UsageReport> {
        let report = match self.load(printer_id, archive_id).await {
            Ok(Some(record)) => match self.reporter.report_partial(&record).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(
                        "Partial usage report failed for printer {} archive {}: {}",
                        printer_id, archive_id, e
                    );
                    UsageReport::default()
                }
            },
            Ok(None) => UsageReport::default(),
            Err(e) => {
                warn!("Failed to load tracking row for archive {}: {}", archive_id, e);
                UsageReport::default()
            }
        };

        for error in &report.errors {
            warn!("Partial usage: {}", error);
        }

        self.with_store(move |store| store.delete(printer_id, archive_id))
            .await?;
        Ok(report)
    }

    /// Completed print: report the full planned usage, then drop the row.
    /// Returns `Ok(None)` when the print was not tracked.
    pub async fn finalize(&self, printer_id: i64, archive_id: i64) -> Result<Option<UsageReport>> {
        let Some(record) = self.load(printer_id, archive_id).await? else {
            debug!("No tracking row for printer {} archive {}", printer_id, archive_id);
            return Ok(None);
        };

        let report = self.reporter.report_full(&record).await;
        self.with_store(move |store| store.delete(printer_id, archive_id))
            .await?;

        let report = report?;
        for error in &report.errors {
            warn!("Full usage: {}", error);
        }
        Ok(Some(report))
    }
}

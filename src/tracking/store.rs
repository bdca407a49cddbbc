use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use super::types::ActivePrintRecord;
use crate::error::{Result, SpoolSyncError};

/// SQLite store for in-progress print tracking rows.
/// All operations are synchronous (rusqlite is blocking).
/// Callers in async contexts should use `tokio::task::spawn_blocking`.
pub struct TrackingStore {
    conn: Connection,
}

impl TrackingStore {
    /// Create or open the tracking database at `db_path`.
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SpoolSyncError::Database(format!("Failed to create data dir: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)?;
        let store = Self::init(conn)?;
        debug!("Opened tracking database at {:?}", db_path);
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS active_print_spoolman (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                printer_id INTEGER NOT NULL,
                archive_id INTEGER NOT NULL,
                filament_usage TEXT NOT NULL,
                ams_trays TEXT NOT NULL,
                slot_to_tray TEXT,
                layer_usage TEXT NOT NULL,
                filament_properties TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(printer_id, archive_id)
            );",
        )?;
        Ok(Self { conn })
    }

    /// Insert `record`, replacing any stale row for the same key in the
    /// same transaction.
    pub fn replace(&mut self, record: &ActivePrintRecord) -> Result<()> {
        let filament_usage = to_json(&record.filament_usage)?;
        let ams_trays = to_json(&record.ams_trays)?;
        let slot_to_tray = record.slot_to_tray.as_ref().map(to_json).transpose()?;
        let layer_usage = to_json(&record.layer_usage)?;
        let filament_properties = to_json(&record.filament_properties)?;

        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM active_print_spoolman WHERE printer_id = ?1 AND archive_id = ?2",
            params![record.printer_id, record.archive_id],
        )?;
        tx.execute(
            "INSERT INTO active_print_spoolman
             (printer_id, archive_id, filament_usage, ams_trays, slot_to_tray,
              layer_usage, filament_properties, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.printer_id,
                record.archive_id,
                filament_usage,
                ams_trays,
                slot_to_tray,
                layer_usage,
                filament_properties,
                record.created_at,
            ],
        )?;
        tx.commit()?;

        if removed > 0 {
            info!(
                "Replaced stale tracking row for printer {} archive {}",
                record.printer_id, record.archive_id
            );
        }
        Ok(())
    }

    pub fn get(&self, printer_id: i64, archive_id: i64) -> Result<Option<ActivePrintRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT filament_usage, ams_trays, slot_to_tray, layer_usage,
                        filament_properties, created_at
                 FROM active_print_spoolman
                 WHERE printer_id = ?1 AND archive_id = ?2",
                params![printer_id, archive_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((usage, trays, mapping, layers, properties, created_at)) = row else {
            return Ok(None);
        };

        Ok(Some(ActivePrintRecord {
            printer_id,
            archive_id,
            filament_usage: from_json(&usage)?,
            ams_trays: from_json(&trays)?,
            slot_to_tray: mapping.as_deref().map(from_json).transpose()?,
            layer_usage: from_json(&layers)?,
            filament_properties: from_json(&properties)?,
            created_at,
        }))
    }

    /// Remove the row for a print. Returns whether a row existed.
    pub fn delete(&self, printer_id: i64, archive_id: i64) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM active_print_spoolman WHERE printer_id = ?1 AND archive_id = ?2",
            params![printer_id, archive_id],
        )?;
        Ok(removed > 0)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM active_print_spoolman", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| SpoolSyncError::Database(format!("Failed to serialize column: {}", e)))
}

fn from_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| SpoolSyncError::Database(format!("Corrupt tracking column: {}", e)))
}

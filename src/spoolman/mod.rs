//! Spoolman inventory integration.
//!
//! - `types`: wire records and request bodies for the `/api/v1` REST API
//! - `client`: `reqwest` implementation of [`InventoryApi`]
//! - `tag`: hardware identity checks and the stored tag format
//! - `sync`: tray-to-spool reconciliation on top of any [`InventoryApi`]
//! - `service`: settings-driven client lifecycle
//! - `memory`: in-memory inventory for dry runs and tests

pub mod client;
pub mod memory;
pub mod service;
pub mod sync;
pub mod tag;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;

pub use client::SpoolmanClient;
pub use memory::MemoryInventory;
pub use service::{HealthReport, SpoolmanService};
pub use sync::{
    clear_location_for_removed_spools, find_or_create_filament, find_spool_by_tag, sync_ams_tray,
};
pub use tag::{decode_tag, encode_tag, is_bambu_lab_spool, resolve_spool_tag};
pub use types::{ExternalFilament, Filament, Spool, SpoolCreate, SpoolUpdate, Vendor};

/// The subset of the Spoolman API the sync core relies on.
#[async_trait]
pub trait InventoryApi: Send + Sync {
    async fn list_spools(&self) -> Result<Vec<Spool>>;

    async fn create_spool(&self, spool: &SpoolCreate) -> Result<Spool>;

    async fn update_spool(&self, spool_id: i64, update: &SpoolUpdate) -> Result<Spool>;

    /// Decrement a spool's remaining weight by `grams`.
    async fn use_spool_weight(&self, spool_id: i64, grams: f64) -> Result<Spool>;

    async fn list_filaments(&self) -> Result<Vec<Filament>>;

    async fn create_filament(&self, filament: &types::FilamentCreate) -> Result<Filament>;

    /// Entries of the external filament catalog (SpoolmanDB).
    async fn list_external_filaments(&self) -> Result<Vec<ExternalFilament>>;

    async fn list_vendors(&self) -> Result<Vec<Vendor>>;

    async fn create_vendor(&self, name: &str) -> Result<Vendor>;

    async fn health(&self) -> Result<()>;
}

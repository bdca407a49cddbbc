//! In-memory [`InventoryApi`] for dry runs and tests.
//!
//! Behaves like a tiny Spoolman: ids are assigned sequentially, updates are
//! applied in place, and every call is recorded so callers can assert on
//! the traffic a sync produced.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::types::{
    ExternalFilament, Filament, FilamentCreate, Spool, SpoolCreate, SpoolUpdate, Vendor,
};
use super::InventoryApi;
use crate::error::{Result, SpoolSyncError};

#[derive(Default)]
struct State {
    next_id: i64,
    spools: Vec<Spool>,
    filaments: Vec<Filament>,
    vendors: Vec<Vendor>,
    external: Vec<ExternalFilament>,
    list_spool_calls: usize,
    updates: Vec<(i64, SpoolUpdate)>,
    uses: Vec<(i64, f64)>,
    created_spools: usize,
    fail_writes: bool,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryInventory {
    state: Mutex<State>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_write(state: &State) -> Result<()> {
        if state.fail_writes {
            Err(SpoolSyncError::Http("write rejected".to_string()))
        } else {
            Ok(())
        }
    }

    /// Seed a spool as-is. Its id also advances the id counter.
    pub fn insert_spool(&self, spool: Spool) {
        let mut state = self.state();
        state.next_id = state.next_id.max(spool.id).max(spool.filament.id);
        state.spools.push(spool);
    }

    pub fn add_external(&self, filament: ExternalFilament) {
        self.state().external.push(filament);
    }

    /// Make every write fail with a connection error.
    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    pub fn spools(&self) -> Vec<Spool> {
        self.state().spools.clone()
    }

    pub fn filaments(&self) -> Vec<Filament> {
        self.state().filaments.clone()
    }

    pub fn vendors(&self) -> Vec<Vendor> {
        self.state().vendors.clone()
    }

    pub fn list_spool_calls(&self) -> usize {
        self.state().list_spool_calls
    }

    pub fn updates(&self) -> Vec<(i64, SpoolUpdate)> {
        self.state().updates.clone()
    }

    /// `(spool_id, grams)` for every usage decrement.
    pub fn uses(&self) -> Vec<(i64, f64)> {
        self.state().uses.clone()
    }

    pub fn created_spool_count(&self) -> usize {
        self.state().created_spools
    }

    /// Total number of successful writes of any kind.
    pub fn write_count(&self) -> usize {
        let state = self.state();
        state.updates.len() + state.uses.len() + state.created_spools
    }
}

#[async_trait]
impl InventoryApi for MemoryInventory {
    async fn list_spools(&self) -> Result<Vec<Spool>> {
        let mut state = self.state();
        state.list_spool_calls += 1;
        Ok(state.spools.clone())
    }

    async fn create_spool(&self, spool: &SpoolCreate) -> Result<Spool> {
        let mut state = self.state();
        Self::check_write(&state)?;
        let filament = state
            .filaments
            .iter()
            .find(|f| f.id == spool.filament_id)
            .cloned()
            .ok_or_else(|| SpoolSyncError::Status {
                status: 400,
                body: format!("unknown filament {}", spool.filament_id),
            })?;
        let created = Spool {
            id: state.next_id(),
            filament,
            remaining_weight: spool.remaining_weight,
            location: spool.location.clone(),
            last_used: None,
            archived: false,
            extra: spool.extra.clone().unwrap_or_default(),
        };
        state.spools.push(created.clone());
        state.created_spools += 1;
        Ok(created)
    }

    async fn update_spool(&self, spool_id: i64, update: &SpoolUpdate) -> Result<Spool> {
        let mut state = self.state();
        Self::check_write(&state)?;
        let spool = state
            .spools
            .iter_mut()
            .find(|s| s.id == spool_id)
            .ok_or_else(|| SpoolSyncError::Status {
                status: 404,
                body: format!("spool {} not found", spool_id),
            })?;

        if let Some(weight) = update.remaining_weight {
            spool.remaining_weight = Some(weight);
        }
        if let Some(location) = &update.location {
            spool.location = (!location.is_empty()).then(|| location.clone());
        }
        if let Some(extra) = &update.extra {
            spool.extra.extend(extra.clone());
        }
        if let Some(last_used) = &update.last_used {
            spool.last_used = Some(last_used.clone());
        }
        let updated = spool.clone();
        state.updates.push((spool_id, update.clone()));
        Ok(updated)
    }

    async fn use_spool_weight(&self, spool_id: i64, grams: f64) -> Result<Spool> {
        let mut state = self.state();
        Self::check_write(&state)?;
        let spool = state
            .spools
            .iter_mut()
            .find(|s| s.id == spool_id)
            .ok_or_else(|| SpoolSyncError::Status {
                status: 404,
                body: format!("spool {} not found", spool_id),
            })?;
        spool.remaining_weight = spool.remaining_weight.map(|w| (w - grams).max(0.0));
        let updated = spool.clone();
        state.uses.push((spool_id, grams));
        Ok(updated)
    }

    async fn list_filaments(&self) -> Result<Vec<Filament>> {
        let state = self.state();
        let mut filaments = state.filaments.clone();
        for spool in &state.spools {
            if !filaments.iter().any(|f| f.id == spool.filament.id) {
                filaments.push(spool.filament.clone());
            }
        }
        Ok(filaments)
    }

    async fn create_filament(&self, filament: &FilamentCreate) -> Result<Filament> {
        let mut state = self.state();
        Self::check_write(&state)?;
        let vendor = filament
            .vendor_id
            .and_then(|id| state.vendors.iter().find(|v| v.id == id).cloned());
        let created = Filament {
            id: state.next_id(),
            name: Some(filament.name.clone()),
            vendor,
            material: Some(filament.material.clone()),
            color_hex: filament.color_hex.clone(),
            density: filament.density,
            diameter: filament.diameter,
            weight: filament.weight,
            external_id: filament.external_id.clone(),
        };
        state.filaments.push(created.clone());
        Ok(created)
    }

    async fn list_external_filaments(&self) -> Result<Vec<ExternalFilament>> {
        Ok(self.state().external.clone())
    }

    async fn list_vendors(&self) -> Result<Vec<Vendor>> {
        Ok(self.state().vendors.clone())
    }

    async fn create_vendor(&self, name: &str) -> Result<Vendor> {
        let mut state = self.state();
        Self::check_write(&state)?;
        let vendor = Vendor {
            id: state.next_id(),
            name: name.to_string(),
            external_id: None,
        };
        state.vendors.push(vendor.clone());
        Ok(vendor)
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

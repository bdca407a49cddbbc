//! AMS layout ingestion.
//!
//! Printers report AMS state in a few JSON shapes depending on firmware and
//! the path the report took. [`AmsLayout::from_raw`] resolves the shape once
//! so sync logic only ever sees normalized [`AmsUnit`]s and [`AmsTray`]s.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// First unit id used by single-tray high-temperature AMS units.
pub const HT_AMS_ID_START: u32 = 128;
/// Slots on a regular AMS or AMS lite unit.
pub const TRAYS_PER_UNIT: u32 = 4;
/// Global tray id of the lone external spool holder.
pub const EXTERNAL_SPOOL_TRAY_ID: u32 = 254;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayKind {
    /// Four-slot AMS / AMS lite unit.
    Regular,
    /// Single-slot AMS HT unit, addressed by its unit id.
    HighTemp,
    /// External spool holder.
    External,
}

/// One physical tray as last reported by the printer.
#[derive(Debug, Clone, PartialEq)]
pub struct AmsTray {
    pub kind: TrayKind,
    pub ams_id: u32,
    pub tray_id: u32,
    pub tray_uuid: String,
    pub tag_uid: String,
    pub tray_type: String,
    pub tray_color: String,
    pub tray_sub_brands: String,
    /// Bambu filament preset id (e.g. `GFA00`). Not proof of a Bambu spool.
    pub tray_info_idx: String,
    /// Remaining filament in percent, when the AMS could measure it.
    pub remain: Option<i32>,
    pub tray_weight: Option<f64>,
    pub tray_diameter: Option<f64>,
}

impl AmsTray {
    fn from_json(kind: TrayKind, ams_id: u32, tray: &Value) -> Option<Self> {
        if !tray.is_object() {
            return None;
        }
        let tray_id = tray.get("id").and_then(json_u32).unwrap_or(0);
        if kind == TrayKind::Regular && tray_id >= TRAYS_PER_UNIT {
            debug!("Ignoring tray id {} on AMS unit {}", tray_id, ams_id);
            return None;
        }
        Some(Self {
            kind,
            ams_id,
            tray_id,
            tray_uuid: json_string(tray, "tray_uuid"),
            tag_uid: json_string(tray, "tag_uid"),
            tray_type: json_string(tray, "tray_type"),
            tray_color: json_string(tray, "tray_color"),
            tray_sub_brands: json_string(tray, "tray_sub_brands"),
            tray_info_idx: json_string(tray, "tray_info_idx"),
            remain: tray
                .get("remain")
                .and_then(json_f64)
                .map(|r| r as i32)
                .filter(|r| *r >= 0),
            tray_weight: tray.get("tray_weight").and_then(json_f64).filter(|w| *w > 0.0),
            tray_diameter: tray.get("tray_diameter").and_then(json_f64).filter(|d| *d > 0.0),
        })
    }

    /// Flattened zero-based address of this tray on its printer.
    pub fn global_tray_id(&self) -> u32 {
        match self.kind {
            TrayKind::Regular => self.ams_id * TRAYS_PER_UNIT + self.tray_id,
            TrayKind::HighTemp => self.ams_id,
            TrayKind::External => EXTERNAL_SPOOL_TRAY_ID,
        }
    }

    /// Human label such as `AMS A1`, `AMS HT A` or `External Spool`.
    pub fn location_label(&self) -> String {
        match self.kind {
            TrayKind::Regular => format!("AMS {}{}", unit_letter(self.ams_id), self.tray_id + 1),
            TrayKind::HighTemp => {
                format!("AMS HT {}", unit_letter(self.ams_id - HT_AMS_ID_START))
            }
            TrayKind::External => "External Spool".to_string(),
        }
    }

    /// A tray with no material type has nothing loaded.
    pub fn is_empty(&self) -> bool {
        self.tray_type.trim().is_empty()
    }

    /// Remaining grams derived from the AMS percentage and nominal spool
    /// weight. `None` when the AMS could not measure it.
    pub fn remaining_weight(&self) -> Option<f64> {
        let weight = self.tray_weight?;
        let remain = self.remain?;
        Some(weight * f64::from(remain) / 100.0)
    }

    pub fn identity(&self) -> TrayIdentity {
        TrayIdentity {
            tray_uuid: self.tray_uuid.clone(),
            tag_uid: self.tag_uid.clone(),
            tray_type: self.tray_type.clone(),
        }
    }
}

fn unit_letter(index: u32) -> char {
    char::from_u32('A' as u32 + index).unwrap_or('?')
}

/// One AMS unit and its trays.
#[derive(Debug, Clone, PartialEq)]
pub struct AmsUnit {
    pub id: u32,
    pub trays: Vec<AmsTray>,
}

impl AmsUnit {
    fn from_json(default_id: u32, unit: &Value) -> Option<Self> {
        let id = unit.get("id").and_then(json_u32).unwrap_or(default_id);
        let kind = if id >= HT_AMS_ID_START {
            TrayKind::HighTemp
        } else {
            TrayKind::Regular
        };
        let trays = unit
            .get("tray")?
            .as_array()?
            .iter()
            .filter_map(|t| AmsTray::from_json(kind, id, t))
            .collect();
        Some(Self { id, trays })
    }

    pub fn is_high_temp(&self) -> bool {
        self.id >= HT_AMS_ID_START
    }
}

/// The AMS report resolved into one of the shapes printers send.
#[derive(Debug, Clone, PartialEq)]
pub enum AmsLayout {
    /// `[ {"id": 0, "tray": [...]}, ... ]`
    UnitList(Vec<AmsUnit>),
    /// `{"ams": [ {"id": 0, "tray": [...]}, ... ], ...}`
    UnitsDict(Vec<AmsUnit>),
    /// `{"id": 0, "tray": [...]}`
    SingleUnit(AmsUnit),
    /// Anything else. Treated as "no AMS", never as an error.
    Unrecognized,
}

impl AmsLayout {
    pub fn from_raw(raw: Option<&Value>) -> Self {
        let layout = match raw {
            Some(Value::Array(units)) => AmsLayout::UnitList(parse_units(units)),
            Some(value @ Value::Object(_)) => {
                if let Some(Value::Array(units)) = value.get("ams") {
                    AmsLayout::UnitsDict(parse_units(units))
                } else {
                    AmsUnit::from_json(0, value)
                        .map(AmsLayout::SingleUnit)
                        .unwrap_or(AmsLayout::Unrecognized)
                }
            }
            _ => AmsLayout::Unrecognized,
        };

        if layout == AmsLayout::Unrecognized && raw.is_some_and(|v| !v.is_null()) {
            debug!("Unrecognized AMS data shape, treating as empty");
        }
        layout
    }

    pub fn units(&self) -> &[AmsUnit] {
        match self {
            AmsLayout::UnitList(units) | AmsLayout::UnitsDict(units) => units,
            AmsLayout::SingleUnit(unit) => std::slice::from_ref(unit),
            AmsLayout::Unrecognized => &[],
        }
    }

    /// Trays in unit-then-tray order as reported.
    pub fn trays(&self) -> impl Iterator<Item = &AmsTray> {
        self.units().iter().flat_map(|u| u.trays.iter())
    }
}

fn parse_units(units: &[Value]) -> Vec<AmsUnit> {
    units
        .iter()
        .enumerate()
        .filter_map(|(i, u)| AmsUnit::from_json(i as u32, u))
        .collect()
}

/// Parse the external spool (`vt_tray`) report.
pub fn external_tray(raw: Option<&Value>) -> Option<AmsTray> {
    let raw = raw?;
    AmsTray::from_json(TrayKind::External, 255, raw).map(|mut tray| {
        tray.tray_id = 0;
        tray
    })
}

/// Hardware identity of the spool in a tray at print start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrayIdentity {
    pub tray_uuid: String,
    pub tag_uid: String,
    pub tray_type: String,
}

/// Global tray id to the spool identity seen there.
pub type AmsTraySnapshot = BTreeMap<u32, TrayIdentity>;

/// Snapshot every tray, including the external spool.
pub fn build_tray_snapshot<'a>(trays: impl IntoIterator<Item = &'a AmsTray>) -> AmsTraySnapshot {
    trays
        .into_iter()
        .map(|t| (t.global_tray_id(), t.identity()))
        .collect()
}

/// Map a 1-based slicer slot to a global tray id. A non-negative override
/// at `slot - 1` wins; otherwise the slot maps to tray `slot - 1`.
pub fn resolve_global_tray_id(slot_id: u32, slot_to_tray: Option<&[i32]>) -> u32 {
    let default = slot_id.saturating_sub(1);
    slot_to_tray
        .and_then(|mapping| mapping.get(default as usize))
        .and_then(|&tray| u32::try_from(tray).ok())
        .unwrap_or(default)
}

fn json_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite())
}

fn json_string(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

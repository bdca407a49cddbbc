use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Spoolman vendor record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub external_id: Option<String>,
}

/// Spoolman filament record (a product, not a physical spool).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filament {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub vendor: Option<Vendor>,
    #[serde(default)]
    pub material: Option<String>,
    /// Hex color without `#`, e.g. `ff0000`.
    #[serde(default)]
    pub color_hex: Option<String>,
    pub density: f64,
    pub diameter: f64,
    /// Net filament weight of a full spool in grams.
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub external_id: Option<String>,
}

impl Filament {
    pub fn vendor_id(&self) -> Option<i64> {
        self.vendor.as_ref().map(|v| v.id)
    }
}

/// Spoolman spool record: one physical spool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spool {
    pub id: i64,
    pub filament: Filament,
    #[serde(default)]
    pub remaining_weight: Option<f64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub last_used: Option<String>,
    #[serde(default)]
    pub archived: bool,
    /// Free-form extra fields. Values are JSON-encoded strings.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl Spool {
    pub fn filament_id(&self) -> i64 {
        self.filament.id
    }

    /// Raw stored value of the `tag` extra field.
    pub fn stored_tag(&self) -> Option<&str> {
        self.extra.get(super::tag::EXTRA_TAG_FIELD).map(String::as_str)
    }
}

/// Entry from Spoolman's external filament catalog (SpoolmanDB).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalFilament {
    pub id: String,
    pub manufacturer: String,
    pub name: String,
    pub material: String,
    pub density: f64,
    pub diameter: f64,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub spool_weight: Option<f64>,
    #[serde(default)]
    pub color_hex: Option<String>,
}

/// Body of `POST /spool`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpoolCreate {
    pub filament_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot_nr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<BTreeMap<String, String>>,
}

/// Body of `PATCH /spool/{id}`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpoolUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_weight: Option<f64>,
    /// `Some("")` clears the location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<String>,
}

/// Body of `POST /filament`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilamentCreate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<i64>,
    pub material: String,
    pub density: f64,
    pub diameter: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_hex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

/// Body of `POST /vendor`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorCreate {
    pub name: String,
}

/// Body of `PUT /spool/{id}/use`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UseWeight {
    pub use_weight: f64,
}

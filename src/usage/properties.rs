use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::three_mf::SliceFilament;
use super::units::{MaterialType, DEFAULT_DENSITY_G_CM3, DEFAULT_DIAMETER_MM};

/// Physical properties of the filament loaded in one slicer slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilamentProperty {
    pub filament_type: String,
    pub diameter_mm: f64,
    pub density_g_cm3: f64,
}

impl Default for FilamentProperty {
    fn default() -> Self {
        Self {
            filament_type: "PLA".to_string(),
            diameter_mm: DEFAULT_DIAMETER_MM,
            density_g_cm3: DEFAULT_DENSITY_G_CM3,
        }
    }
}

/// 1-based slot id to resolved properties. Slots that could not be resolved
/// are absent; callers fall back to [`FilamentProperty::default`].
pub type FilamentProperties = BTreeMap<u32, FilamentProperty>;

/// Resolve per-slot density, diameter and type.
///
/// Density priority: the explicit `filament_density` list in project
/// settings, then a material default derived from the slice metadata type,
/// then the PLA default. Best effort: malformed entries are skipped.
pub fn extract_filament_properties(
    project_settings: Option<&Value>,
    slice_filaments: &[SliceFilament],
) -> FilamentProperties {
    let densities = project_settings
        .map(|s| numeric_list(s, "filament_density"))
        .unwrap_or_default();
    let diameters = project_settings
        .map(|s| numeric_list(s, "filament_diameter"))
        .unwrap_or_default();
    let types = project_settings
        .map(|s| string_list(s, "filament_type"))
        .unwrap_or_default();

    let mut properties = FilamentProperties::new();

    for (index, density) in densities.iter().enumerate() {
        let Some(density) = density.filter(|d| *d > 0.0) else {
            continue;
        };
        let slot = index as u32 + 1;
        let filament_type = types
            .get(index)
            .cloned()
            .flatten()
            .or_else(|| slice_type(slice_filaments, slot))
            .unwrap_or_else(|| "PLA".to_string());
        properties.insert(
            slot,
            FilamentProperty {
                filament_type,
                diameter_mm: diameter_at(&diameters, index),
                density_g_cm3: density,
            },
        );
    }

    for filament in slice_filaments {
        if properties.contains_key(&filament.slot_id) || filament.filament_type.is_empty() {
            continue;
        }
        let index = (filament.slot_id as usize).saturating_sub(1);
        properties.insert(
            filament.slot_id,
            FilamentProperty {
                filament_type: filament.filament_type.clone(),
                diameter_mm: diameter_at(&diameters, index),
                density_g_cm3: MaterialType::from_str(&filament.filament_type).default_density(),
            },
        );
    }

    properties
}

fn slice_type(slice_filaments: &[SliceFilament], slot: u32) -> Option<String> {
    slice_filaments
        .iter()
        .find(|f| f.slot_id == slot && !f.filament_type.is_empty())
        .map(|f| f.filament_type.clone())
}

fn diameter_at(diameters: &[Option<f64>], index: usize) -> f64 {
    diameters
        .get(index)
        .copied()
        .flatten()
        .filter(|d| *d > 0.0)
        .unwrap_or(DEFAULT_DIAMETER_MM)
}

/// Bambu Studio stores numbers as strings inside arrays; accept both.
fn numeric_list(settings: &Value, key: &str) -> Vec<Option<f64>> {
    settings
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|v| match v {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                })
                .map(|v| v.filter(|f: &f64| f.is_finite()))
                .collect()
        })
        .unwrap_or_default()
}

fn string_list(settings: &Value, key: &str) -> Vec<Option<String>> {
    settings
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|v| v.as_str().filter(|s| !s.is_empty()).map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

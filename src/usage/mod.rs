//! Filament usage extraction from sliced print jobs.
//!
//! Pure, side-effect free pieces used by the tracker:
//! G-code layer tracking, per-slot filament properties, length-to-mass
//! conversion, and the 3MF reader that feeds them.

pub mod gcode;
pub mod properties;
pub mod three_mf;
pub mod units;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use gcode::{cumulative_usage_at_layer, parse_layer_usage, ChannelUsage, LayerUsage};
pub use properties::{extract_filament_properties, FilamentProperties, FilamentProperty};
pub use three_mf::{SliceFilament, ThreeMfContents};
pub use units::{mm_to_grams, MaterialType, DEFAULT_DENSITY_G_CM3, DEFAULT_DIAMETER_MM};

/// Total planned usage of one slicer slot for the whole print.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilamentUsage {
    /// 1-based slicer slot.
    pub slot_id: u32,
    pub used_g: f64,
    #[serde(rename = "type")]
    pub filament_type: String,
    pub color: String,
}

/// Everything derived from one 3MF at print start.
#[derive(Debug, Clone, Default)]
pub struct PrintJobAnalysis {
    pub filament_usage: Vec<FilamentUsage>,
    pub layer_usage: LayerUsage,
    pub properties: FilamentProperties,
}

impl PrintJobAnalysis {
    pub fn from_contents(contents: &ThreeMfContents) -> Self {
        let filament_usage = contents
            .slice_filaments
            .iter()
            .filter(|f| f.used_g > 0.0)
            .map(|f| FilamentUsage {
                slot_id: f.slot_id,
                used_g: f.used_g,
                filament_type: f.filament_type.clone(),
                color: f.color.clone(),
            })
            .collect();

        let layer_usage = contents
            .gcode
            .as_deref()
            .map(parse_layer_usage)
            .unwrap_or_default();

        let properties =
            extract_filament_properties(contents.project_settings.as_ref(), &contents.slice_filaments);

        Self {
            filament_usage,
            layer_usage,
            properties,
        }
    }
}

/// Read and analyze a sliced 3MF.
pub fn analyze_print_job(path: &Path) -> anyhow::Result<PrintJobAnalysis> {
    let contents = ThreeMfContents::load(path)?;
    Ok(PrintJobAnalysis::from_contents(&contents))
}

#[cfg(test)]
mod tests {
    use super::three_mf::test_support::write_3mf;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_analyze_print_job() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.3mf");
        write_3mf(
            &path,
            &[
                (
                    "Metadata/plate_1.gcode",
                    "M620 S0A\nM73 L1\nG1 E100\nM620 S1A\nM73 L2\nG1 E50\n",
                ),
                (
                    "Metadata/slice_info.config",
                    r##"<config><plate>
<filament id="1" type="PLA" color="#FF0000" used_m="1" used_g="3.0"/>
<filament id="2" type="PETG" color="#00FF00" used_m="0.5" used_g="1.5"/>
<filament id="3" type="PLA" color="#0000FF" used_m="0" used_g="0"/>
</plate></config>"##,
                ),
            ],
        );

        let analysis = analyze_print_job(&path).unwrap();
        assert_eq!(analysis.filament_usage.len(), 2);
        assert_eq!(analysis.filament_usage[1].filament_type, "PETG");
        assert_eq!(analysis.layer_usage[&2][&0], 100.0);
        assert_eq!(analysis.layer_usage[&2][&1], 50.0);
        assert_eq!(analysis.properties[&2].density_g_cm3, 1.27);
    }

    #[test]
    fn test_filament_usage_serializes_type_key() {
        let usage = FilamentUsage {
            slot_id: 1,
            used_g: 2.0,
            filament_type: "PLA".to_string(),
            color: "#FFFFFF".to_string(),
        };
        let json = serde_json::to_value(&usage).unwrap();
        assert_eq!(json["type"], "PLA");
    }
}

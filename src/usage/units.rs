use serde::{Deserialize, Serialize};

/// Density used when nothing better is known (generic PLA).
pub const DEFAULT_DENSITY_G_CM3: f64 = 1.24;
/// Filament diameter used when nothing better is known.
pub const DEFAULT_DIAMETER_MM: f64 = 1.75;

/// Convert an extruded filament length to grams.
///
/// Volume is computed in cm³ from the filament cross-section, so the
/// diameter is halved and converted mm -> cm (`/ 20`) and the length
/// converted mm -> cm (`/ 10`).
pub fn mm_to_grams(length_mm: f64, diameter_mm: f64, density_g_cm3: f64) -> f64 {
    let radius_cm = diameter_mm / 20.0;
    let length_cm = length_mm / 10.0;
    std::f64::consts::PI * radius_cm * radius_cm * length_cm * density_g_cm3
}

/// Recognized material families, used for density defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MaterialType {
    PLA,
    PETG,
    ABS,
    ASA,
    TPU,
    Nylon,
    PC,
    PVA,
    HIPS,
    Other(String),
}

impl MaterialType {
    /// Classify a material string by case-insensitive substring.
    /// PLA is checked before PA so "PLA" is never read as nylon, and PC
    /// before ABS so "PC-ABS" lands on PC.
    pub fn from_str(input: &str) -> MaterialType {
        let upper = input.to_uppercase();

        if upper.contains("PLA") {
            MaterialType::PLA
        } else if upper.contains("PETG") || upper.contains("PET") {
            MaterialType::PETG
        } else if upper.contains("ASA") {
            MaterialType::ASA
        } else if upper.contains("HIPS") {
            MaterialType::HIPS
        } else if upper.contains("PVA") {
            MaterialType::PVA
        } else if upper.contains("PC") || upper.contains("POLYCARBONATE") {
            MaterialType::PC
        } else if upper.contains("ABS") {
            MaterialType::ABS
        } else if upper.contains("TPU") || upper.contains("TPE") {
            MaterialType::TPU
        } else if upper.contains("PA") || upper.contains("NYLON") {
            MaterialType::Nylon
        } else {
            MaterialType::Other(input.to_string())
        }
    }

    /// Typical density in g/cm³ for the family.
    pub fn default_density(&self) -> f64 {
        match self {
            MaterialType::PLA => 1.24,
            MaterialType::PETG => 1.27,
            MaterialType::ABS => 1.04,
            MaterialType::ASA => 1.07,
            MaterialType::TPU => 1.21,
            MaterialType::Nylon => 1.14,
            MaterialType::PC => 1.20,
            MaterialType::PVA => 1.23,
            MaterialType::HIPS => 1.04,
            MaterialType::Other(_) => DEFAULT_DENSITY_G_CM3,
        }
    }
}

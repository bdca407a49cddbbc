//! Reading the parts of a sliced Bambu Studio 3MF that usage tracking needs.
//!
//! A sliced 3MF is a ZIP container. The relevant members are:
//!
//! - `Metadata/plate_<n>.gcode`: the embedded G-code
//! - `Metadata/slice_info.config`: XML with per-filament totals
//! - `Metadata/project_settings.config`: JSON with per-filament properties

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use zip::ZipArchive;

const SLICE_INFO_PATH: &str = "Metadata/slice_info.config";
const PROJECT_SETTINGS_PATH: &str = "Metadata/project_settings.config";

/// One `<filament>` entry from `slice_info.config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceFilament {
    /// 1-based slot id as assigned by the slicer.
    pub slot_id: u32,
    pub filament_type: String,
    pub color: String,
    pub used_m: f64,
    pub used_g: f64,
}

/// Everything usage tracking reads out of one 3MF.
#[derive(Debug, Clone, Default)]
pub struct ThreeMfContents {
    pub gcode: Option<String>,
    pub slice_filaments: Vec<SliceFilament>,
    pub project_settings: Option<Value>,
}

impl ThreeMfContents {
    /// Open a 3MF and pull out G-code and slicing metadata.
    ///
    /// Missing members are left empty; only an unreadable container is an
    /// error.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open 3MF {:?}", path))?;
        let mut archive = ZipArchive::new(BufReader::new(file))
            .with_context(|| format!("Invalid ZIP container {:?}", path))?;

        let gcode = read_plate_gcode(&mut archive);

        let slice_filaments = match read_member(&mut archive, SLICE_INFO_PATH) {
            Some(xml) => parse_slice_filaments(&xml).unwrap_or_else(|e| {
                warn!("Failed to parse slice info in {:?}: {}", path, e);
                Vec::new()
            }),
            None => Vec::new(),
        };

        let project_settings = read_member(&mut archive, PROJECT_SETTINGS_PATH).and_then(|json| {
            serde_json::from_str(&json)
                .map_err(|e| warn!("Invalid project settings JSON in {:?}: {}", path, e))
                .ok()
        });

        debug!(
            "Loaded 3MF {:?}: gcode={}, filaments={}, project_settings={}",
            path,
            gcode.is_some(),
            slice_filaments.len(),
            project_settings.is_some()
        );

        Ok(Self {
            gcode,
            slice_filaments,
            project_settings,
        })
    }
}

fn read_member<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<String> {
    let mut file = archive.by_name(name).ok()?;
    let mut content = String::new();
    match file.read_to_string(&mut content) {
        Ok(_) => Some(content),
        Err(e) => {
            warn!("Failed to read 3MF member {}: {}", name, e);
            None
        }
    }
}

/// First `Metadata/plate_<n>.gcode`, preferring plate 1.
fn read_plate_gcode<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Option<String> {
    if let Some(gcode) = read_member(archive, "Metadata/plate_1.gcode") {
        return Some(gcode);
    }

    let name = archive
        .file_names()
        .filter(|n| n.starts_with("Metadata/plate_") && n.ends_with(".gcode"))
        .min()
        .map(str::to_string)?;
    read_member(archive, &name)
}

/// Parse the `<filament .../>` elements of `slice_info.config`.
pub fn parse_slice_filaments(xml: &str) -> Result<Vec<SliceFilament>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut filaments = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e) | Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"filament" {
                    if let Some(filament) = parse_filament_element(e) {
                        filaments.push(filament);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow::anyhow!("XML parse error: {}", e)),
            _ => {}
        }
        buf.clear();
    }

    filaments.sort_by_key(|f| f.slot_id);
    Ok(filaments)
}

fn parse_filament_element(element: &BytesStart<'_>) -> Option<SliceFilament> {
    let mut slot_id = None;
    let mut filament_type = String::new();
    let mut color = String::new();
    let mut used_m = 0.0;
    let mut used_g = 0.0;

    for attr in element.attributes().flatten() {
        let Ok(value) = std::str::from_utf8(&attr.value) else {
            continue;
        };
        match attr.key.local_name().as_ref() {
            b"id" => slot_id = value.trim().parse::<u32>().ok(),
            b"type" => filament_type = value.to_string(),
            b"color" => color = value.to_string(),
            b"used_m" => used_m = value.trim().parse().unwrap_or(0.0),
            b"used_g" => used_g = value.trim().parse().unwrap_or(0.0),
            _ => {}
        }
    }

    Some(SliceFilament {
        slot_id: slot_id.filter(|id| *id > 0)?,
        filament_type,
        color,
        used_m,
        used_g,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Write;
    use std::path::Path;

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// Write a minimal sliced 3MF with the given members.
    pub fn write_3mf(path: &Path, members: &[(&str, &str)]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in members {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
}

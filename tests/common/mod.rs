#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use bambumate_spoolsync::config::{
    MemorySettings, KEY_DISABLE_WEIGHT_SYNC, KEY_SPOOLMAN_ENABLED, KEY_SPOOLMAN_URL,
};
use bambumate_spoolsync::printer::{PrinterInfo, PrinterState, PrinterStateProvider};
use bambumate_spoolsync::spoolman::tag::encode_tag;
use bambumate_spoolsync::spoolman::types::{Filament, Spool};

pub const UUID_WHITE: &str = "A1B2C3D4E5F60718293A4B5C6D7E8F90";
pub const UUID_BLACK: &str = "0F1E2D3C4B5A69788796A5B4C3D2E1F0";
pub const UUID_RED: &str = "11223344556677889900AABBCCDDEEFF";
pub const TAG_GREEN: &str = "8899AABBCCDDEEFF";

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Build a sliced 3MF at `dest` from the two-color fixtures.
pub fn write_two_color_3mf(dest: &Path) {
    let members = [
        ("Metadata/plate_1.gcode", "two_color_plate_1.gcode"),
        ("Metadata/slice_info.config", "two_color_slice_info.config"),
        ("Metadata/project_settings.config", "two_color_project_settings.config"),
    ];

    let file = std::fs::File::create(dest).expect("Failed to create 3MF");
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (member, fixture) in members {
        let content = std::fs::read(fixture_path(fixture)).expect("Missing fixture");
        zip.start_file(member, options).expect("Failed to start member");
        zip.write_all(&content).expect("Failed to write member");
    }
    zip.finish().expect("Failed to finish 3MF");
}

/// Settings with Spoolman on and AMS weight sync off, i.e. usage tracking
/// active.
pub fn tracking_settings() -> MemorySettings {
    MemorySettings::new()
        .with(KEY_SPOOLMAN_ENABLED, "true")
        .with(KEY_SPOOLMAN_URL, "http://spoolman.local:7912")
        .with(KEY_DISABLE_WEIGHT_SYNC, "true")
}

pub fn tray_json(tray_id: u32, tray_uuid: &str, tag_uid: &str, tray_type: &str, color: &str) -> Value {
    json!({
        "id": tray_id.to_string(),
        "tray_uuid": tray_uuid,
        "tag_uid": tag_uid,
        "tray_type": tray_type,
        "tray_color": color,
        "tray_sub_brands": format!("{} Basic", tray_type),
        "tray_info_idx": "GFA00",
        "remain": 80,
        "tray_weight": "1000",
        "tray_diameter": "1.75"
    })
}

pub fn empty_tray_json(tray_id: u32) -> Value {
    json!({ "id": tray_id.to_string() })
}

pub fn ams_units(units: Vec<Vec<Value>>) -> Value {
    Value::Array(
        units
            .into_iter()
            .enumerate()
            .map(|(id, trays)| json!({ "id": id.to_string(), "tray": trays }))
            .collect(),
    )
}

pub fn printer_state(raw_ams: Value) -> PrinterState {
    PrinterState {
        connected: true,
        raw_ams: Some(raw_ams),
        raw_vt_tray: None,
        current_layer: 0,
        total_layers: 0,
    }
}

pub fn spool(id: i64, tag: Option<&str>, location: Option<&str>) -> Spool {
    let mut extra = BTreeMap::new();
    if let Some(tag) = tag {
        extra.insert("tag".to_string(), encode_tag(tag));
    }
    Spool {
        id,
        filament: Filament {
            id: 100 + id,
            name: Some("PLA Basic".to_string()),
            vendor: None,
            material: Some("PLA".to_string()),
            color_hex: Some("ffffff".to_string()),
            density: 1.24,
            diameter: 1.75,
            weight: Some(1000.0),
            external_id: None,
        },
        remaining_weight: Some(1000.0),
        location: location.map(str::to_string),
        last_used: None,
        archived: false,
        extra,
    }
}

/// Printer directory whose state tests can change between calls.
#[derive(Default)]
pub struct FakePrinters {
    printers: Mutex<Vec<(PrinterInfo, PrinterState)>>,
}

impl FakePrinters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, id: i64, name: &str, state: PrinterState) {
        self.printers.lock().unwrap().push((
            PrinterInfo {
                id,
                name: name.to_string(),
            },
            state,
        ));
    }

    pub fn set_layer(&self, id: i64, current_layer: i64, total_layers: i64) {
        let mut printers = self.printers.lock().unwrap();
        if let Some((_, state)) = printers.iter_mut().find(|(info, _)| info.id == id) {
            state.current_layer = current_layer;
            state.total_layers = total_layers;
        }
    }

    pub fn state(&self, id: i64) -> PrinterState {
        self.printers
            .lock()
            .unwrap()
            .iter()
            .find(|(info, _)| info.id == id)
            .map(|(_, state)| state.clone())
            .expect("Unknown printer")
    }
}

#[async_trait]
impl PrinterStateProvider for FakePrinters {
    async fn printer_state(&self, printer_id: i64) -> Option<PrinterState> {
        self.printers
            .lock()
            .unwrap()
            .iter()
            .find(|(info, _)| info.id == printer_id)
            .map(|(_, state)| state.clone())
    }

    async fn list_printers(&self) -> Vec<PrinterInfo> {
        self.printers
            .lock()
            .unwrap()
            .iter()
            .map(|(info, _)| info.clone())
            .collect()
    }
}

/// Slot mapping reader backed by a fixed map of raw JSON strings.
#[derive(Default)]
pub struct FixedSlotMappings(pub HashMap<(i64, i64), String>);

#[async_trait]
impl bambumate_spoolsync::QueueSlotMappingReader for FixedSlotMappings {
    async fn slot_mapping(&self, printer_id: i64, archive_id: i64) -> Option<String> {
        self.0.get(&(printer_id, archive_id)).cloned()
    }
}

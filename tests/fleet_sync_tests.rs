mod common;

use std::sync::Arc;

use serde_json::json;

use bambumate_spoolsync::config::{MemorySettings, KEY_DISABLE_WEIGHT_SYNC};
use bambumate_spoolsync::error::SpoolSyncError;
use bambumate_spoolsync::fleet::FleetSyncOrchestrator;
use bambumate_spoolsync::printer::PrinterState;
use bambumate_spoolsync::spoolman::{MemoryInventory, SpoolmanService};

use common::*;

fn orchestrator(
    inventory: &Arc<MemoryInventory>,
    printers: &Arc<FakePrinters>,
    settings: MemorySettings,
) -> FleetSyncOrchestrator {
    FleetSyncOrchestrator::new(
        Arc::new(SpoolmanService::with_api(inventory.clone())),
        printers.clone(),
        Arc::new(settings),
    )
}

fn location_of(inventory: &MemoryInventory, spool_id: i64) -> Option<String> {
    inventory
        .spools()
        .into_iter()
        .find(|s| s.id == spool_id)
        .and_then(|s| s.location)
}

#[tokio::test]
async fn test_fleet_sync_lists_spools_once_for_whole_batch() {
    let inventory = Arc::new(MemoryInventory::new());
    inventory.insert_spool(spool(1, Some(UUID_WHITE), None));

    let printers = FakePrinters::new();
    printers.add(
        1,
        "X1C",
        printer_state(ams_units(vec![vec![
            tray_json(0, UUID_WHITE, "", "PLA", "FFFFFFFF"),
            tray_json(1, "", "", "PETG", "00FF00FF"),
            tray_json(2, UUID_RED, "", "PLA", "FF0000FF"),
            empty_tray_json(3),
        ]])),
    );
    printers.add(
        2,
        "P1S",
        printer_state(ams_units(vec![vec![tray_json(0, "", TAG_GREEN, "PLA", "00AA00FF")]])),
    );

    let result = orchestrator(&inventory, &printers, tracking_settings())
        .sync_all()
        .await
        .unwrap();

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(inventory.list_spool_calls(), 1);
    assert_eq!(result.synced_count, 3);
    assert_eq!(result.skipped_count, 1);
    assert_eq!(result.skipped[0].printer, "X1C");
    assert_eq!(result.skipped[0].location, "AMS A2");
    assert!(result.skipped[0].reason.contains("not a Bambu Lab spool"));

    assert_eq!(inventory.created_spool_count(), 2);
    assert_eq!(inventory.vendors().len(), 1);
    assert_eq!(location_of(&inventory, 1).as_deref(), Some("X1C - AMS A1"));
    let locations: Vec<_> = inventory.spools().into_iter().filter_map(|s| s.location).collect();
    assert!(locations.contains(&"X1C - AMS A3".to_string()));
    assert!(locations.contains(&"P1S - AMS A1".to_string()));
}

#[tokio::test]
async fn test_removed_spool_location_cleared_exactly_once() {
    let inventory = Arc::new(MemoryInventory::new());
    inventory.insert_spool(spool(1, Some(UUID_WHITE), Some("PrinterA - AMS A2")));
    inventory.insert_spool(spool(5, Some(UUID_RED), Some("PrinterA - AMS A1")));
    inventory.insert_spool(spool(6, Some(UUID_BLACK), Some("PrinterB - AMS A1")));
    inventory.insert_spool(spool(7, None, Some("PrinterA - AMS A3")));

    let printers = FakePrinters::new();
    printers.add(
        1,
        "PrinterA",
        printer_state(ams_units(vec![vec![tray_json(0, UUID_WHITE, "", "PLA", "FFFFFFFF")]])),
    );

    let fleet = orchestrator(&inventory, &printers, tracking_settings());
    let first = fleet.sync_printer(1).await.unwrap();
    let second = fleet.sync_printer(1).await.unwrap();

    assert_eq!(first.cleared_count, 1);
    assert_eq!(second.cleared_count, 0);
    assert_eq!(location_of(&inventory, 5), None);
    assert_eq!(location_of(&inventory, 1).as_deref(), Some("PrinterA - AMS A1"));
    assert_eq!(location_of(&inventory, 6).as_deref(), Some("PrinterB - AMS A1"));
    assert_eq!(location_of(&inventory, 7).as_deref(), Some("PrinterA - AMS A3"));

    let clears: Vec<_> = inventory
        .updates()
        .into_iter()
        .filter(|(id, _)| *id == 5)
        .collect();
    assert_eq!(clears.len(), 1);
    assert_eq!(clears[0].1.location.as_deref(), Some(""));
}

#[tokio::test]
async fn test_sync_printer_prerequisites() {
    let inventory = Arc::new(MemoryInventory::new());
    let printers = FakePrinters::new();
    printers.add(
        2,
        "Offline",
        PrinterState {
            connected: false,
            ..Default::default()
        },
    );

    let fleet = orchestrator(&inventory, &printers, tracking_settings());
    assert!(matches!(
        fleet.sync_printer(2).await,
        Err(SpoolSyncError::PrinterNotConnected(2))
    ));
    assert!(matches!(
        fleet.sync_printer(42).await,
        Err(SpoolSyncError::PrinterNotConnected(42))
    ));

    let unconfigured = FleetSyncOrchestrator::new(
        Arc::new(SpoolmanService::new()),
        printers.clone(),
        Arc::new(tracking_settings()),
    );
    assert!(matches!(
        unconfigured.sync_all().await,
        Err(SpoolSyncError::NotConfigured)
    ));
    assert_eq!(inventory.list_spool_calls(), 0);
}

#[tokio::test]
async fn test_sync_all_skips_disconnected_printers() {
    let inventory = Arc::new(MemoryInventory::new());
    let printers = FakePrinters::new();
    let mut offline = printer_state(ams_units(vec![vec![tray_json(
        0, UUID_RED, "", "PLA", "FF0000FF",
    )]]));
    offline.connected = false;
    printers.add(1, "Offline", offline);
    printers.add(
        2,
        "Online",
        printer_state(ams_units(vec![vec![tray_json(0, UUID_WHITE, "", "PLA", "FFFFFFFF")]])),
    );

    let result = orchestrator(&inventory, &printers, tracking_settings())
        .sync_all()
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.synced_count, 1);
    assert_eq!(inventory.spools().len(), 1);
    assert_eq!(
        inventory.spools()[0].location.as_deref(),
        Some("Online - AMS A1")
    );
}

#[tokio::test]
async fn test_weight_sync_setting_controls_updates_only() {
    let inventory = Arc::new(MemoryInventory::new());
    inventory.insert_spool(spool(1, Some(UUID_WHITE), None));
    let printers = FakePrinters::new();
    printers.add(
        1,
        "X1C",
        printer_state(ams_units(vec![vec![
            tray_json(0, UUID_WHITE, "", "PLA", "FFFFFFFF"),
            tray_json(1, UUID_RED, "", "PLA", "FF0000FF"),
        ]])),
    );

    let settings = MemorySettings::new().with(KEY_DISABLE_WEIGHT_SYNC, "true");
    orchestrator(&inventory, &printers, settings)
        .sync_printer(1)
        .await
        .unwrap();

    let updates = inventory.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.remaining_weight, None);
    assert!(updates[0].1.last_used.is_some());

    let created = inventory
        .spools()
        .into_iter()
        .find(|s| s.id != 1)
        .unwrap();
    assert_eq!(created.remaining_weight, Some(800.0));
}

#[tokio::test]
async fn test_tray_failures_do_not_abort_batch() {
    let inventory = Arc::new(MemoryInventory::new());
    inventory.insert_spool(spool(1, Some(UUID_WHITE), None));
    inventory.fail_writes(true);
    let printers = FakePrinters::new();
    printers.add(
        1,
        "X1C",
        printer_state(ams_units(vec![vec![
            tray_json(0, UUID_WHITE, "", "PLA", "FFFFFFFF"),
            tray_json(1, "", "", "PLA", "FFFFFFFF"),
            tray_json(2, UUID_RED, "", "PLA", "FF0000FF"),
        ]])),
    );

    let result = orchestrator(&inventory, &printers, tracking_settings())
        .sync_printer(1)
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.synced_count, 0);
    assert_eq!(result.skipped_count, 1);
    assert!(result.errors[0].contains("AMS A1"));
}

#[tokio::test]
async fn test_unrecognized_ams_shape_is_not_an_error() {
    let inventory = Arc::new(MemoryInventory::new());
    inventory.insert_spool(spool(1, Some(UUID_WHITE), Some("X1C - AMS A1")));
    let printers = FakePrinters::new();
    printers.add(1, "X1C", printer_state(json!("garbled")));

    let result = orchestrator(&inventory, &printers, tracking_settings())
        .sync_printer(1)
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.synced_count + result.skipped_count + result.cleared_count, 0);
    assert_eq!(location_of(&inventory, 1).as_deref(), Some("X1C - AMS A1"));
    assert_eq!(inventory.write_count(), 0);
}

#[tokio::test]
async fn test_unrecognized_ams_with_external_spool_keeps_ams_locations() {
    let inventory = Arc::new(MemoryInventory::new());
    inventory.insert_spool(spool(1, Some(UUID_WHITE), Some("X1C - AMS A1")));
    let printers = FakePrinters::new();
    let mut state = printer_state(json!("garbled"));
    state.raw_vt_tray = Some(json!({
        "id": "254",
        "tray_uuid": UUID_BLACK,
        "tray_type": "PETG",
        "tray_color": "000000FF",
        "remain": 40,
        "tray_weight": "1000"
    }));
    printers.add(1, "X1C", state);

    let result = orchestrator(&inventory, &printers, tracking_settings())
        .sync_printer(1)
        .await
        .unwrap();

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.synced_count, 1);
    assert_eq!(result.cleared_count, 0);
    assert_eq!(location_of(&inventory, 1).as_deref(), Some("X1C - AMS A1"));
    assert!(inventory.updates().iter().all(|(id, _)| *id != 1));
    assert!(inventory
        .spools()
        .iter()
        .any(|s| s.location.as_deref() == Some("X1C - External Spool")));
}

#[tokio::test]
async fn test_high_temp_unit_and_external_spool_locations() {
    let inventory = Arc::new(MemoryInventory::new());
    let printers = FakePrinters::new();
    let mut state = printer_state(json!({
        "ams": [
            { "id": "128", "tray": [tray_json(0, UUID_RED, "", "PA-CF", "222222FF")] }
        ]
    }));
    state.raw_vt_tray = Some(json!({
        "id": "254",
        "tray_uuid": UUID_BLACK,
        "tray_type": "PETG",
        "tray_color": "000000FF",
        "remain": -1,
        "tray_weight": "1000"
    }));
    printers.add(1, "H2D", state);

    let result = orchestrator(&inventory, &printers, tracking_settings())
        .sync_printer(1)
        .await
        .unwrap();

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.synced_count, 2);
    let mut locations: Vec<_> = inventory.spools().into_iter().filter_map(|s| s.location).collect();
    locations.sort();
    assert_eq!(locations, vec!["H2D - AMS HT A", "H2D - External Spool"]);

    // Unmeasured remain falls back to the full spool weight on creation.
    let external = inventory
        .spools()
        .into_iter()
        .find(|s| s.location.as_deref() == Some("H2D - External Spool"))
        .unwrap();
    assert_eq!(external.remaining_weight, Some(1000.0));
}

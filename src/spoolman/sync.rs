//! Reconciling AMS trays against Spoolman spools.
//!
//! Every operation accepts an optional caller-owned spool list. When present
//! it is used instead of listing spools again, and spools created or updated
//! here are written back into it so later trays in the same batch see them.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::tag::{
    encode_tag, is_printer_location, normalize_tag, resolve_spool_tag, stored_tag_matches,
    tray_location, tray_tags, EXTRA_TAG_FIELD,
};
use super::types::{ExternalFilament, Filament, FilamentCreate, Spool, SpoolCreate, SpoolUpdate};
use super::InventoryApi;
use crate::error::Result;
use crate::printer::AmsTray;
use crate::usage::{MaterialType, DEFAULT_DIAMETER_MM};

/// Vendor name under which Bambu spools are catalogued.
pub const BAMBU_VENDOR: &str = "Bambu Lab";
/// Net weight assumed for a Bambu spool when the AMS does not report one.
const DEFAULT_SPOOL_WEIGHT_G: f64 = 1000.0;

/// Find the spool whose stored tag matches `tag`, case-insensitively.
///
/// Uses `cached_spools` without any network call when given; otherwise
/// lists all spools.
pub async fn find_spool_by_tag(
    api: &dyn InventoryApi,
    tag: &str,
    cached_spools: Option<&[Spool]>,
) -> Result<Option<Spool>> {
    if tag.trim().is_empty() {
        return Ok(None);
    }

    let fetched;
    let spools = match cached_spools {
        Some(spools) => spools,
        None => {
            fetched = api.list_spools().await?;
            fetched.as_slice()
        }
    };

    Ok(spools
        .iter()
        .find(|s| s.stored_tag().is_some_and(|stored| stored_tag_matches(stored, tag)))
        .cloned())
}

/// Find a spool by any identifier the tray exposes, preferred tag first.
async fn find_spool_for_tray(
    api: &dyn InventoryApi,
    tray: &AmsTray,
    cached_spools: Option<&[Spool]>,
) -> Result<Option<Spool>> {
    let fetched;
    let spools = match cached_spools {
        Some(spools) => spools,
        None => {
            fetched = api.list_spools().await?;
            fetched.as_slice()
        }
    };

    for tag in tray_tags(tray) {
        if let Some(spool) = find_spool_by_tag(api, &tag, Some(spools)).await? {
            return Ok(Some(spool));
        }
    }
    Ok(None)
}

/// Bring Spoolman in line with one AMS tray.
///
/// Returns `Ok(None)` when the tray holds no Bambu Lab identified spool.
/// An existing spool gets its location and last-used time refreshed, plus
/// remaining weight unless `disable_weight_sync` is set. A missing spool is
/// created (with its filament if needed); creation always carries a weight.
pub async fn sync_ams_tray(
    api: &dyn InventoryApi,
    tray: &AmsTray,
    printer_name: &str,
    disable_weight_sync: bool,
    mut cached_spools: Option<&mut Vec<Spool>>,
) -> Result<Option<Spool>> {
    let Some(tag) = resolve_spool_tag(&tray.tray_uuid, &tray.tag_uid) else {
        return Ok(None);
    };
    let location = tray_location(printer_name, tray);

    let existing = find_spool_for_tray(api, tray, cached_spools.as_deref().map(Vec::as_slice)).await?;

    let spool = match existing {
        Some(existing) => {
            let update = SpoolUpdate {
                remaining_weight: if disable_weight_sync {
                    None
                } else {
                    tray.remaining_weight()
                },
                location: Some(location.clone()),
                extra: None,
                last_used: Some(Utc::now().to_rfc3339()),
            };
            let updated = api.update_spool(existing.id, &update).await?;
            debug!("Updated spool {} at {}", updated.id, location);
            if let Some(cache) = cached_spools.as_deref_mut() {
                match cache.iter_mut().find(|s| s.id == updated.id) {
                    Some(slot) => *slot = updated.clone(),
                    None => cache.push(updated.clone()),
                }
            }
            updated
        }
        None => {
            let filament = find_or_create_filament(api, tray).await?;
            let create = SpoolCreate {
                filament_id: filament.id,
                remaining_weight: Some(
                    tray.remaining_weight()
                        .or(tray.tray_weight)
                        .unwrap_or(DEFAULT_SPOOL_WEIGHT_G),
                ),
                location: Some(location.clone()),
                lot_nr: None,
                comment: Some("Added by BambuMate from AMS".to_string()),
                extra: Some(BTreeMap::from([(EXTRA_TAG_FIELD.to_string(), encode_tag(&tag))])),
            };
            let created = api.create_spool(&create).await?;
            info!(
                "Created spool {} (filament {}) for tag {} at {}",
                created.id, filament.id, tag, location
            );
            if let Some(cache) = cached_spools.as_deref_mut() {
                cache.push(created.clone());
            }
            created
        }
    };

    Ok(Some(spool))
}

/// Clear the location of spools this printer no longer holds.
///
/// Considers only tagged spools at one of the printer's tray locations
/// (see [`is_printer_location`]). `current_tags` must hold normalized tags (see
/// [`normalize_tag`]). Returns the number of spools cleared; individual
/// failures are logged and skipped.
pub async fn clear_location_for_removed_spools(
    api: &dyn InventoryApi,
    printer_name: &str,
    current_tags: &HashSet<String>,
    cached_spools: &mut [Spool],
) -> usize {
    let mut cleared = 0;

    for spool in cached_spools.iter_mut() {
        let at_printer = spool
            .location
            .as_deref()
            .is_some_and(|loc| is_printer_location(printer_name, loc));
        if !at_printer {
            continue;
        }
        let Some(tag) = spool.stored_tag().map(super::tag::decode_tag) else {
            continue;
        };
        if tag.is_empty() || current_tags.contains(&normalize_tag(&tag)) {
            continue;
        }

        let update = SpoolUpdate {
            location: Some(String::new()),
            ..Default::default()
        };
        match api.update_spool(spool.id, &update).await {
            Ok(_) => {
                info!(
                    "Cleared location of spool {} (was {:?})",
                    spool.id, spool.location
                );
                spool.location = None;
                cleared += 1;
            }
            Err(e) => warn!("Failed to clear location of spool {}: {}", spool.id, e),
        }
    }

    cleared
}

/// Strip `#` and any alpha channel: `#FF8800FF` -> `ff8800`.
pub fn normalize_color_hex(color: &str) -> String {
    let hex = color.trim().trim_start_matches('#').to_ascii_lowercase();
    if hex.len() == 8 {
        hex.get(..6).map(str::to_string).unwrap_or(hex)
    } else {
        hex
    }
}

fn same_color(a: Option<&str>, b: &str) -> bool {
    a.is_some_and(|a| normalize_color_hex(a) == normalize_color_hex(b))
}

/// Find a matching filament in Spoolman, then in the external catalog, and
/// create one if neither has it.
pub async fn find_or_create_filament(api: &dyn InventoryApi, tray: &AmsTray) -> Result<Filament> {
    let material = tray.tray_type.trim();
    let color = normalize_color_hex(&tray.tray_color);

    let filaments = api.list_filaments().await?;
    let internal = filaments.into_iter().find(|f| {
        f.vendor
            .as_ref()
            .is_some_and(|v| v.name.eq_ignore_ascii_case(BAMBU_VENDOR))
            && f.material
                .as_deref()
                .is_some_and(|m| m.eq_ignore_ascii_case(material))
            && same_color(f.color_hex.as_deref(), &color)
    });
    if let Some(filament) = internal {
        debug!("Matched existing filament {} for {} #{}", filament.id, material, color);
        return Ok(filament);
    }

    let vendor_id = ensure_vendor(api, BAMBU_VENDOR).await?;

    let external = match api.list_external_filaments().await {
        Ok(catalog) => find_external_match(&catalog, material, &color).cloned(),
        Err(e) => {
            warn!("External filament catalog unavailable: {}", e);
            None
        }
    };

    let create = match external {
        Some(ext) => FilamentCreate {
            name: ext.name.clone(),
            vendor_id: Some(vendor_id),
            material: ext.material.clone(),
            density: ext.density,
            diameter: ext.diameter,
            weight: ext.weight,
            color_hex: ext.color_hex.as_deref().map(normalize_color_hex),
            external_id: Some(ext.id.clone()),
        },
        None => {
            let name = if tray.tray_sub_brands.is_empty() {
                material.to_string()
            } else {
                tray.tray_sub_brands.clone()
            };
            FilamentCreate {
                name,
                vendor_id: Some(vendor_id),
                material: material.to_string(),
                density: MaterialType::from_str(material).default_density(),
                diameter: tray.tray_diameter.unwrap_or(DEFAULT_DIAMETER_MM),
                weight: Some(tray.tray_weight.unwrap_or(DEFAULT_SPOOL_WEIGHT_G)),
                color_hex: (!color.is_empty()).then(|| color.clone()),
                external_id: None,
            }
        }
    };

    let filament = api.create_filament(&create).await?;
    info!("Created filament {} ({} #{})", filament.id, material, color);
    Ok(filament)
}

fn find_external_match<'a>(
    catalog: &'a [ExternalFilament],
    material: &str,
    color: &str,
) -> Option<&'a ExternalFilament> {
    catalog.iter().find(|f| {
        f.manufacturer.eq_ignore_ascii_case(BAMBU_VENDOR)
            && f.material.eq_ignore_ascii_case(material)
            && same_color(f.color_hex.as_deref(), color)
    })
}

async fn ensure_vendor(api: &dyn InventoryApi, name: &str) -> Result<i64> {
    let vendors = api.list_vendors().await?;
    if let Some(vendor) = vendors.iter().find(|v| v.name.eq_ignore_ascii_case(name)) {
        return Ok(vendor.id);
    }
    let vendor = api.create_vendor(name).await?;
    info!("Created vendor {} ({})", vendor.id, name);
    Ok(vendor.id)
}

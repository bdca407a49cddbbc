//! Spool identity: hardware tag checks and the stored `extra.tag` format.
//!
//! Spoolman keeps `extra` values JSON-encoded, so a tag is stored as
//! `"\"<hex>\""`. [`encode_tag`] and [`decode_tag`] are the only places that
//! know about the quoting.

use crate::printer::AmsTray;

/// Name of the Spoolman extra field holding the spool's hardware tag.
pub const EXTRA_TAG_FIELD: &str = "tag";

const TRAY_UUID_LEN: usize = 32;
const TAG_UID_LEN: usize = 16;

fn is_nonzero_hex(value: &str, len: usize) -> bool {
    value.len() == len
        && value.chars().all(|c| c.is_ascii_hexdigit())
        && value.chars().any(|c| c != '0')
}

/// Whether the tray carries a genuine Bambu Lab RFID identity.
///
/// A non-zero 32-hex `tray_uuid` wins; otherwise a non-zero 16-hex
/// `tag_uid` is accepted. Preset ids such as `GFA00` never count.
pub fn is_bambu_lab_spool(tray_uuid: &str, tag_uid: &str) -> bool {
    is_nonzero_hex(tray_uuid.trim(), TRAY_UUID_LEN) || is_nonzero_hex(tag_uid.trim(), TAG_UID_LEN)
}

/// The identifier used to key a spool in Spoolman. `tray_uuid` is stable
/// across AMS hardware revisions, so it is preferred over `tag_uid`.
pub fn resolve_spool_tag(tray_uuid: &str, tag_uid: &str) -> Option<String> {
    let tray_uuid = tray_uuid.trim();
    let tag_uid = tag_uid.trim();
    if is_nonzero_hex(tray_uuid, TRAY_UUID_LEN) {
        Some(tray_uuid.to_string())
    } else if is_nonzero_hex(tag_uid, TAG_UID_LEN) {
        Some(tag_uid.to_string())
    } else {
        None
    }
}

/// Every valid identifier the tray exposes, preferred first.
pub fn tray_tags(tray: &AmsTray) -> Vec<String> {
    let mut tags = Vec::new();
    if is_nonzero_hex(tray.tray_uuid.trim(), TRAY_UUID_LEN) {
        tags.push(tray.tray_uuid.trim().to_string());
    }
    if is_nonzero_hex(tray.tag_uid.trim(), TAG_UID_LEN) {
        tags.push(tray.tag_uid.trim().to_string());
    }
    tags
}

/// Stored form of a tag in `extra.tag`.
pub fn encode_tag(tag: &str) -> String {
    serde_json::Value::String(tag.to_string()).to_string()
}

/// Strip one layer of JSON quoting from a stored tag.
pub fn decode_tag(stored: &str) -> String {
    let trimmed = stored.trim();
    match serde_json::from_str::<String>(trimmed) {
        Ok(inner) => inner,
        Err(_) => trimmed.trim_matches('"').to_string(),
    }
}

/// Canonical form used for comparisons and tag sets.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_ascii_lowercase()
}

/// Case-insensitive match between a stored (quoted) tag and a raw one.
pub fn stored_tag_matches(stored: &str, tag: &str) -> bool {
    let decoded = decode_tag(stored);
    !decoded.is_empty() && decoded.trim().eq_ignore_ascii_case(tag.trim())
}

/// Location prefix owned by one printer, e.g. `X1C - `.
pub fn location_prefix(printer_name: &str) -> String {
    format!("{} - ", printer_name)
}

/// Whether `location` names one of this printer's trays. Matching on the
/// label after the prefix keeps `X1C` from claiming spools at `X1C - 2`.
pub fn is_printer_location(printer_name: &str, location: &str) -> bool {
    location
        .strip_prefix(&location_prefix(printer_name))
        .is_some_and(|label| label.starts_with("AMS ") || label == "External Spool")
}

/// Spoolman location string for a tray, e.g. `X1C - AMS A1`.
pub fn tray_location(printer_name: &str, tray: &AmsTray) -> String {
    format!("{}{}", location_prefix(printer_name), tray.location_label())
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: &str = "A1B2C3D4E5F60718293A4B5C6D7E8F90";
    const TAG: &str = "1A2B3C4D5E6F7081";

    #[test]
    fn test_bambu_spool_detection() {
        assert!(is_bambu_lab_spool(UUID, ""));
        assert!(is_bambu_lab_spool("", TAG));
        assert!(is_bambu_lab_spool(&UUID.to_lowercase(), ""));
    }

    #[test]
    fn test_zero_sentinels_rejected() {
        assert!(!is_bambu_lab_spool(&"0".repeat(32), ""));
        assert!(!is_bambu_lab_spool(&"0".repeat(32), &"0".repeat(16)));
        assert!(!is_bambu_lab_spool("", ""));
    }

    #[test]
    fn test_preset_id_alone_rejected() {
        assert!(!is_bambu_lab_spool("GFA00", ""));
        assert!(!is_bambu_lab_spool("", "GFL99"));
    }

    #[test]
    fn test_wrong_length_or_non_hex_rejected() {
        assert!(!is_bambu_lab_spool(&UUID[..31], ""));
        assert!(!is_bambu_lab_spool("", "1A2B3C4D5E6F708Z"));
    }

    #[test]
    fn test_resolve_prefers_uuid() {
        assert_eq!(resolve_spool_tag(UUID, TAG), Some(UUID.to_string()));
        assert_eq!(resolve_spool_tag(&"0".repeat(32), TAG), Some(TAG.to_string()));
        assert_eq!(resolve_spool_tag("", ""), None);
    }

    #[test]
    fn test_encode_decode() {
        let stored = encode_tag(UUID);
        assert_eq!(stored, format!("\"{}\"", UUID));
        assert_eq!(decode_tag(&stored), UUID);
        assert_eq!(decode_tag(UUID), UUID);
        assert_eq!(decode_tag("  \"abc\" "), "abc");
    }

    #[test]
    fn test_stored_tag_matches_case_insensitive() {
        assert!(stored_tag_matches(&encode_tag(UUID), &UUID.to_lowercase()));
        assert!(stored_tag_matches(UUID, UUID));
        assert!(!stored_tag_matches("\"\"", ""));
        assert!(!stored_tag_matches(&encode_tag(TAG), UUID));
    }

    #[test]
    fn test_printer_location_matches_tray_labels_only() {
        assert!(is_printer_location("X1C", "X1C - AMS A1"));
        assert!(is_printer_location("X1C", "X1C - AMS HT A"));
        assert!(is_printer_location("X1C", "X1C - External Spool"));
        assert!(!is_printer_location("X1C", "X1C - 2 - AMS A1"));
        assert!(!is_printer_location("X1C", "Shelf 3"));
    }

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag(" ABCdef "), "abcdef");
    }
}

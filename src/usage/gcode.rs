//! Per-layer, per-channel extrusion tracking over sliced G-code.
//!
//! Recognizes the Bambu Studio directives that carry the needed state:
//!
//! - `M73 L<n>`: layer change
//! - `M620 S<n>[A]`: filament channel select (`S255` unloads)
//! - `G0`..`G3` with `E<mm>`: extrusion on the active channel

use std::collections::BTreeMap;

use tracing::debug;

/// Channel index (0-based) to cumulative extruded millimeters.
pub type ChannelUsage = BTreeMap<u32, f64>;

/// Layer number to the cumulative per-channel usage reached by the end of
/// that layer.
pub type LayerUsage = BTreeMap<u32, ChannelUsage>;

const UNLOAD_CHANNEL: u32 = 255;

/// Scan G-code once and record cumulative extrusion per channel at each
/// layer boundary.
///
/// Never fails: unparseable tokens are skipped. An empty map means the
/// G-code carried no usable layer/channel directives and callers should
/// fall back to linear interpolation.
pub fn parse_layer_usage(gcode: &str) -> LayerUsage {
    let mut snapshots = LayerUsage::new();
    let mut cumulative = ChannelUsage::new();
    let mut current_layer: u32 = 0;
    let mut active_channel: Option<u32> = None;

    for raw_line in gcode.lines() {
        let line = match raw_line.split_once(';') {
            Some((code, _comment)) => code,
            None => raw_line,
        };
        let mut tokens = line.split_whitespace();
        let Some(command) = tokens.next() else {
            continue;
        };

        if command.eq_ignore_ascii_case("M73") {
            let layer = tokens
                .filter_map(|t| param_value(t, 'L'))
                .find_map(|v| v.parse::<u32>().ok());
            if let Some(layer) = layer {
                if !cumulative.is_empty() {
                    snapshots.insert(current_layer, cumulative.clone());
                }
                current_layer = layer;
            }
        } else if command.eq_ignore_ascii_case("M620") {
            if let Some(value) = tokens.find_map(|t| param_value(t, 'S')) {
                match leading_number(value) {
                    Some(UNLOAD_CHANNEL) => active_channel = None,
                    Some(channel) => active_channel = Some(channel),
                    None => {}
                }
            }
        } else if is_move(command) {
            let Some(channel) = active_channel else {
                continue;
            };
            let amount = tokens
                .filter_map(|t| param_value(t, 'E'))
                .find_map(|v| v.parse::<f64>().ok());
            if let Some(amount) = amount.filter(|a| a.is_finite() && *a > 0.0) {
                *cumulative.entry(channel).or_insert(0.0) += amount;
            }
        }
    }

    if !cumulative.is_empty() {
        snapshots.insert(current_layer, cumulative);
    }

    debug!(
        "Parsed G-code layer usage: {} layer snapshots",
        snapshots.len()
    );
    snapshots
}

/// Cumulative usage at the highest recorded layer not above `target_layer`.
/// Empty when nothing was recorded at or below the target.
pub fn cumulative_usage_at_layer(layer_usage: &LayerUsage, target_layer: u32) -> ChannelUsage {
    layer_usage
        .range(..=target_layer)
        .next_back()
        .map(|(_, usage)| usage.clone())
        .unwrap_or_default()
}

fn is_move(command: &str) -> bool {
    matches!(
        command.to_ascii_uppercase().as_str(),
        "G0" | "G1" | "G2" | "G3"
    )
}

/// Value of a single-letter G-code parameter such as `E1.25`.
fn param_value(token: &str, letter: char) -> Option<&str> {
    let mut chars = token.chars();
    let first = chars.next()?;
    if first.eq_ignore_ascii_case(&letter) {
        Some(chars.as_str())
    } else {
        None
    }
}

/// Leading ASCII digits parsed as a number (`"2A"` -> 2).
fn leading_number(value: &str) -> Option<u32> {
    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    value[..end].parse().ok()
}

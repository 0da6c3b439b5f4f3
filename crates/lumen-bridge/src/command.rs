//! Semantic light commands and value scaling
//!
//! Inbound MQTT payloads are Home Assistant JSON-schema light commands.
//! They decode into a tagged [`LightCommand`], trying extractors in a fixed
//! precedence order: HSL color first, then brightness, then on/off. A
//! payload matching none of the shapes yields [`LightCommand::Unrecognized`]
//! rather than faulting on a missing field.
//!
//! Scaling maps the semantic ranges (hue 0-360 degrees, saturation and
//! lightness 0-100 percent) onto the mesh's raw 16-bit ranges. The HSL
//! lightness channel is capped at half-range.

use serde_json::Value;

use crate::config::{HUE_MAX_DEGREES, LIGHTNESS_MAX, PERCENT_MAX};
use crate::error::{BridgeError, Result};

/// A semantic command decoded from one inbound MQTT message
#[derive(Debug, Clone, PartialEq)]
pub enum LightCommand {
    /// Turn the lamp on or off
    OnOff(bool),
    /// Set brightness as a percentage in [0, 100]
    Brightness(f32),
    /// Set hue/saturation/lightness
    Hsl {
        /// Hue in degrees, [0, 360]
        hue: f32,
        /// Saturation percent, [0, 100]
        saturation: f32,
        /// Lightness percent, [0, 100]
        lightness: f32,
    },
    /// Valid JSON that matches none of the command shapes
    Unrecognized,
}

/// Decode an inbound payload into a [`LightCommand`]
///
/// Precedence, first match wins:
///
/// 1. a `color` object with numeric `h` and `s`, reading an optional
///    sibling `brightness` as the lightness component (falling back to
///    `last_lightness`, the last value recorded in the session)
/// 2. a numeric `brightness` field
/// 3. a `state` string with prefix `"ON"` or `"OFF"` (case-sensitive)
///
/// Malformed JSON is a [`BridgeError::PayloadParse`]. A `color` object
/// without numeric `h`/`s` commits to the color branch and comes back
/// `Unrecognized`, as does anything matching no shape.
pub fn parse_command(payload: &[u8], last_lightness: f32) -> Result<LightCommand> {
    let value: Value = serde_json::from_slice(payload)?;

    if let Some(color) = value.get("color") {
        let hue = color.get("h").and_then(Value::as_f64);
        let saturation = color.get("s").and_then(Value::as_f64);
        return Ok(match (hue, saturation) {
            (Some(h), Some(s)) => {
                let lightness = value
                    .get("brightness")
                    .and_then(Value::as_f64)
                    .map_or(last_lightness, |b| b as f32);
                LightCommand::Hsl {
                    hue: h as f32,
                    saturation: s as f32,
                    lightness,
                }
            }
            _ => LightCommand::Unrecognized,
        });
    }

    if let Some(brightness) = value.get("brightness").and_then(Value::as_f64) {
        return Ok(LightCommand::Brightness(brightness as f32));
    }

    if let Some(state) = value.get("state").and_then(Value::as_str) {
        if state.starts_with("ON") {
            return Ok(LightCommand::OnOff(true));
        }
        if state.starts_with("OFF") {
            return Ok(LightCommand::OnOff(false));
        }
    }

    Ok(LightCommand::Unrecognized)
}

// ============================================================================
// Scaling
// ============================================================================

/// Scale a brightness percentage onto the raw mesh lightness range
pub fn scale_percent_to_lightness(percent: f32) -> u16 {
    (f64::from(percent) * f64::from(LIGHTNESS_MAX) / f64::from(PERCENT_MAX)).round() as u16
}

/// Inverse of [`scale_percent_to_lightness`], raw mesh lightness to percent
pub fn lightness_to_percent(raw: u16) -> f32 {
    (f64::from(raw) * f64::from(PERCENT_MAX) / f64::from(LIGHTNESS_MAX)).round() as f32
}

/// Scale a hue in degrees onto the raw 16-bit hue range
pub fn scale_hue(hue: f32) -> u16 {
    (f64::from(hue) * f64::from(LIGHTNESS_MAX) / f64::from(HUE_MAX_DEGREES)).round() as u16
}

/// Scale a saturation percentage onto the raw 16-bit saturation range
pub fn scale_saturation(saturation: f32) -> u16 {
    (f64::from(saturation) * f64::from(LIGHTNESS_MAX) / f64::from(PERCENT_MAX)).round() as u16
}

/// Scale an HSL lightness percentage onto the half-capped raw range
///
/// The HSL lightness channel maps 100% to half of the 16-bit range.
pub fn scale_hsl_lightness(lightness: f32) -> u16 {
    (f64::from(lightness) * f64::from(LIGHTNESS_MAX) / f64::from(PERCENT_MAX) / 2.0).round() as u16
}

// ============================================================================
// Validation
// ============================================================================

/// Validate a brightness/saturation/lightness percentage
pub fn validate_percent(field: &'static str, value: f32) -> Result<()> {
    if !(0.0..=PERCENT_MAX).contains(&value) || !value.is_finite() {
        return Err(BridgeError::OutOfRange { field, value });
    }
    Ok(())
}

/// Validate a full HSL triple
pub fn validate_hsl(hue: f32, saturation: f32, lightness: f32) -> Result<()> {
    if !(0.0..=HUE_MAX_DEGREES).contains(&hue) || !hue.is_finite() {
        return Err(BridgeError::OutOfRange { field: "hue", value: hue });
    }
    validate_percent("saturation", saturation)?;
    validate_percent("lightness", lightness)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_lightness_matches_rounding() {
        for percent in 0..=100u32 {
            let expected = (f64::from(percent) * 65535.0 / 100.0).round() as u16;
            assert_eq!(scale_percent_to_lightness(percent as f32), expected);
        }
        assert_eq!(scale_percent_to_lightness(0.0), 0);
        assert_eq!(scale_percent_to_lightness(100.0), 65535);
    }

    #[test]
    fn test_scale_lightness_inverse_within_one() {
        for percent in 0..=100u32 {
            let raw = scale_percent_to_lightness(percent as f32);
            let back = lightness_to_percent(raw);
            assert!(
                (back - percent as f32).abs() <= 1.0,
                "percent {percent} round-tripped to {back}"
            );
        }
    }

    #[test]
    fn test_scale_hue_endpoints() {
        assert_eq!(scale_hue(0.0), 0);
        assert_eq!(scale_hue(360.0), 65535);
        assert_eq!(scale_hue(180.0), 32768);
    }

    #[test]
    fn test_hsl_lightness_half_range_cap() {
        // The HSL lightness channel never exceeds half-range.
        for percent in 0..=100u32 {
            assert!(scale_hsl_lightness(percent as f32) <= 32768);
        }
        assert_eq!(scale_hsl_lightness(100.0), 32768);
        assert_eq!(scale_hsl_lightness(0.0), 0);
    }

    #[test]
    fn test_validate_hsl_rejects_iff_out_of_range() {
        assert!(validate_hsl(0.0, 0.0, 0.0).is_ok());
        assert!(validate_hsl(360.0, 100.0, 100.0).is_ok());
        assert!(validate_hsl(120.5, 50.0, 80.0).is_ok());

        assert!(validate_hsl(-0.1, 50.0, 50.0).is_err());
        assert!(validate_hsl(360.1, 50.0, 50.0).is_err());
        assert!(validate_hsl(120.0, 100.5, 50.0).is_err());
        assert!(validate_hsl(120.0, 50.0, -1.0).is_err());
        assert!(validate_hsl(f32::NAN, 50.0, 50.0).is_err());
    }

    #[test]
    fn test_color_takes_precedence_over_brightness() {
        let cmd = parse_command(br#"{"color":{"h":120,"s":50},"brightness":80}"#, 0.0).unwrap();
        assert_eq!(
            cmd,
            LightCommand::Hsl { hue: 120.0, saturation: 50.0, lightness: 80.0 }
        );
    }

    #[test]
    fn test_hsl_lightness_defaults_to_session_value() {
        let cmd = parse_command(br#"{"color":{"h":240,"s":10}}"#, 65.0).unwrap();
        assert_eq!(
            cmd,
            LightCommand::Hsl { hue: 240.0, saturation: 10.0, lightness: 65.0 }
        );
    }

    #[test]
    fn test_brightness_without_color() {
        let cmd = parse_command(br#"{"brightness":42}"#, 0.0).unwrap();
        assert_eq!(cmd, LightCommand::Brightness(42.0));
    }

    #[test]
    fn test_state_on_off() {
        assert_eq!(parse_command(br#"{"state":"ON"}"#, 0.0).unwrap(), LightCommand::OnOff(true));
        assert_eq!(parse_command(br#"{"state":"OFF"}"#, 0.0).unwrap(), LightCommand::OnOff(false));
        // Prefix match, case-sensitive
        assert_eq!(parse_command(br#"{"state":"ONLINE"}"#, 0.0).unwrap(), LightCommand::OnOff(true));
        assert_eq!(parse_command(br#"{"state":"on"}"#, 0.0).unwrap(), LightCommand::Unrecognized);
    }

    #[test]
    fn test_color_without_numeric_fields_is_unrecognized() {
        // A color object commits to the color branch; it does not fall
        // through to brightness.
        let cmd = parse_command(br#"{"color":{"h":"red"},"brightness":10}"#, 0.0).unwrap();
        assert_eq!(cmd, LightCommand::Unrecognized);
    }

    #[test]
    fn test_unmatched_payload_is_unrecognized() {
        assert_eq!(parse_command(br#"{"effect":"rainbow"}"#, 0.0).unwrap(), LightCommand::Unrecognized);
        assert_eq!(parse_command(br#"{}"#, 0.0).unwrap(), LightCommand::Unrecognized);
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = parse_command(b"{not json", 0.0).unwrap_err();
        assert!(matches!(err, BridgeError::PayloadParse(_)));
    }
}

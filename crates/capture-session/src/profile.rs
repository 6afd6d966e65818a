//! JSON settings profiles.
//!
//! A profile is shaped `{"capturing_settings": {"<field>": {"value": ..}}, ..}`. Every field
//! is optional; missing or invalid entries keep the built-in default. Loading never fails:
//! an unreadable file falls back to the defaults with a warning.

use crate::DesiredSettings;
use phoxi_device::{CapturingSettings, ExperimentalSettings, ProcessingSettings, Resolution};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use tracing::{debug, error, warn};

const CAPTURING: &str = "capturing_settings";
const PROCESSING: &str = "processing_settings";
const EXPERIMENTAL: &str = "experimental_settings";

/// Profile key and the settings field it maps to, where the two differ.
const RENAMED: &[(&str, &str)] = &[
    ("max_inaccuracy", "confidence"),
    ("interreflections_filter", "interreflections_filtering"),
];

/// Capturing modes addressable from a profile, by index.
const RESOLUTIONS: [Resolution; 2] = [Resolution::new(2064, 1544), Resolution::new(1032, 772)];

fn field_name(key: &str) -> &str {
    RENAMED
        .iter()
        .find(|(k, _)| *k == key)
        .map_or(key, |(_, field)| *field)
}

fn profile_key(field: &str) -> &str {
    RENAMED
        .iter()
        .find(|(_, f)| *f == field)
        .map_or(field, |(key, _)| *key)
}

/// Map a `{width, height}` object to a capturing-mode index, falling back to 0.
pub fn resolution_index(value: &Value) -> usize {
    let width = value.get("width").and_then(Value::as_u64);
    let height = value.get("height").and_then(Value::as_u64);
    let found = RESOLUTIONS
        .iter()
        .position(|r| Some(u64::from(r.width)) == width && Some(u64::from(r.height)) == height);
    match found {
        Some(index) => index,
        None => {
            error!(resolution = %value, "unsupported resolution, defaulting to {}", RESOLUTIONS[0]);
            0
        }
    }
}

/// Apply each `{"value": ..}` entry of one profile section onto the group defaults.
fn overlay<S>(section: &str, entries: Option<&Value>) -> S
where
    S: Serialize + DeserializeOwned + Default,
{
    let defaults = S::default();
    let Some(entries) = entries.and_then(Value::as_object) else {
        return defaults;
    };
    let mut current = match serde_json::to_value(&defaults) {
        Ok(Value::Object(map)) => map,
        _ => return defaults,
    };
    for (key, entry) in entries {
        let field = field_name(key);
        if !current.contains_key(field) {
            debug!(section, key = %key, "ignoring profile entry");
            continue;
        }
        let Some(value) = entry.get("value") else {
            warn!(section, key = %key, "profile entry has no value");
            continue;
        };
        let mut candidate = current.clone();
        candidate.insert(field.to_string(), value.clone());
        match serde_json::from_value::<S>(Value::Object(candidate.clone())) {
            Ok(_) => current = candidate,
            Err(e) => warn!(section, key = %key, value = %value, error = %e, "invalid profile value ignored"),
        }
    }
    serde_json::from_value(Value::Object(current)).unwrap_or(defaults)
}

/// Build desired settings from a parsed profile document.
pub fn profile_from_value(doc: &Value) -> DesiredSettings {
    let index = doc
        .pointer("/capturing_settings/resolution/value")
        .map_or(0, resolution_index);
    DesiredSettings {
        capturing: overlay::<CapturingSettings>(CAPTURING, doc.get(CAPTURING)),
        resolution_index: index,
        processing: overlay::<ProcessingSettings>(PROCESSING, doc.get(PROCESSING)),
        experimental: overlay::<ExperimentalSettings>(EXPERIMENTAL, doc.get(EXPERIMENTAL)),
    }
}

/// Read a profile from disk; a missing or malformed file yields the defaults.
pub fn load_profile(path: &Path) -> DesiredSettings {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read profile, using built-in defaults");
            return DesiredSettings::default();
        }
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(doc) => profile_from_value(&doc),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed profile, using built-in defaults");
            DesiredSettings::default()
        }
    }
}

fn section<S: Serialize>(group: &S) -> Map<String, Value> {
    let Ok(Value::Object(fields)) = serde_json::to_value(group) else {
        return Map::new();
    };
    fields
        .into_iter()
        .map(|(field, value)| (profile_key(&field).to_string(), json!({ "value": value })))
        .collect()
}

/// The built-in defaults, rendered as a profile document.
pub fn default_profile_json() -> Value {
    let defaults = DesiredSettings::default();
    let mut capturing = section(&defaults.capturing);
    capturing.insert(
        "resolution".to_string(),
        json!({ "value": RESOLUTIONS[0] }),
    );
    json!({
        CAPTURING: capturing,
        PROCESSING: section(&defaults.processing),
        EXPERIMENTAL: section(&defaults.experimental),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use phoxi_device::{CodingQuality, PatternDecompositionReach, SurfaceSmoothness};
    use std::io::Write;

    #[test]
    fn empty_document_gives_defaults() {
        assert_eq!(profile_from_value(&json!({})), DesiredSettings::default());
    }

    #[test]
    fn values_override_defaults_per_field() {
        let doc = json!({
            "capturing_settings": {
                "shutter_multiplier": {"value": 3},
                "coding_quality": {"value": "ultra"},
                "resolution": {"value": {"width": 1032, "height": 772}, "min": {"width": 1032, "height": 772}}
            },
            "processing_settings": {
                "max_inaccuracy": {"value": 3.5},
                "surface_smoothness": {"value": "Sharp"},
                "interreflections_filter": {"value": true}
            },
            "experimental_settings": {
                "pattern_decomposition_reach": {"value": "Large"}
            }
        });
        let s = profile_from_value(&doc);
        assert_eq!(s.capturing.shutter_multiplier, 3);
        assert_eq!(s.capturing.scan_multiplier, 1);
        assert_eq!(s.capturing.coding_quality, CodingQuality::Ultra);
        assert_eq!(s.resolution_index, 1);
        assert_eq!(s.processing.confidence, 3.5);
        assert_eq!(s.processing.surface_smoothness, SurfaceSmoothness::Sharp);
        assert!(s.processing.interreflections_filtering);
        assert_eq!(
            s.experimental.pattern_decomposition_reach,
            PatternDecompositionReach::Large
        );
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let doc = json!({
            "capturing_settings": {
                "laser_power": {"value": "bright"},
                "coding_strategy": {"value": "Zigzag"},
                "led_power": {"value": 1000}
            }
        });
        let s = profile_from_value(&doc);
        assert_eq!(s.capturing.laser_power, 4095);
        assert_eq!(s.capturing.led_power, 1000);
        assert_eq!(
            s.capturing.coding_strategy,
            CapturingSettings::default().coding_strategy
        );
    }

    #[test]
    fn unknown_resolution_falls_back_to_first_mode() {
        assert_eq!(resolution_index(&json!({"width": 640, "height": 480})), 0);
        assert_eq!(resolution_index(&json!({"width": 2064, "height": 1544})), 0);
        assert_eq!(resolution_index(&json!({"width": 1032, "height": 772})), 1);
    }

    #[test]
    fn unreadable_files_give_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            load_profile(&dir.path().join("missing.json")),
            DesiredSettings::default()
        );
        let path = dir.path().join("broken.json");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"{ not json")
            .unwrap();
        assert_eq!(load_profile(&path), DesiredSettings::default());
    }

    #[test]
    fn default_profile_reads_back_as_defaults() {
        let doc = default_profile_json();
        assert_eq!(doc["processing_settings"]["max_inaccuracy"]["value"], json!(2.0));
        assert_eq!(doc["capturing_settings"]["texture_source"]["value"], json!("LED"));
        assert_eq!(profile_from_value(&doc), DesiredSettings::default());
    }
}

use serde_json::Value;

use crate::model::AffectedPackage;

/// Marker emitted for ranges introduced at `0`.
pub const ALL_VERSIONS: &str = "all versions";

/// Affected versions of one OSV `affected[]` entry.
///
/// A non-empty `versions` list wins verbatim; otherwise range events become
/// markers (`"all versions"`, `">=V"`, `"<F"`) in encounter order. Duplicates
/// are kept. Malformed pieces are skipped.
pub fn extract(affected: &AffectedPackage) -> Vec<String> {
    extract_raw(&affected.versions_raw)
}

pub fn extract_raw(raw: &Value) -> Vec<String> {
    if let Some(listed) = raw.get("versions").and_then(Value::as_array) {
        let versions: Vec<String> = listed
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        if !versions.is_empty() {
            return versions;
        }
    }

    let mut markers = Vec::new();
    let Some(ranges) = raw.get("ranges").and_then(Value::as_array) else {
        return markers;
    };

    for range in ranges {
        let Some(events) = range.get("events").and_then(Value::as_array) else {
            continue;
        };
        for event in events.iter().filter(|e| e.is_object()) {
            if let Some(introduced) = event.get("introduced").and_then(scalar) {
                if introduced == "0" {
                    markers.push(ALL_VERSIONS.to_string());
                } else {
                    markers.push(format!(">={}", introduced));
                }
            }
            if let Some(fixed) = event.get("fixed").and_then(scalar) {
                markers.push(format!("<{}", fixed));
            }
        }
    }

    markers
}

/// Whether a concrete registry version is covered by the extracted list.
///
/// Only `"all versions"` and literal entries are interpreted; other range
/// markers never match. An empty list means the advisory did not say, so
/// everything matches.
pub fn covers(affected: &[String], version: &str) -> bool {
    affected.is_empty() || affected.iter().any(|v| v == ALL_VERSIONS || v == version)
}

// Event values are strings per the OSV schema, but numbers show up in the wild.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

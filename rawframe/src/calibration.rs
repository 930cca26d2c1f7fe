//! Calibration sidecar: a JSON file next to the source (same basename,
//! `.json` extension) that overrides color matrices, the as-shot neutral,
//! and the CFA phase used for remosaic. Matrix fields accept either JSON
//! arrays or whitespace-separated strings.

use std::path::Path;

use serde_json::Value;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationData {
    pub color_matrix1: Option<[f32; 9]>,
    pub color_matrix2: Option<[f32; 9]>,
    pub forward_matrix1: Option<[f32; 9]>,
    pub forward_matrix2: Option<[f32; 9]>,
    pub as_shot_neutral: Option<[f32; 3]>,
    pub cfa_phase: Option<String>,
}

impl CalibrationData {
    /// Look for a sidecar next to `source` and load it if present.
    pub fn load_for_source(source: &Path) -> Option<CalibrationData> {
        let sidecar = source.with_extension("json");
        if !sidecar.exists() {
            return None;
        }

        let data = CalibrationData::load(&sidecar)?;
        info!("Loaded calibration sidecar {}", sidecar.display());
        Some(data)
    }

    pub fn load(path: &Path) -> Option<CalibrationData> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!("Could not read calibration file {}: {}", path.display(), e);
                return None;
            }
        };

        let j: Value = match serde_json::from_str(&text) {
            Ok(j) => j,
            Err(e) => {
                error!("Malformed calibration JSON {}: {}", path.display(), e);
                return None;
            }
        };

        CalibrationData::parse(&j)
    }

    /// Returns `None` unless at least one recognized field parses.
    pub fn parse(j: &Value) -> Option<CalibrationData> {
        let data = CalibrationData {
            color_matrix1: parse_floats(j.get("colorMatrix1")),
            color_matrix2: parse_floats(j.get("colorMatrix2")),
            forward_matrix1: parse_floats(j.get("forwardMatrix1")),
            forward_matrix2: parse_floats(j.get("forwardMatrix2")),
            as_shot_neutral: parse_floats(j.get("asShotNeutral")),
            cfa_phase: j
                .get("cfaPhase")
                .and_then(Value::as_str)
                .map(str::to_string),
        };

        if data == CalibrationData::default() {
            warn!("No recognized calibration fields in sidecar");
            return None;
        }

        Some(data)
    }
}

/// Parse `N` floats from either a JSON array or a whitespace-separated
/// string. Short or malformed values yield `None`.
fn parse_floats<const N: usize>(v: Option<&Value>) -> Option<[f32; N]> {
    let v = v?;
    let mut out = [0.0f32; N];

    match v {
        Value::Array(items) => {
            if items.len() < N {
                return None;
            }
            for (i, item) in items.iter().take(N).enumerate() {
                out[i] = item.as_f64()? as f32;
            }
        }
        Value::String(s) => {
            let mut count = 0;
            for (i, token) in s.split_whitespace().take(N).enumerate() {
                out[i] = token.parse().ok()?;
                count += 1;
            }
            if count < N {
                return None;
            }
        }
        _ => return None,
    }

    Some(out)
}

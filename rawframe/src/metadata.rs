//! Frame and camera metadata parsed from the recording container's JSON.
//!
//! Containers carry one JSON blob per frame (dynamic levels, shading map,
//! orientation, exposure) and one per recording (calibration matrices,
//! static levels, sensor arrangement). Missing or malformed fields fall back
//! to defaults; parsing never fails.

use serde_json::Value;

use crate::ShadingMap;

/// Physical orientation of the device at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    Portrait,
    ReversePortrait,
    #[default]
    Landscape,
    ReverseLandscape,
    Invalid,
}

impl Orientation {
    pub fn from_code(code: i64) -> Orientation {
        match code {
            0 => Orientation::Portrait,
            1 => Orientation::ReversePortrait,
            2 => Orientation::Landscape,
            3 => Orientation::ReverseLandscape,
            _ => Orientation::Invalid,
        }
    }
}

/// Per-frame metadata.
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
    pub iso: u32,
    /// Exposure time in nanoseconds.
    pub exposure_time: f64,
    pub as_shot_neutral: [f32; 3],
    pub dynamic_black_level: [f32; 4],
    pub dynamic_white_level: f32,
    pub orientation: Orientation,
    pub shading_map: Option<ShadingMap>,
    pub needs_remosaic: bool,
}

impl Default for FrameMetadata {
    fn default() -> Self {
        FrameMetadata {
            width: 0,
            height: 0,
            original_width: 0,
            original_height: 0,
            iso: 0,
            exposure_time: 0.0,
            as_shot_neutral: [1.0, 1.0, 1.0],
            dynamic_black_level: [0.0; 4],
            dynamic_white_level: 0.0,
            orientation: Orientation::Landscape,
            shading_map: None,
            needs_remosaic: false,
        }
    }
}

impl FrameMetadata {
    /// Parse the full per-frame record, shading map included.
    pub fn parse(j: &Value) -> FrameMetadata {
        let width = get_u32(j, "width");
        let height = get_u32(j, "height");

        let original_width = match get_u32(j, "originalWidth") {
            0 => width,
            w => w,
        };
        let original_height = match get_u32(j, "originalHeight") {
            0 => height,
            h => h,
        };

        FrameMetadata {
            width,
            height,
            original_width,
            original_height,
            iso: get_u32(j, "iso"),
            exposure_time: get_f64(j, "exposureTime"),
            as_shot_neutral: get_f32_array(j.get("asShotNeutral"), [1.0, 1.0, 1.0]),
            dynamic_black_level: get_f32_array(j.get("dynamicBlackLevel"), [0.0; 4]),
            dynamic_white_level: get_f64(j, "dynamicWhiteLevel") as f32,
            orientation: Orientation::from_code(
                j.get("orientation").and_then(Value::as_i64).unwrap_or(2),
            ),
            shading_map: parse_shading_map(j),
            needs_remosaic: j
                .get("needRemosaic")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }

    /// Cheap parse of just the exposure product `iso * exposure_ns`, used
    /// for the mount-time baseline scan.
    pub fn exposure_product(j: &Value) -> f64 {
        get_u32(j, "iso") as f64 * get_f64(j, "exposureTime")
    }
}

/// Per-recording camera configuration.
#[derive(Debug, Clone, Default)]
pub struct CameraConfig {
    pub black_level: [f32; 4],
    pub white_level: f32,
    pub color_matrix1: [f32; 9],
    pub color_matrix2: [f32; 9],
    pub forward_matrix1: [f32; 9],
    pub forward_matrix2: [f32; 9],
    pub color_illuminant1: String,
    pub color_illuminant2: String,
    pub sensor_arrangement: String,
    pub flipped: bool,
    pub build_model: String,
    pub audio_channels: u32,
    pub audio_sample_rate: u32,
}

impl CameraConfig {
    pub fn parse(j: &Value) -> CameraConfig {
        // Both spellings occur in the wild
        let arrangement = match get_string(j, "sensorArrangment") {
            s if s.is_empty() => get_string(j, "sensorArrangement"),
            s => s,
        };

        let post = j
            .pointer("/extraData/postProcessSettings")
            .cloned()
            .unwrap_or(Value::Null);

        CameraConfig {
            black_level: get_f32_array(j.get("blackLevel"), [0.0; 4]),
            white_level: get_f64(j, "whiteLevel") as f32,
            color_matrix1: get_f32_array(j.get("colorMatrix1"), [0.0; 9]),
            color_matrix2: get_f32_array(j.get("colorMatrix2"), [0.0; 9]),
            forward_matrix1: get_f32_array(j.get("forwardMatrix1"), [0.0; 9]),
            forward_matrix2: get_f32_array(j.get("forwardMatrix2"), [0.0; 9]),
            color_illuminant1: get_string(j, "colorIlluminant1"),
            color_illuminant2: get_string(j, "colorIlluminant2"),
            sensor_arrangement: arrangement,
            flipped: post.get("flipped").and_then(Value::as_bool).unwrap_or(false),
            build_model: post
                .pointer("/metadata/build.model")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            audio_channels: j
                .pointer("/extraData/audioChannels")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            audio_sample_rate: j
                .pointer("/extraData/audioSampleRate")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
        }
    }
}

fn get_u32(j: &Value, key: &str) -> u32 {
    j.get(key).and_then(Value::as_u64).unwrap_or(0) as u32
}

fn get_f64(j: &Value, key: &str) -> f64 {
    j.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn get_string(j: &Value, key: &str) -> String {
    j.get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn get_f32_array<const N: usize>(v: Option<&Value>, default: [f32; N]) -> [f32; N] {
    let Some(Value::Array(items)) = v else {
        return default;
    };

    let mut out = default;
    for (i, item) in items.iter().take(N).enumerate() {
        if let Some(f) = item.as_f64() {
            out[i] = f as f32;
        }
    }
    out
}

fn parse_shading_map(j: &Value) -> Option<ShadingMap> {
    let width = get_u32(j, "lensShadingMapWidth") as usize;
    let height = get_u32(j, "lensShadingMapHeight") as usize;
    let planes = j.get("lensShadingMap")?.as_array()?;

    if width == 0 || height == 0 || planes.len() < 4 {
        return None;
    }

    let mut channels: [Vec<f32>; 4] = std::array::from_fn(|_| Vec::new());
    for (c, plane) in planes.iter().take(4).enumerate() {
        let cells = plane.as_array()?;
        if cells.len() != width * height {
            return None;
        }
        channels[c] = cells
            .iter()
            .map(|v| v.as_f64().unwrap_or(1.0) as f32)
            .collect();
    }

    Some(ShadingMap::new(channels, width, height))
}

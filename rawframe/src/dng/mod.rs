//! DNG assembly: composes the preprocessed strip and its metadata into a
//! complete DNG byte stream.

pub mod opcodes;
pub mod writer;

use tracing::debug;

use crate::calibration::CalibrationData;
use crate::codec::CfaPattern;
use crate::error::RenderError;
use crate::metadata::{CameraConfig, FrameMetadata, Orientation};
use crate::preprocess::PreprocessOutput;
use self::writer::{Ifd, TagValue};

/// TIFF/DNG tag numbers used by the assembler.
pub mod tags {
    pub const NEW_SUBFILE_TYPE: u16 = 254;
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const PHOTOMETRIC: u16 = 262;
    pub const MAKE: u16 = 271;
    pub const MODEL: u16 = 272;
    pub const ORIENTATION: u16 = 274;
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    pub const ROWS_PER_STRIP: u16 = 278;
    pub const X_RESOLUTION: u16 = 282;
    pub const Y_RESOLUTION: u16 = 283;
    pub const PLANAR_CONFIG: u16 = 284;
    pub const RESOLUTION_UNIT: u16 = 296;
    pub const SOFTWARE: u16 = 305;
    pub const SAMPLE_FORMAT: u16 = 339;
    pub const CFA_REPEAT_PATTERN_DIM: u16 = 33421;
    pub const CFA_PATTERN: u16 = 33422;
    pub const EXPOSURE_TIME: u16 = 33434;
    pub const ISO: u16 = 34855;
    pub const DNG_VERSION: u16 = 50706;
    pub const DNG_BACKWARD_VERSION: u16 = 50707;
    pub const UNIQUE_CAMERA_MODEL: u16 = 50708;
    pub const CFA_LAYOUT: u16 = 50711;
    pub const LINEARIZATION_TABLE: u16 = 50712;
    pub const BLACK_LEVEL_REPEAT_DIM: u16 = 50713;
    pub const BLACK_LEVEL: u16 = 50714;
    pub const WHITE_LEVEL: u16 = 50717;
    pub const COLOR_MATRIX_1: u16 = 50721;
    pub const COLOR_MATRIX_2: u16 = 50722;
    pub const CAMERA_CALIBRATION_1: u16 = 50723;
    pub const CAMERA_CALIBRATION_2: u16 = 50724;
    pub const AS_SHOT_NEUTRAL: u16 = 50728;
    pub const BASELINE_EXPOSURE: u16 = 50730;
    pub const CALIBRATION_ILLUMINANT_1: u16 = 50778;
    pub const CALIBRATION_ILLUMINANT_2: u16 = 50779;
    pub const ACTIVE_AREA: u16 = 50829;
    pub const FORWARD_MATRIX_1: u16 = 50964;
    pub const FORWARD_MATRIX_2: u16 = 50965;
    pub const OPCODE_LIST_2: u16 = 51009;
    pub const OPCODE_LIST_3: u16 = 51022;
    pub const TIME_CODES: u16 = 51043;
    pub const FRAME_RATE: u16 = 51044;
}

const SOFTWARE_NAME: &str = "rawmount";

/// Strip color model of the assembled DNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DngColor {
    Cfa(CfaPattern),
    Rgb,
}

/// Per-frame assembly inputs that are not part of the pixel pipeline.
#[derive(Debug, Clone)]
pub struct DngFrameParams {
    pub fps: f32,
    pub frame_index: i64,
    /// Camera model override from the render config, empty for the
    /// recording's own model.
    pub camera_model: String,
    pub normalize_exposure: bool,
    /// Minimum `iso * exposure_ns` across the sequence, the anchor for
    /// exposure normalization.
    pub baseline_exp_value: f64,
    /// Keyframed or static EV compensation sampled for this frame.
    pub exposure_offset_ev: f32,
    /// Attach the lens shading map as a GainMap opcode when it was not
    /// baked into the pixels.
    pub include_gain_map: bool,
}

impl Default for DngFrameParams {
    fn default() -> Self {
        DngFrameParams {
            fps: 30.0,
            frame_index: 0,
            camera_model: String::new(),
            normalize_exposure: false,
            baseline_exp_value: 0.0,
            exposure_offset_ev: 0.0,
            include_gain_map: true,
        }
    }
}

/// DNG orientation codes.
fn orientation_code(orientation: Orientation, flipped: bool) -> u16 {
    match (orientation, flipped) {
        (Orientation::Portrait, false) => 6,        // Rotate90CW
        (Orientation::Portrait, true) => 7,         // Mirror90CW
        (Orientation::ReversePortrait, false) => 8, // Rotate90CCW
        (Orientation::ReversePortrait, true) => 5,  // Mirror90CCW
        (Orientation::Landscape, false) => 1,       // Normal
        (Orientation::Landscape, true) => 2,        // Mirror
        (Orientation::ReverseLandscape, false) => 3, // Rotate180
        (Orientation::ReverseLandscape, true) => 4, // Mirror180
        (Orientation::Invalid, _) => 9,             // Unknown
    }
}

fn illuminant_code(value: &str) -> u16 {
    match value.to_ascii_lowercase().as_str() {
        "standarda" => 17,
        "standardb" => 18,
        "standardc" => 19,
        "d55" => 20,
        "d65" => 21,
        "d75" => 22,
        "d50" => 23,
        _ => 0,
    }
}

fn is_zero_matrix(m: &[f32; 9]) -> bool {
    m.iter().all(|&v| v == 0.0)
}

fn matrix_srational(m: &[f32; 9]) -> TagValue {
    TagValue::SRational(m.iter().map(|&v| ((v * 10000.0).round() as i32, 10000)).collect())
}

const IDENTITY_MATRIX: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

fn srational_from_f32(v: f32, denom: i32) -> (i32, i32) {
    ((v * denom as f32).round() as i32, denom)
}

fn to_bcd(value: u32) -> u8 {
    (((value / 10) << 4) | (value % 10)) as u8
}

/// SMPTE timecode bytes for a frame at the given constant rate.
fn timecode_bytes(frame_index: i64, fps: f32) -> [u8; 8] {
    let time = frame_index as f64 / fps as f64;

    let hours = (time / 3600.0).floor() as u32;
    let minutes = ((time / 60.0).floor() as u32) % 60;
    let seconds = (time.floor() as u32) % 60;
    let frames = if fps > 1.0 {
        (frame_index % fps.round() as i64) as u32
    } else {
        0
    };

    let mut tc = [0u8; 8];
    tc[0] = to_bcd(frames) & 0x3f;
    tc[1] = to_bcd(seconds) & 0x7f;
    tc[2] = to_bcd(minutes) & 0x7f;
    tc[3] = to_bcd(hours) & 0x3f;
    tc
}

fn exposure_time_rational(exposure_ns: f64) -> (u32, u32) {
    if exposure_ns <= 0.0 {
        return (0, 1);
    }
    if exposure_ns < u32::MAX as f64 {
        let n = exposure_ns.round() as u32;
        let g = common::gcd(n, 1_000_000_000);
        (n / g, 1_000_000_000 / g)
    } else {
        // Longer than ~4s, millisecond precision is plenty
        ((exposure_ns / 1e6).round() as u32, 1000)
    }
}

/// Compose a complete DNG from a preprocessed strip.
pub fn assemble_dng(
    out: &PreprocessOutput,
    color: DngColor,
    metadata: &FrameMetadata,
    camera: &CameraConfig,
    calibration: Option<&CalibrationData>,
    params: &DngFrameParams,
) -> Result<Vec<u8>, RenderError> {
    if out.width == 0 || out.height == 0 {
        return Err(RenderError::InvalidDimensions {
            width: out.width,
            height: out.height,
        });
    }

    let mut ifd = Ifd::new();
    let spp = out.samples_per_pixel;

    ifd.set(tags::NEW_SUBFILE_TYPE, TagValue::Long(vec![0]));
    ifd.set(tags::IMAGE_WIDTH, TagValue::Long(vec![out.width]));
    ifd.set(tags::IMAGE_LENGTH, TagValue::Long(vec![out.height]));
    ifd.set(
        tags::BITS_PER_SAMPLE,
        TagValue::Short(vec![out.bits_per_sample; spp as usize]),
    );
    ifd.set(tags::COMPRESSION, TagValue::Short(vec![1]));
    ifd.set(tags::SAMPLES_PER_PIXEL, TagValue::Short(vec![spp]));
    ifd.set(tags::ROWS_PER_STRIP, TagValue::Long(vec![out.height]));
    ifd.set(tags::PLANAR_CONFIG, TagValue::Short(vec![1]));
    ifd.set(
        tags::SAMPLE_FORMAT,
        TagValue::Short(vec![1; spp as usize]),
    );
    ifd.set(tags::X_RESOLUTION, TagValue::Rational(vec![(300, 1)]));
    ifd.set(tags::Y_RESOLUTION, TagValue::Rational(vec![(300, 1)]));
    ifd.set(tags::RESOLUTION_UNIT, TagValue::Short(vec![2]));
    ifd.set(tags::SOFTWARE, TagValue::Ascii(SOFTWARE_NAME.to_string()));

    ifd.set(tags::DNG_VERSION, TagValue::Byte(vec![1, 4, 0, 0]));
    ifd.set(tags::DNG_BACKWARD_VERSION, TagValue::Byte(vec![1, 1, 0, 0]));

    match color {
        DngColor::Cfa(pattern) => {
            ifd.set(tags::PHOTOMETRIC, TagValue::Short(vec![32803]));
            ifd.set(tags::CFA_REPEAT_PATTERN_DIM, TagValue::Short(vec![2, 2]));
            ifd.set(
                tags::CFA_PATTERN,
                TagValue::Byte(pattern.codes().to_vec()),
            );
            // Rectangular layout
            ifd.set(tags::CFA_LAYOUT, TagValue::Short(vec![1]));
        }
        DngColor::Rgb => {
            ifd.set(tags::PHOTOMETRIC, TagValue::Short(vec![2]));
        }
    }

    // Levels: a linearization table rebases the stored codes to a full
    // 16-bit linear range
    if let Some(table) = &out.linearization {
        ifd.set(tags::LINEARIZATION_TABLE, TagValue::Short(table.clone()));
        ifd.set(tags::BLACK_LEVEL, TagValue::Short(vec![0; 4]));
        ifd.set(tags::WHITE_LEVEL, TagValue::Short(vec![65534]));
    } else {
        ifd.set(
            tags::BLACK_LEVEL,
            TagValue::Short(out.black_level.to_vec()),
        );
        ifd.set(tags::WHITE_LEVEL, TagValue::Short(vec![out.white_level]));
    }
    ifd.set(tags::BLACK_LEVEL_REPEAT_DIM, TagValue::Short(vec![2, 2]));

    ifd.set(
        tags::ACTIVE_AREA,
        TagValue::Long(vec![0, 0, out.height, out.width]),
    );

    // Color calibration, sidecar overrides first
    let color_matrix1 = calibration
        .and_then(|c| c.color_matrix1)
        .unwrap_or(camera.color_matrix1);
    let color_matrix2 = calibration
        .and_then(|c| c.color_matrix2)
        .unwrap_or(camera.color_matrix2);
    let forward_matrix1 = calibration
        .and_then(|c| c.forward_matrix1)
        .unwrap_or(camera.forward_matrix1);
    let forward_matrix2 = calibration
        .and_then(|c| c.forward_matrix2)
        .unwrap_or(camera.forward_matrix2);

    if !is_zero_matrix(&color_matrix1) {
        ifd.set(tags::COLOR_MATRIX_1, matrix_srational(&color_matrix1));
    }
    if !is_zero_matrix(&color_matrix2) {
        ifd.set(tags::COLOR_MATRIX_2, matrix_srational(&color_matrix2));
    }
    if !is_zero_matrix(&forward_matrix1) {
        ifd.set(tags::FORWARD_MATRIX_1, matrix_srational(&forward_matrix1));
    }
    if !is_zero_matrix(&forward_matrix2) {
        ifd.set(tags::FORWARD_MATRIX_2, matrix_srational(&forward_matrix2));
    }

    ifd.set(tags::CAMERA_CALIBRATION_1, matrix_srational(&IDENTITY_MATRIX));
    ifd.set(tags::CAMERA_CALIBRATION_2, matrix_srational(&IDENTITY_MATRIX));

    let neutral = calibration
        .and_then(|c| c.as_shot_neutral)
        .unwrap_or(metadata.as_shot_neutral);
    ifd.set(
        tags::AS_SHOT_NEUTRAL,
        TagValue::Rational(
            neutral
                .iter()
                .map(|&v| ((v * 1_000_000.0).round().max(0.0) as u32, 1_000_000))
                .collect(),
        ),
    );

    ifd.set(
        tags::CALIBRATION_ILLUMINANT_1,
        TagValue::Short(vec![illuminant_code(&camera.color_illuminant1)]),
    );
    ifd.set(
        tags::CALIBRATION_ILLUMINANT_2,
        TagValue::Short(vec![illuminant_code(&camera.color_illuminant2)]),
    );

    // Camera identity
    let mut exposure_offset = params.exposure_offset_ev;
    match params.camera_model.as_str() {
        "" => {
            if !camera.build_model.is_empty() {
                ifd.set(
                    tags::UNIQUE_CAMERA_MODEL,
                    TagValue::Ascii(camera.build_model.clone()),
                );
            }
        }
        "Blackmagic" => {
            ifd.set(
                tags::UNIQUE_CAMERA_MODEL,
                TagValue::Ascii("Blackmagic Pocket Cinema Camera 4K".to_string()),
            );
        }
        "Panasonic" => {
            ifd.set(
                tags::UNIQUE_CAMERA_MODEL,
                TagValue::Ascii("Panasonic Varicam RAW".to_string()),
            );
            // Varicam profiles expect a darker baseline
            exposure_offset -= 2.0;
        }
        "Fujifilm" | "Fujifilm X-T5" => {
            ifd.set(
                tags::UNIQUE_CAMERA_MODEL,
                TagValue::Ascii("Fujifilm X-T5".to_string()),
            );
            ifd.set(tags::MAKE, TagValue::Ascii("Fujifilm".to_string()));
            ifd.set(tags::MODEL, TagValue::Ascii("X-T5".to_string()));
        }
        other => {
            ifd.set(tags::UNIQUE_CAMERA_MODEL, TagValue::Ascii(other.to_string()));
        }
    }

    // Exposure
    if metadata.iso > 0 {
        ifd.set(tags::ISO, TagValue::Short(vec![metadata.iso.min(65535) as u16]));
    }
    if metadata.exposure_time > 0.0 {
        ifd.set(
            tags::EXPOSURE_TIME,
            TagValue::Rational(vec![exposure_time_rational(metadata.exposure_time)]),
        );
    }

    let mut baseline = exposure_offset;
    if params.normalize_exposure && metadata.iso > 0 && metadata.exposure_time > 0.0 {
        baseline += (params.baseline_exp_value
            / (metadata.iso as f64 * metadata.exposure_time))
            .log2() as f32;
    }
    ifd.set(
        tags::BASELINE_EXPOSURE,
        TagValue::SRational(vec![srational_from_f32(baseline, 100)]),
    );

    ifd.set(
        tags::ORIENTATION,
        TagValue::Short(vec![orientation_code(metadata.orientation, camera.flipped)]),
    );

    // Timecode and frame rate
    ifd.set(
        tags::TIME_CODES,
        TagValue::Byte(timecode_bytes(params.frame_index, params.fps).to_vec()),
    );
    let (fps_num, fps_den) = common::to_fraction(params.fps, 1000);
    ifd.set(
        tags::FRAME_RATE,
        TagValue::SRational(vec![(fps_num as i32, fps_den as i32)]),
    );

    // Shading map as a GainMap opcode when it was not baked into the pixels
    if params.include_gain_map && !out.shading_baked {
        if let Some(map) = &metadata.shading_map {
            if let Some(gain_map) = opcodes::gain_map_from_shading(
                map,
                out.width,
                out.height,
                out.sensor_left,
                out.sensor_top,
            ) {
                ifd.set(
                    tags::OPCODE_LIST_2,
                    TagValue::Undefined(opcodes::serialize_opcode_list(&[gain_map])),
                );
            }
        }
    }

    debug!(
        width = out.width,
        height = out.height,
        bits = out.bits_per_sample,
        white = out.white_level,
        "Assembling DNG frame {}",
        params.frame_index
    );

    Ok(ifd.write_with_strip(&out.data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::{PreprocessParams, preprocess_bayer};

    fn render_sample(params: &DngFrameParams) -> Vec<u8> {
        let metadata = FrameMetadata {
            width: 8,
            height: 8,
            original_width: 8,
            original_height: 8,
            iso: 400,
            exposure_time: 10_000_000.0,
            dynamic_black_level: [64.0; 4],
            dynamic_white_level: 1023.0,
            ..FrameMetadata::default()
        };
        let camera = CameraConfig {
            color_matrix1: [0.7, -0.2, -0.1, -0.5, 1.3, 0.2, -0.1, 0.2, 0.6],
            color_illuminant1: "standarda".to_string(),
            color_illuminant2: "d65".to_string(),
            sensor_arrangement: "rggb".to_string(),
            ..CameraConfig::default()
        };

        let src = vec![512u16; 64];
        let out = preprocess_bayer(
            &src,
            8,
            8,
            &metadata,
            &camera,
            &PreprocessParams::default(),
        )
        .unwrap();

        assemble_dng(
            &out,
            DngColor::Cfa(CfaPattern::Rggb),
            &metadata,
            &camera,
            None,
            params,
        )
        .unwrap()
    }

    fn tag_u32(dng: &[u8], tag: u16) -> Option<u32> {
        writer::read_ifd_entries(dng)?
            .into_iter()
            .find(|(e, _)| e.tag == tag)
            .and_then(|(e, off)| e.as_u32(dng, off))
    }

    #[test]
    fn test_core_tags_present() {
        let dng = render_sample(&DngFrameParams::default());

        assert_eq!(tag_u32(&dng, tags::IMAGE_WIDTH), Some(8));
        assert_eq!(tag_u32(&dng, tags::IMAGE_LENGTH), Some(8));
        assert_eq!(tag_u32(&dng, tags::BITS_PER_SAMPLE), Some(10));
        assert_eq!(tag_u32(&dng, tags::PHOTOMETRIC), Some(32803));
        assert_eq!(tag_u32(&dng, tags::SAMPLES_PER_PIXEL), Some(1));
        assert_eq!(tag_u32(&dng, tags::WHITE_LEVEL), Some(1023));
        assert_eq!(tag_u32(&dng, tags::COMPRESSION), Some(1));
        assert_eq!(tag_u32(&dng, tags::CALIBRATION_ILLUMINANT_1), Some(17));
        assert_eq!(tag_u32(&dng, tags::CALIBRATION_ILLUMINANT_2), Some(21));

        let version = writer::find_tag(&dng, tags::DNG_VERSION).unwrap();
        assert_eq!(version, &[1, 4, 0, 0]);

        let cfa = writer::find_tag(&dng, tags::CFA_PATTERN).unwrap();
        assert_eq!(cfa, &[0, 1, 1, 2]);
    }

    #[test]
    fn test_strip_size_matches_packed_plane() {
        let dng = render_sample(&DngFrameParams::default());
        assert_eq!(
            tag_u32(&dng, writer::TAG_STRIP_BYTE_COUNTS),
            Some(8 * 8 * 10 / 8)
        );
    }

    #[test]
    fn test_camera_model_mapping() {
        let params = DngFrameParams {
            camera_model: "Blackmagic".to_string(),
            ..DngFrameParams::default()
        };
        let dng = render_sample(&params);
        let model = writer::find_tag(&dng, tags::UNIQUE_CAMERA_MODEL).unwrap();
        assert!(model.starts_with(b"Blackmagic Pocket Cinema Camera 4K"));
    }

    #[test]
    fn test_fujifilm_sets_make_and_model() {
        let params = DngFrameParams {
            camera_model: "Fujifilm".to_string(),
            ..DngFrameParams::default()
        };
        let dng = render_sample(&params);
        assert!(writer::find_tag(&dng, tags::MAKE).unwrap().starts_with(b"Fujifilm"));
        assert!(writer::find_tag(&dng, tags::MODEL).unwrap().starts_with(b"X-T5"));
    }

    #[test]
    fn test_panasonic_baseline_offset() {
        let params = DngFrameParams {
            camera_model: "Panasonic".to_string(),
            ..DngFrameParams::default()
        };
        let dng = render_sample(&params);
        let be = writer::find_tag(&dng, tags::BASELINE_EXPOSURE).unwrap();
        let num = i32::from_le_bytes(be[0..4].try_into().unwrap());
        let den = i32::from_le_bytes(be[4..8].try_into().unwrap());
        assert_eq!((num, den), (-200, 100));
    }

    #[test]
    fn test_timecode_bcd() {
        // Frame 95 at 30 fps = 3s + 5 frames
        let tc = timecode_bytes(95, 30.0);
        assert_eq!(tc[0], 0x05);
        assert_eq!(tc[1], 0x03);
        assert_eq!(tc[2], 0x00);
        assert_eq!(tc[3], 0x00);

        // One hour, one minute, one second, one frame at 25 fps
        let frame = (3600 + 60 + 1) * 25 + 1;
        let tc = timecode_bytes(frame, 25.0);
        assert_eq!(tc[3], 0x01);
        assert_eq!(tc[2], 0x01);
        assert_eq!(tc[1], 0x01);
        assert_eq!(tc[0], 0x01);
    }

    #[test]
    fn test_orientation_table() {
        assert_eq!(orientation_code(Orientation::Portrait, false), 6);
        assert_eq!(orientation_code(Orientation::Portrait, true), 7);
        assert_eq!(orientation_code(Orientation::ReversePortrait, false), 8);
        assert_eq!(orientation_code(Orientation::ReversePortrait, true), 5);
        assert_eq!(orientation_code(Orientation::Landscape, false), 1);
        assert_eq!(orientation_code(Orientation::Landscape, true), 2);
        assert_eq!(orientation_code(Orientation::ReverseLandscape, false), 3);
        assert_eq!(orientation_code(Orientation::ReverseLandscape, true), 4);
    }

    #[test]
    fn test_exposure_time_rational() {
        let (n, d) = exposure_time_rational(10_000_000.0);
        // 10ms = 1/100s
        assert_eq!((n, d), (1, 100));
    }

    #[test]
    fn test_gain_map_opcode_round_trip() {
        let metadata = FrameMetadata {
            width: 8,
            height: 8,
            original_width: 8,
            original_height: 8,
            dynamic_white_level: 1023.0,
            shading_map: Some(crate::ShadingMap::uniform(3, 3, 1.5)),
            ..FrameMetadata::default()
        };
        let camera = CameraConfig::default();
        let src = vec![512u16; 64];
        let out = preprocess_bayer(
            &src,
            8,
            8,
            &metadata,
            &camera,
            &PreprocessParams::default(),
        )
        .unwrap();

        let dng = assemble_dng(
            &out,
            DngColor::Cfa(CfaPattern::Rggb),
            &metadata,
            &camera,
            None,
            &DngFrameParams::default(),
        )
        .unwrap();

        let list = writer::find_tag(&dng, tags::OPCODE_LIST_2).expect("opcode list");
        let map = opcodes::parse_gain_map(list).expect("gain map");
        assert_eq!((map.map_points_v, map.map_points_h), (3, 3));
        assert_eq!(map.gains[0], 1.5);
    }

    #[test]
    fn test_no_gain_map_when_shading_baked() {
        let metadata = FrameMetadata {
            width: 8,
            height: 8,
            original_width: 8,
            original_height: 8,
            dynamic_white_level: 1023.0,
            shading_map: Some(crate::ShadingMap::uniform(3, 3, 1.5)),
            ..FrameMetadata::default()
        };
        let camera = CameraConfig::default();
        let src = vec![512u16; 64];
        let out = preprocess_bayer(
            &src,
            8,
            8,
            &metadata,
            &camera,
            &PreprocessParams {
                apply_shading: true,
                ..PreprocessParams::default()
            },
        )
        .unwrap();

        let dng = assemble_dng(
            &out,
            DngColor::Cfa(CfaPattern::Rggb),
            &metadata,
            &camera,
            None,
            &DngFrameParams::default(),
        )
        .unwrap();

        assert!(writer::find_tag(&dng, tags::OPCODE_LIST_2).is_none());
    }

    #[test]
    fn test_calibration_override_wins() {
        let metadata = FrameMetadata {
            width: 8,
            height: 8,
            original_width: 8,
            original_height: 8,
            dynamic_white_level: 1023.0,
            as_shot_neutral: [0.4, 1.0, 0.7],
            ..FrameMetadata::default()
        };
        let camera = CameraConfig::default();
        let calibration = CalibrationData {
            as_shot_neutral: Some([0.5, 1.0, 0.5]),
            ..CalibrationData::default()
        };

        let src = vec![512u16; 64];
        let out = preprocess_bayer(
            &src,
            8,
            8,
            &metadata,
            &camera,
            &PreprocessParams::default(),
        )
        .unwrap();

        let dng = assemble_dng(
            &out,
            DngColor::Cfa(CfaPattern::Rggb),
            &metadata,
            &camera,
            Some(&calibration),
            &DngFrameParams::default(),
        )
        .unwrap();

        let neutral = writer::find_tag(&dng, tags::AS_SHOT_NEUTRAL).unwrap();
        let n0 = u32::from_le_bytes(neutral[0..4].try_into().unwrap());
        assert_eq!(n0, 500_000);
    }
}

//! Rawframe - frame rendering engine for virtual DNG sequences.
//!
//! Turns a source sample (raw Bayer plane or RGB decoded from a log video)
//! plus its metadata into a compliant DNG byte stream:
//! - Codec primitives: bit packers, shading-map sampling, remosaic
//! - Preprocessor: level remapping, vignette correction, log encoding
//! - DNG assembler over a little-endian TIFF writer
//! - Constant-frame-rate time model
//! - Exposure keyframes and audio synchronization

pub mod audio;
pub mod calibration;
pub mod codec;
pub mod dng;
mod error;
pub mod exposure;
pub mod metadata;
pub mod preprocess;
pub mod time_model;
pub mod yuv;

/// Capture timestamp in nanoseconds.
pub type Timestamp = i64;

pub use calibration::CalibrationData;
pub use codec::CfaPattern;
pub use codec::shading::ShadingMap;
pub use error::RenderError;
pub use exposure::ExposureKeyframes;
pub use metadata::{CameraConfig, FrameMetadata, Orientation};
pub use preprocess::{LevelMode, LogMode, PreprocessOutput, PreprocessParams};
pub use time_model::{FrameRateStats, TimeMapping};

//! Seams to the consumed media libraries.
//!
//! The recording-container parser and the video decoder are external
//! collaborators; these traits state exactly the contract the ingest
//! variants rely on, and tests drive them with in-memory fakes.

use std::path::Path;

use serde_json::Value;
use thiserror::Error;

use rawframe::Timestamp;
use rawframe::audio::AudioChunk;
use rawframe::yuv::PixelFormat;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source is corrupt: {0}")]
    Corrupt(String),

    #[error("No frame at timestamp {0}")]
    FrameNotFound(Timestamp),

    #[error("Unsupported source: {0}")]
    Unsupported(String),
}

/// A raw recording container: per-frame Bayer planes plus JSON metadata and
/// an optional PCM track. Handles are stateful decoders, so methods take
/// `&mut self`; the IO pool keeps one handle per worker per source path.
pub trait RawContainer: Send {
    /// Capture timestamps of every frame, unsorted.
    fn frames(&mut self) -> Result<Vec<Timestamp>, SourceError>;

    /// Decode one frame: the 16-bit little-endian pixel plane and the
    /// frame's metadata record.
    fn load_frame(&mut self, timestamp: Timestamp) -> Result<(Vec<u8>, Value), SourceError>;

    /// Metadata only, no pixel decode.
    fn load_frame_metadata(&mut self, timestamp: Timestamp) -> Result<Value, SourceError>;

    fn load_audio(&mut self) -> Result<Vec<AudioChunk>, SourceError>;

    fn num_audio_channels(&self) -> u32;

    fn audio_sample_rate_hz(&self) -> u32;

    /// The per-recording configuration record.
    fn container_metadata(&mut self) -> Result<Value, SourceError>;
}

/// Opens container handles; shared across the IO pool workers.
pub trait ContainerOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn RawContainer>, SourceError>;
}

/// Static properties of an opened video.
#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub is_hlg: bool,
}

/// One enumerated video frame.
#[derive(Debug, Clone, Copy)]
pub struct VideoFrameInfo {
    pub pts: i64,
    pub timestamp: Timestamp,
}

/// Owned planar YUV pixels for one decoded frame. Strides are in bytes.
#[derive(Debug, Clone)]
pub struct YuvFrame {
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
    pub y_stride: usize,
    pub u_stride: usize,
    pub v_stride: usize,
}

/// A seekable video decoder for the log-video ingest.
pub trait VideoDecoder: Send {
    fn info(&self) -> VideoInfo;

    /// Frame enumeration in presentation order.
    fn frames(&self) -> Vec<VideoFrameInfo>;

    /// Seek to and decode the frame at `index` in the enumeration.
    fn decode_frame(&mut self, index: usize) -> Result<YuvFrame, SourceError>;
}

/// Opens video-decoder handles; shared across the IO pool workers.
pub trait VideoOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoDecoder>, SourceError>;
}

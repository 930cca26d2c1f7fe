//! Rawmount - a recording container exposed as a virtual directory of
//! per-frame DNG files plus a synchronized WAV track.
//!
//! The host filesystem adapter (ProjFS, FUSE, ...) forwards enumerate,
//! stat, and read requests to a [`VirtualDirectory`]; frames render on
//! demand through a two-stage decode/render pipeline with a single-flight
//! LRU cache in front.

pub mod cache;
pub mod config;
pub mod entry;
mod error;
pub mod ingest;
pub mod pool;
pub mod session;
pub mod source;
pub mod vdir;

pub use cache::{CacheParams, FrameCache};
pub use config::{RenderConfig, RenderOptions};
pub use entry::{Entry, EntryData, EntryKind, FileInfo};
pub use error::VfsError;
pub use session::{MountId, SessionManager, SessionParams};
pub use vdir::{ReadCallback, ReadMode, VirtualDirectory};

//! Synthetic directory entries and the per-mount info snapshot.

use rawframe::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
    /// Shell-support files like `desktop.ini`, hidden from casual listings.
    HiddenSystem,
}

/// Source locator carried by an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryData {
    None,
    /// A rendered frame: output slot index plus the source timestamp that
    /// fills it.
    Frame { index: i64, timestamp: Timestamp },
    /// A prerendered byte region, e.g. the muxed audio track.
    Chunk(u32),
}

/// One synthetic file or directory in the mount.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    pub kind: EntryKind,
    pub path_parts: Vec<String>,
    pub name: String,
    pub size: u64,
    pub data: EntryData,
}

impl Entry {
    pub fn file(name: impl Into<String>, size: u64) -> Entry {
        Entry {
            kind: EntryKind::File,
            path_parts: Vec::new(),
            name: name.into(),
            size,
            data: EntryData::None,
        }
    }

    pub fn frame(name: impl Into<String>, size: u64, index: i64, timestamp: Timestamp) -> Entry {
        Entry {
            kind: EntryKind::File,
            path_parts: Vec::new(),
            name: name.into(),
            size,
            data: EntryData::Frame { index, timestamp },
        }
    }

    /// Slash-joined path of the entry relative to the mount root.
    pub fn full_path(&self) -> String {
        if self.path_parts.is_empty() {
            return self.name.clone();
        }
        let mut path = self.path_parts.join("/");
        path.push('/');
        path.push_str(&self.name);
        path
    }

    /// Stable identity used as the cache key component.
    pub fn identity(&self) -> String {
        format!("{:?}:{}", self.kind, self.full_path())
    }
}

/// `<base>-NNNNNN.ext` with six-digit zero padding.
pub fn frame_filename(base: &str, frame_number: i64, extension: &str) -> String {
    let dot = if extension.starts_with('.') || extension.is_empty() {
        ""
    } else {
        "."
    };
    format!("{base}{frame_number:06}{dot}{extension}")
}

/// Snapshot of a mounted source for UI display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    pub median_fps: f32,
    pub average_fps: f32,
    pub total_frames: u32,
    pub dropped_frames: u32,
    pub duplicated_frames: u32,
    /// Source data description, e.g. `"10-bit Bayer (rggb)"`.
    pub data_type: String,
    /// Active level-transform summary.
    pub levels: String,
    pub runtime_secs: f32,
}

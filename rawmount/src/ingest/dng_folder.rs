//! Pass-through ingest for an existing DNG sequence on disk: files are
//! served unchanged, with frame ordering recovered from their numbering and
//! any embedded GainMap opcode parsed once for reporting.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, bail};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use rawframe::Timestamp;
use rawframe::dng::{opcodes, tags, writer};
use rawframe::time_model::frame_rate_stats;

use crate::cache::CacheKey;
use crate::config::RenderConfig;
use crate::entry::{Entry, EntryData, EntryKind, FileInfo, frame_filename};
use crate::error::VfsError;
use crate::ingest::{
    filter_entries, find_in_entries, next_dir_id, read_inline, read_through_cache,
};
use crate::pool::MountEnv;
use crate::vdir::{DESKTOP_INI, ReadCallback, ReadMode, VirtualDirectory};

/// Assumed cadence when filenames are the only timing source.
const FALLBACK_FPS: f64 = 30.0;

#[derive(Debug, Clone)]
struct SequenceFrame {
    path: PathBuf,
    size: u64,
    timestamp: Timestamp,
}

pub struct DngFolderDirectory {
    base_name: String,
    env: MountEnv,
    dir_id: u64,
    generation: AtomicU64,
    frames: Vec<SequenceFrame>,
    width: u32,
    height: u32,
    median_fps: f32,
    average_fps: f32,
    has_gain_map: bool,
    levels: RwLock<String>,
    entries: RwLock<Arc<Vec<Entry>>>,
}

/// First run of six or more digits in a filename, the sequence number
/// convention of DNG exports.
fn extract_frame_number(name: &str) -> Option<i64> {
    let bytes = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i - start >= 6 {
                return name[start..i].parse().ok();
            }
        } else {
            i += 1;
        }
    }
    None
}

impl DngFolderDirectory {
    pub fn new(
        dir_path: &Path,
        config: RenderConfig,
        env: MountEnv,
    ) -> anyhow::Result<DngFolderDirectory> {
        let base_name = dir_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "frame".to_string());

        let mut files: Vec<(PathBuf, Option<i64>, u64)> = Vec::new();
        for item in std::fs::read_dir(dir_path)
            .with_context(|| format!("Reading DNG folder {}", dir_path.display()))?
        {
            let item = item?;
            let path = item.path();
            if path.extension().is_none_or(|e| !e.eq_ignore_ascii_case("dng")) {
                continue;
            }
            let size = item.metadata()?.len();
            let number = path
                .file_stem()
                .and_then(|s| extract_frame_number(&s.to_string_lossy()));
            files.push((path, number, size));
        }

        if files.is_empty() {
            bail!("No DNG files in {}", dir_path.display());
        }

        // Frame numbers order the sequence when every file carries one,
        // otherwise plain name order
        if files.iter().all(|(_, n, _)| n.is_some()) {
            files.sort_by_key(|(_, n, _)| n.unwrap());
        } else {
            files.sort_by(|a, b| a.0.cmp(&b.0));
        }

        let ns_per_frame = 1e9 / FALLBACK_FPS;
        let frames: Vec<SequenceFrame> = files
            .iter()
            .enumerate()
            .map(|(i, (path, number, size))| SequenceFrame {
                path: path.clone(),
                size: *size,
                timestamp: (number.unwrap_or(i as i64) as f64 * ns_per_frame) as Timestamp,
            })
            .collect();

        let stats = frame_rate_stats(&frames.iter().map(|f| f.timestamp).collect::<Vec<_>>());

        // Inspect the first frame: dimensions and the optional gain map
        let (width, height, has_gain_map) = match std::fs::read(&frames[0].path) {
            Ok(bytes) => inspect_dng(&bytes),
            Err(e) => {
                warn!("Could not inspect {}: {e}", frames[0].path.display());
                (0, 0, false)
            }
        };

        if has_gain_map {
            info!("DNG sequence carries an embedded lens-shading gain map");
        }

        let dir = DngFolderDirectory {
            base_name,
            env,
            dir_id: next_dir_id(),
            generation: AtomicU64::new(0),
            frames,
            width,
            height,
            median_fps: stats.median_fps,
            average_fps: stats.average_fps,
            has_gain_map,
            levels: RwLock::new(config.levels.clone()),
            entries: RwLock::new(Arc::new(Vec::new())),
        };
        dir.rebuild();

        info!(
            frames = dir.frames.len(),
            width,
            height,
            "Mounted DNG sequence {}",
            dir_path.display()
        );

        Ok(dir)
    }

    fn rebuild(&self) {
        let mut entries = Vec::with_capacity(self.frames.len() + 1);
        if self.env.desktop_ini {
            entries.push(Entry {
                kind: EntryKind::HiddenSystem,
                path_parts: Vec::new(),
                name: "desktop.ini".to_string(),
                size: DESKTOP_INI.len() as u64,
                data: EntryData::None,
            });
        }

        let base = format!("{}-", self.base_name);
        for (i, frame) in self.frames.iter().enumerate() {
            entries.push(Entry::frame(
                frame_filename(&base, i as i64, "dng"),
                frame.size,
                i as i64,
                frame.timestamp,
            ));
        }

        *self.entries.write() = Arc::new(entries);
    }

    fn schedule_read(
        &self,
        entry: &Entry,
        pos: u64,
        len: usize,
        mode: ReadMode,
        callback: ReadCallback,
    ) {
        let EntryData::Frame { index, .. } = entry.data else {
            callback(Err(VfsError::NotFound));
            return;
        };
        let Some(frame) = self.frames.get(index as usize) else {
            callback(Err(VfsError::NotFound));
            return;
        };

        let key = CacheKey {
            dir: self.dir_id,
            generation: self.generation.load(Ordering::Acquire),
            entry: entry.identity(),
        };
        let produce_key = key.clone();
        let env = self.env.clone();
        let path = frame.path.clone();

        let produce = move || {
            let io_env = env.clone();
            env.io.submit(move || {
                debug!("Reading sequence file {}", path.display());
                let result = std::fs::read(&path)
                    .map(Arc::new)
                    .map_err(|e| {
                        error!("Failed to read {}: {e}", path.display());
                        VfsError::Decode(e.to_string())
                    });
                io_env.cache.complete(&produce_key, result);
            });
        };

        read_through_cache(&self.env, key, pos, len, mode, callback, produce);
    }
}

/// Pull dimensions and gain-map presence out of a DNG's IFD chain.
fn inspect_dng(bytes: &[u8]) -> (u32, u32, bool) {
    let Some(entries) = writer::read_ifd_entries(bytes) else {
        return (0, 0, false);
    };

    let tag_value = |tag: u16| {
        entries
            .iter()
            .find(|(e, _)| e.tag == tag)
            .and_then(|(e, off)| e.as_u32(bytes, *off))
    };

    let width = tag_value(tags::IMAGE_WIDTH).unwrap_or(0);
    let height = tag_value(tags::IMAGE_LENGTH).unwrap_or(0);

    let gain_map = [tags::OPCODE_LIST_2, tags::OPCODE_LIST_3]
        .iter()
        .filter_map(|&tag| {
            entries
                .iter()
                .find(|(e, _)| e.tag == tag)
                .and_then(|(e, off)| e.value_bytes(bytes, *off))
        })
        .any(|list| opcodes::parse_gain_map(list).is_some());

    (width, height, gain_map)
}

impl VirtualDirectory for DngFolderDirectory {
    fn list_files(&self, filter: &str) -> Vec<Entry> {
        filter_entries(&self.entries.read(), filter)
    }

    fn find_entry(&self, full_path: &str) -> Option<Entry> {
        find_in_entries(&self.entries.read(), full_path)
    }

    fn read_file(
        &self,
        entry: &Entry,
        pos: u64,
        len: usize,
        mode: ReadMode,
        callback: ReadCallback,
    ) {
        if entry.name == "desktop.ini" {
            read_inline(DESKTOP_INI.as_bytes(), pos, len, callback);
        } else if entry.name.ends_with(".dng") {
            self.schedule_read(entry, pos, len, mode, callback);
        } else {
            callback(Err(VfsError::NotFound));
        }
    }

    fn update_options(&self, config: &RenderConfig) {
        // Pass-through frames do not re-render; only bookkeeping changes
        *self.levels.write() = config.levels.clone();
        self.generation.fetch_add(1, Ordering::Release);
        self.rebuild();
    }

    fn file_info(&self) -> FileInfo {
        FileInfo {
            width: self.width,
            height: self.height,
            fps: self.median_fps,
            median_fps: self.median_fps,
            average_fps: self.average_fps,
            total_frames: self.frames.len() as u32,
            dropped_frames: 0,
            duplicated_frames: 0,
            data_type: if self.has_gain_map {
                "DNG passthrough (gain map)".to_string()
            } else {
                "DNG passthrough".to_string()
            },
            levels: self.levels.read().clone(),
            runtime_secs: if self.median_fps > 0.0 {
                self.frames.len() as f32 / self.median_fps
            } else {
                0.0
            },
        }
    }
}

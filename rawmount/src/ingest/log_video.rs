//! Log-encoded video ingest: decodes H.265 frames to YUV, converts to
//! linear RGB (inverse HLG when flagged), optionally remosaics to a Bayer
//! plane, and assembles DNGs through the shared pipeline.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, bail};
use parking_lot::RwLock;
use tracing::{debug, error, info};

use rawframe::codec::remosaic::remosaic_rgb_to_bayer;
use rawframe::dng::{DngColor, DngFrameParams, assemble_dng};
use rawframe::preprocess::preprocess_linear;
use rawframe::time_model::{TimeMapping, build_mapping};
use rawframe::yuv::{YuvPlanes, hlg_to_linear, yuv_to_rgb16};
use rawframe::{CalibrationData, CameraConfig, CfaPattern, ExposureKeyframes, FrameMetadata};

use crate::cache::CacheKey;
use crate::config::{RenderConfig, RenderOptions};
use crate::entry::{Entry, EntryData, EntryKind, FileInfo, frame_filename};
use crate::error::VfsError;
use crate::ingest::{
    filter_entries, find_in_entries, next_dir_id, read_inline, read_through_cache,
};
use crate::pool::MountEnv;
use crate::source::{VideoDecoder, VideoFrameInfo, VideoInfo, VideoOpener, YuvFrame};
use crate::vdir::{DESKTOP_INI, ReadCallback, ReadMode, VirtualDirectory};

thread_local! {
    /// One decoder handle per IO worker per source path.
    static HANDLES: RefCell<HashMap<PathBuf, Box<dyn VideoDecoder>>> =
        RefCell::new(HashMap::new());
}

fn with_decoder<R>(
    opener: &dyn VideoOpener,
    path: &Path,
    f: impl FnOnce(&mut dyn VideoDecoder) -> R,
) -> Result<R, VfsError> {
    HANDLES.with(|handles| {
        let mut handles = handles.borrow_mut();
        if !handles.contains_key(path) {
            let handle = opener
                .open(path)
                .map_err(|e| VfsError::Decode(e.to_string()))?;
            handles.insert(path.to_path_buf(), handle);
        }
        Ok(f(handles
            .get_mut(path)
            .expect("handle just inserted")
            .as_mut()))
    })
}

struct DirState {
    config: RenderConfig,
    entries: Arc<Vec<Entry>>,
    mapping: TimeMapping,
    keyframes: Option<ExposureKeyframes>,
    static_ev: f32,
    frame_entry_count: i64,
    /// Remosaic target, `None` to keep RGB output.
    remosaic_phase: Option<CfaPattern>,
    data_type: String,
}

pub struct LogVideoDirectory {
    opener: Arc<dyn VideoOpener>,
    src_path: PathBuf,
    base_name: String,
    env: MountEnv,
    dir_id: u64,
    generation: AtomicU64,
    info: VideoInfo,
    frames: Vec<VideoFrameInfo>,
    calibration: Option<CalibrationData>,
    state: RwLock<Arc<DirState>>,
}

impl LogVideoDirectory {
    pub fn new(
        opener: Arc<dyn VideoOpener>,
        src_path: &Path,
        config: RenderConfig,
        env: MountEnv,
    ) -> anyhow::Result<LogVideoDirectory> {
        let base_name = src_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "frame".to_string());

        let calibration = CalibrationData::load_for_source(src_path);

        let (info, frames, sample) = {
            let mut handle = opener
                .open(src_path)
                .with_context(|| format!("Opening video {}", src_path.display()))?;
            let info = handle.info();
            let frames = handle.frames();
            if frames.is_empty() {
                bail!("Video {} has no frames", src_path.display());
            }
            let sample = handle.decode_frame(0).context("Decoding sample frame")?;
            (info, frames, sample)
        };

        info!(
            width = info.width,
            height = info.height,
            frames = frames.len(),
            hlg = info.is_hlg,
            "Mounted log video {}",
            src_path.display()
        );

        let state = build_state(
            &info,
            &frames,
            &sample,
            calibration.as_ref(),
            &base_name,
            config,
            env.desktop_ini,
        )?;

        Ok(LogVideoDirectory {
            opener,
            src_path: src_path.to_path_buf(),
            base_name,
            env,
            dir_id: next_dir_id(),
            generation: AtomicU64::new(0),
            info,
            frames,
            calibration,
            state: RwLock::new(Arc::new(state)),
        })
    }

    fn state(&self) -> Arc<DirState> {
        Arc::clone(&self.state.read())
    }

    fn schedule_frame(
        &self,
        entry: &Entry,
        pos: u64,
        len: usize,
        mode: ReadMode,
        callback: ReadCallback,
    ) {
        let EntryData::Frame { index, timestamp } = entry.data else {
            callback(Err(VfsError::NotFound));
            return;
        };

        // Resolve the source frame position in the enumeration
        let Some(source_index) = self.frames.iter().position(|f| f.timestamp == timestamp)
        else {
            callback(Err(VfsError::NotFound));
            return;
        };

        let key = CacheKey {
            dir: self.dir_id,
            generation: self.generation.load(Ordering::Acquire),
            entry: entry.identity(),
        };
        let produce_key = key.clone();

        let state = self.state();
        let opener = Arc::clone(&self.opener);
        let src_path = self.src_path.clone();
        let env = self.env.clone();
        let info = self.info.clone();
        let calibration = self.calibration.clone();

        let produce = move || {
            let io_env = env.clone();
            env.io.submit(move || {
                debug!("Decoding video frame {source_index} of {}", src_path.display());

                let decoded = with_decoder(&*opener, &src_path, |d| {
                    d.decode_frame(source_index)
                        .map_err(|e| VfsError::Decode(e.to_string()))
                })
                .and_then(|r| r);

                match decoded {
                    Err(e) => {
                        error!("Video frame {source_index} decode failed: {e}");
                        io_env.cache.complete(&produce_key, Err(e));
                    }
                    Ok(yuv) => {
                        let proc_env = io_env.clone();
                        io_env.processing.spawn(move || {
                            let result =
                                render_frame(&yuv, &info, &state, calibration.as_ref(), index);
                            if let Err(e) = &result {
                                error!("Video frame {source_index} render failed: {e}");
                            }
                            proc_env.cache.complete(&produce_key, result.map(Arc::new));
                        });
                    }
                }
            });
        };

        read_through_cache(&self.env, key, pos, len, mode, callback, produce);
    }
}

/// Resolve the remosaic CFA phase: sidecar override first, then the config
/// unless it opts out, then the bggr default.
fn resolve_cfa_phase(config: &RenderConfig, calibration: Option<&CalibrationData>) -> CfaPattern {
    if let Some(phase) = calibration
        .and_then(|c| c.cfa_phase.as_deref())
        .and_then(CfaPattern::parse)
    {
        return phase;
    }
    if config.cfa_phase != "Don't override CFA" {
        if let Some(phase) = CfaPattern::parse(&config.cfa_phase) {
            return phase;
        }
    }
    CfaPattern::Bggr
}

fn build_state(
    info: &VideoInfo,
    frames: &[VideoFrameInfo],
    sample: &YuvFrame,
    calibration: Option<&CalibrationData>,
    base_name: &str,
    config: RenderConfig,
    desktop_ini: bool,
) -> anyhow::Result<DirState> {
    let timestamps: Vec<i64> = frames.iter().map(|f| f.timestamp).collect();
    let mapping = build_mapping(
        &timestamps,
        &config.cfr_target,
        config.options.has(RenderOptions::FRAMERATE_CONVERSION),
    );

    let keyframes = ExposureKeyframes::parse(&config.exposure_compensation);
    let static_ev = if keyframes.is_some() {
        0.0
    } else {
        config.static_exposure_ev()
    };

    let remosaic_phase = if config.options.has(RenderOptions::REMOSAIC) {
        Some(resolve_cfa_phase(&config, calibration))
    } else {
        None
    };

    let mut state = DirState {
        config,
        entries: Arc::new(Vec::new()),
        frame_entry_count: mapping.entries.len() as i64,
        mapping,
        keyframes,
        static_ev,
        remosaic_phase,
        data_type: String::new(),
    };

    let sample_dng = render_frame(sample, info, &state, calibration, 0)
        .map_err(|e| anyhow::anyhow!("Rendering sample frame: {e}"))?;
    let typical_size = sample_dng.len() as u64;

    state.data_type = match state.remosaic_phase {
        Some(phase) => format!("Log video remosaiced ({})", phase.as_str()),
        None => format!("Log video RGB{}", if info.is_hlg { " (HLG)" } else { "" }),
    };

    let mut entries = Vec::with_capacity(state.mapping.entries.len() + 1);
    if desktop_ini {
        entries.push(Entry {
            kind: EntryKind::HiddenSystem,
            path_parts: Vec::new(),
            name: "desktop.ini".to_string(),
            size: DESKTOP_INI.len() as u64,
            data: EntryData::None,
        });
    }

    let base = format!("{base_name}-");
    for &(index, timestamp) in &state.mapping.entries {
        entries.push(Entry::frame(
            frame_filename(&base, index, "dng"),
            typical_size,
            index,
            timestamp,
        ));
    }

    state.entries = Arc::new(entries);
    Ok(state)
}

fn render_frame(
    yuv: &YuvFrame,
    info: &VideoInfo,
    state: &DirState,
    calibration: Option<&CalibrationData>,
    frame_index: i64,
) -> Result<Vec<u8>, VfsError> {
    let planes = YuvPlanes {
        y: &yuv.y,
        u: &yuv.u,
        v: &yuv.v,
        y_stride: yuv.y_stride,
        u_stride: yuv.u_stride,
        v_stride: yuv.v_stride,
    };

    let mut rgb = yuv_to_rgb16(&planes, info.width, info.height, info.pixel_format)
        .map_err(|e| VfsError::Render(e.to_string()))?;

    if info.is_hlg {
        hlg_to_linear(&mut rgb);
    }

    let params = state.config.preprocess_params();
    let (processed, color) = match state.remosaic_phase {
        Some(phase) => {
            let bayer = remosaic_rgb_to_bayer(
                &rgb,
                info.width as usize,
                info.height as usize,
                phase,
            );
            let out = preprocess_linear(&bayer, info.width, info.height, 1, &params)
                .map_err(|e| VfsError::Render(e.to_string()))?;
            (out, DngColor::Cfa(phase))
        }
        None => {
            let out = preprocess_linear(&rgb, info.width, info.height, 3, &params)
                .map_err(|e| VfsError::Render(e.to_string()))?;
            (out, DngColor::Rgb)
        }
    };

    let exposure_offset_ev = match &state.keyframes {
        Some(kfs) => kfs.value_at_frame(frame_index, state.frame_entry_count),
        None => state.static_ev,
    };

    // Decoded video has no sensor metadata; the frame record only carries
    // the rendered geometry
    let metadata = FrameMetadata {
        width: processed.width,
        height: processed.height,
        original_width: processed.width,
        original_height: processed.height,
        ..FrameMetadata::default()
    };

    let frame_params = DngFrameParams {
        fps: state.mapping.fps,
        frame_index,
        camera_model: state.config.camera_model_override().to_string(),
        normalize_exposure: false,
        baseline_exp_value: 0.0,
        exposure_offset_ev,
        include_gain_map: false,
    };

    assemble_dng(
        &processed,
        color,
        &metadata,
        &CameraConfig::default(),
        calibration,
        &frame_params,
    )
    .map_err(|e| VfsError::Render(e.to_string()))
}

impl VirtualDirectory for LogVideoDirectory {
    fn list_files(&self, filter: &str) -> Vec<Entry> {
        filter_entries(&self.state().entries, filter)
    }

    fn find_entry(&self, full_path: &str) -> Option<Entry> {
        find_in_entries(&self.state().entries, full_path)
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
            self.schedule_frame(entry, pos, len, mode, callback);
        } else {
            callback(Err(VfsError::NotFound));
        }
    }

    fn update_options(&self, config: &RenderConfig) {
        info!("Updating log-video options to {}", config.options);
        self.generation.fetch_add(1, Ordering::Release);

        // Re-decode the sample through a fresh handle for sizing
        let rebuilt = (|| -> anyhow::Result<DirState> {
            let mut handle = self.opener.open(&self.src_path)?;
            let sample = handle.decode_frame(0)?;
            build_state(
                &self.info,
                &self.frames,
                &sample,
                self.calibration.as_ref(),
                &self.base_name,
                config.clone(),
                self.env.desktop_ini,
            )
        })();

        match rebuilt {
            Ok(state) => *self.state.write() = Arc::new(state),
            Err(e) => error!("Option update failed, keeping previous entry table: {e}"),
        }
    }

    fn file_info(&self) -> FileInfo {
        let state = self.state();
        FileInfo {
            width: self.info.width,
            height: self.info.height,
            fps: state.mapping.fps,
            median_fps: state.mapping.median_fps,
            average_fps: state.mapping.average_fps,
            total_frames: state.frame_entry_count as u32,
            dropped_frames: state.mapping.dropped,
            duplicated_frames: state.mapping.duplicated,
            data_type: state.data_type.clone(),
            levels: state.config.levels.clone(),
            runtime_secs: if state.mapping.fps > 0.0 {
                state.frame_entry_count as f32 / state.mapping.fps
            } else {
                0.0
            },
        }
    }
}

//! Raw-recording container ingest: decodes Bayer frames on demand and
//! renders them into DNGs, with the PCM track synced and muxed once at
//! mount.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, bail};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use rawframe::dng::{DngColor, DngFrameParams, assemble_dng};
use rawframe::preprocess::preprocess_bayer;
use rawframe::time_model::{TimeMapping, build_mapping};
use rawframe::{CameraConfig, CfaPattern, ExposureKeyframes, FrameMetadata, Timestamp, audio};

use crate::cache::CacheKey;
use crate::config::{RenderConfig, RenderOptions};
use crate::entry::{Entry, EntryData, EntryKind, FileInfo, frame_filename};
use crate::error::VfsError;
use crate::ingest::{
    filter_entries, find_in_entries, next_dir_id, read_inline, read_through_cache,
};
use crate::pool::MountEnv;
use crate::source::{ContainerOpener, RawContainer};
use crate::vdir::{DESKTOP_INI, ReadCallback, ReadMode, VirtualDirectory};

thread_local! {
    /// One container handle per IO worker per source path, reused across
    /// decode jobs.
    static HANDLES: RefCell<HashMap<PathBuf, Box<dyn RawContainer>>> =
        RefCell::new(HashMap::new());
}

/// Run `f` with this worker's handle for `path`, opening one on first use.
fn with_container<R>(
    opener: &dyn ContainerOpener,
    path: &Path,
    f: impl FnOnce(&mut dyn RawContainer) -> R,
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

/// Everything derived from one render configuration, swapped atomically on
/// `update_options`.
struct DirState {
    config: RenderConfig,
    entries: Arc<Vec<Entry>>,
    mapping: TimeMapping,
    keyframes: Option<ExposureKeyframes>,
    static_ev: f32,
    frame_entry_count: i64,
    rendered_width: u32,
    rendered_height: u32,
    data_type: String,
}

pub struct ContainerDirectory {
    opener: Arc<dyn ContainerOpener>,
    src_path: PathBuf,
    base_name: String,
    env: MountEnv,
    dir_id: u64,
    generation: AtomicU64,
    camera: CameraConfig,
    cfa: CfaPattern,
    timestamps: Vec<Timestamp>,
    baseline_exp_value: f64,
    /// Muxed WAV track, built once at mount; empty when the recording has
    /// no PCM.
    audio_track: Arc<Vec<u8>>,
    state: RwLock<Arc<DirState>>,
}

impl ContainerDirectory {
    pub fn new(
        opener: Arc<dyn ContainerOpener>,
        src_path: &Path,
        config: RenderConfig,
        env: MountEnv,
    ) -> anyhow::Result<ContainerDirectory> {
        let base_name = src_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "frame".to_string());

        let mut handle = opener
            .open(src_path)
            .with_context(|| format!("Opening container {}", src_path.display()))?;

        let mut timestamps = handle.frames().context("Enumerating container frames")?;
        timestamps.sort_unstable();
        if timestamps.is_empty() {
            bail!("Container {} has no frames", src_path.display());
        }

        let camera = CameraConfig::parse(
            &handle
                .container_metadata()
                .context("Reading container metadata")?,
        );
        let Some(cfa) = CfaPattern::parse(&camera.sensor_arrangement) else {
            bail!(
                "Container {} has invalid sensor arrangement '{}'",
                src_path.display(),
                camera.sensor_arrangement
            );
        };

        // The least sensitive exposure in the sequence anchors
        // normalization so no frame needs negative gain
        let mut baseline_exp_value = f64::MAX;
        for &ts in &timestamps {
            let meta = handle
                .load_frame_metadata(ts)
                .with_context(|| format!("Reading metadata of frame {ts}"))?;
            baseline_exp_value = baseline_exp_value.min(FrameMetadata::exposure_product(&meta));
        }

        // Sync and mux the PCM track once against the chosen frame rate
        let fps = build_mapping(
            &timestamps,
            &config.cfr_target,
            config.options.has(RenderOptions::FRAMERATE_CONVERSION),
        )
        .fps;
        let audio_track = match handle.load_audio() {
            Ok(mut chunks) if !chunks.is_empty() => {
                audio::sync_audio(
                    timestamps[0],
                    &mut chunks,
                    handle.audio_sample_rate_hz(),
                    handle.num_audio_channels(),
                );
                let (num, den) = common::to_fraction(fps, 1000);
                Arc::new(audio::wav::write_wav(
                    &chunks,
                    handle.num_audio_channels() as u16,
                    handle.audio_sample_rate_hz(),
                    num,
                    den,
                ))
            }
            Ok(_) => Arc::new(Vec::new()),
            Err(e) => {
                warn!("Failed to load audio track: {e}");
                Arc::new(Vec::new())
            }
        };

        let state = build_state(
            &mut *handle,
            &timestamps,
            &camera,
            cfa,
            &base_name,
            baseline_exp_value,
            config,
            env.desktop_ini,
            audio_track.len() as u64,
        )?;

        info!(
            frames = timestamps.len(),
            fps = state.mapping.fps,
            audio_bytes = audio_track.len(),
            "Mounted container {}",
            src_path.display()
        );

        Ok(ContainerDirectory {
            opener,
            src_path: src_path.to_path_buf(),
            base_name,
            env,
            dir_id: next_dir_id(),
            generation: AtomicU64::new(0),
            camera,
            cfa,
            timestamps,
            baseline_exp_value,
            audio_track,
            state: RwLock::new(Arc::new(state)),
        })
    }

    fn rebuild_with_config(&self, config: RenderConfig) -> anyhow::Result<()> {
        let mut handle = self.opener.open(&self.src_path)?;
        let state = build_state(
            &mut *handle,
            &self.timestamps,
            &self.camera,
            self.cfa,
            &self.base_name,
            self.baseline_exp_value,
            config,
            self.env.desktop_ini,
            self.audio_track.len() as u64,
        )?;
        *self.state.write() = Arc::new(state);
        Ok(())
    }

    fn state(&self) -> Arc<DirState> {
        Arc::clone(&self.state.read())
    }

    fn cache_key(&self, entry: &Entry) -> CacheKey {
        CacheKey {
            dir: self.dir_id,
            generation: self.generation.load(Ordering::Acquire),
            entry: entry.identity(),
        }
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

        let key = self.cache_key(entry);
        let state = self.state();

        let opener = Arc::clone(&self.opener);
        let src_path = self.src_path.clone();
        let env = self.env.clone();
        let camera = self.camera.clone();
        let cfa = self.cfa;
        let baseline = self.baseline_exp_value;
        let produce_key = key.clone();

        let produce = move || {
            let io_env = env.clone();
            env.io.submit(move || {
                debug!("Decoding frame {timestamp} of {}", src_path.display());

                let decoded = with_container(&*opener, &src_path, |c| {
                    c.load_frame(timestamp)
                        .map_err(|e| VfsError::Decode(e.to_string()))
                })
                .and_then(|r| r);

                match decoded {
                    Err(e) => {
                        error!("Frame {timestamp} decode failed: {e}");
                        io_env.cache.complete(&produce_key, Err(e));
                    }
                    Ok((plane, meta_json)) => {
                        let proc_env = io_env.clone();
                        io_env.processing.spawn(move || {
                            let result = render_frame(
                                &plane, &meta_json, &camera, cfa, &state, index, baseline,
                            );
                            if let Err(e) = &result {
                                error!("Frame {timestamp} render failed: {e}");
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

#[allow(clippy::too_many_arguments)]
fn build_state(
    handle: &mut dyn RawContainer,
    timestamps: &[Timestamp],
    camera: &CameraConfig,
    cfa: CfaPattern,
    base_name: &str,
    baseline_exp_value: f64,
    config: RenderConfig,
    desktop_ini: bool,
    audio_len: u64,
) -> anyhow::Result<DirState> {
    debug!("Building entry table with options {}", config.options);

    let mapping = build_mapping(
        timestamps,
        &config.cfr_target,
        config.options.has(RenderOptions::FRAMERATE_CONVERSION),
    );

    let keyframes = ExposureKeyframes::parse(&config.exposure_compensation);
    let static_ev = if keyframes.is_some() {
        0.0
    } else {
        config.static_exposure_ev()
    };

    let mut state = DirState {
        config,
        entries: Arc::new(Vec::new()),
        frame_entry_count: mapping.entries.len() as i64,
        mapping,
        keyframes,
        static_ev,
        rendered_width: 0,
        rendered_height: 0,
        data_type: String::new(),
    };

    // One sample render fixes the advertised file size and dimensions
    let (plane, meta_json) = handle
        .load_frame(timestamps[0])
        .context("Decoding sample frame")?;
    let sample_meta = FrameMetadata::parse(&meta_json);
    let processed = preprocess_bayer(
        &rawframe::codec::bytes_to_u16_le(&plane),
        sample_meta.width,
        sample_meta.height,
        &sample_meta,
        camera,
        &state.config.preprocess_params(),
    )?;
    state.rendered_width = processed.width;
    state.rendered_height = processed.height;
    state.data_type = format!("{}-bit Bayer ({})", processed.bits_per_sample, cfa.as_str());

    let typical_size = render_frame(
        &plane,
        &meta_json,
        camera,
        cfa,
        &state,
        0,
        baseline_exp_value,
    )
    .map_err(|e| anyhow::anyhow!("Rendering sample frame: {e}"))?
    .len() as u64;

    let mut entries = Vec::with_capacity(state.mapping.entries.len() + 2);
    if desktop_ini {
        entries.push(Entry {
            kind: EntryKind::HiddenSystem,
            path_parts: Vec::new(),
            name: "desktop.ini".to_string(),
            size: DESKTOP_INI.len() as u64,
            data: EntryData::None,
        });
    }
    if audio_len > 0 {
        entries.push(Entry::file("audio.wav", audio_len));
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

/// The full render pipeline for one decoded frame.
fn render_frame(
    plane: &[u8],
    meta_json: &Value,
    camera: &CameraConfig,
    cfa: CfaPattern,
    state: &DirState,
    frame_index: i64,
    baseline_exp_value: f64,
) -> Result<Vec<u8>, VfsError> {
    let metadata = FrameMetadata::parse(meta_json);

    let samples = rawframe::codec::bytes_to_u16_le(plane);
    let processed = preprocess_bayer(
        &samples,
        metadata.width,
        metadata.height,
        &metadata,
        camera,
        &state.config.preprocess_params(),
    )
    .map_err(|e| VfsError::Render(e.to_string()))?;

    let exposure_offset_ev = match &state.keyframes {
        Some(kfs) => kfs.value_at_frame(frame_index, state.frame_entry_count),
        None => state.static_ev,
    };

    let frame_params = DngFrameParams {
        fps: state.mapping.fps,
        frame_index,
        camera_model: state.config.camera_model_override().to_string(),
        normalize_exposure: state.config.options.has(RenderOptions::NORMALIZE_EXPOSURE),
        baseline_exp_value,
        exposure_offset_ev,
        include_gain_map: true,
    };

    assemble_dng(
        &processed,
        DngColor::Cfa(cfa),
        &metadata,
        camera,
        None,
        &frame_params,
    )
    .map_err(|e| VfsError::Render(e.to_string()))
}

impl VirtualDirectory for ContainerDirectory {
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
        } else if entry.name.ends_with(".wav") {
            read_inline(&self.audio_track, pos, len, callback);
        } else if entry.name.ends_with(".dng") {
            self.schedule_frame(entry, pos, len, mode, callback);
        } else {
            callback(Err(VfsError::NotFound));
        }
    }

    fn update_options(&self, config: &RenderConfig) {
        info!("Updating options to {}", config.options);
        self.generation.fetch_add(1, Ordering::Release);
        if let Err(e) = self.rebuild_with_config(config.clone()) {
            error!("Option update failed, keeping previous entry table: {e}");
        }
    }

    fn file_info(&self) -> FileInfo {
        let state = self.state();
        FileInfo {
            width: state.rendered_width,
            height: state.rendered_height,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheParams, FrameCache};
    use crate::pool::IoPool;
    use crate::source::SourceError;
    use rawframe::dng::{tags, writer};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    /// In-memory container: three 8x8 10-bit frames at 30 fps plus a short
    /// stereo PCM track.
    struct FakeContainer {
        decodes: Arc<AtomicUsize>,
    }

    const FRAME_TS: [Timestamp; 3] = [0, 33_333_333, 66_666_666];

    impl FakeContainer {
        fn frame_meta(ts: Timestamp) -> Value {
            json!({
                "width": 8,
                "height": 8,
                "originalWidth": 8,
                "originalHeight": 8,
                "iso": 400,
                "exposureTime": 10_000_000.0,
                "asShotNeutral": [0.5, 1.0, 0.6],
                "dynamicBlackLevel": [64.0, 64.0, 64.0, 64.0],
                "dynamicWhiteLevel": 1023.0,
                "orientation": 2,
                "timestamp": ts.to_string(),
            })
        }
    }

    impl RawContainer for FakeContainer {
        fn frames(&mut self) -> Result<Vec<Timestamp>, SourceError> {
            Ok(FRAME_TS.to_vec())
        }

        fn load_frame(&mut self, ts: Timestamp) -> Result<(Vec<u8>, Value), SourceError> {
            if !FRAME_TS.contains(&ts) {
                return Err(SourceError::FrameNotFound(ts));
            }
            self.decodes.fetch_add(1, Ordering::SeqCst);
            let plane: Vec<u8> = std::iter::repeat_n(512u16, 64)
                .flat_map(|s| s.to_le_bytes())
                .collect();
            Ok((plane, Self::frame_meta(ts)))
        }

        fn load_frame_metadata(&mut self, ts: Timestamp) -> Result<Value, SourceError> {
            Ok(Self::frame_meta(ts))
        }

        fn load_audio(&mut self) -> Result<Vec<rawframe::audio::AudioChunk>, SourceError> {
            Ok(vec![(0, vec![0i16; 960])])
        }

        fn num_audio_channels(&self) -> u32 {
            2
        }

        fn audio_sample_rate_hz(&self) -> u32 {
            48_000
        }

        fn container_metadata(&mut self) -> Result<Value, SourceError> {
            Ok(json!({
                "blackLevel": [64, 64, 64, 64],
                "whiteLevel": 1023,
                "sensorArrangement": "rggb",
                "colorIlluminant1": "standarda",
                "colorIlluminant2": "d65",
            }))
        }
    }

    struct FakeOpener {
        decodes: Arc<AtomicUsize>,
    }

    impl ContainerOpener for FakeOpener {
        fn open(&self, _path: &Path) -> Result<Box<dyn RawContainer>, SourceError> {
            Ok(Box::new(FakeContainer {
                decodes: Arc::clone(&self.decodes),
            }))
        }
    }

    fn test_env() -> MountEnv {
        MountEnv {
            io: Arc::new(IoPool::new(2)),
            processing: Arc::new(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(2)
                    .build()
                    .unwrap(),
            ),
            cache: Arc::new(FrameCache::new(CacheParams::default())),
            desktop_ini: false,
        }
    }

    fn mount(config: RenderConfig) -> (ContainerDirectory, Arc<AtomicUsize>) {
        let decodes = Arc::new(AtomicUsize::new(0));
        let opener = Arc::new(FakeOpener {
            decodes: Arc::clone(&decodes),
        });
        let dir = ContainerDirectory::new(
            opener,
            Path::new("/recordings/clip.mcraw"),
            config,
            test_env(),
        )
        .expect("mount");
        (dir, decodes)
    }

    fn cfr_config() -> RenderConfig {
        RenderConfig {
            options: RenderOptions::FRAMERATE_CONVERSION,
            ..RenderConfig::default()
        }
    }

    #[test]
    fn test_entry_table_layout() {
        let (dir, _) = mount(cfr_config());
        let entries = dir.list_files("");

        // audio.wav plus three frame entries
        assert!(entries.iter().any(|e| e.name == "audio.wav"));
        let frames: Vec<&Entry> = entries.iter().filter(|e| e.name.ends_with(".dng")).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].name, "clip-000000.dng");
        assert_eq!(frames[2].name, "clip-000002.dng");
        // All frame entries share the sample size
        assert!(frames.iter().all(|e| e.size == frames[0].size && e.size > 0));
    }

    #[test]
    fn test_find_entry_round_trips_listing() {
        let (dir, _) = mount(cfr_config());
        for entry in dir.list_files("") {
            let found = dir.find_entry(&entry.full_path()).expect("entry findable");
            assert_eq!(found, entry);
        }
        assert!(dir.find_entry("clip-999999.dng").is_none());
    }

    #[test]
    fn test_blocking_read_renders_valid_dng() {
        let (dir, _) = mount(cfr_config());
        let entry = dir.find_entry("clip-000001.dng").unwrap();

        let (tx, rx) = mpsc::channel();
        dir.read_file(
            &entry,
            0,
            entry.size as usize,
            ReadMode::Blocking,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        let bytes = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("callback fired")
            .expect("read succeeded");

        // The rendered bytes parse as a TIFF with our dimensions
        let entries = writer::read_ifd_entries(&bytes).expect("valid TIFF");
        let (width_entry, off) = entries
            .iter()
            .find(|(e, _)| e.tag == tags::IMAGE_WIDTH)
            .copied()
            .unwrap();
        assert_eq!(width_entry.as_u32(&bytes, off), Some(8));
    }

    #[test]
    fn test_concurrent_reads_share_one_decode() {
        let (dir, decodes) = mount(cfr_config());
        let entry = dir.find_entry("clip-000000.dng").unwrap();
        let baseline = decodes.load(Ordering::SeqCst);

        let (tx, rx) = mpsc::channel();
        for _ in 0..4 {
            let tx = tx.clone();
            dir.read_file(
                &entry,
                0,
                64,
                ReadMode::Async,
                Box::new(move |result| {
                    let _ = tx.send(result.expect("read ok"));
                }),
            );
        }

        let results: Vec<Vec<u8>> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(10)).expect("callback"))
            .collect();

        // Identical bytes for every reader, exactly one extra decode
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(decodes.load(Ordering::SeqCst), baseline + 1);
    }

    #[test]
    fn test_audio_read_is_inline_wav() {
        let (dir, _) = mount(cfr_config());
        let entry = dir.find_entry("audio.wav").unwrap();

        let (tx, rx) = mpsc::channel();
        dir.read_file(
            &entry,
            0,
            4,
            ReadMode::Async,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        let bytes = rx.recv_timeout(Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(&bytes, b"RIFF");
    }

    #[test]
    fn test_read_past_end_is_empty() {
        let (dir, _) = mount(cfr_config());
        let entry = dir.find_entry("audio.wav").unwrap();

        let (tx, rx) = mpsc::channel();
        dir.read_file(
            &entry,
            entry.size + 100,
            16,
            ReadMode::Async,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        let bytes = rx.recv_timeout(Duration::from_secs(1)).unwrap().unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_update_options_rebuilds_entries() {
        let (dir, _) = mount(cfr_config());
        let before = dir.file_info();
        assert_eq!(before.width, 8);

        let config = RenderConfig {
            options: RenderOptions::FRAMERATE_CONVERSION.with(RenderOptions::LOG_TRANSFORM),
            log_transform: "Reduce by 2bit".to_string(),
            ..RenderConfig::default()
        };
        dir.update_options(&config);

        let info = dir.file_info();
        assert_eq!(info.data_type, "8-bit Bayer (rggb)");
        // The table was rebuilt whole: still three frames, new sizes
        let entries = dir.list_files(".dng");
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.size > 0));
    }

    #[test]
    fn test_file_info_frame_rate() {
        let (dir, _) = mount(cfr_config());
        let info = dir.file_info();
        // Default target "Prefer Drop Frame" snaps a 30 fps source to 29.97
        assert!((info.fps - 29.97).abs() < 1e-3);
        assert_eq!(info.total_frames, 3);
        assert_eq!(info.dropped_frames, 0);
        assert_eq!(info.duplicated_frames, 0);
        assert_eq!(info.data_type, "10-bit Bayer (rggb)");
    }

    #[test]
    fn test_mount_fails_without_frames() {
        struct EmptyContainer;
        impl RawContainer for EmptyContainer {
            fn frames(&mut self) -> Result<Vec<Timestamp>, SourceError> {
                Ok(vec![])
            }
            fn load_frame(&mut self, ts: Timestamp) -> Result<(Vec<u8>, Value), SourceError> {
                Err(SourceError::FrameNotFound(ts))
            }
            fn load_frame_metadata(&mut self, ts: Timestamp) -> Result<Value, SourceError> {
                Err(SourceError::FrameNotFound(ts))
            }
            fn load_audio(&mut self) -> Result<Vec<rawframe::audio::AudioChunk>, SourceError> {
                Ok(vec![])
            }
            fn num_audio_channels(&self) -> u32 {
                0
            }
            fn audio_sample_rate_hz(&self) -> u32 {
                0
            }
            fn container_metadata(&mut self) -> Result<Value, SourceError> {
                Ok(json!({}))
            }
        }

        struct EmptyOpener;
        impl ContainerOpener for EmptyOpener {
            fn open(&self, _path: &Path) -> Result<Box<dyn RawContainer>, SourceError> {
                Ok(Box::new(EmptyContainer))
            }
        }

        let result = ContainerDirectory::new(
            Arc::new(EmptyOpener),
            Path::new("/recordings/empty.mcraw"),
            RenderConfig::default(),
            test_env(),
        );
        assert!(result.is_err());
    }
}

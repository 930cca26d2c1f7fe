//! Mount lifecycle: owns the worker pools and the shared cache, hands out
//! dense mount ids, and routes adapter callbacks to the owning directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::cache::{CacheParams, FrameCache};
use crate::config::RenderConfig;
use crate::entry::FileInfo;
use crate::ingest::container::ContainerDirectory;
use crate::ingest::dng_folder::DngFolderDirectory;
use crate::ingest::log_video::LogVideoDirectory;
use crate::pool::{IoPool, MountEnv};
use crate::source::{ContainerOpener, VideoOpener};
use crate::vdir::VirtualDirectory;

pub type MountId = i32;

/// Pool and cache sizing, fixed when the manager is created.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub io_workers: usize,
    /// Processing threads; `None` sizes to the machine.
    pub processing_threads: Option<usize>,
    pub cache: CacheParams,
    /// Emit the `desktop.ini` shell-support entry (on by default only where
    /// the shell wants it).
    pub desktop_ini: bool,
}

impl Default for SessionParams {
    fn default() -> Self {
        SessionParams {
            io_workers: 4,
            processing_threads: None,
            cache: CacheParams::default(),
            desktop_ini: cfg!(windows),
        }
    }
}

struct Session {
    source: PathBuf,
    directory: Arc<dyn VirtualDirectory>,
}

/// Owns every mounted source. The host adapter keeps one of these per
/// process and resolves callbacks through [`SessionManager::directory`].
pub struct SessionManager {
    env: MountEnv,
    sessions: Mutex<HashMap<MountId, Session>>,
    next_id: Mutex<MountId>,
}

impl SessionManager {
    pub fn new(params: SessionParams) -> anyhow::Result<SessionManager> {
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("render-{i}"));
        if let Some(threads) = params.processing_threads {
            builder = builder.num_threads(threads);
        }
        let processing = builder.build().context("Building processing pool")?;

        Ok(SessionManager {
            env: MountEnv {
                io: Arc::new(IoPool::new(params.io_workers)),
                processing: Arc::new(processing),
                cache: Arc::new(FrameCache::new(params.cache)),
                desktop_ini: params.desktop_ini,
            },
            sessions: Mutex::new(HashMap::new()),
            next_id: Mutex::new(0),
        })
    }

    fn register(&self, source: &Path, directory: Arc<dyn VirtualDirectory>) -> MountId {
        let mut next = self.next_id.lock();
        let id = *next;
        *next += 1;

        self.sessions.lock().insert(
            id,
            Session {
                source: source.to_path_buf(),
                directory,
            },
        );
        info!("Mounted {} as mount {id}", source.display());
        id
    }

    /// Mount a raw recording container.
    pub fn mount_container(
        &self,
        opener: Arc<dyn ContainerOpener>,
        source: &Path,
        config: RenderConfig,
    ) -> anyhow::Result<MountId> {
        let dir = ContainerDirectory::new(opener, source, config, self.env.clone())
            .with_context(|| format!("Mounting container {}", source.display()))?;
        Ok(self.register(source, Arc::new(dir)))
    }

    /// Mount a folder of existing DNG files.
    pub fn mount_dng_folder(&self, source: &Path, config: RenderConfig) -> anyhow::Result<MountId> {
        let dir = DngFolderDirectory::new(source, config, self.env.clone())
            .with_context(|| format!("Mounting DNG folder {}", source.display()))?;
        Ok(self.register(source, Arc::new(dir)))
    }

    /// Mount a log-encoded video file.
    pub fn mount_log_video(
        &self,
        opener: Arc<dyn VideoOpener>,
        source: &Path,
        config: RenderConfig,
    ) -> anyhow::Result<MountId> {
        let dir = LogVideoDirectory::new(opener, source, config, self.env.clone())
            .with_context(|| format!("Mounting log video {}", source.display()))?;
        Ok(self.register(source, Arc::new(dir)))
    }

    /// The directory behind a mount; adapters resolve every callback
    /// through this. In-flight reads hold their own reference, so a
    /// directory outlives its unmount until they drain.
    pub fn directory(&self, id: MountId) -> Option<Arc<dyn VirtualDirectory>> {
        self.sessions
            .lock()
            .get(&id)
            .map(|s| Arc::clone(&s.directory))
    }

    /// Remove a mount. New lookups fail immediately; outstanding reads
    /// complete against the stale directory.
    pub fn unmount(&self, id: MountId) -> bool {
        match self.sessions.lock().remove(&id) {
            Some(session) => {
                info!("Unmounted {} (mount {id})", session.source.display());
                true
            }
            None => {
                warn!("Unmount of unknown mount {id}");
                false
            }
        }
    }

    /// Forward a configuration change to the owning directory.
    pub fn update_options(&self, id: MountId, config: &RenderConfig) -> bool {
        match self.directory(id) {
            Some(dir) => {
                dir.update_options(config);
                true
            }
            None => false,
        }
    }

    pub fn file_info(&self, id: MountId) -> Option<FileInfo> {
        self.directory(id).map(|dir| dir.file_info())
    }

    pub fn mounted_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rawframe::dng::{tags, writer};

    fn scratch_folder(name: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("rawmount_session_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let mut ifd = writer::Ifd::new();
        ifd.set(tags::IMAGE_WIDTH, writer::TagValue::Long(vec![32]));
        ifd.set(tags::IMAGE_LENGTH, writer::TagValue::Long(vec![16]));
        let dng = ifd.write_with_strip(&[0u8; 16]);
        for i in 0..3 {
            std::fs::write(dir.join(format!("seq-{i:06}.dng")), &dng).unwrap();
        }
        dir
    }

    fn small_manager() -> SessionManager {
        SessionManager::new(SessionParams {
            io_workers: 2,
            processing_threads: Some(2),
            cache: CacheParams::default(),
            desktop_ini: false,
        })
        .unwrap()
    }

    #[test]
    fn test_mount_ids_are_dense() {
        let manager = small_manager();
        let folder = scratch_folder("dense");

        let a = manager
            .mount_dng_folder(&folder, RenderConfig::default())
            .unwrap();
        let b = manager
            .mount_dng_folder(&folder, RenderConfig::default())
            .unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(manager.mounted_count(), 2);

        let _ = std::fs::remove_dir_all(&folder);
    }

    #[test]
    fn test_unmount_removes_lookup() {
        let manager = small_manager();
        let folder = scratch_folder("unmount");

        let id = manager
            .mount_dng_folder(&folder, RenderConfig::default())
            .unwrap();
        assert!(manager.directory(id).is_some());

        assert!(manager.unmount(id));
        assert!(manager.directory(id).is_none());
        assert!(!manager.unmount(id));

        let _ = std::fs::remove_dir_all(&folder);
    }

    #[test]
    fn test_directory_survives_unmount_while_held() {
        let manager = small_manager();
        let folder = scratch_folder("held");

        let id = manager
            .mount_dng_folder(&folder, RenderConfig::default())
            .unwrap();
        let dir = manager.directory(id).unwrap();
        manager.unmount(id);

        // The held reference still answers queries against stale data
        assert_eq!(dir.list_files(".dng").len(), 3);

        let _ = std::fs::remove_dir_all(&folder);
    }

    #[test]
    fn test_file_info_and_update_route() {
        let manager = small_manager();
        let folder = scratch_folder("info");

        let id = manager
            .mount_dng_folder(&folder, RenderConfig::default())
            .unwrap();
        let info = manager.file_info(id).unwrap();
        assert_eq!(info.width, 32);
        assert_eq!(info.total_frames, 3);

        let config = RenderConfig {
            levels: "Static".to_string(),
            ..RenderConfig::default()
        };
        assert!(manager.update_options(id, &config));
        assert_eq!(manager.file_info(id).unwrap().levels, "Static");

        assert!(!manager.update_options(999, &config));
        assert!(manager.file_info(999).is_none());

        let _ = std::fs::remove_dir_all(&folder);
    }

    #[test]
    fn test_mount_failure_surfaces() {
        let manager = small_manager();
        let result = manager.mount_dng_folder(Path::new("/nonexistent/path"), RenderConfig::default());
        assert!(result.is_err());
        assert_eq!(manager.mounted_count(), 0);
    }
}

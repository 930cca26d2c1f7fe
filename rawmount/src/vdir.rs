//! The virtual-directory contract the host filesystem adapter drives.

use std::sync::mpsc;

use crate::config::RenderConfig;
use crate::entry::{Entry, FileInfo};
use crate::error::VfsError;

/// Fixed payload for the Windows `desktop.ini` entry; stops the shell from
/// hammering the mount for thumbnails.
pub const DESKTOP_INI: &str = r"[.ShellClassInfo]
ConfirmFileOp=0

[ViewState]
Mode=4
Vid={137E7700-3573-11CF-AE69-08002B2E1262}
FolderType=Generic

[{5984FFE0-28D4-11CF-AE66-08002B2E1262}]
Mode=4
LogicalViewMode=1
IconSize=16

[LocalizedFileNames]
";

/// How a read request wants its completion delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Schedule and return; the callback fires from a worker.
    Async,
    /// Wait for the result before returning (callback still fires).
    Blocking,
}

/// Invoked exactly once per read with the requested byte range or an error.
pub type ReadCallback = Box<dyn FnOnce(Result<Vec<u8>, VfsError>) + Send + 'static>;

/// A mounted source presented as a flat directory of synthetic entries.
///
/// Implementations are internally synchronized; the adapter may call from
/// any thread.
pub trait VirtualDirectory: Send + Sync {
    /// All entries whose name contains `filter` (every entry for an empty
    /// filter).
    fn list_files(&self, filter: &str) -> Vec<Entry>;

    /// Exact-path lookup.
    fn find_entry(&self, full_path: &str) -> Option<Entry>;

    /// Read `len` bytes at `pos` of `entry`. The callback is invoked exactly
    /// once; reads past the end yield an empty buffer.
    fn read_file(&self, entry: &Entry, pos: u64, len: usize, mode: ReadMode, callback: ReadCallback);

    /// Atomically swap in a new render configuration: the entry table is
    /// rebuilt and cached frames from the old configuration become
    /// unreachable.
    fn update_options(&self, config: &RenderConfig);

    fn file_info(&self) -> FileInfo;
}

/// Copy the requested range out of a fully materialized buffer. Reads past
/// the end are empty, not errors.
pub fn slice_range(buffer: &[u8], pos: u64, len: usize) -> Vec<u8> {
    let start = (pos as usize).min(buffer.len());
    let end = start.saturating_add(len).min(buffer.len());
    buffer[start..end].to_vec()
}

/// Run an async-style scheduling closure and wait for its callback,
/// implementing [`ReadMode::Blocking`] on top of the async path.
pub fn run_blocking(
    schedule: impl FnOnce(ReadCallback),
) -> Result<Vec<u8>, VfsError> {
    let (tx, rx) = mpsc::channel();
    schedule(Box::new(move |result| {
        let _ = tx.send(result);
    }));
    rx.recv().unwrap_or(Err(VfsError::NotFound))
}

//! Ingest variants: each source kind implements the virtual-directory
//! contract on top of the shared cache and pools.

pub mod container;
pub mod dng_folder;
pub mod log_video;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cache::{CacheKey, Lookup};
use crate::entry::Entry;
use crate::error::VfsError;
use crate::pool::MountEnv;
use crate::vdir::{ReadCallback, ReadMode, run_blocking, slice_range};

static NEXT_DIR_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id for one directory instance, part of every cache key.
pub(crate) fn next_dir_id() -> u64 {
    NEXT_DIR_ID.fetch_add(1, Ordering::Relaxed)
}

/// Serve a read from the cache, launching `produce` if this caller wins
/// production. `produce` must eventually call `cache.complete` for `key`.
pub(crate) fn read_through_cache(
    env: &MountEnv,
    key: CacheKey,
    pos: u64,
    len: usize,
    mode: ReadMode,
    callback: ReadCallback,
    produce: impl FnOnce() + Send + 'static,
) {
    let schedule = {
        let env = env.clone();
        move |cb: ReadCallback| {
            let waiter = Box::new(move |result: Result<Arc<Vec<u8>>, VfsError>| match result {
                Ok(buffer) => cb(Ok(slice_range(&buffer, pos, len))),
                Err(e) => cb(Err(e)),
            });

            if let Lookup::Owner = env.cache.begin(key, waiter) {
                produce();
            }
        }
    };

    match mode {
        ReadMode::Async => schedule(callback),
        ReadMode::Blocking => callback(run_blocking(schedule)),
    }
}

/// Answer a read against an already materialized buffer, honoring the
/// exactly-once callback contract.
pub(crate) fn read_inline(buffer: &[u8], pos: u64, len: usize, callback: ReadCallback) {
    callback(Ok(slice_range(buffer, pos, len)));
}

/// Substring name filter shared by the `list_files` implementations.
pub(crate) fn filter_entries(entries: &[Entry], filter: &str) -> Vec<Entry> {
    if filter.is_empty() {
        return entries.to_vec();
    }
    entries
        .iter()
        .filter(|e| e.name.contains(filter))
        .cloned()
        .collect()
}

/// Exact-path lookup shared by the `find_entry` implementations. Accepts an
/// optional leading slash from adapters that pass absolute mount paths.
pub(crate) fn find_in_entries(entries: &[Entry], full_path: &str) -> Option<Entry> {
    let wanted = full_path.trim_start_matches('/');
    entries.iter().find(|e| e.full_path() == wanted).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;

    #[test]
    fn test_filter_entries() {
        let entries = vec![
            Entry::file("clip-000000.dng", 1),
            Entry::file("clip-000001.dng", 1),
            Entry::file("audio.wav", 1),
        ];

        assert_eq!(filter_entries(&entries, "").len(), 3);
        assert_eq!(filter_entries(&entries, ".dng").len(), 2);
        assert_eq!(filter_entries(&entries, "audio").len(), 1);
        assert_eq!(filter_entries(&entries, "zzz").len(), 0);
    }

    #[test]
    fn test_find_in_entries_strips_leading_slash() {
        let entries = vec![Entry::file("audio.wav", 1)];
        assert!(find_in_entries(&entries, "audio.wav").is_some());
        assert!(find_in_entries(&entries, "/audio.wav").is_some());
        assert!(find_in_entries(&entries, "/missing.wav").is_none());
    }
}

//! Per-worker table of native watches
//!
//! Maps each native watch id to the directory it represents. The table is
//! owned by exactly one watch worker and only touched from its thread.

use crate::platform::WatchId;
use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// One watched directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    /// Native watch id
    pub native_handle: WatchId,
    /// Absolute path of the watched directory
    pub path_prefix: PathBuf,
}

impl WatchEntry {
    /// Absolute path of `name` inside this directory
    ///
    /// An empty name refers to the directory itself.
    pub fn resolve(&self, name: &OsStr) -> PathBuf {
        if name.is_empty() {
            self.path_prefix.clone()
        } else {
            self.path_prefix.join(name)
        }
    }
}

/// Native watch id → watched directory
#[derive(Debug, Default)]
pub struct SubtreeWatchTable {
    entries: HashMap<WatchId, WatchEntry>,
    prefixes: HashSet<PathBuf>,
}

impl SubtreeWatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `native_handle` watches `path_prefix`
    ///
    /// Re-inserting a known handle moves it to the new prefix; some native
    /// APIs hand back the same id when a directory is watched again after
    /// being renamed.
    pub fn insert(&mut self, native_handle: WatchId, path_prefix: PathBuf) {
        let entry = WatchEntry {
            native_handle,
            path_prefix: path_prefix.clone(),
        };
        if let Some(previous) = self.entries.insert(native_handle, entry) {
            if previous.path_prefix != path_prefix {
                self.prefixes.remove(&previous.path_prefix);
            }
        }
        self.prefixes.insert(path_prefix);
    }

    pub fn lookup(&self, native_handle: WatchId) -> Option<&WatchEntry> {
        self.entries.get(&native_handle)
    }

    /// Whether a watch for exactly this directory exists
    pub fn contains_prefix(&self, path_prefix: &Path) -> bool {
        self.prefixes.contains(path_prefix)
    }

    /// Drop an entry whose native watch is already gone
    pub fn forget(&mut self, native_handle: WatchId) -> Option<WatchEntry> {
        let entry = self.entries.remove(&native_handle)?;
        // Another handle may have been re-pointed at the same prefix
        if !self.entries.values().any(|e| e.path_prefix == entry.path_prefix) {
            self.prefixes.remove(&entry.path_prefix);
        }
        Some(entry)
    }

    /// Remove `dir` and everything below it, returning the removed handles
    pub fn detach_subtree(&mut self, dir: &Path) -> Vec<WatchId> {
        let detached: Vec<WatchId> = self
            .entries
            .values()
            .filter(|entry| entry.path_prefix.starts_with(dir))
            .map(|entry| entry.native_handle)
            .collect();

        for handle in &detached {
            if let Some(entry) = self.entries.remove(handle) {
                self.prefixes.remove(&entry.path_prefix);
            }
        }
        detached
    }

    /// Empty the table, returning every handle for release
    pub fn drain(&mut self) -> Vec<WatchId> {
        self.prefixes.clear();
        self.entries.drain().map(|(handle, _)| handle).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

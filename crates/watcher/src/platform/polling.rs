//! Polling fallback adapter
//!
//! Keeps a snapshot (name → kind, size, mtime) of every watched directory
//! and rescans them each poll interval. Works on any platform and any
//! filesystem, at the cost of latency and missed short-lived files.

use super::{NativeRecord, PlatformWatchAdapter, Wait, WatchId, WatchIdAllocator};
use crate::error::WatchError;
use crate::translate::NativeAction;
use crate::wake::{ChannelWake, WakeHandle};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// What the last scan saw for one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EntryStamp {
    is_dir: bool,
    len: u64,
    modified: Option<SystemTime>,
}

type Snapshot = BTreeMap<OsString, EntryStamp>;

#[derive(Debug)]
struct PolledDir {
    path: PathBuf,
    entries: Snapshot,
}

/// Rescan-based adapter used where no native API is available
pub struct PollingFallbackAdapter {
    interval: Duration,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    dirs: BTreeMap<WatchId, PolledDir>,
    by_path: HashMap<PathBuf, WatchId>,
    ids: WatchIdAllocator,
}

impl PollingFallbackAdapter {
    pub fn new(interval: Duration) -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::unbounded();
        Self {
            interval,
            wake_tx,
            wake_rx,
            dirs: BTreeMap::new(),
            by_path: HashMap::new(),
            ids: WatchIdAllocator::default(),
        }
    }

    /// Number of directories currently scanned
    pub fn watch_count(&self) -> usize {
        self.dirs.len()
    }
}

impl PlatformWatchAdapter for PollingFallbackAdapter {
    fn name(&self) -> &'static str {
        "polling"
    }

    fn add_watch(&mut self, dir: &Path) -> Result<WatchId, WatchError> {
        if let Some(&id) = self.by_path.get(dir) {
            return Ok(id);
        }

        let entries = scan_dir(dir).map_err(|source| WatchError::AddWatch {
            path: dir.to_path_buf(),
            source,
        })?;

        let id = self.ids.next_id();
        self.dirs.insert(
            id,
            PolledDir {
                path: dir.to_path_buf(),
                entries,
            },
        );
        self.by_path.insert(dir.to_path_buf(), id);
        Ok(id)
    }

    fn remove_watch(&mut self, id: WatchId) {
        if let Some(dir) = self.dirs.remove(&id) {
            self.by_path.remove(&dir.path);
        }
    }

    fn waker(&self) -> WakeHandle {
        Arc::new(ChannelWake::new(self.wake_tx.clone(), || ()))
    }

    fn wait(&mut self) -> Result<Wait, WatchError> {
        match self.wake_rx.recv_timeout(self.interval) {
            Ok(()) => {
                // Collapse queued wakes into one
                while self.wake_rx.try_recv().is_ok() {}
                Ok(Wait::Woken)
            }
            Err(RecvTimeoutError::Timeout) => Ok(Wait::Ready),
            Err(RecvTimeoutError::Disconnected) => Err(WatchError::Wait(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "wake channel closed",
            ))),
        }
    }

    fn drain(&mut self) -> Result<Vec<NativeRecord>, WatchError> {
        let mut records = Vec::new();
        let mut vanished = Vec::new();

        for (&id, dir) in self.dirs.iter_mut() {
            let current = match scan_dir(&dir.path) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Polled directory vanished: {}", dir.path.display());
                    vanished.push(id);
                    continue;
                }
                Err(e) => {
                    warn!("Failed to rescan {}: {}", dir.path.display(), e);
                    continue;
                }
            };

            diff_snapshots(id, &dir.entries, &current, &mut records);
            dir.entries = current;
        }

        for id in vanished {
            self.remove_watch(id);
            records.push(NativeRecord::new(id, OsString::new(), NativeAction::WatchRemoved, true));
        }

        Ok(records)
    }
}

/// One-level listing of `dir` with enough metadata to detect changes
///
/// Fails with `NotFound` when `dir` is missing or is not a directory.
fn scan_dir(dir: &Path) -> io::Result<Snapshot> {
    if !std::fs::metadata(dir)?.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", dir.display()),
        ));
    }

    let mut entries = Snapshot::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            // Entry removed between listing and stat; the next scan sees it gone
            Err(_) => continue,
        };
        entries.insert(
            entry.file_name().to_os_string(),
            EntryStamp {
                is_dir: metadata.is_dir(),
                len: metadata.len(),
                modified: metadata.modified().ok(),
            },
        );
    }

    Ok(entries)
}

/// Compare two scans of one directory
///
/// Removals are emitted before additions so a rename within the directory
/// reads as "old name deleted, new name created". Polling cannot tell a
/// rename from a delete plus create, so both come out the same way.
fn diff_snapshots(id: WatchId, before: &Snapshot, after: &Snapshot, out: &mut Vec<NativeRecord>) {
    for (name, old) in before {
        match after.get(name) {
            None => out.push(NativeRecord::new(id, name.clone(), NativeAction::Removed, old.is_dir)),
            // File replaced by a directory (or the other way round)
            Some(new) if new.is_dir != old.is_dir => {
                out.push(NativeRecord::new(id, name.clone(), NativeAction::Removed, old.is_dir))
            }
            Some(_) => {}
        }
    }

    for (name, new) in after {
        match before.get(name) {
            None => out.push(NativeRecord::new(id, name.clone(), NativeAction::Added, new.is_dir)),
            Some(old) if old.is_dir != new.is_dir => {
                out.push(NativeRecord::new(id, name.clone(), NativeAction::Added, new.is_dir))
            }
            Some(old) if !new.is_dir && old != new => {
                out.push(NativeRecord::new(id, name.clone(), NativeAction::Modified, false))
            }
            Some(_) => {}
        }
    }
}

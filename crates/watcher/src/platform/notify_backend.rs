//! Adapter over a `notify` watcher
//!
//! Used for FSEvents on macOS and `ReadDirectoryChangesW` on Windows. The
//! watcher's callback and the wake handle feed the same channel, so a
//! blocking `recv` is the dual wait.

use super::{NativeRecord, PlatformWatchAdapter, Wait, WatchId, WatchIdAllocator};
use crate::error::WatchError;
use crate::translate::NativeAction;
use crate::wake::{ChannelWake, WakeHandle};
use crossbeam_channel::{Receiver, Sender};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, Event, EventKind as NotifyKind, RecursiveMode, Watcher};
use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

#[cfg(target_os = "macos")]
pub type MacFsEventsAdapter = NotifyAdapter<notify::FsEventWatcher>;

#[cfg(target_os = "windows")]
pub type WindowsDirAdapter = NotifyAdapter<notify::ReadDirectoryChangesWatcher>;

enum Signal {
    Native(notify::Result<Event>),
    Wake,
}

/// Adapter for any `notify::Watcher` implementation
pub struct NotifyAdapter<W: Watcher> {
    backend: &'static str,
    watcher: W,
    tx: Sender<Signal>,
    rx: Receiver<Signal>,
    /// Native results received by `wait` but not yet drained
    pending: VecDeque<notify::Result<Event>>,
    dirs: HashMap<PathBuf, WatchId>,
    paths: HashMap<WatchId, PathBuf>,
    ids: WatchIdAllocator,
}

impl<W: Watcher + Send> NotifyAdapter<W> {
    /// Create the underlying watcher; `backend` names it in logs
    pub fn open(backend: &'static str) -> Result<Self, WatchError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let events = tx.clone();
        let watcher = W::new(
            move |result| {
                let _ = events.send(Signal::Native(result));
            },
            Config::default(),
        )
        .map_err(|e| WatchError::Init {
            backend,
            source: io::Error::new(io::ErrorKind::Other, e.to_string()),
        })?;

        Ok(Self {
            backend,
            watcher,
            tx,
            rx,
            pending: VecDeque::new(),
            dirs: HashMap::new(),
            paths: HashMap::new(),
            ids: WatchIdAllocator::default(),
        })
    }

    fn forget_dir(&mut self, id: WatchId) -> Option<PathBuf> {
        let path = self.paths.remove(&id)?;
        self.dirs.remove(&path);
        Some(path)
    }
}

impl<W: Watcher + Send> PlatformWatchAdapter for NotifyAdapter<W> {
    fn name(&self) -> &'static str {
        self.backend
    }

    fn add_watch(&mut self, dir: &Path) -> Result<WatchId, WatchError> {
        if let Some(&id) = self.dirs.get(dir) {
            return Ok(id);
        }

        if !dir.is_dir() {
            return Err(WatchError::AddWatch {
                path: dir.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "not a directory"),
            });
        }

        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::AddWatch {
                path: dir.to_path_buf(),
                source: io::Error::new(io::ErrorKind::Other, e.to_string()),
            })?;

        let id = self.ids.next_id();
        self.dirs.insert(dir.to_path_buf(), id);
        self.paths.insert(id, dir.to_path_buf());
        trace!("{} watch {} on {}", self.backend, id, dir.display());
        Ok(id)
    }

    fn remove_watch(&mut self, id: WatchId) {
        let Some(path) = self.forget_dir(id) else {
            return;
        };
        if let Err(e) = self.watcher.unwatch(&path) {
            debug!("{} unwatch of {} failed: {}", self.backend, path.display(), e);
        }
    }

    fn waker(&self) -> WakeHandle {
        Arc::new(ChannelWake::new(self.tx.clone(), || Signal::Wake))
    }

    fn wait(&mut self) -> Result<Wait, WatchError> {
        if !self.pending.is_empty() {
            return Ok(Wait::Ready);
        }

        // `self.tx` keeps the channel open, so `recv` only returns signals
        match self.rx.recv() {
            Ok(Signal::Native(result)) => {
                self.pending.push_back(result);
                Ok(Wait::Ready)
            }
            Ok(Signal::Wake) => Ok(Wait::Woken),
            Err(_) => Err(WatchError::Wait(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "notify channel closed",
            ))),
        }
    }

    fn drain(&mut self) -> Result<Vec<NativeRecord>, WatchError> {
        let mut woken = false;
        for signal in self.rx.try_iter() {
            match signal {
                Signal::Native(result) => self.pending.push_back(result),
                Signal::Wake => woken = true,
            }
        }
        if woken {
            // Keep the wake observable for the next `wait`
            let _ = self.tx.send(Signal::Wake);
        }

        let mut records = Vec::new();
        while let Some(result) = self.pending.pop_front() {
            let event = result?;
            records.extend(translate_event(&event, &self.dirs));
        }

        for record in &records {
            if record.action == NativeAction::WatchRemoved {
                if let Some(id) = record.watch {
                    self.forget_dir(id);
                }
            }
        }

        Ok(records)
    }
}

/// Turn one `notify` event into native records
///
/// Records are attributed to the watch on the parent directory of each
/// path. `dirs` is consulted to recognise directories that no longer exist.
pub fn translate_event(event: &Event, dirs: &HashMap<PathBuf, WatchId>) -> Vec<NativeRecord> {
    let mut records = Vec::new();

    if event.need_rescan() {
        records.push(NativeRecord::detached(OsString::new(), NativeAction::Overflow, false));
        return records;
    }

    match &event.kind {
        NotifyKind::Create(kind) => {
            for path in &event.paths {
                let is_dir = match kind {
                    CreateKind::Folder => true,
                    CreateKind::File => false,
                    _ => path.is_dir(),
                };
                records.push(record_for(path, NativeAction::Added, is_dir, dirs));
            }
        }
        NotifyKind::Remove(kind) => {
            for path in &event.paths {
                let is_dir = match kind {
                    RemoveKind::Folder => true,
                    RemoveKind::File => false,
                    _ => dirs.contains_key(path),
                };
                records.push(record_for(path, NativeAction::Removed, is_dir, dirs));
                if let Some(&id) = dirs.get(path) {
                    records.push(NativeRecord::new(id, OsString::new(), NativeAction::WatchRemoved, true));
                }
            }
        }
        NotifyKind::Modify(ModifyKind::Name(mode)) => match (mode, event.paths.as_slice()) {
            (RenameMode::Both, [from, to]) => {
                records.push(record_for(from, NativeAction::RenamedFrom, to.is_dir(), dirs));
                records.push(record_for(to, NativeAction::RenamedTo, to.is_dir(), dirs));
            }
            (RenameMode::From, paths) => {
                for path in paths {
                    let is_dir = dirs.contains_key(path);
                    records.push(record_for(path, NativeAction::RenamedFrom, is_dir, dirs));
                }
            }
            (RenameMode::To, paths) => {
                for path in paths {
                    records.push(record_for(path, NativeAction::RenamedTo, path.is_dir(), dirs));
                }
            }
            // Direction unknown: decide by whether the name still exists
            (_, paths) => {
                for path in paths {
                    let (action, is_dir) = if path.exists() {
                        (NativeAction::RenamedTo, path.is_dir())
                    } else {
                        (NativeAction::RenamedFrom, dirs.contains_key(path))
                    };
                    records.push(record_for(path, action, is_dir, dirs));
                }
            }
        },
        NotifyKind::Modify(_) => {
            for path in &event.paths {
                let is_dir = dirs.contains_key(path) || path.is_dir();
                records.push(record_for(path, NativeAction::Modified, is_dir, dirs));
            }
        }
        NotifyKind::Access(_) | NotifyKind::Any | NotifyKind::Other => {}
    }

    records
}

fn record_for(
    path: &Path,
    action: NativeAction,
    is_dir: bool,
    dirs: &HashMap<PathBuf, WatchId>,
) -> NativeRecord {
    let name = path.file_name().map(OsString::from).unwrap_or_default();
    match path.parent().and_then(|parent| dirs.get(parent)) {
        Some(&id) => NativeRecord::new(id, name, action, is_dir),
        None => NativeRecord::detached(name, action, is_dir),
    }
}

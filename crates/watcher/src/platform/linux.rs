//! Linux inotify adapter
//!
//! One inotify instance per watch worker. The dual wait is a `poll(2)` on
//! the inotify descriptor and on one end of a Unix socket pair; the wake
//! handle writes a byte into the other end.

use super::{NativeRecord, PlatformWatchAdapter, Wait, WatchId, WatchIdAllocator};
use crate::error::WatchError;
use crate::translate::NativeAction;
use crate::wake::{Wake, WakeHandle};
use inotify::{EventMask, Inotify, WatchDescriptor, WatchMask};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use std::collections::HashMap;
use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Events requested for every watched directory
const WATCH_MASK: WatchMask = WatchMask::CREATE
    .union(WatchMask::DELETE)
    .union(WatchMask::MODIFY)
    .union(WatchMask::MOVED_FROM)
    .union(WatchMask::MOVED_TO);

/// inotify mask bit → native action, checked in order
const ACTION_TABLE: &[(EventMask, NativeAction)] = &[
    (EventMask::Q_OVERFLOW, NativeAction::Overflow),
    (EventMask::IGNORED, NativeAction::WatchRemoved),
    (EventMask::CREATE, NativeAction::Added),
    (EventMask::DELETE, NativeAction::Removed),
    (EventMask::MODIFY, NativeAction::Modified),
    (EventMask::MOVED_FROM, NativeAction::RenamedFrom),
    (EventMask::MOVED_TO, NativeAction::RenamedTo),
];

/// Map an inotify mask onto a native action
fn action_for(mask: EventMask) -> Option<NativeAction> {
    ACTION_TABLE
        .iter()
        .find(|(bit, _)| mask.contains(*bit))
        .map(|(_, action)| *action)
}

/// Writes into the wake socket
struct SocketWake {
    tx: UnixStream,
}

impl Wake for SocketWake {
    fn wake(&self) {
        // A full socket buffer already guarantees a pending wake
        if let Err(e) = (&self.tx).write(&[1u8]) {
            match e.kind() {
                io::ErrorKind::WouldBlock => {}
                // Reading end closed: the worker already released the adapter
                io::ErrorKind::BrokenPipe => debug!("inotify worker already gone"),
                _ => warn!("Failed to signal inotify worker: {}", e),
            }
        }
    }
}

/// inotify-backed adapter
pub struct InotifyAdapter {
    inotify: Inotify,
    buffer: Vec<u8>,
    ids: HashMap<WatchDescriptor, WatchId>,
    descriptors: HashMap<WatchId, WatchDescriptor>,
    allocator: WatchIdAllocator,
    wake_rx: UnixStream,
    waker: Arc<SocketWake>,
}

impl InotifyAdapter {
    /// Open an inotify instance with a read buffer of `buffer_bytes`
    pub fn new(buffer_bytes: usize) -> Result<Self, WatchError> {
        let init_err = |source| WatchError::Init {
            backend: "inotify",
            source,
        };

        let inotify = Inotify::init().map_err(init_err)?;
        let (wake_tx, wake_rx) = UnixStream::pair().map_err(init_err)?;
        wake_tx.set_nonblocking(true).map_err(init_err)?;
        wake_rx.set_nonblocking(true).map_err(init_err)?;

        Ok(Self {
            inotify,
            buffer: vec![0; buffer_bytes.max(1024)],
            ids: HashMap::new(),
            descriptors: HashMap::new(),
            allocator: WatchIdAllocator::default(),
            wake_rx,
            waker: Arc::new(SocketWake { tx: wake_tx }),
        })
    }

    /// Consume every byte written by the wake handle
    fn clear_wake(&self) {
        let mut sink = [0u8; 64];
        loop {
            match (&self.wake_rx).read(&mut sink) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }
}

impl PlatformWatchAdapter for InotifyAdapter {
    fn name(&self) -> &'static str {
        "inotify"
    }

    fn add_watch(&mut self, dir: &Path) -> Result<WatchId, WatchError> {
        let wd = self
            .inotify
            .watches()
            .add(dir, WATCH_MASK | WatchMask::ONLYDIR)
            .map_err(|source| WatchError::AddWatch {
                path: dir.to_path_buf(),
                source,
            })?;

        // The kernel returns the existing descriptor for an inode already watched
        if let Some(&id) = self.ids.get(&wd) {
            return Ok(id);
        }

        let id = self.allocator.next_id();
        self.ids.insert(wd.clone(), id);
        self.descriptors.insert(id, wd);
        trace!("inotify watch {} on {}", id, dir.display());
        Ok(id)
    }

    fn remove_watch(&mut self, id: WatchId) {
        let Some(wd) = self.descriptors.remove(&id) else {
            return;
        };
        self.ids.remove(&wd);
        if let Err(e) = self.inotify.watches().remove(wd) {
            // EINVAL: the kernel already dropped it (directory deleted)
            debug!("inotify_rm_watch for {} failed: {}", id, e);
        }
    }

    fn waker(&self) -> WakeHandle {
        self.waker.clone()
    }

    fn wait(&mut self) -> Result<Wait, WatchError> {
        loop {
            let mut fds = [
                PollFd::new(&self.inotify, PollFlags::POLLIN),
                PollFd::new(&self.wake_rx, PollFlags::POLLIN),
            ];

            match poll(&mut fds, -1) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(WatchError::Wait(io::Error::from(errno))),
            }

            let readable = PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP;
            let ready = fds[0].revents().map_or(false, |r| r.intersects(readable));
            let woken = fds[1].revents().map_or(false, |r| r.intersects(readable));

            if woken {
                self.clear_wake();
            }
            if ready {
                return Ok(Wait::Ready);
            }
            if woken {
                return Ok(Wait::Woken);
            }
        }
    }

    fn drain(&mut self) -> Result<Vec<NativeRecord>, WatchError> {
        let Self {
            inotify,
            buffer,
            ids,
            descriptors,
            ..
        } = self;
        let mut records = Vec::new();

        loop {
            let events = match inotify.read_events(buffer) {
                Ok(events) => events,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(WatchError::Read(e)),
            };

            let before = records.len();
            let mut read_any = false;
            for event in events {
                read_any = true;
                let Some(action) = action_for(event.mask) else {
                    trace!("Ignoring inotify mask {:?}", event.mask);
                    continue;
                };

                let name = event.name.map(OsString::from).unwrap_or_default();
                let is_dir = event.mask.contains(EventMask::ISDIR);

                if action == NativeAction::Overflow {
                    records.push(NativeRecord::detached(name, action, is_dir));
                    continue;
                }

                let watch = ids.get(&event.wd).copied();
                if action == NativeAction::WatchRemoved {
                    // The kernel released the descriptor; forget our side too
                    ids.remove(&event.wd);
                    if let Some(id) = watch {
                        descriptors.remove(&id);
                    }
                }

                records.push(NativeRecord {
                    watch,
                    name,
                    action,
                    is_dir,
                });
            }

            if !read_any {
                break;
            }
            trace!("Read {} inotify records", records.len() - before);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;
    use tempfile::TempDir;

    fn adapter() -> InotifyAdapter {
        InotifyAdapter::new(4096).unwrap()
    }

    /// Collect records until `expected` non-modify records arrived
    fn drain_until(adapter: &mut InotifyAdapter, expected: usize) -> Vec<NativeRecord> {
        let mut records = Vec::new();
        while records.len() < expected {
            assert_eq!(adapter.wait().unwrap(), Wait::Ready);
            records.extend(
                adapter
                    .drain()
                    .unwrap()
                    .into_iter()
                    .filter(|r| r.action != NativeAction::Modified),
            );
        }
        records
    }

    #[test]
    fn test_action_table() {
        assert_eq!(action_for(EventMask::CREATE), Some(NativeAction::Added));
        assert_eq!(action_for(EventMask::CREATE | EventMask::ISDIR), Some(NativeAction::Added));
        assert_eq!(action_for(EventMask::MOVED_FROM), Some(NativeAction::RenamedFrom));
        assert_eq!(action_for(EventMask::MOVED_TO), Some(NativeAction::RenamedTo));
        assert_eq!(action_for(EventMask::IGNORED), Some(NativeAction::WatchRemoved));
        assert_eq!(action_for(EventMask::Q_OVERFLOW), Some(NativeAction::Overflow));
        assert_eq!(action_for(EventMask::ACCESS), None);
    }

    #[test]
    fn test_add_watch_same_dir_returns_same_id() {
        let temp_dir = TempDir::new().unwrap();
        let mut adapter = adapter();

        let a = adapter.add_watch(temp_dir.path()).unwrap();
        let b = adapter.add_watch(temp_dir.path()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_add_watch_rejects_files() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("plain.txt");
        fs::write(&file, b"x").unwrap();

        let mut adapter = adapter();
        assert!(matches!(adapter.add_watch(&file), Err(WatchError::AddWatch { .. })));
    }

    #[test]
    fn test_records_for_create_and_rename() {
        let temp_dir = TempDir::new().unwrap();
        let mut adapter = adapter();
        let id = adapter.add_watch(temp_dir.path()).unwrap();

        fs::File::create(temp_dir.path().join("a.txt")).unwrap();
        fs::rename(temp_dir.path().join("a.txt"), temp_dir.path().join("b.txt")).unwrap();

        let records = drain_until(&mut adapter, 3);
        assert_eq!(
            records,
            vec![
                NativeRecord::new(id, "a.txt", NativeAction::Added, false),
                NativeRecord::new(id, "a.txt", NativeAction::RenamedFrom, false),
                NativeRecord::new(id, "b.txt", NativeAction::RenamedTo, false),
            ]
        );
    }

    #[test]
    fn test_directory_flag() {
        let temp_dir = TempDir::new().unwrap();
        let mut adapter = adapter();
        let id = adapter.add_watch(temp_dir.path()).unwrap();

        fs::create_dir(temp_dir.path().join("sub")).unwrap();

        let records = drain_until(&mut adapter, 1);
        assert_eq!(records[0], NativeRecord::new(id, "sub", NativeAction::Added, true));
    }

    #[test]
    fn test_removed_directory_reports_watch_removed() {
        let temp_dir = TempDir::new().unwrap();
        let sub = temp_dir.path().join("sub");
        fs::create_dir(&sub).unwrap();

        let mut adapter = adapter();
        let id = adapter.add_watch(&sub).unwrap();
        fs::remove_dir(&sub).unwrap();

        let mut records = Vec::new();
        while !records.iter().any(|r: &NativeRecord| r.action == NativeAction::WatchRemoved) {
            adapter.wait().unwrap();
            records.extend(adapter.drain().unwrap());
        }
        let removed = records
            .iter()
            .find(|r| r.action == NativeAction::WatchRemoved)
            .unwrap();
        assert_eq!(removed.watch, Some(id));

        // Releasing an already-dropped watch is harmless
        adapter.remove_watch(id);
    }

    #[test]
    fn test_wake_interrupts_wait() {
        let temp_dir = TempDir::new().unwrap();
        let mut adapter = adapter();
        adapter.add_watch(temp_dir.path()).unwrap();
        let waker = adapter.waker();

        let handle = thread::spawn(move || adapter.wait().unwrap());
        waker.wake();

        assert_eq!(handle.join().unwrap(), Wait::Woken);
    }

    #[test]
    fn test_wake_after_adapter_dropped() {
        let adapter = adapter();
        let waker = adapter.waker();
        drop(adapter);

        // The reading end is closed; waking must neither block nor panic
        waker.wake();
        waker.wake();
    }

    #[test]
    fn test_drain_without_events_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let mut adapter = adapter();
        adapter.add_watch(temp_dir.path()).unwrap();

        assert!(adapter.drain().unwrap().is_empty());
    }
}

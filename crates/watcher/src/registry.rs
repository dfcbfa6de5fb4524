//! Bounded registry of monitored roots
//!
//! The slot table is a fixed-size vector behind one mutex: the duplicate
//! check, the slot claim and the slot release all happen under that lock,
//! so two callers can never start two workers for the same root. Joining a
//! worker happens with the lock released; a second `unregister` for the
//! same root waits on a condition variable until the first one is done.

use crate::error::{RegisterError, WatchError};
use crate::platform::{default_factory, AdapterFactory};
use crate::worker::{join_worker, startup_finished, MonitorState, WatchWorker, WorkerHandle};
use fsmon_core::{EventPublisher, FileSystem, LocalFs, MonitorConfig};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct MonitorSlot {
    path: PathBuf,
    worker: WorkerHandle,
    /// An `unregister` owns this slot and is joining its thread
    stopping: bool,
}

/// Registry of monitored directory trees
///
/// Dropping the registry stops every monitor.
pub struct MonitorRegistry {
    config: MonitorConfig,
    fs: Arc<dyn FileSystem>,
    publisher: Arc<dyn EventPublisher>,
    factory: AdapterFactory,
    slots: Mutex<Vec<Option<MonitorSlot>>>,
    released: Condvar,
}

impl MonitorRegistry {
    /// Registry on the local filesystem with the configured backend
    pub fn new(config: MonitorConfig, publisher: impl EventPublisher + 'static) -> Self {
        Self::with_parts(config, Arc::new(LocalFs), Arc::new(publisher), default_factory())
    }

    /// Registry with explicit collaborators
    pub fn with_parts(
        config: MonitorConfig,
        fs: Arc<dyn FileSystem>,
        publisher: Arc<dyn EventPublisher>,
        factory: AdapterFactory,
    ) -> Self {
        let slots = (0..config.max_monitors).map(|_| None).collect();
        Self {
            config,
            fs,
            publisher,
            factory,
            slots: Mutex::new(slots),
            released: Condvar::new(),
        }
    }

    /// Start monitoring `path` and everything below it
    ///
    /// Returns once every directory that exists below `path` is watched, so
    /// changes made after this call are reported. Registering a root that is
    /// already monitored returns [`RegisterError::AlreadyWatched`] and
    /// changes nothing. A root whose monitor terminated is restarted.
    pub fn register(&self, path: &Path) -> Result<(), RegisterError> {
        let root = self.normalize(path)?;

        let mut slots = self.slots.lock();
        let mut reaped = None;

        if let Some(index) = position(&slots, &root) {
            let restartable = slots[index]
                .as_ref()
                .map_or(false, |slot| !slot.stopping && slot.worker.state() == MonitorState::Terminated);
            if !restartable {
                debug!("{} is already being watched", root.display());
                return Err(RegisterError::AlreadyWatched(root));
            }
            reaped = slots[index].take();
        }

        let Some(index) = slots.iter().position(Option::is_none) else {
            warn!("No free monitor slot for {} (capacity {})", root.display(), slots.len());
            return Err(RegisterError::NoFreeSlot { capacity: slots.len() });
        };

        let spawned = WatchWorker::spawn(
            root.clone(),
            &self.config,
            &self.factory,
            self.fs.clone(),
            self.publisher.clone(),
        );
        let worker = match spawned {
            Ok(worker) => worker,
            Err(source) => {
                drop(slots);
                reap(reaped);
                warn!("Cannot monitor {}: {}", root.display(), source);
                return Err(RegisterError::AdapterInitFailed { path: root, source });
            }
        };

        let started = worker.startup();
        slots[index] = Some(MonitorSlot {
            path: root.clone(),
            worker,
            stopping: false,
        });
        drop(slots);

        reap(reaped);
        if startup_finished(&started) {
            info!("Registered monitor for {} in slot {}", root.display(), index);
        } else {
            warn!("Monitor for {} exited during its initial walk", root.display());
        }
        Ok(())
    }

    /// Stop monitoring `path`, blocking until its worker thread has exited
    ///
    /// Unknown paths are ignored.
    pub fn unregister(&self, path: &Path) {
        let Ok(root) = self.fs.normalize(path) else {
            debug!("Ignoring unregister of unresolvable path {}", path.display());
            return;
        };

        let mut slots = self.slots.lock();
        loop {
            let Some(index) = position(&slots, &root) else {
                return;
            };
            let Some(slot) = slots[index].as_mut() else {
                return;
            };

            if slot.stopping {
                // Another caller is tearing it down; wait for the slot to free up
                self.released.wait(&mut slots);
                continue;
            }

            slot.stopping = true;
            slot.worker.request_stop();
            let thread = slot.worker.take_thread();

            MutexGuard::unlocked(&mut slots, || join_worker(&root, thread));

            slots[index] = None;
            self.released.notify_all();
            info!("Unregistered monitor for {}", root.display());
            return;
        }
    }

    /// Stop every monitor
    ///
    /// All workers are signalled first and then joined, so shutdown takes
    /// about as long as the slowest one.
    pub fn shutdown(&self) {
        let mut slots = self.slots.lock();

        let mut stopping = Vec::new();
        for slot in slots.iter_mut().flatten() {
            if slot.stopping {
                continue;
            }
            slot.stopping = true;
            slot.worker.request_stop();
            stopping.push((slot.path.clone(), slot.worker.take_thread()));
        }

        if stopping.is_empty() {
            return;
        }

        MutexGuard::unlocked(&mut slots, || {
            for (path, thread) in &mut stopping {
                join_worker(path, thread.take());
            }
        });

        for entry in slots.iter_mut() {
            if entry
                .as_ref()
                .map_or(false, |slot| stopping.iter().any(|(path, _)| *path == slot.path))
            {
                *entry = None;
            }
        }
        self.released.notify_all();
        info!("Stopped {} monitors", stopping.len());
    }

    /// Lifecycle state of the monitor for `path`, if there is one
    pub fn state(&self, path: &Path) -> Option<MonitorState> {
        let root = self.fs.normalize(path).ok()?;
        let slots = self.slots.lock();
        let index = position(&slots, &root)?;
        slots[index].as_ref().map(|slot| slot.worker.state())
    }

    /// Every monitored root with its state, in slot order
    pub fn monitors(&self) -> Vec<(PathBuf, MonitorState)> {
        self.slots
            .lock()
            .iter()
            .flatten()
            .map(|slot| (slot.path.clone(), slot.worker.state()))
            .collect()
    }

    /// Maximum number of monitored roots
    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }

    /// Number of occupied slots
    pub fn active(&self) -> usize {
        self.slots.lock().iter().flatten().count()
    }

    fn normalize(&self, path: &Path) -> Result<PathBuf, RegisterError> {
        self.fs
            .normalize(path)
            .map_err(|source| RegisterError::AdapterInitFailed {
                path: path.to_path_buf(),
                source: WatchError::Path {
                    path: path.to_path_buf(),
                    source,
                },
            })
    }
}

impl Drop for MonitorRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn position(slots: &[Option<MonitorSlot>], root: &Path) -> Option<usize> {
    slots
        .iter()
        .position(|slot| slot.as_ref().map_or(false, |slot| slot.path == root))
}

/// Join the thread of a terminated worker that is being replaced
fn reap(slot: Option<MonitorSlot>) {
    if let Some(slot) = slot {
        debug!("Reaping terminated monitor for {}", slot.path.display());
        slot.worker.stop();
    }
}

//! Per-root watch worker
//!
//! A worker owns one adapter and one [`SubtreeWatchTable`] and runs on its
//! own thread:
//!
//! ```text
//! Starting ──walk done──▶ Running ──stop requested──▶ Stopping ──▶ Terminated
//!     │                      │                                        ▲
//!     └──────────────────────┴──────── fatal native error ────────────┘
//! ```
//!
//! The registry only touches the shared termination flag, the state cell
//! and the wake handle; everything else is private to the worker thread.

use crate::error::WatchError;
use crate::platform::{AdapterFactory, NativeRecord, PlatformWatchAdapter, Wait};
use crate::table::SubtreeWatchTable;
use crate::translate::{canonical_kind, NativeAction};
use crate::wake::WakeHandle;
use crossbeam_channel::{Receiver, Sender};
use fsmon_core::{EventKind, EventPublisher, FileChangeEvent, FileSystem, MonitorConfig};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of one monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MonitorState {
    /// Root watched, initial walk in progress
    Starting = 0,
    /// Delivering events
    Running = 1,
    /// Stop requested, worker winding down
    Stopping = 2,
    /// Worker finished; after a fatal native error it stays here until
    /// the root is unregistered or registered again
    Terminated = 3,
}

impl MonitorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => MonitorState::Starting,
            1 => MonitorState::Running,
            2 => MonitorState::Stopping,
            _ => MonitorState::Terminated,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MonitorState::Starting => "starting",
            MonitorState::Running => "running",
            MonitorState::Stopping => "stopping",
            MonitorState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared between a worker thread and its handle
struct WorkerShared {
    should_terminate: AtomicBool,
    state: AtomicU8,
    waker: WakeHandle,
}

impl WorkerShared {
    fn state(&self) -> MonitorState {
        MonitorState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: MonitorState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move `from → to` unless someone else moved the state meanwhile
    fn advance(&self, from: MonitorState, to: MonitorState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn stop_requested(&self) -> bool {
        self.should_terminate.load(Ordering::Acquire)
    }
}

/// Marks the monitor terminated however the worker thread exits
struct ExitGuard(Arc<WorkerShared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.set_state(MonitorState::Terminated);
    }
}

/// Registry-side handle of a running worker
pub struct WorkerHandle {
    root: PathBuf,
    shared: Arc<WorkerShared>,
    started: Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn state(&self) -> MonitorState {
        self.shared.state()
    }

    /// Set the termination flag and interrupt the worker's wait
    ///
    /// Returns immediately; join the thread to wait for teardown.
    pub fn request_stop(&self) {
        let shared = &self.shared;
        shared.should_terminate.store(true, Ordering::Release);

        // A terminated worker has already dropped its adapter
        if shared.state() == MonitorState::Terminated {
            return;
        }
        if !shared.advance(MonitorState::Running, MonitorState::Stopping) {
            shared.advance(MonitorState::Starting, MonitorState::Stopping);
        }
        shared.waker.wake();
    }

    /// Block until the initial walk is done or the worker thread exited
    ///
    /// Returns `false` if the thread ended before finishing the walk.
    pub fn wait_started(&self) -> bool {
        startup_finished(&self.started)
    }

    /// Receiver that fires once the initial walk is done
    pub(crate) fn startup(&self) -> Receiver<()> {
        self.started.clone()
    }

    /// Take the thread handle so it can be joined without holding a lock
    pub(crate) fn take_thread(&mut self) -> Option<JoinHandle<()>> {
        self.thread.take()
    }

    /// Stop the worker and wait for its thread to exit
    pub fn stop(mut self) {
        self.request_stop();
        let thread = self.take_thread();
        join_worker(&self.root, thread);
    }
}

/// Wait on a startup receiver; the sender is dropped if the thread dies early
pub(crate) fn startup_finished(started: &Receiver<()>) -> bool {
    started.recv().is_ok()
}

/// Join a worker thread, logging a panic instead of propagating it
pub(crate) fn join_worker(root: &Path, thread: Option<JoinHandle<()>>) {
    if let Some(thread) = thread {
        if thread.join().is_err() {
            error!("Watch worker for {} panicked", root.display());
        }
    }
}

/// Watch loop for one monitored root
pub struct WatchWorker {
    root: PathBuf,
    adapter: Box<dyn PlatformWatchAdapter>,
    table: SubtreeWatchTable,
    fs: Arc<dyn FileSystem>,
    publisher: Arc<dyn EventPublisher>,
    shared: Arc<WorkerShared>,
    synthesize_nested_creates: bool,
}

impl WatchWorker {
    /// Open an adapter, watch `root` and start the worker thread
    ///
    /// The adapter and the root watch are set up on the calling thread, so
    /// a failure here means no thread was started. `root` must already be
    /// normalised. The initial walk runs on the new thread; use
    /// [`WorkerHandle::wait_started`] to wait for it.
    pub fn spawn(
        root: PathBuf,
        config: &MonitorConfig,
        factory: &AdapterFactory,
        fs: Arc<dyn FileSystem>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<WorkerHandle, WatchError> {
        let mut adapter = factory(config)?;
        let root_id = adapter.add_watch(&root)?;

        let mut table = SubtreeWatchTable::new();
        table.insert(root_id, root.clone());

        let shared = Arc::new(WorkerShared {
            should_terminate: AtomicBool::new(false),
            state: AtomicU8::new(MonitorState::Starting as u8),
            waker: adapter.waker(),
        });

        let worker = WatchWorker {
            root: root.clone(),
            adapter,
            table,
            fs,
            publisher,
            shared: shared.clone(),
            synthesize_nested_creates: config.synthesize_nested_creates,
        };

        let (started_tx, started) = crossbeam_channel::bounded(1);
        let thread = thread::Builder::new()
            .name("fsmon-watch".to_string())
            .spawn(move || worker.run(started_tx))
            .map_err(WatchError::Spawn)?;

        Ok(WorkerHandle {
            root,
            shared,
            started,
            thread: Some(thread),
        })
    }

    fn run(mut self, started: Sender<()>) {
        let _exit = ExitGuard(self.shared.clone());
        info!("Watching {} ({})", self.root.display(), self.adapter.name());

        let root = self.root.clone();
        self.register_subtree(&root, false);

        if self.shared.advance(MonitorState::Starting, MonitorState::Running) {
            debug!(
                "Initial walk of {} done: {} directories watched",
                self.root.display(),
                self.table.len()
            );
        }
        // Capacity 1 and a single send, so this cannot block
        if started.send(()).is_err() {
            trace!("Nobody waiting for {} to start", self.root.display());
        }
        drop(started);

        let failed = match self.watch_loop() {
            Ok(()) => false,
            Err(e) => {
                error!("Monitor for {} stopped: {}", self.root.display(), e);
                true
            }
        };

        self.teardown(failed);
    }

    fn watch_loop(&mut self) -> Result<(), WatchError> {
        loop {
            if self.shared.stop_requested() {
                return Ok(());
            }

            let wait = self.adapter.wait()?;
            if self.shared.stop_requested() {
                return Ok(());
            }
            if wait == Wait::Woken {
                trace!("Spurious wake for {}", self.root.display());
                continue;
            }

            for record in self.adapter.drain()? {
                // Nothing may be published once a stop was requested
                if self.shared.stop_requested() {
                    return Ok(());
                }
                self.dispatch(record);
            }
        }
    }

    fn dispatch(&mut self, record: NativeRecord) {
        if record.action == NativeAction::Overflow {
            warn!(
                "Native event queue overflowed for {}; changes were lost",
                self.root.display()
            );
            return;
        }

        let Some(entry) = record.watch.and_then(|id| self.table.lookup(id)).cloned() else {
            if record.action != NativeAction::WatchRemoved {
                warn!(
                    "Dropping {:?} record for {:?}: unknown watch {:?}",
                    record.action, record.name, record.watch
                );
            }
            return;
        };

        if record.action == NativeAction::WatchRemoved {
            self.table.forget(entry.native_handle);
            debug!("Watch on {} removed by the OS", entry.resolve(&record.name).display());
            return;
        }

        let path = self.fs.join(&entry.path_prefix, &record.name);

        if record.is_dir {
            match record.action {
                NativeAction::Added | NativeAction::RenamedTo => self.watch_new_dir(path),
                NativeAction::Removed | NativeAction::RenamedFrom => self.detach_dir(&path),
                _ => trace!("Ignoring directory change on {}", path.display()),
            }
            return;
        }

        if let Some(kind) = canonical_kind(record.action) {
            self.publish(kind, path);
        }
    }

    /// Watch a directory that appeared while running
    fn watch_new_dir(&mut self, dir: PathBuf) {
        if self.table.contains_prefix(&dir) {
            return;
        }
        if !self.fs.is_dir(&dir) {
            debug!("{} is gone or no longer a directory", dir.display());
            return;
        }
        match self.adapter.add_watch(&dir) {
            Ok(id) => self.table.insert(id, dir.clone()),
            Err(e) => {
                warn!("Not watching new directory {}: {}", dir.display(), e);
                return;
            }
        }
        self.register_subtree(&dir, self.synthesize_nested_creates);
    }

    /// Drop the watches of a directory that was deleted or moved away
    fn detach_dir(&mut self, dir: &Path) {
        let handles = self.table.detach_subtree(dir);
        if !handles.is_empty() {
            debug!("Detaching {} watches under {}", handles.len(), dir.display());
        }
        for id in handles {
            self.adapter.remove_watch(id);
        }
    }

    /// Depth-first registration of everything below an already watched `start`
    ///
    /// Directories that cannot be listed or watched are logged and left out
    /// together with their descendants. With `synthesize` set, regular
    /// files found in each directory are published as created.
    fn register_subtree(&mut self, start: &Path, synthesize: bool) {
        let mut pending = vec![start.to_path_buf()];

        while let Some(dir) = pending.pop() {
            if self.shared.stop_requested() {
                debug!("Walk of {} aborted by stop request", self.root.display());
                return;
            }

            if synthesize {
                self.synthesize_creates(&dir);
            }

            let names = match self.fs.list_subdirs(&dir) {
                Ok(names) => names,
                Err(e) => {
                    warn!("Cannot list {}: {}", dir.display(), e);
                    continue;
                }
            };

            let mut children = Vec::with_capacity(names.len());
            for name in &names {
                let child = self.fs.join(&dir, name);
                if self.table.contains_prefix(&child) {
                    continue;
                }
                match self.adapter.add_watch(&child) {
                    Ok(id) => {
                        self.table.insert(id, child.clone());
                        children.push(child);
                    }
                    Err(e) => warn!("Not watching {}: {}", child.display(), e),
                }
            }

            // Reversed so the first name is walked first
            pending.extend(children.into_iter().rev());
        }
    }

    fn synthesize_creates(&self, dir: &Path) {
        match self.fs.list_files(dir) {
            Ok(files) => {
                for name in files {
                    let path = self.fs.join(dir, &name);
                    self.publish(EventKind::Created, path);
                }
            }
            Err(e) => debug!("Cannot list files of {}: {}", dir.display(), e),
        }
    }

    fn publish(&self, kind: EventKind, path: PathBuf) {
        trace!("{} {}", kind, path.display());
        self.publisher.publish(FileChangeEvent::new(kind, path));
    }

    fn teardown(self, failed: bool) {
        let WatchWorker {
            root,
            mut adapter,
            mut table,
            shared,
            ..
        } = self;

        let handles = table.drain();
        debug!("Releasing {} watches for {}", handles.len(), root.display());
        for id in handles {
            adapter.remove_watch(id);
        }
        drop(adapter);

        shared.set_state(MonitorState::Terminated);
        if failed {
            warn!("Monitor for {} terminated; register it again to restart", root.display());
        } else {
            info!("Stopped watching {}", root.display());
        }
    }
}

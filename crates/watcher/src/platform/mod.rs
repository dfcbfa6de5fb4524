//! Platform-specific change-notification adapters
//!
//! Provides a unified interface ([`PlatformWatchAdapter`]) over:
//! - Linux inotify ([`InotifyAdapter`])
//! - macOS FSEvents ([`MacFsEventsAdapter`])
//! - Windows `ReadDirectoryChangesW` ([`WindowsDirAdapter`])
//! - Periodic rescans on every platform ([`PollingFallbackAdapter`])
//!
//! Adapters watch single directories (never recursively); the watch worker
//! builds the recursive view on top.

#[cfg(target_os = "linux")]
pub mod linux;

pub mod notify_backend;
pub mod polling;

use crate::error::WatchError;
use crate::translate::NativeAction;
use crate::wake::WakeHandle;
use fsmon_core::{Backend, MonitorConfig};
use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

#[cfg(target_os = "linux")]
pub use linux::InotifyAdapter;

#[cfg(target_os = "macos")]
pub use notify_backend::MacFsEventsAdapter;

#[cfg(target_os = "windows")]
pub use notify_backend::WindowsDirAdapter;

pub use notify_backend::NotifyAdapter;
pub use polling::PollingFallbackAdapter;

/// Opaque id of one native directory watch
///
/// Assigned by the adapter that created the watch; meaningless to any
/// other adapter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(u64);

impl WatchId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wd#{}", self.0)
    }
}

/// Monotonic source of [`WatchId`]s for adapters without integer handles
#[derive(Debug, Default)]
pub(crate) struct WatchIdAllocator {
    next: u64,
}

impl WatchIdAllocator {
    pub(crate) fn next_id(&mut self) -> WatchId {
        self.next += 1;
        WatchId(self.next)
    }
}

/// One pending change reported by an adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeRecord {
    /// Watch the record was reported on; `None` when the adapter could not
    /// attribute it to any of its watches
    pub watch: Option<WatchId>,
    /// Entry name relative to the watched directory; empty for records
    /// about the directory itself
    pub name: OsString,
    /// What happened
    pub action: NativeAction,
    /// Whether the entry is a directory
    pub is_dir: bool,
}

impl NativeRecord {
    pub fn new(watch: WatchId, name: impl Into<OsString>, action: NativeAction, is_dir: bool) -> Self {
        Self {
            watch: Some(watch),
            name: name.into(),
            action,
            is_dir,
        }
    }

    /// Record not tied to any watch (queue overflow, unknown origin)
    pub fn detached(name: impl Into<OsString>, action: NativeAction, is_dir: bool) -> Self {
        Self {
            watch: None,
            name: name.into(),
            action,
            is_dir,
        }
    }
}

/// Outcome of [`PlatformWatchAdapter::wait`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// The wake signal fired
    Woken,
    /// Native records may be pending; call `drain`
    Ready,
}

/// Platform-agnostic directory-change interface
///
/// An adapter instance belongs to one watch worker. It is created on the
/// registering thread and then moved into the worker thread, so it only has
/// to be `Send`.
pub trait PlatformWatchAdapter: Send {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Start watching the direct children of `dir`
    fn add_watch(&mut self, dir: &Path) -> Result<WatchId, WatchError>;

    /// Release a native watch; unknown or already-dropped ids are ignored
    fn remove_watch(&mut self, id: WatchId);

    /// Handle that interrupts a blocked [`wait`](Self::wait) from any thread
    fn waker(&self) -> WakeHandle;

    /// Block until the wake signal fires or native records are available
    ///
    /// An error here is fatal for the worker.
    fn wait(&mut self) -> Result<Wait, WatchError>;

    /// Take every pending record, in the order the platform reported them
    ///
    /// Never blocks. An error here is fatal for the worker.
    fn drain(&mut self) -> Result<Vec<NativeRecord>, WatchError>;
}

/// Builds a fresh adapter for each new watch worker
pub type AdapterFactory =
    Arc<dyn Fn(&MonitorConfig) -> Result<Box<dyn PlatformWatchAdapter>, WatchError> + Send + Sync>;

/// Factory selecting the adapter from configuration
pub fn default_factory() -> AdapterFactory {
    Arc::new(open_adapter)
}

/// Open the adapter configured for this platform
pub fn open_adapter(config: &MonitorConfig) -> Result<Box<dyn PlatformWatchAdapter>, WatchError> {
    match config.backend {
        Backend::Polling => Ok(Box::new(PollingFallbackAdapter::new(config.poll_interval()))),
        Backend::Native => open_native_adapter(config),
    }
}

#[cfg(target_os = "linux")]
fn open_native_adapter(config: &MonitorConfig) -> Result<Box<dyn PlatformWatchAdapter>, WatchError> {
    Ok(Box::new(InotifyAdapter::new(config.inotify_buffer_bytes)?))
}

#[cfg(target_os = "macos")]
fn open_native_adapter(_config: &MonitorConfig) -> Result<Box<dyn PlatformWatchAdapter>, WatchError> {
    Ok(Box::new(MacFsEventsAdapter::open("fsevents")?))
}

#[cfg(target_os = "windows")]
fn open_native_adapter(_config: &MonitorConfig) -> Result<Box<dyn PlatformWatchAdapter>, WatchError> {
    Ok(Box::new(WindowsDirAdapter::open("read-directory-changes")?))
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn open_native_adapter(config: &MonitorConfig) -> Result<Box<dyn PlatformWatchAdapter>, WatchError> {
    tracing::debug!("No native backend on this platform, using polling");
    Ok(Box::new(PollingFallbackAdapter::new(config.poll_interval())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_ids_are_unique() {
        let mut ids = WatchIdAllocator::default();
        let a = ids.next_id();
        let b = ids.next_id();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn test_polling_backend_selected() {
        let config = MonitorConfig {
            backend: Backend::Polling,
            ..MonitorConfig::default()
        };
        let adapter = open_adapter(&config).unwrap();
        assert_eq!(adapter.name(), "polling");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_native_backend_on_linux_is_inotify() {
        let adapter = open_adapter(&MonitorConfig::default()).unwrap();
        assert_eq!(adapter.name(), "inotify");
    }
}

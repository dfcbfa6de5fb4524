//! Recursive filesystem change monitoring for fsmon
//!
//! This crate turns platform directory-change APIs into canonical
//! [`FileChangeEvent`](fsmon_core::FileChangeEvent)s:
//! - One background worker thread per monitored root
//! - Subdirectories discovered at startup and while running are watched
//! - Renames are split into delete-then-create
//! - Cooperative, synchronous shutdown through [`MonitorRegistry::unregister`]
//!
//! ```no_run
//! use fsmon_core::{FileChangeEvent, MonitorConfig};
//! use fsmon_watcher::MonitorRegistry;
//! use std::path::Path;
//!
//! let registry = MonitorRegistry::new(MonitorConfig::default(), |event: FileChangeEvent| {
//!     println!("{}", event);
//! });
//! registry.register(Path::new("/tmp")).unwrap();
//! ```

pub mod error;
pub mod platform;
pub mod registry;
pub mod table;
pub mod translate;
pub mod wake;
pub mod worker;

#[cfg(test)]
mod testing;

pub use error::{RegisterError, WatchError};
pub use platform::{
    default_factory, open_adapter, AdapterFactory, NativeRecord, PlatformWatchAdapter,
    PollingFallbackAdapter, Wait, WatchId,
};
pub use registry::MonitorRegistry;
pub use table::{SubtreeWatchTable, WatchEntry};
pub use translate::{canonical_kind, NativeAction};
pub use wake::{Wake, WakeHandle};
pub use worker::{MonitorState, WatchWorker, WorkerHandle};

#[cfg(target_os = "linux")]
pub use platform::InotifyAdapter;

#[cfg(target_os = "macos")]
pub use platform::MacFsEventsAdapter;

#[cfg(target_os = "windows")]
pub use platform::WindowsDirAdapter;

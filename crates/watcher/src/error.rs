//! Error types for monitor registration and native watch operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure inside a platform adapter
#[derive(Debug, Error)]
pub enum WatchError {
    /// The requested root could not be resolved to an absolute path
    #[error("cannot resolve path {path}: {source}")]
    Path {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The native watch context could not be created
    #[error("failed to initialise {backend} watch context: {source}")]
    Init {
        backend: &'static str,
        #[source]
        source: io::Error,
    },

    /// A directory could not be registered with the native API
    #[error("failed to watch {path}: {source}")]
    AddWatch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The worker thread could not be started
    #[error("failed to spawn watch worker: {0}")]
    Spawn(#[source] io::Error),

    /// Blocking on the native API failed
    #[error("native wait failed: {0}")]
    Wait(#[source] io::Error),

    /// Reading pending native records failed
    #[error("native read failed: {0}")]
    Read(#[source] io::Error),

    /// Error reported by a `notify` backend
    #[error(transparent)]
    Notify(#[from] notify::Error),
}

/// Failure returned by [`MonitorRegistry::register`](crate::MonitorRegistry::register)
#[derive(Debug, Error)]
pub enum RegisterError {
    /// The canonical path already has a monitor (or one is still stopping)
    #[error("{0} is already being watched")]
    AlreadyWatched(PathBuf),

    /// Every slot is taken
    #[error("no free monitor slot (capacity {capacity})")]
    NoFreeSlot { capacity: usize },

    /// The native watch context or the root watch could not be set up
    #[error("cannot start monitor for {path}: {source}")]
    AdapterInitFailed {
        path: PathBuf,
        #[source]
        source: WatchError,
    },
}

impl RegisterError {
    /// `true` for the idempotent "already registered" outcome
    pub fn is_already_watched(&self) -> bool {
        matches!(self, RegisterError::AlreadyWatched(_))
    }
}

//! Shared building blocks for fsmon
//!
//! This crate provides:
//! - The canonical change event model (`Created` / `Deleted` / `Modified`)
//! - The `EventPublisher` boundary the watch workers push into
//! - The path and directory-listing collaborator used during registration
//! - Configuration loading and validation (TOML)

pub mod config;
pub mod event;
pub mod fs;

// Re-exports
pub use config::{Backend, FsmonConfig, MonitorConfig};
pub use event::{ChannelPublisher, EventKind, EventPublisher, FileChangeEvent, UnknownEventKind};
pub use fs::{FileSystem, LocalFs};

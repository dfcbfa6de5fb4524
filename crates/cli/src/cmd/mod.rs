//! CLI command implementations

pub mod config;
pub mod watch;

use anyhow::{Context, Result};
use fsmon_core::config::config_file_path;
use fsmon_core::FsmonConfig;
use std::path::{Path, PathBuf};

/// Config file named by `--config`, or the default location
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => config_file_path().context("Could not determine config file path"),
    }
}

/// Load configuration, falling back to defaults when the file is missing
pub fn load_config(explicit: Option<&Path>) -> Result<FsmonConfig> {
    let path = config_path(explicit)?;
    if path.exists() {
        FsmonConfig::load_from(&path)
    } else {
        Ok(FsmonConfig::default())
    }
}

//! Configuration file management
//!
//! Configuration lives in `<config_dir>/fsmon/config.toml`:
//! ```toml
//! [monitor]
//! max_monitors = 16
//! backend = "native"
//! poll_interval_ms = 100
//! synthesize_nested_creates = true
//! inotify_buffer_bytes = 4096
//! ```
//!
//! Every field is optional; missing fields fall back to their defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default bound on concurrently monitored roots
pub const DEFAULT_MAX_MONITORS: usize = 16;

/// Default rescan interval of the polling backend
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default inotify read buffer size
pub const DEFAULT_INOTIFY_BUFFER_BYTES: usize = 4096;

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsmonConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Which change-notification backend watch workers use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The platform's native API (inotify, FSEvents, ReadDirectoryChangesW)
    #[default]
    Native,
    /// Periodic directory rescans; works everywhere
    Polling,
}

impl std::str::FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "native" => Ok(Backend::Native),
            "polling" => Ok(Backend::Polling),
            other => anyhow::bail!("Unknown backend: {} (expected 'native' or 'polling')", other),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Native => f.write_str("native"),
            Backend::Polling => f.write_str("polling"),
        }
    }
}

/// Monitor registry and watch worker settings
///
/// `max_monitors` is read once when a registry is built; the slot table
/// never grows afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Maximum number of concurrently monitored roots (default: 16)
    #[serde(default = "default_max_monitors")]
    pub max_monitors: usize,

    /// Notification backend (default: native)
    #[serde(default)]
    pub backend: Backend,

    /// Rescan interval for the polling backend, in milliseconds (default: 100)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Emit `Created` for files already inside a directory discovered at
    /// runtime (default: true)
    #[serde(default = "default_true")]
    pub synthesize_nested_creates: bool,

    /// Size of the inotify read buffer in bytes (default: 4096)
    #[serde(default = "default_inotify_buffer_bytes")]
    pub inotify_buffer_bytes: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_monitors: DEFAULT_MAX_MONITORS,
            backend: Backend::Native,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            synthesize_nested_creates: true,
            inotify_buffer_bytes: DEFAULT_INOTIFY_BUFFER_BYTES,
        }
    }
}

impl MonitorConfig {
    /// Polling interval as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Check every field against its valid range
    pub fn validate(&self) -> Result<()> {
        if !(1..=1024).contains(&self.max_monitors) {
            anyhow::bail!(
                "monitor.max_monitors must be between 1 and 1024 (got {})",
                self.max_monitors
            );
        }
        if !(10..=60_000).contains(&self.poll_interval_ms) {
            anyhow::bail!(
                "monitor.poll_interval_ms must be between 10 and 60000 (got {})",
                self.poll_interval_ms
            );
        }
        if !(1024..=1_048_576).contains(&self.inotify_buffer_bytes) {
            anyhow::bail!(
                "monitor.inotify_buffer_bytes must be between 1024 and 1048576 (got {})",
                self.inotify_buffer_bytes
            );
        }
        Ok(())
    }
}

impl FsmonConfig {
    /// Parse and validate configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: FsmonConfig = toml::from_str(text).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Write configuration to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate().context("Refusing to save invalid configuration")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let text = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        self.monitor.validate()
    }
}

/// Default config file location: `<config_dir>/fsmon/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fsmon").join("config.toml"))
}

/// Create the default config file if it does not exist yet
///
/// Returns the path of the config file.
pub fn init_if_missing() -> Result<PathBuf> {
    let path = config_file_path().context("Could not determine config file path")?;
    if !path.exists() {
        FsmonConfig::default().save_to(&path)?;
    }
    Ok(path)
}

/// Annotated example configuration
pub fn example_config() -> &'static str {
    r#"# fsmon configuration

[monitor]
# Maximum number of directory trees monitored at the same time (1-1024).
# Registering more roots than this fails with "no free slot".
max_monitors = 16

# "native" uses inotify / FSEvents / ReadDirectoryChangesW.
# "polling" rescans watched directories periodically.
backend = "native"

# Rescan interval of the polling backend, in milliseconds (10-60000)
poll_interval_ms = 100

# Report files that already exist inside a newly created directory
synthesize_nested_creates = true

# inotify read buffer size in bytes (1024-1048576)
inotify_buffer_bytes = 4096
"#
}

fn default_max_monitors() -> usize {
    DEFAULT_MAX_MONITORS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_inotify_buffer_bytes() -> usize {
    DEFAULT_INOTIFY_BUFFER_BYTES
}

fn default_true() -> bool {
    true
}

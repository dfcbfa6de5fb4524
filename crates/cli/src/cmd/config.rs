//! Configuration management command
//!
//! Provides CLI interface to view and edit the monitor configuration.

use super::{config_path, load_config};
use anyhow::{Context, Result};
use fsmon_core::config::{example_config, init_if_missing};
use fsmon_core::{Backend, FsmonConfig};
use owo_colors::OwoColorize;
use std::path::Path;

/// List all configuration values
pub fn run_list(explicit: Option<&Path>) -> Result<()> {
    let config = load_config(explicit)?;
    let path = config_path(explicit)?;
    let monitor = &config.monitor;

    println!("{}", "fsmon Configuration".bold());
    println!("{}: {}\n", "Location".dimmed(), path.display().dimmed());

    println!("{}", "[monitor]".yellow());
    println!("  {} = {}", "max_monitors".cyan(), monitor.max_monitors);
    println!("  {} = {}", "backend".cyan(), monitor.backend);
    println!(
        "  {} = {} {}",
        "poll_interval_ms".cyan(),
        monitor.poll_interval_ms,
        if monitor.backend == Backend::Polling {
            format!("({:?})", monitor.poll_interval()).dimmed().to_string()
        } else {
            "(unused with native backend)".dimmed().to_string()
        }
    );
    println!(
        "  {} = {}",
        "synthesize_nested_creates".cyan(),
        monitor.synthesize_nested_creates
    );
    println!(
        "  {} = {}",
        "inotify_buffer_bytes".cyan(),
        monitor.inotify_buffer_bytes
    );

    println!("\n{}", "Valid Ranges:".bold());
    println!("  max_monitors: 1-1024");
    println!("  backend: native, polling");
    println!("  poll_interval_ms: 10-60,000");
    println!("  inotify_buffer_bytes: 1,024-1,048,576");

    Ok(())
}

/// Get a single configuration value
pub fn run_get(explicit: Option<&Path>, key: &str) -> Result<()> {
    let config = load_config(explicit)?;
    let monitor = &config.monitor;

    let value = match key {
        "monitor.max_monitors" => monitor.max_monitors.to_string(),
        "monitor.backend" => monitor.backend.to_string(),
        "monitor.poll_interval_ms" => monitor.poll_interval_ms.to_string(),
        "monitor.synthesize_nested_creates" => monitor.synthesize_nested_creates.to_string(),
        "monitor.inotify_buffer_bytes" => monitor.inotify_buffer_bytes.to_string(),
        _ => anyhow::bail!(
            "Unknown config key: {}. Use 'fsmon config list' to see available keys.",
            key
        ),
    };

    println!("{}", value);
    Ok(())
}

/// Set a configuration value
pub fn run_set(explicit: Option<&Path>, key: &str, value: &str) -> Result<()> {
    let mut config = load_config(explicit)?;
    apply(&mut config, key, value)?;

    // Validate before saving
    config.validate().context("Invalid configuration value")?;

    let path = config_path(explicit)?;
    config.save_to(&path)?;

    println!("{} {} = {}", "✓".green(), key.cyan(), value);
    println!(
        "{}",
        "Note: running 'fsmon watch' processes keep their old settings".yellow()
    );

    Ok(())
}

fn apply(config: &mut FsmonConfig, key: &str, value: &str) -> Result<()> {
    let monitor = &mut config.monitor;
    match key {
        "monitor.max_monitors" => {
            monitor.max_monitors = value
                .parse()
                .context("Invalid value: must be a positive integer")?;
        }
        "monitor.backend" => {
            monitor.backend = value.parse()?;
        }
        "monitor.poll_interval_ms" => {
            monitor.poll_interval_ms = value
                .parse()
                .context("Invalid value: must be a positive integer")?;
        }
        "monitor.synthesize_nested_creates" => {
            monitor.synthesize_nested_creates = value
                .parse()
                .context("Invalid value: must be 'true' or 'false'")?;
        }
        "monitor.inotify_buffer_bytes" => {
            monitor.inotify_buffer_bytes = value
                .parse()
                .context("Invalid value: must be a positive integer")?;
        }
        _ => anyhow::bail!(
            "Unknown config key: {}. Use 'fsmon config list' to see available keys.",
            key
        ),
    }
    Ok(())
}

/// Show the config file path and optionally create it
pub fn run_path(explicit: Option<&Path>, create: bool) -> Result<()> {
    let path = config_path(explicit)?;

    if create && !path.exists() {
        match explicit {
            Some(path) => FsmonConfig::default().save_to(path)?,
            None => {
                init_if_missing()?;
            }
        }
        println!("{} Created config file at: {}", "✓".green(), path.display());
    } else if path.exists() {
        println!("{}", path.display());
    } else {
        println!("{}", path.display());
        println!("{}", "File does not exist. Use --create to create it.".yellow());
    }

    Ok(())
}

/// Show example configuration
pub fn run_example() -> Result<()> {
    println!("{}", example_config());
    Ok(())
}

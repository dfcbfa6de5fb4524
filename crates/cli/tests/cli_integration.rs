//! Integration tests for the fsmon binary

mod common;

use anyhow::Result;
use std::fs;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_config_example_is_printed() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let result = fsmon!(temp_dir.path(), "config", "example").assert_success()?;

    assert!(result.stdout.contains("[monitor]"));
    assert!(result.stdout.contains("max_monitors = 16"));
    Ok(())
}

#[test]
fn test_config_set_then_get() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = temp_dir.path().join("nested/config.toml");
    let config = config.to_str().unwrap();

    fsmon!(temp_dir.path(), "--config", config, "config", "set", "monitor.backend", "polling")
        .assert_success()?;
    let result =
        fsmon!(temp_dir.path(), "--config", config, "config", "get", "monitor.backend").assert_success()?;

    assert_eq!(result.stdout.trim(), "polling");
    assert!(fs::read_to_string(config)?.contains("backend = \"polling\""));
    Ok(())
}

#[test]
fn test_config_set_rejects_out_of_range_value() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = temp_dir.path().join("config.toml");
    let config = config.to_str().unwrap();

    let result = fsmon!(temp_dir.path(), "--config", config, "config", "set", "monitor.max_monitors", "0")
        .assert_failure()?;

    assert!(result.contains_stderr("max_monitors"));
    assert!(!temp_dir.path().join("config.toml").exists());
    Ok(())
}

#[test]
fn test_config_path_create() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = temp_dir.path().join("fresh.toml");
    let config_str = config.to_str().unwrap();

    fsmon!(temp_dir.path(), "--config", config_str, "config", "path", "--create").assert_success()?;

    assert!(config.exists());
    let list = fsmon!(temp_dir.path(), "--config", config_str, "config", "list").assert_success()?;
    assert!(list.stdout.contains("max_monitors"));
    Ok(())
}

#[test]
fn test_watch_rejects_invalid_config_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = temp_dir.path().join("bad.toml");
    fs::write(&config, "[monitor]\npoll_interval_ms = 1\n")?;

    let result = fsmon!(
        temp_dir.path(),
        "--config",
        config.to_str().unwrap(),
        "watch",
        "--duration",
        "1",
        "."
    )
    .assert_failure()?;

    assert!(result.contains_stderr("poll_interval_ms"));
    Ok(())
}

#[test]
fn test_watch_fails_when_nothing_can_be_watched() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let result = fsmon!(temp_dir.path(), "watch", "--duration", "1", "missing-dir").assert_failure()?;

    assert!(result.contains_stderr("None of the given paths could be watched"));
    Ok(())
}

#[test]
fn test_watch_prints_json_events() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path().canonicalize()?;
    let watched = root.join("watched");
    fs::create_dir(&watched)?;

    let writer = {
        let watched = watched.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(700));
            fs::create_dir(watched.join("sub")).unwrap();
            fs::write(watched.join("sub/new.txt"), b"hello").unwrap();
        })
    };

    let result = fsmon!(
        &root,
        "watch",
        "--json",
        "--backend",
        "polling",
        "--duration",
        "3",
        "watched"
    )
    .assert_success()?;
    writer.join().unwrap();

    let expected = watched.join("sub/new.txt");
    let events = result.json_lines()?;
    assert!(
        events.iter().any(|event| event["kind"] == "created"
            && event["code"] == 1
            && event["path"] == expected.to_str().unwrap()),
        "no created event for {} in:\n{}",
        expected.display(),
        result.stdout
    );
    Ok(())
}

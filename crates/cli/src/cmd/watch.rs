//! Watch command
//!
//! Registers every path, then prints events until Enter is pressed, stdin
//! closes or `--duration` elapses.

use anyhow::{Context, Result};
use crossbeam_channel::{select, Receiver};
use fsmon_core::{Backend, ChannelPublisher, EventKind, FileChangeEvent};
use fsmon_watcher::MonitorRegistry;
use owo_colors::OwoColorize;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::debug;

pub struct WatchOptions {
    pub paths: Vec<PathBuf>,
    pub json: bool,
    pub backend: Option<Backend>,
    pub max_monitors: Option<usize>,
    pub duration: Option<u64>,
}

pub fn run(config_path: Option<&Path>, opts: WatchOptions) -> Result<()> {
    let mut config = super::load_config(config_path)?.monitor;
    if let Some(backend) = opts.backend {
        config.backend = backend;
    }
    if let Some(max_monitors) = opts.max_monitors {
        config.max_monitors = max_monitors;
    }
    config.validate().context("Invalid monitor settings")?;

    let (tx, events) = crossbeam_channel::unbounded();
    let registry = MonitorRegistry::new(config, ChannelPublisher::new(tx));

    let mut watched = 0;
    for path in &opts.paths {
        match registry.register(path) {
            Ok(()) => {
                watched += 1;
                eprintln!("{} Watching {}", "✓".green(), path.display());
            }
            Err(e) if e.is_already_watched() => {
                eprintln!("{} {} is already watched", "!".yellow(), path.display());
            }
            Err(e) => eprintln!("{} {}", "✗".red(), e),
        }
    }
    if watched == 0 {
        anyhow::bail!("None of the given paths could be watched");
    }

    let timer = match opts.duration {
        Some(secs) => crossbeam_channel::after(Duration::from_secs(secs)),
        None => crossbeam_channel::never(),
    };
    // With a fixed duration stdin is left alone, so the command also works detached
    let input = match opts.duration {
        Some(_) => crossbeam_channel::never(),
        None => {
            eprintln!("{}", "Press Enter to stop".dimmed());
            stdin_closed()
        }
    };

    loop {
        select! {
            recv(events) -> event => match event {
                Ok(event) => print_event(&event, opts.json)?,
                Err(_) => break,
            },
            recv(timer) -> _ => break,
            recv(input) -> _ => break,
        }
    }

    registry.shutdown();
    for event in events.try_iter() {
        print_event(&event, opts.json)?;
    }
    Ok(())
}

/// Fires once a line is entered or stdin reaches EOF
fn stdin_closed() -> Receiver<()> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let mut line = String::new();
        let read = std::io::stdin().lock().read_line(&mut line);
        debug!("stdin returned {:?}, stopping", read);
        let _ = tx.send(());
    });
    rx
}

fn print_event(event: &FileChangeEvent, json: bool) -> Result<()> {
    if json {
        let line = serde_json::json!({
            "kind": event.kind.as_str(),
            "code": event.kind.code(),
            "path": event.path.to_string_lossy(),
        });
        println!("{}", serde_json::to_string(&line)?);
        return Ok(());
    }

    let label = format!("{:<8}", event.kind.as_str());
    let label = match event.kind {
        EventKind::Created => label.green().to_string(),
        EventKind::Deleted => label.red().to_string(),
        EventKind::Modified => label.yellow().to_string(),
    };
    println!("{} {}", label, event.path.display());
    Ok(())
}

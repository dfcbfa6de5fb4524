//! Scripted adapter for unit tests

use crate::error::WatchError;
use crate::platform::{NativeRecord, PlatformWatchAdapter, Wait, WatchId, WatchIdAllocator};
use crate::wake::{ChannelWake, WakeHandle};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub(crate) enum Step {
    Records(Vec<NativeRecord>),
    Fail,
    Wake,
}

/// What the worker asked the adapter to do
#[derive(Debug, Default)]
pub(crate) struct AdapterLog {
    pub added: Vec<(WatchId, PathBuf)>,
    pub removed: Vec<WatchId>,
    pub refuse: HashSet<PathBuf>,
}

/// Test-side controls of one [`ScriptedAdapter`]
#[derive(Clone)]
pub(crate) struct Script {
    tx: Sender<Step>,
    pub log: Arc<Mutex<AdapterLog>>,
}

impl Script {
    pub fn id_of(&self, dir: &Path) -> Option<WatchId> {
        self.log
            .lock()
            .added
            .iter()
            .find(|(_, path)| path == dir)
            .map(|(id, _)| *id)
    }

    pub fn watched(&self) -> Vec<PathBuf> {
        self.log.lock().added.iter().map(|(_, path)| path.clone()).collect()
    }

    /// Queue records; ignored once the adapter is gone
    pub fn send(&self, records: Vec<NativeRecord>) {
        let _ = self.tx.send(Step::Records(records));
    }

    pub fn fail(&self) {
        let _ = self.tx.send(Step::Fail);
    }
}

pub(crate) struct ScriptedAdapter {
    tx: Sender<Step>,
    rx: Receiver<Step>,
    ids: WatchIdAllocator,
    log: Arc<Mutex<AdapterLog>>,
    queued: Vec<NativeRecord>,
}

pub(crate) fn scripted() -> (ScriptedAdapter, Script) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let log = Arc::new(Mutex::new(AdapterLog::default()));
    let script = Script {
        tx: tx.clone(),
        log: log.clone(),
    };
    let adapter = ScriptedAdapter {
        tx,
        rx,
        ids: WatchIdAllocator::default(),
        log,
        queued: Vec::new(),
    };
    (adapter, script)
}

impl PlatformWatchAdapter for ScriptedAdapter {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn add_watch(&mut self, dir: &Path) -> Result<WatchId, WatchError> {
        let mut log = self.log.lock();
        if log.refuse.contains(dir) {
            return Err(WatchError::AddWatch {
                path: dir.to_path_buf(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "refused"),
            });
        }
        let id = self.ids.next_id();
        log.added.push((id, dir.to_path_buf()));
        Ok(id)
    }

    fn remove_watch(&mut self, id: WatchId) {
        self.log.lock().removed.push(id);
    }

    fn waker(&self) -> WakeHandle {
        Arc::new(ChannelWake::new(self.tx.clone(), || Step::Wake))
    }

    fn wait(&mut self) -> Result<Wait, WatchError> {
        match self.rx.recv() {
            Ok(Step::Records(records)) => {
                self.queued.extend(records);
                Ok(Wait::Ready)
            }
            Ok(Step::Wake) => Ok(Wait::Woken),
            Ok(Step::Fail) => Err(WatchError::Read(io::Error::new(
                io::ErrorKind::Other,
                "scripted failure",
            ))),
            Err(_) => Err(WatchError::Wait(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "script closed",
            ))),
        }
    }

    fn drain(&mut self) -> Result<Vec<NativeRecord>, WatchError> {
        Ok(std::mem::take(&mut self.queued))
    }
}

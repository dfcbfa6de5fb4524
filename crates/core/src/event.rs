//! Canonical change events and the publisher boundary

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kind of a canonical change event
///
/// The discriminants are the stable codes handed to event consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum EventKind {
    /// A regular file appeared (created, or renamed into place)
    Created = 1,
    /// A regular file disappeared (deleted, or renamed away)
    Deleted = 2,
    /// A regular file's contents changed
    Modified = 3,
}

impl EventKind {
    /// Numeric code of this kind
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Lowercase label, used for display
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Deleted => "deleted",
            EventKind::Modified => "modified",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when decoding a code that is not an `EventKind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown event kind code: {0}")]
pub struct UnknownEventKind(pub u8);

impl TryFrom<u8> for EventKind {
    type Error = UnknownEventKind;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(EventKind::Created),
            2 => Ok(EventKind::Deleted),
            3 => Ok(EventKind::Modified),
            other => Err(UnknownEventKind(other)),
        }
    }
}

/// A single change to a regular file under a monitored root
///
/// Events are transient: built by a watch worker, published, then dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileChangeEvent {
    /// What happened
    pub kind: EventKind,
    /// Absolute path of the affected file
    pub path: PathBuf,
}

impl FileChangeEvent {
    /// Create a new event
    pub fn new(kind: EventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(EventKind::Created, path)
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(EventKind::Deleted, path)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(EventKind::Modified, path)
    }
}

impl fmt::Display for FileChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path.display())
    }
}

/// Sink for canonical events
///
/// Implementations are called from every watch worker thread, possibly
/// at the same time, so they must be `Send + Sync`.
pub trait EventPublisher: Send + Sync {
    /// Deliver one event
    fn publish(&self, event: FileChangeEvent);
}

impl<F> EventPublisher for F
where
    F: Fn(FileChangeEvent) + Send + Sync,
{
    fn publish(&self, event: FileChangeEvent) {
        self(event)
    }
}

/// Publisher that forwards events into a crossbeam channel
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: Sender<FileChangeEvent>,
}

impl ChannelPublisher {
    pub fn new(tx: Sender<FileChangeEvent>) -> Self {
        Self { tx }
    }
}

impl EventPublisher for ChannelPublisher {
    fn publish(&self, event: FileChangeEvent) {
        // A dropped receiver just means nobody is listening any more
        if self.tx.send(event).is_err() {
            tracing::trace!("Event receiver dropped, discarding event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_kind_codes_are_stable() {
        assert_eq!(EventKind::Created.code(), 1);
        assert_eq!(EventKind::Deleted.code(), 2);
        assert_eq!(EventKind::Modified.code(), 3);
    }

    #[test]
    fn test_kind_from_code() {
        assert_eq!(EventKind::try_from(2), Ok(EventKind::Deleted));
        assert_eq!(EventKind::try_from(0), Err(UnknownEventKind(0)));
        assert_eq!(EventKind::try_from(4), Err(UnknownEventKind(4)));
    }

    #[test]
    fn test_event_json_shape() {
        let event = FileChangeEvent::created("/root/a.txt");
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"kind":"created","path":"/root/a.txt"}"#);
    }

    #[test]
    fn test_channel_publisher_forwards() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let publisher = ChannelPublisher::new(tx);

        publisher.publish(FileChangeEvent::deleted("/root/a.txt"));
        publisher.publish(FileChangeEvent::created("/root/b.txt"));

        assert_eq!(rx.try_recv().unwrap(), FileChangeEvent::deleted("/root/a.txt"));
        assert_eq!(rx.try_recv().unwrap(), FileChangeEvent::created("/root/b.txt"));
    }

    #[test]
    fn test_channel_publisher_survives_dropped_receiver() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        ChannelPublisher::new(tx).publish(FileChangeEvent::modified("/root/a.txt"));
    }

    #[test]
    fn test_closure_publisher() {
        let seen = Mutex::new(Vec::new());
        let publisher = |event: FileChangeEvent| seen.lock().unwrap().push(event);

        publisher.publish(FileChangeEvent::modified("/x"));

        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}

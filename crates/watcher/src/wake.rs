//! Cross-thread wake signal for blocked watch workers

use crossbeam_channel::Sender;
use std::sync::Arc;

/// Interrupts an adapter's blocking wait
///
/// Firing a wake never blocks and is safe to repeat; extra wakes are
/// absorbed by the adapter.
pub trait Wake: Send + Sync {
    fn wake(&self);
}

/// Shared handle to an adapter's wake primitive
pub type WakeHandle = Arc<dyn Wake>;

/// Wake primitive backed by a channel the adapter blocks on
#[derive(Debug)]
pub struct ChannelWake<T> {
    tx: Sender<T>,
    message: fn() -> T,
}

impl<T: Send> ChannelWake<T> {
    pub fn new(tx: Sender<T>, message: fn() -> T) -> Self {
        Self { tx, message }
    }
}

impl<T: Send> Wake for ChannelWake<T> {
    fn wake(&self) {
        // The adapter owns the receiver; a send error means it is gone already
        let _ = self.tx.send((self.message)());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_wake_delivers_message() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let waker: WakeHandle = Arc::new(ChannelWake::new(tx, || 7u8));

        waker.wake();
        waker.wake();

        assert_eq!(rx.try_recv(), Ok(7));
        assert_eq!(rx.try_recv(), Ok(7));
    }

    #[test]
    fn test_channel_wake_after_receiver_dropped() {
        let (tx, rx) = crossbeam_channel::unbounded::<()>();
        drop(rx);
        ChannelWake::new(tx, || ()).wake();
    }
}

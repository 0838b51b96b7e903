use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

/// Binary semaphore. Signals that arrive while it is already raised coalesce.
///
/// Clones share the same state, so one side can hold it in a command while
/// the other waits.
#[derive(Debug, Clone)]
pub struct Semaphore {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Semaphore {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    pub fn signal(&self) {
        // Full means already raised.
        let _ = self.tx.try_send(());
    }

    /// Blocks until signalled, then lowers the semaphore.
    pub fn wait(&self) {
        // Both ends live in `self`, so the channel cannot disconnect.
        let _ = self.rx.recv();
    }

    /// Returns `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.rx.recv_timeout(timeout).is_ok()
    }

    pub fn try_wait(&self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}

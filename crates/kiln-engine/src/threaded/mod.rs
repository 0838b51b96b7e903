//! Producer/consumer shell around the render thread.
//!
//! At most one command buffer is owned by the render thread at any time:
//! submitting a buffer first waits for the previous one to drain.

mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, bounded};

use crate::command::CommandBuffer;

/// Executes a full command buffer on the render thread.
///
/// The processor has exclusive use of the buffer until it returns and may
/// take ownership of command payloads.
pub trait BufferProcessor {
    fn run_buffer(&mut self, buffer: &mut CommandBuffer);
}

pub(crate) enum Job {
    Run(CommandBuffer),
    /// Lets the worker observe the shutdown flag.
    Wake,
}

/// Owns the render thread and the single in-flight buffer.
pub struct ThreadedBackend {
    work_tx: Sender<Job>,
    done_rx: Receiver<CommandBuffer>,
    busy: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    /// A buffer was sent and its drained copy not yet received.
    in_flight: bool,
    drained: Option<CommandBuffer>,
}

impl ThreadedBackend {
    /// Spawns the render thread. `factory` runs on that thread, so the
    /// processor itself need not be `Send`.
    pub fn start<P, F>(factory: F) -> Result<Self>
    where
        P: BufferProcessor + 'static,
        F: FnOnce() -> P + Send + 'static,
    {
        let (work_tx, work_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);
        let busy = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = {
            let busy = Arc::clone(&busy);
            let shutdown = Arc::clone(&shutdown);
            std::thread::Builder::new()
                .name("kiln-render".into())
                .spawn(move || {
                    let processor = factory();
                    worker::run(processor, work_rx, done_tx, busy, shutdown);
                })
                .context("failed to spawn render thread")?
        };

        Ok(Self {
            work_tx,
            done_rx,
            busy,
            shutdown,
            handle: Some(handle),
            in_flight: false,
            drained: None,
        })
    }

    /// Hands `buffer` to the render thread.
    ///
    /// Blocks until the previously submitted buffer has drained and returns
    /// that buffer, emptied, for reuse.
    pub fn run_buffer(&mut self, buffer: CommandBuffer) -> Option<CommandBuffer> {
        self.wait_for_idle();

        if self.handle.is_none() {
            log::error!("run_buffer after stop; dropping {} commands", buffer.command_count());
            return Some(recycle(buffer));
        }

        self.busy.store(true, Ordering::Release);
        match self.work_tx.send(Job::Run(buffer)) {
            Ok(()) => self.in_flight = true,
            Err(err) => {
                self.busy.store(false, Ordering::Release);
                log::error!("render thread is gone; buffer not executed");
                if let Job::Run(buffer) = err.into_inner() {
                    return Some(recycle(buffer));
                }
            }
        }
        self.drained.take()
    }

    /// True when no buffer is owned by the render thread.
    pub fn is_idle(&self) -> bool {
        !self.busy.load(Ordering::Acquire)
    }

    /// Blocks until the in-flight buffer, if any, has drained.
    pub fn wait_for_idle(&mut self) {
        if !self.in_flight {
            return;
        }
        self.in_flight = false;
        match self.done_rx.recv() {
            Ok(buffer) => self.drained = Some(buffer),
            Err(_) => {
                self.busy.store(false, Ordering::Release);
                log::error!("render thread exited while a buffer was in flight");
            }
        }
    }

    /// Drains the in-flight buffer, then stops and joins the render thread.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.wait_for_idle();
        self.shutdown.store(true, Ordering::Release);
        let _ = self.work_tx.send(Job::Wake);
        if handle.join().is_err() {
            log::error!("render thread panicked");
        }
        log::debug!("render thread stopped");
    }
}

impl Drop for ThreadedBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

fn recycle(mut buffer: CommandBuffer) -> CommandBuffer {
    buffer.reset();
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Records the number of commands in each buffer it sees.
    struct Recorder {
        seen: Arc<Mutex<Vec<usize>>>,
        active: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl BufferProcessor for Recorder {
        fn run_buffer(&mut self, buffer: &mut CommandBuffer) {
            let prev = self.active.fetch_add(1, Ordering::SeqCst);
            assert_eq!(prev, 0, "two buffers in flight");
            std::thread::sleep(self.delay);
            self.seen.lock().unwrap().push(buffer.command_count());
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn start(delay: Duration) -> (ThreadedBackend, Arc<Mutex<Vec<usize>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let remote = Arc::clone(&seen);
        let backend = ThreadedBackend::start(move || Recorder {
            seen: remote,
            active: Arc::new(AtomicUsize::new(0)),
            delay,
        })
        .unwrap();
        (backend, seen)
    }

    fn buffer_with(n: usize) -> CommandBuffer {
        let mut buf = CommandBuffer::new(1 << 16, 0);
        for _ in 0..n {
            buf.add_command(Command::Nop).unwrap();
        }
        buf
    }

    // ── hand-off ──────────────────────────────────────────────────────────

    #[test]
    fn previous_buffer_has_drained_when_run_buffer_returns() {
        let (mut backend, seen) = start(Duration::from_millis(5));
        for n in 1..=5 {
            backend.run_buffer(buffer_with(n));
            let done = seen.lock().unwrap().clone();
            assert_eq!(done, (1..n).collect::<Vec<_>>());
        }
        backend.wait_for_idle();
        assert!(backend.is_idle());
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn drained_buffer_comes_back_empty() {
        let (mut backend, _) = start(Duration::ZERO);
        assert!(backend.run_buffer(buffer_with(3)).is_none());
        let recycled = backend.run_buffer(buffer_with(1)).unwrap();
        assert!(recycled.is_empty());
    }

    #[test]
    fn busy_while_processing() {
        let (mut backend, _) = start(Duration::from_millis(50));
        backend.run_buffer(buffer_with(1));
        assert!(!backend.is_idle());
        backend.wait_for_idle();
        assert!(backend.is_idle());
    }

    // ── shutdown ──────────────────────────────────────────────────────────

    #[test]
    fn stop_drains_before_joining() {
        let (mut backend, seen) = start(Duration::from_millis(20));
        backend.run_buffer(buffer_with(2));
        backend.stop();
        assert_eq!(*seen.lock().unwrap(), vec![2]);
        // Stopping twice is harmless.
        backend.stop();
    }

    #[test]
    fn run_after_stop_hands_the_buffer_back() {
        let (mut backend, seen) = start(Duration::ZERO);
        backend.stop();
        let back = backend.run_buffer(buffer_with(4));
        assert!(back.unwrap().is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }
}

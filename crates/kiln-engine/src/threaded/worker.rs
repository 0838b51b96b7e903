use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering, fence};

use crossbeam_channel::{Receiver, Sender};

use super::{BufferProcessor, Job};
use crate::command::CommandBuffer;

/// Render thread body.
pub(super) fn run<P: BufferProcessor>(
    mut processor: P,
    work_rx: Receiver<Job>,
    done_tx: Sender<CommandBuffer>,
    busy: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
) {
    log::debug!("render thread started");

    while let Ok(job) = work_rx.recv() {
        if let Job::Run(mut buffer) = job {
            processor.run_buffer(&mut buffer);

            // Everything the processor wrote must be visible before the
            // producer sees the buffer as drained.
            fence(Ordering::SeqCst);
            buffer.reset();
            busy.store(false, Ordering::Release);
            if done_tx.send(buffer).is_err() {
                break;
            }
        }

        if shutdown.load(Ordering::Acquire) {
            break;
        }
    }

    drop(processor);
    log::debug!("render thread exiting");
}

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Texture memory in bytes, shared between the render thread and the
/// producer.
#[derive(Debug, Clone, Default)]
pub struct MemoryCounter(Arc<AtomicUsize>);

impl MemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    pub fn add(&self, bytes: usize) {
        self.0.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Subtracts `bytes`, clamping at zero.
    pub fn sub(&self, bytes: usize) {
        let prev = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_sub(bytes))
            })
            .unwrap_or_default();
        if prev < bytes {
            log::warn!("texture memory counter underflow: {prev} - {bytes}");
        }
    }
}

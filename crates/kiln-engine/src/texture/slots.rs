use bitflags::bitflags;

use crate::command::{TextureDimension, TextureId, WrapMode};

use super::memory::MemoryCounter;

bitflags! {
    /// Which variants a slot holds. Empty means the slot is free.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct SlotState: u8 {
        const HAS_2D    = 1 << 0;
        const HAS_ARRAY = 1 << 1;
    }
}

/// Backend-independent data about a live texture.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub premultiplied: bool,
    pub linear_mipmaps: bool,
    /// Halvings applied per axis at creation, as `(x, y)`.
    pub rescale_shift: (u32, u32),
    pub footprint: usize,
}

/// One slot of the table: shared info plus backend handles per variant.
#[derive(Debug)]
pub struct SlotEntry<T> {
    pub info: TextureInfo,
    pub tex2d: Option<T>,
    pub array: Option<T>,
}

impl<T> SlotEntry<T> {
    pub fn state(&self) -> SlotState {
        let mut s = SlotState::empty();
        s.set(SlotState::HAS_2D, self.tex2d.is_some());
        s.set(SlotState::HAS_ARRAY, self.array.is_some());
        s
    }

    pub fn variant(&self, dim: TextureDimension) -> Option<&T> {
        match dim {
            TextureDimension::D2 => self.tex2d.as_ref(),
            TextureDimension::Array => self.array.as_ref(),
        }
    }

    pub fn variant_mut(&mut self, dim: TextureDimension) -> Option<&mut T> {
        match dim {
            TextureDimension::D2 => self.tex2d.as_mut(),
            TextureDimension::Array => self.array.as_mut(),
        }
    }
}

/// Fixed-size texture table indexed by [`TextureId`].
///
/// Insertions and removals keep the shared [`MemoryCounter`] in step with
/// the footprint of the live entries.
pub struct TextureSlots<T> {
    entries: Vec<Option<SlotEntry<T>>>,
    memory: MemoryCounter,
}

impl<T> TextureSlots<T> {
    pub fn new(capacity: usize, memory: MemoryCounter) -> Self {
        Self {
            entries: std::iter::repeat_with(|| None).take(capacity).collect(),
            memory,
        }
    }

    /// Stores `entry` at `id` and returns the entry it replaced, if any.
    ///
    /// Out-of-range ids are logged and the entry is handed back.
    pub fn insert(&mut self, id: TextureId, entry: SlotEntry<T>) -> Result<Option<SlotEntry<T>>, SlotEntry<T>> {
        let Some(slot) = self.entries.get_mut(id.index()) else {
            log::warn!("texture slot {} out of range ({} slots)", id.0, self.entries.len());
            return Err(entry);
        };
        let footprint = entry.info.footprint;
        let previous = slot.replace(entry);
        if let Some(prev) = &previous {
            log::warn!("texture slot {} created twice without destroy", id.0);
            self.memory.sub(prev.info.footprint);
        }
        self.memory.add(footprint);
        Ok(previous)
    }

    /// Frees `id` and returns its entry so the caller can release handles.
    pub fn remove(&mut self, id: TextureId) -> Option<SlotEntry<T>> {
        let entry = self.entries.get_mut(id.index())?.take()?;
        self.memory.sub(entry.info.footprint);
        Some(entry)
    }

    pub fn get(&self, id: TextureId) -> Option<&SlotEntry<T>> {
        self.entries.get(id.index())?.as_ref()
    }

    pub fn get_mut(&mut self, id: TextureId) -> Option<&mut SlotEntry<T>> {
        self.entries.get_mut(id.index())?.as_mut()
    }

    pub fn state(&self, id: TextureId) -> SlotState {
        self.get(id).map(SlotEntry::state).unwrap_or_default()
    }

    /// Frees every slot.
    pub fn drain(&mut self) -> Vec<SlotEntry<T>> {
        let drained: Vec<_> = self.entries.iter_mut().filter_map(Option::take).collect();
        for e in &drained {
            self.memory.sub(e.info.footprint);
        }
        drained
    }
}

/// Lazily created binding objects of one texture, keyed by wrap modes.
#[derive(Debug)]
pub struct BindCache<B> {
    entries: [Option<B>; 4],
}

impl<B> Default for BindCache<B> {
    fn default() -> Self {
        Self {
            entries: [None, None, None, None],
        }
    }
}

impl<B> BindCache<B> {
    #[inline]
    fn key(wrap_u: WrapMode, wrap_v: WrapMode) -> usize {
        wrap_u.index() * 2 + wrap_v.index()
    }

    pub fn get_or_insert_with(&mut self, wrap_u: WrapMode, wrap_v: WrapMode, create: impl FnOnce() -> B) -> &B {
        self.entries[Self::key(wrap_u, wrap_v)].get_or_insert_with(create)
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.entries = [None, None, None, None];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(footprint: usize) -> SlotEntry<u32> {
        SlotEntry {
            info: TextureInfo {
                footprint,
                ..Default::default()
            },
            tex2d: Some(1),
            array: None,
        }
    }

    // ── slots ─────────────────────────────────────────────────────────────

    #[test]
    fn create_destroy_pairs_restore_the_counter() {
        let memory = MemoryCounter::new();
        memory.add(5);
        let mut slots = TextureSlots::new(8, memory.clone());

        for (i, size) in [100usize, 2000, 37].into_iter().enumerate() {
            slots.insert(TextureId(i as u32), entry(size)).unwrap();
        }
        assert_eq!(memory.get(), 5 + 100 + 2000 + 37);

        for i in [1, 0, 2] {
            assert!(slots.remove(TextureId(i)).is_some());
        }
        assert_eq!(memory.get(), 5);
        assert_eq!(slots.state(TextureId(0)), SlotState::empty());
    }

    #[test]
    fn state_reflects_variants() {
        let mut slots = TextureSlots::new(4, MemoryCounter::new());
        let mut e = entry(1);
        e.array = Some(2);
        slots.insert(TextureId(2), e).unwrap();
        assert_eq!(slots.state(TextureId(2)), SlotState::HAS_2D | SlotState::HAS_ARRAY);
        assert_eq!(slots.get(TextureId(2)).unwrap().variant(TextureDimension::Array), Some(&2));
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        let memory = MemoryCounter::new();
        let mut slots = TextureSlots::new(2, memory.clone());
        assert!(slots.insert(TextureId(2), entry(10)).is_err());
        assert!(slots.remove(TextureId(9)).is_none());
        assert_eq!(memory.get(), 0);
    }

    #[test]
    fn drain_returns_counter_to_zero() {
        let memory = MemoryCounter::new();
        let mut slots = TextureSlots::new(4, memory.clone());
        slots.insert(TextureId(0), entry(10)).unwrap();
        slots.insert(TextureId(3), entry(20)).unwrap();
        assert_eq!(slots.drain().len(), 2);
        assert_eq!(memory.get(), 0);
    }

    // ── bind cache ────────────────────────────────────────────────────────

    #[test]
    fn bind_cache_creates_once_per_wrap_pair() {
        let mut cache = BindCache::default();
        let mut made = 0;
        for _ in 0..3 {
            cache.get_or_insert_with(WrapMode::Repeat, WrapMode::Clamp, || {
                made += 1;
                made
            });
        }
        cache.get_or_insert_with(WrapMode::Clamp, WrapMode::Clamp, || 99);
        assert_eq!(made, 1);
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}

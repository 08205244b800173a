// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Generic, codec-agnostic surface/picture slot arena.
//!
//! Every codec-specific DPB ([`crate::codec::h264::dpb::AvcDpb`],
//! `h265::dpb::HevcDpb`, the VP9 reference-frame array) refers to decoded
//! pictures by [`SlotHandle`] rather than by raw index, so a stale handle
//! held past a slot's reuse is rejected instead of silently resolving to
//! the wrong picture (spec §9 redesign flag: generation counters on DPB
//! slot handles).

use std::fmt;

/// Handle to a slot in a [`SlotArena`]. Two handles with the same `index`
/// but different `generation` refer to different pictures; a handle whose
/// generation doesn't match the slot's current generation is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotHandle {
    index: usize,
    generation: u32,
}

impl SlotHandle {
    pub fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for SlotHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}@{}", self.index, self.generation)
    }
}

struct Slot<T> {
    value: Option<T>,
    generation: u32,
}

/// Fixed-capacity arena of picture/surface storage slots, addressed by
/// [`SlotHandle`]. Freed slots are recycled; each reuse bumps the slot's
/// generation so outstanding handles from the previous occupant fail
/// `get`/`get_mut` instead of aliasing the new occupant (spec §4.6 "surface
/// pool" / §9).
pub struct SlotArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
}

impl<T> SlotArena<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { slots: Vec::with_capacity(capacity), free: Vec::new() }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts `value` into a free slot, growing the arena if none is
    /// free and below `capacity`. Returns `None` if the arena is full and
    /// every slot is occupied.
    pub fn insert(&mut self, value: T, capacity: usize) -> Option<SlotHandle> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.value = Some(value);
            return Some(SlotHandle::new(index, slot.generation));
        }
        if self.slots.len() < capacity {
            let generation = 0;
            self.slots.push(Slot { value: Some(value), generation });
            return Some(SlotHandle::new(self.slots.len() - 1, generation));
        }
        None
    }

    pub fn get(&self, handle: SlotHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: SlotHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Removes the value at `handle`, if the handle is still current, and
    /// bumps the slot's generation so any other outstanding handle to it
    /// becomes stale.
    pub fn remove(&mut self, handle: SlotHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|v| (SlotHandle::new(index, slot.generation), v))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove_roundtrip() {
        let mut arena: SlotArena<u32> = SlotArena::with_capacity(4);
        let h = arena.insert(42, 4).unwrap();
        assert_eq!(*arena.get(h).unwrap(), 42);
        assert_eq!(arena.remove(h), Some(42));
        assert!(arena.get(h).is_none());
    }

    #[test]
    fn stale_handle_rejected_after_reuse() {
        let mut arena: SlotArena<u32> = SlotArena::with_capacity(2);
        let h1 = arena.insert(1, 2).unwrap();
        arena.remove(h1).unwrap();
        let h2 = arena.insert(2, 2).unwrap();
        assert_eq!(h1.index(), h2.index());
        assert_ne!(h1.generation(), h2.generation());
        assert!(arena.get(h1).is_none());
        assert_eq!(*arena.get(h2).unwrap(), 2);
    }

    #[test]
    fn full_arena_rejects_insert() {
        let mut arena: SlotArena<u32> = SlotArena::with_capacity(1);
        arena.insert(1, 1).unwrap();
        assert!(arena.insert(2, 1).is_none());
    }
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Fixed-size surface pool (spec §3 "Surface pool", §4.6 "Surface slot
//! assignment").
//!
//! `N = max_dpb_size + display_delay + safety_margin` surfaces are
//! allocated once at decoder creation; the pool only ever hands out
//! indices into that fixed array, matching the teacher's "no runtime
//! allocation on the hot path" style (`encoder::stateless::OutputQueue`
//! preallocates its queue the same way).

use crate::backend::SurfaceId;
use crate::picture::UseFlags;

#[derive(Debug, Clone, Copy)]
pub struct SurfaceSlot {
    pub surface_id: SurfaceId,
    pub use_status: UseFlags,
    pub pts: Option<i64>,
}

/// Safety margin added on top of `max_dpb_size + display_delay` when
/// sizing the pool (spec §3 "Surface pool").
pub const SAFETY_MARGIN: usize = 2;

#[derive(Debug)]
pub struct SurfacePool {
    slots: Vec<SurfaceSlot>,
}

impl SurfacePool {
    pub fn new(surface_ids: Vec<SurfaceId>) -> Self {
        let slots = surface_ids
            .into_iter()
            .map(|surface_id| SurfaceSlot { surface_id, use_status: UseFlags::empty(), pts: None })
            .collect();
        Self { slots }
    }

    pub fn num_surfaces(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Option<&SurfaceSlot> {
        self.slots.get(index)
    }

    /// Picks the lowest-indexed free slot (spec §4.6 "the session picks
    /// the lowest-indexed slot with `use_status == Free`"). Returns `None`
    /// if every slot is in use; the caller decides whether to block or
    /// return `PoolExhausted`.
    pub fn allocate(&mut self, pts: Option<i64>) -> Option<usize> {
        let index = self.slots.iter().position(|s| s.use_status.is_empty())?;
        self.slots[index].use_status = UseFlags::USED_FOR_DECODE;
        self.slots[index].pts = pts;
        Some(index)
    }

    pub fn mark_flag(&mut self, index: usize, flag: UseFlags) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.use_status |= flag;
        }
    }

    pub fn clear_flag(&mut self, index: usize, flag: UseFlags) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.use_status.remove(flag);
            if slot.use_status.is_empty() {
                slot.pts = None;
            }
        }
    }

    pub fn is_free(&self, index: usize) -> bool {
        self.slots.get(index).map(|s| s.use_status.is_empty()).unwrap_or(false)
    }

    /// Spec §8 property 5: `#{decode} + #{display-only} + #{free} ==
    /// num_surfaces` at all times.
    pub fn conservation_holds(&self) -> bool {
        let decode = self.slots.iter().filter(|s| s.use_status.contains(UseFlags::USED_FOR_DECODE)).count();
        let display_only = self
            .slots
            .iter()
            .filter(|s| s.use_status.contains(UseFlags::USED_FOR_DISPLAY) && !s.use_status.contains(UseFlags::USED_FOR_DECODE))
            .count();
        let free = self.slots.iter().filter(|s| s.use_status.is_empty()).count();
        decode + display_only + free == self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> SurfacePool {
        let ids = (0..n as u32).map(SurfaceId).collect();
        SurfacePool::new(ids)
    }

    #[test]
    fn allocate_picks_lowest_free_index() {
        let mut pool = pool(3);
        assert_eq!(pool.allocate(Some(1)), Some(0));
        assert_eq!(pool.allocate(Some(2)), Some(1));
        pool.clear_flag(0, UseFlags::USED_FOR_DECODE);
        assert_eq!(pool.allocate(Some(3)), Some(0));
    }

    #[test]
    fn allocate_returns_none_when_full() {
        let mut pool = pool(1);
        assert_eq!(pool.allocate(None), Some(0));
        assert_eq!(pool.allocate(None), None);
    }

    #[test]
    fn conservation_holds_across_transitions() {
        let mut pool = pool(2);
        assert!(pool.conservation_holds());
        let idx = pool.allocate(None).unwrap();
        assert!(pool.conservation_holds());
        pool.mark_flag(idx, UseFlags::USED_FOR_DISPLAY);
        pool.clear_flag(idx, UseFlags::USED_FOR_DECODE);
        assert!(pool.conservation_holds());
        pool.clear_flag(idx, UseFlags::USED_FOR_DISPLAY);
        assert!(pool.conservation_holds());
        assert!(pool.is_free(idx));
    }
}

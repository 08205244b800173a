// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! AV1 scaffolding (spec §1 "with AV1/VP9 scaffolding", §4.4 "AV1 /
//! Extensible").
//!
//! AV1 follows the same reference-store shape as VP9 (a small fixed
//! store where each frame specifies which slots to update) but with a
//! deeper OBU/frame-header syntax this crate does not parse in full;
//! only the reference-store mechanics are implemented, mirroring
//! [`crate::codec::vp9::ReferenceFrameStore`].

use crate::dpb::SlotHandle;

pub const NUM_REF_FRAMES: usize = 8;
pub const REFS_PER_FRAME: usize = 7;

/// Minimal per-frame reference update description. A full AV1 frame
/// header additionally carries OBU-level sequence headers, tile info,
/// quantization and loop-restoration params, segmentation, film grain and
/// global motion parameters — none of which the DPB needs, so they are
/// left to the accelerator backend.
#[derive(Debug, Clone, Copy)]
pub struct FrameRefUpdate {
    pub refresh_frame_flags: u8,
    pub ref_frame_idx: [u8; REFS_PER_FRAME],
}

#[derive(Debug, Default)]
pub struct ReferenceFrameStore {
    slots: [Option<SlotHandle>; NUM_REF_FRAMES],
}

impl ReferenceFrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Option<SlotHandle> {
        self.slots.get(index).copied().flatten()
    }

    pub fn resolve_refs(&self, ref_frame_idx: &[u8; REFS_PER_FRAME]) -> [Option<SlotHandle>; REFS_PER_FRAME] {
        let mut out = [None; REFS_PER_FRAME];
        for (i, &idx) in ref_frame_idx.iter().enumerate() {
            out[i] = self.get(idx as usize);
        }
        out
    }

    pub fn update_references(&mut self, update: &FrameRefUpdate, new_handle: SlotHandle) {
        for i in 0..NUM_REF_FRAMES {
            if update.refresh_frame_flags & (1 << i) != 0 {
                self.slots[i] = Some(new_handle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_references_respects_mask() {
        let mut store = ReferenceFrameStore::new();
        let h = SlotHandle::new(0, 0);
        let update = FrameRefUpdate { refresh_frame_flags: 0b1111_1111, ref_frame_idx: [0; REFS_PER_FRAME] };
        store.update_references(&update, h);
        for i in 0..NUM_REF_FRAMES {
            assert_eq!(store.get(i), Some(h));
        }
    }
}

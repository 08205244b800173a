// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Picture records and the picture boundary detector (spec §3 "Picture
//! record", §4.3 "Picture boundary detector").

use bitflags::bitflags;

use crate::dpb::SlotHandle;

bitflags! {
    /// `use_flags` from spec §3: `{ UsedForDecode, UsedForDisplay,
    /// ShortTermRef, LongTermRef }`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UseFlags: u8 {
        const USED_FOR_DECODE = 0b0001;
        const USED_FOR_DISPLAY = 0b0010;
        const SHORT_TERM_REF = 0b0100;
        const LONG_TERM_REF = 0b1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    Invalid,
    InProgress,
    Success,
    Displaying,
    Error,
    ErrorConcealed,
}

/// One entry in the DPB (spec §3 "Picture record"). `order_hint` is the
/// codec-agnostic display-order scalar: POC for AVC/HEVC, `frame_num`-
/// derived for VP9/AV1.
#[derive(Debug, Clone)]
pub struct PictureRecord {
    pub picture_id: u64,
    pub order_hint: i64,
    pub surface_slot: Option<SlotHandle>,
    pub decode_status: DecodeStatus,
    pub ref_count: u32,
    pub use_flags: UseFlags,
    pub pts: Option<i64>,
    pub sequence_changed: bool,
}

impl PictureRecord {
    pub fn new(picture_id: u64, order_hint: i64) -> Self {
        Self {
            picture_id,
            order_hint,
            surface_slot: None,
            decode_status: DecodeStatus::Invalid,
            ref_count: 0,
            use_flags: UseFlags::empty(),
            pts: None,
            sequence_changed: false,
        }
    }

    /// Invariant from spec §3: "a picture may be freed only when
    /// `ref_count == 0` and no flags set".
    pub fn is_freeable(&self) -> bool {
        self.ref_count == 0 && self.use_flags.is_empty()
    }
}

/// One NAL unit (or, for frame-based codecs, one frame header) retained
/// until the picture it belongs to is fully assembled.
#[derive(Debug, Clone)]
pub struct PendingUnit {
    pub nal_type: u8,
    pub rbsp: Vec<u8>,
    /// Carried through from [`crate::bitstream::Nal`] so the decode
    /// parameter builder can still correct the slice-data bit offset once
    /// the unit has been buffered across a picture boundary and its slice
    /// header parsed (spec §4.5 "slice data offset").
    pub emulation_removed_at: Vec<u32>,
}

/// Per-NAL classification the caller (codec-specific parsing in
/// `parser.rs`) computes and feeds to the detector; keeps this module
/// codec-agnostic per spec §9's "codec enum dispatching to codec-specific
/// modules" redesign.
#[derive(Debug, Clone, Copy)]
pub struct NalClass {
    pub is_slice: bool,
    pub is_param_set_or_aud: bool,
    pub is_irap: bool,
    pub is_first_slice_of_picture: bool,
}

pub enum BoundaryDecision {
    /// No picture boundary; the NAL was appended to the in-progress picture.
    Continue,
    /// A picture boundary was found before this NAL. The NALs comprising
    /// the completed picture are returned; the triggering NAL has already
    /// been folded into the new in-progress picture.
    Emit(Vec<PendingUnit>),
}

/// Consumes NAL units in stream order and detects picture boundaries
/// (spec §4.3). Rules are shared across AVC/HEVC; VP9/AV1 are frame-based
/// so every frame header is `is_first_slice_of_picture = true` and
/// `is_slice = true`.
#[derive(Debug, Default)]
pub struct PictureBoundaryDetector {
    slice_seen: bool,
    prev_slice_nal_type: Option<u8>,
    pending: Vec<PendingUnit>,
}

impl PictureBoundaryDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(
        &mut self,
        nal_type: u8,
        rbsp: Vec<u8>,
        emulation_removed_at: Vec<u32>,
        class: NalClass,
    ) -> BoundaryDecision {
        let starts_new_picture = if class.is_param_set_or_aud {
            self.slice_seen
        } else if class.is_slice {
            let irap_boundary = self
                .prev_slice_nal_type
                .map(|prev| (prev != nal_type) && class.is_irap)
                .unwrap_or(false);
            irap_boundary || (self.slice_seen && class.is_first_slice_of_picture)
        } else {
            false
        };

        let unit = PendingUnit { nal_type, rbsp, emulation_removed_at };

        if starts_new_picture && !self.pending.is_empty() {
            let completed = std::mem::take(&mut self.pending);
            self.pending.push(unit);
            if class.is_slice {
                self.slice_seen = true;
                self.prev_slice_nal_type = Some(nal_type);
            }
            return BoundaryDecision::Emit(completed);
        }

        self.pending.push(unit);
        if class.is_slice {
            self.slice_seen = true;
            self.prev_slice_nal_type = Some(nal_type);
        }
        BoundaryDecision::Continue
    }

    /// Forces emission of any in-progress picture (spec §4.3 "`EOS` flag
    /// from the caller forces emission of any in-progress picture").
    pub fn flush(&mut self) -> Option<Vec<PendingUnit>> {
        if self.pending.is_empty() {
            None
        } else {
            self.slice_seen = false;
            self.prev_slice_nal_type = None;
            Some(std::mem::take(&mut self.pending))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(nal_type: u8, first: bool, irap: bool) -> NalClass {
        NalClass { is_slice: true, is_param_set_or_aud: false, is_irap: irap, is_first_slice_of_picture: first }
    }

    fn param_set() -> NalClass {
        NalClass { is_slice: false, is_param_set_or_aud: true, is_irap: false, is_first_slice_of_picture: false }
    }

    #[test]
    fn param_set_after_slice_starts_new_picture() {
        let mut d = PictureBoundaryDetector::new();
        assert!(matches!(d.feed(7, vec![1], vec![], param_set()), BoundaryDecision::Continue));
        assert!(matches!(d.feed(5, vec![2], vec![], slice(5, true, true)), BoundaryDecision::Continue));
        match d.feed(7, vec![3], vec![], param_set()) {
            BoundaryDecision::Emit(units) => assert_eq!(units.len(), 2),
            BoundaryDecision::Continue => panic!("expected boundary"),
        }
    }

    #[test]
    fn same_nal_type_first_slice_flag_starts_new_picture() {
        let mut d = PictureBoundaryDetector::new();
        d.feed(1, vec![1], vec![], slice(1, true, false));
        match d.feed(1, vec![2], vec![], slice(1, true, false)) {
            BoundaryDecision::Emit(units) => assert_eq!(units.len(), 1),
            BoundaryDecision::Continue => panic!("expected boundary"),
        }
    }

    #[test]
    fn non_first_slice_continues_picture() {
        let mut d = PictureBoundaryDetector::new();
        d.feed(1, vec![1], vec![], slice(1, true, false));
        assert!(matches!(d.feed(1, vec![2], vec![], slice(1, false, false)), BoundaryDecision::Continue));
    }

    #[test]
    fn flush_emits_in_progress_picture() {
        let mut d = PictureBoundaryDetector::new();
        d.feed(1, vec![1], vec![], slice(1, true, false));
        let flushed = d.flush().unwrap();
        assert_eq!(flushed.len(), 1);
        assert!(d.flush().is_none());
    }
}

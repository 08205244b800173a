// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! `short_term_ref_pic_set()`, Rec. ITU-T H.265 §7.3.7 / §7.4.8, including
//! inter-RPS prediction. Grounded bit-for-bit on the original source's
//! `ParseShortTermRefPicSet` (delta-RPS merge loops split into negative-
//! then-positive halves).

use crate::bitstream::BitReader;
use crate::error::DecodeError;

#[derive(Debug, Clone, Default)]
pub struct ShortTermRefPicSet {
    pub num_negative_pics: u32,
    pub num_positive_pics: u32,
    pub delta_poc_s0: Vec<i32>,
    pub used_by_curr_pic_s0: Vec<bool>,
    pub delta_poc_s1: Vec<i32>,
    pub used_by_curr_pic_s1: Vec<bool>,
}

impl ShortTermRefPicSet {
    pub fn num_delta_pocs(&self) -> usize {
        self.delta_poc_s0.len() + self.delta_poc_s1.len()
    }

    pub fn parse(
        r: &mut BitReader,
        st_rps_idx: usize,
        prior_sets: &[ShortTermRefPicSet],
    ) -> Result<Self, DecodeError> {
        let inter_ref_pic_set_prediction_flag = if st_rps_idx != 0 { r.read_flag()? } else { false };

        if inter_ref_pic_set_prediction_flag {
            let delta_idx_minus1 = if st_rps_idx == prior_sets.len() { r.read_ue()? } else { 0 };
            let ref_rps_idx = st_rps_idx - 1 - delta_idx_minus1 as usize;
            let delta_rps_sign = r.read_flag()?;
            let abs_delta_rps_minus1 = r.read_ue()?;
            let delta_rps = if delta_rps_sign { -(abs_delta_rps_minus1 as i32 + 1) } else { abs_delta_rps_minus1 as i32 + 1 };

            let ref_set = prior_sets.get(ref_rps_idx).cloned().unwrap_or_default();
            let num_ref_delta_pocs = ref_set.num_delta_pocs();

            let mut use_delta_flag = vec![true; num_ref_delta_pocs + 1];
            let mut used_by_curr_pic_flag = vec![false; num_ref_delta_pocs + 1];
            for j in 0..=num_ref_delta_pocs {
                used_by_curr_pic_flag[j] = r.read_flag()?;
                if !used_by_curr_pic_flag[j] {
                    use_delta_flag[j] = r.read_flag()?;
                }
            }

            let mut ref_delta_poc = Vec::with_capacity(num_ref_delta_pocs);
            ref_delta_poc.extend(ref_set.delta_poc_s1.iter().rev().copied());
            ref_delta_poc.extend(ref_set.delta_poc_s0.iter().copied());
            // the above ordering matches the standard's combined indexing
            // (negative deltas first in DeltaPocS0 order, then positive);
            // we rebuild it explicitly below instead of relying on it.

            let mut delta_poc_s0 = Vec::new();
            let mut used_s0 = Vec::new();
            for j in (0..ref_set.num_positive_pics as usize).rev() {
                let d_poc = ref_set.delta_poc_s1[j] + delta_rps;
                if d_poc < 0 && use_delta_flag[ref_set.num_negative_pics as usize + j] {
                    delta_poc_s0.push(d_poc);
                    used_s0.push(used_by_curr_pic_flag[ref_set.num_negative_pics as usize + j]);
                }
            }
            if delta_rps < 0 && use_delta_flag[num_ref_delta_pocs] {
                delta_poc_s0.push(delta_rps);
                used_s0.push(used_by_curr_pic_flag[num_ref_delta_pocs]);
            }
            for j in 0..ref_set.num_negative_pics as usize {
                let d_poc = ref_set.delta_poc_s0[j] + delta_rps;
                if d_poc < 0 && use_delta_flag[j] {
                    delta_poc_s0.push(d_poc);
                    used_s0.push(used_by_curr_pic_flag[j]);
                }
            }

            let mut delta_poc_s1 = Vec::new();
            let mut used_s1 = Vec::new();
            for j in (0..ref_set.num_negative_pics as usize).rev() {
                let d_poc = ref_set.delta_poc_s0[j] + delta_rps;
                if d_poc > 0 && use_delta_flag[j] {
                    delta_poc_s1.push(d_poc);
                    used_s1.push(used_by_curr_pic_flag[j]);
                }
            }
            if delta_rps > 0 && use_delta_flag[num_ref_delta_pocs] {
                delta_poc_s1.push(delta_rps);
                used_s1.push(used_by_curr_pic_flag[num_ref_delta_pocs]);
            }
            for j in 0..ref_set.num_positive_pics as usize {
                let d_poc = ref_set.delta_poc_s1[j] + delta_rps;
                if d_poc > 0 && use_delta_flag[ref_set.num_negative_pics as usize + j] {
                    delta_poc_s1.push(d_poc);
                    used_s1.push(used_by_curr_pic_flag[ref_set.num_negative_pics as usize + j]);
                }
            }

            Ok(ShortTermRefPicSet {
                num_negative_pics: delta_poc_s0.len() as u32,
                num_positive_pics: delta_poc_s1.len() as u32,
                delta_poc_s0,
                used_by_curr_pic_s0: used_s0,
                delta_poc_s1,
                used_by_curr_pic_s1: used_s1,
            })
        } else {
            let num_negative_pics = r.read_ue()?;
            let num_positive_pics = r.read_ue()?;

            let mut delta_poc_s0 = Vec::with_capacity(num_negative_pics as usize);
            let mut used_by_curr_pic_s0 = Vec::with_capacity(num_negative_pics as usize);
            let mut prev = 0i32;
            for _ in 0..num_negative_pics {
                let delta_poc_s0_minus1 = r.read_ue()? as i32;
                prev -= delta_poc_s0_minus1 + 1;
                delta_poc_s0.push(prev);
                used_by_curr_pic_s0.push(r.read_flag()?);
            }

            let mut delta_poc_s1 = Vec::with_capacity(num_positive_pics as usize);
            let mut used_by_curr_pic_s1 = Vec::with_capacity(num_positive_pics as usize);
            prev = 0;
            for _ in 0..num_positive_pics {
                let delta_poc_s1_minus1 = r.read_ue()? as i32;
                prev += delta_poc_s1_minus1 + 1;
                delta_poc_s1.push(prev);
                used_by_curr_pic_s1.push(r.read_flag()?);
            }

            Ok(ShortTermRefPicSet {
                num_negative_pics,
                num_positive_pics,
                delta_poc_s0,
                used_by_curr_pic_s0,
                delta_poc_s1,
                used_by_curr_pic_s1,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{reader::BitWriter, BitReader};

    #[test]
    fn explicit_set_parses_negative_and_positive_lists() {
        let mut w = BitWriter::new();
        w.write_ue(1); // num_negative_pics
        w.write_ue(0); // num_positive_pics
        w.write_ue(0); // delta_poc_s0_minus1 -> delta = -1
        w.write_bits(1, 1); // used_by_curr_pic_s0[0] = true
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        let set = ShortTermRefPicSet::parse(&mut r, 0, &[]).unwrap();
        assert_eq!(set.num_negative_pics, 1);
        assert_eq!(set.delta_poc_s0, vec![-1]);
        assert!(set.used_by_curr_pic_s0[0]);
    }
}

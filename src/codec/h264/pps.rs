// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Picture parameter set (PPS) parsing, Rec. ITU-T H.264 §7.3.2.2.

use crate::bitstream::BitReader;
use crate::error::DecodeError;

#[derive(Debug, Clone, PartialEq)]
pub struct Pps {
    pub pic_parameter_set_id: u32,
    pub seq_parameter_set_id: u32,
    pub entropy_coding_mode_flag: bool,
    pub bottom_field_pic_order_in_frame_present_flag: bool,

    pub num_ref_idx_l0_default_active_minus1: u8,
    pub num_ref_idx_l1_default_active_minus1: u8,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_idc: u8,
    pub pic_init_qp_minus26: i32,
    pub pic_init_qs_minus26: i32,
    pub chroma_qp_index_offset: i32,
    pub deblocking_filter_control_present_flag: bool,
    pub constrained_intra_pred_flag: bool,
    pub redundant_pic_cnt_present_flag: bool,

    pub transform_8x8_mode_flag: bool,
    pub pic_scaling_matrix_present_flag: bool,
    pub second_chroma_qp_index_offset: i32,
}

impl Pps {
    pub fn parse(rbsp: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BitReader::new(rbsp);

        let pic_parameter_set_id = r.read_ue()?;
        let seq_parameter_set_id = r.read_ue()?;
        let entropy_coding_mode_flag = r.read_flag()?;
        let bottom_field_pic_order_in_frame_present_flag = r.read_flag()?;

        let num_slice_groups_minus1 = r.read_ue()?;
        if num_slice_groups_minus1 > 0 {
            let slice_group_map_type = r.read_ue()?;
            match slice_group_map_type {
                0 => {
                    for _ in 0..=num_slice_groups_minus1 {
                        r.read_ue()?;
                    }
                }
                2 => {
                    for _ in 0..num_slice_groups_minus1 {
                        r.read_ue()?;
                        r.read_ue()?;
                    }
                }
                3 | 4 | 5 => {
                    r.read_flag()?;
                    r.read_ue()?;
                }
                6 => {
                    let pic_size_in_map_units_minus1 = r.read_ue()?;
                    let num_bits = (num_slice_groups_minus1 + 1).max(1).ilog2() + 1;
                    for _ in 0..=pic_size_in_map_units_minus1 {
                        r.read_bits(num_bits)?;
                    }
                }
                _ => {}
            }
        }

        let num_ref_idx_l0_default_active_minus1 = r.read_ue()? as u8;
        let num_ref_idx_l1_default_active_minus1 = r.read_ue()? as u8;
        let weighted_pred_flag = r.read_flag()?;
        let weighted_bipred_idc = r.read_bits(2)? as u8;
        let pic_init_qp_minus26 = r.read_se()?;
        let pic_init_qs_minus26 = r.read_se()?;
        let chroma_qp_index_offset = r.read_se()?;
        let deblocking_filter_control_present_flag = r.read_flag()?;
        let constrained_intra_pred_flag = r.read_flag()?;
        let redundant_pic_cnt_present_flag = r.read_flag()?;

        let mut transform_8x8_mode_flag = false;
        let mut pic_scaling_matrix_present_flag = false;
        let mut second_chroma_qp_index_offset = chroma_qp_index_offset;

        if r.more_rbsp_data() {
            transform_8x8_mode_flag = r.read_flag()?;
            pic_scaling_matrix_present_flag = r.read_flag()?;
            if pic_scaling_matrix_present_flag {
                let num_lists = 6 + if transform_8x8_mode_flag { 2 } else { 0 };
                for i in 0..num_lists {
                    if r.read_flag()? {
                        skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                    }
                }
            }
            second_chroma_qp_index_offset = r.read_se()?;
        }

        Ok(Pps {
            pic_parameter_set_id,
            seq_parameter_set_id,
            entropy_coding_mode_flag,
            bottom_field_pic_order_in_frame_present_flag,
            num_ref_idx_l0_default_active_minus1,
            num_ref_idx_l1_default_active_minus1,
            weighted_pred_flag,
            weighted_bipred_idc,
            pic_init_qp_minus26,
            pic_init_qs_minus26,
            chroma_qp_index_offset,
            deblocking_filter_control_present_flag,
            constrained_intra_pred_flag,
            redundant_pic_cnt_present_flag,
            transform_8x8_mode_flag,
            pic_scaling_matrix_present_flag,
            second_chroma_qp_index_offset,
        })
    }
}

fn skip_scaling_list(r: &mut BitReader, size: usize) -> Result<(), DecodeError> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = r.read_se()?;
            next_scale = (last_scale + delta_scale + 256) % 256;
        }
        last_scale = if next_scale == 0 { last_scale } else { next_scale };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::ebsp_to_rbsp;

    #[test]
    fn parses_minimal_pps() {
        let ebsp = vec![0xee, 0x3c, 0x80];
        let rbsp = ebsp_to_rbsp(&ebsp);
        let pps = Pps::parse(&rbsp).unwrap();
        assert_eq!(pps.pic_parameter_set_id, 0);
        assert_eq!(pps.seq_parameter_set_id, 0);
    }
}

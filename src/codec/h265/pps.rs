// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Picture parameter set (PPS) parsing, Rec. ITU-T H.265 §7.3.2.3.

use crate::bitstream::BitReader;
use crate::error::DecodeError;

#[derive(Debug, Clone, PartialEq)]
pub struct Pps {
    pub pps_pic_parameter_set_id: u32,
    pub pps_seq_parameter_set_id: u32,
    pub dependent_slice_segments_enabled_flag: bool,
    pub output_flag_present_flag: bool,
    pub num_extra_slice_header_bits: u8,
    pub sign_data_hiding_enabled_flag: bool,
    pub cabac_init_present_flag: bool,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub init_qp_minus26: i32,
    pub constrained_intra_pred_flag: bool,
    pub transform_skip_enabled_flag: bool,
    pub cu_qp_delta_enabled_flag: bool,
    pub pps_cb_qp_offset: i32,
    pub pps_cr_qp_offset: i32,
    pub pps_slice_chroma_qp_offsets_present_flag: bool,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_flag: bool,
    pub transquant_bypass_enabled_flag: bool,
    pub tiles_enabled_flag: bool,
    pub entropy_coding_sync_enabled_flag: bool,
    pub pps_loop_filter_across_slices_enabled_flag: bool,
    pub deblocking_filter_control_present_flag: bool,
    pub deblocking_filter_override_enabled_flag: bool,
    pub pps_deblocking_filter_disabled_flag: bool,
    pub lists_modification_present_flag: bool,
    pub log2_parallel_merge_level_minus2: u32,
    pub slice_segment_header_extension_present_flag: bool,
}

impl Pps {
    pub fn parse(rbsp: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BitReader::new(rbsp);

        let pps_pic_parameter_set_id = r.read_ue()?;
        let pps_seq_parameter_set_id = r.read_ue()?;
        let dependent_slice_segments_enabled_flag = r.read_flag()?;
        let output_flag_present_flag = r.read_flag()?;
        let num_extra_slice_header_bits = r.read_bits(3)? as u8;
        let sign_data_hiding_enabled_flag = r.read_flag()?;
        let cabac_init_present_flag = r.read_flag()?;
        let num_ref_idx_l0_default_active_minus1 = r.read_ue()?;
        let num_ref_idx_l1_default_active_minus1 = r.read_ue()?;
        let init_qp_minus26 = r.read_se()?;
        let constrained_intra_pred_flag = r.read_flag()?;
        let transform_skip_enabled_flag = r.read_flag()?;
        let cu_qp_delta_enabled_flag = r.read_flag()?;
        if cu_qp_delta_enabled_flag {
            r.read_ue()?; // diff_cu_qp_delta_depth
        }
        let pps_cb_qp_offset = r.read_se()?;
        let pps_cr_qp_offset = r.read_se()?;
        let pps_slice_chroma_qp_offsets_present_flag = r.read_flag()?;
        let weighted_pred_flag = r.read_flag()?;
        let weighted_bipred_flag = r.read_flag()?;
        let transquant_bypass_enabled_flag = r.read_flag()?;
        let tiles_enabled_flag = r.read_flag()?;
        let entropy_coding_sync_enabled_flag = r.read_flag()?;

        if tiles_enabled_flag {
            let num_tile_columns_minus1 = r.read_ue()?;
            let num_tile_rows_minus1 = r.read_ue()?;
            let uniform_spacing_flag = r.read_flag()?;
            if !uniform_spacing_flag {
                for _ in 0..num_tile_columns_minus1 {
                    r.read_ue()?;
                }
                for _ in 0..num_tile_rows_minus1 {
                    r.read_ue()?;
                }
            }
            r.read_flag()?; // loop_filter_across_tiles_enabled_flag
        }

        let pps_loop_filter_across_slices_enabled_flag = r.read_flag()?;
        let deblocking_filter_control_present_flag = r.read_flag()?;
        let mut deblocking_filter_override_enabled_flag = false;
        let mut pps_deblocking_filter_disabled_flag = false;
        if deblocking_filter_control_present_flag {
            deblocking_filter_override_enabled_flag = r.read_flag()?;
            pps_deblocking_filter_disabled_flag = r.read_flag()?;
            if !pps_deblocking_filter_disabled_flag {
                r.read_se()?; // pps_beta_offset_div2
                r.read_se()?; // pps_tc_offset_div2
            }
        }

        let pps_scaling_list_data_present_flag = r.read_flag()?;
        if pps_scaling_list_data_present_flag {
            skip_scaling_list_data(&mut r)?;
        }

        let lists_modification_present_flag = r.read_flag()?;
        let log2_parallel_merge_level_minus2 = r.read_ue()?;
        let slice_segment_header_extension_present_flag = r.read_flag()?;
        // pps_extension flags intentionally left unparsed: nothing past
        // this point affects slice-header bit alignment.

        Ok(Pps {
            pps_pic_parameter_set_id,
            pps_seq_parameter_set_id,
            dependent_slice_segments_enabled_flag,
            output_flag_present_flag,
            num_extra_slice_header_bits,
            sign_data_hiding_enabled_flag,
            cabac_init_present_flag,
            num_ref_idx_l0_default_active_minus1,
            num_ref_idx_l1_default_active_minus1,
            init_qp_minus26,
            constrained_intra_pred_flag,
            transform_skip_enabled_flag,
            cu_qp_delta_enabled_flag,
            pps_cb_qp_offset,
            pps_cr_qp_offset,
            pps_slice_chroma_qp_offsets_present_flag,
            weighted_pred_flag,
            weighted_bipred_flag,
            transquant_bypass_enabled_flag,
            tiles_enabled_flag,
            entropy_coding_sync_enabled_flag,
            pps_loop_filter_across_slices_enabled_flag,
            deblocking_filter_control_present_flag,
            deblocking_filter_override_enabled_flag,
            pps_deblocking_filter_disabled_flag,
            lists_modification_present_flag,
            log2_parallel_merge_level_minus2,
            slice_segment_header_extension_present_flag,
        })
    }
}

fn skip_scaling_list_data(r: &mut BitReader) -> Result<(), DecodeError> {
    for size_id in 0..4 {
        let step = if size_id == 3 { 3 } else { 1 };
        let mut mat_id = 0;
        while mat_id < 6 {
            let scaling_list_pred_mode_flag = r.read_flag()?;
            if !scaling_list_pred_mode_flag {
                r.read_ue()?;
            } else {
                let coef_num = (64.min(1 << (4 + (size_id << 1)))).min(64);
                if size_id > 1 {
                    r.read_se()?;
                }
                for _ in 0..coef_num {
                    r.read_se()?;
                }
            }
            mat_id += step;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::reader::BitWriter;

    #[test]
    fn parses_minimal_pps() {
        let mut w = BitWriter::new();
        w.write_ue(0); // pps_pic_parameter_set_id
        w.write_ue(0); // pps_seq_parameter_set_id
        w.write_bits(0, 1); // dependent_slice_segments_enabled_flag
        w.write_bits(0, 1); // output_flag_present_flag
        w.write_bits(0, 3); // num_extra_slice_header_bits
        w.write_bits(0, 1); // sign_data_hiding_enabled_flag
        w.write_bits(0, 1); // cabac_init_present_flag
        w.write_ue(0); // num_ref_idx_l0_default_active_minus1
        w.write_ue(0); // num_ref_idx_l1_default_active_minus1
        w.write_se(0); // init_qp_minus26
        w.write_bits(0, 1); // constrained_intra_pred_flag
        w.write_bits(0, 1); // transform_skip_enabled_flag
        w.write_bits(0, 1); // cu_qp_delta_enabled_flag
        w.write_se(0); // pps_cb_qp_offset
        w.write_se(0); // pps_cr_qp_offset
        w.write_bits(0, 1); // pps_slice_chroma_qp_offsets_present_flag
        w.write_bits(0, 1); // weighted_pred_flag
        w.write_bits(0, 1); // weighted_bipred_flag
        w.write_bits(0, 1); // transquant_bypass_enabled_flag
        w.write_bits(0, 1); // tiles_enabled_flag
        w.write_bits(0, 1); // entropy_coding_sync_enabled_flag
        w.write_bits(1, 1); // pps_loop_filter_across_slices_enabled_flag
        w.write_bits(0, 1); // deblocking_filter_control_present_flag
        w.write_bits(0, 1); // pps_scaling_list_data_present_flag
        w.write_bits(0, 1); // lists_modification_present_flag
        w.write_ue(0); // log2_parallel_merge_level_minus2
        w.write_bits(0, 1); // slice_segment_header_extension_present_flag
        let bytes = w.into_bytes();
        let pps = Pps::parse(&bytes).unwrap();
        assert_eq!(pps.pps_pic_parameter_set_id, 0);
        assert!(pps.pps_loop_filter_across_slices_enabled_flag);
    }
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Sequence parameter set (SPS) parsing, Rec. ITU-T H.265 §7.3.2.2.

use crate::bitstream::BitReader;
use crate::codec::h265::profile_tier_level::skip_profile_tier_level;
use crate::codec::h265::short_term_rps::ShortTermRefPicSet;
use crate::error::DecodeError;

#[derive(Debug, Clone, PartialEq)]
pub struct Sps {
    pub sps_video_parameter_set_id: u32,
    pub sps_max_sub_layers_minus1: u8,
    pub sps_seq_parameter_set_id: u32,
    pub chroma_format_idc: u32,
    pub separate_colour_plane_flag: bool,
    pub pic_width_in_luma_samples: u32,
    pub pic_height_in_luma_samples: u32,
    pub conformance_window: Option<(u32, u32, u32, u32)>,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub log2_max_pic_order_cnt_lsb_minus4: u32,
    pub sps_max_dec_pic_buffering_minus1: Vec<u32>,
    pub sps_max_num_reorder_pics: Vec<u32>,
    pub sps_max_latency_increase_plus1: Vec<u32>,
    pub num_short_term_ref_pic_sets: u32,
    pub short_term_ref_pic_sets: Vec<ShortTermRefPicSet>,
    pub long_term_ref_pics_present_flag: bool,
    pub num_long_term_ref_pics_sps: u32,
    pub lt_ref_pic_poc_lsb_sps: Vec<u32>,
    pub used_by_curr_pic_lt_sps_flag: Vec<bool>,
    pub sps_temporal_mvp_enabled_flag: bool,

    pub width: u32,
    pub height: u32,
}

impl Sps {
    pub fn max_pic_order_cnt_lsb(&self) -> u64 {
        1u64 << (self.log2_max_pic_order_cnt_lsb_minus4 + 4)
    }

    /// Highest sub-layer's `sps_max_dec_pic_buffering_minus1 + 1`, the DPB
    /// capacity invariant of spec.md §4.4/§3.
    pub fn max_dec_pic_buffering(&self) -> u32 {
        self.sps_max_dec_pic_buffering_minus1.last().copied().unwrap_or(0) + 1
    }

    pub fn max_num_reorder_pics(&self) -> u32 {
        self.sps_max_num_reorder_pics.last().copied().unwrap_or(0)
    }

    pub fn parse(rbsp: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BitReader::new(rbsp);

        let sps_video_parameter_set_id = r.read_bits(4)?;
        let sps_max_sub_layers_minus1 = r.read_bits(3)? as u8;
        let _sps_temporal_id_nesting_flag = r.read_flag()?;

        skip_profile_tier_level(&mut r, true, sps_max_sub_layers_minus1)?;

        let sps_seq_parameter_set_id = r.read_ue()?;
        let chroma_format_idc = r.read_ue()?;
        let separate_colour_plane_flag = if chroma_format_idc == 3 { r.read_flag()? } else { false };

        let pic_width_in_luma_samples = r.read_ue()?;
        let pic_height_in_luma_samples = r.read_ue()?;

        let conformance_window_flag = r.read_flag()?;
        let conformance_window = if conformance_window_flag {
            Some((r.read_ue()?, r.read_ue()?, r.read_ue()?, r.read_ue()?))
        } else {
            None
        };

        let bit_depth_luma_minus8 = r.read_ue()?;
        let bit_depth_chroma_minus8 = r.read_ue()?;
        let log2_max_pic_order_cnt_lsb_minus4 = r.read_ue()?;

        let sps_sub_layer_ordering_info_present_flag = r.read_flag()?;
        let start = if sps_sub_layer_ordering_info_present_flag { 0 } else { sps_max_sub_layers_minus1 };
        let mut sps_max_dec_pic_buffering_minus1 = Vec::new();
        let mut sps_max_num_reorder_pics = Vec::new();
        let mut sps_max_latency_increase_plus1 = Vec::new();
        for _ in start..=sps_max_sub_layers_minus1 {
            sps_max_dec_pic_buffering_minus1.push(r.read_ue()?);
            sps_max_num_reorder_pics.push(r.read_ue()?);
            sps_max_latency_increase_plus1.push(r.read_ue()?);
        }

        r.read_ue()?; // log2_min_luma_coding_block_size_minus3
        r.read_ue()?; // log2_diff_max_min_luma_coding_block_size
        r.read_ue()?; // log2_min_luma_transform_block_size_minus2
        r.read_ue()?; // log2_diff_max_min_luma_transform_block_size
        r.read_ue()?; // max_transform_hierarchy_depth_inter
        r.read_ue()?; // max_transform_hierarchy_depth_intra

        let scaling_list_enabled_flag = r.read_flag()?;
        if scaling_list_enabled_flag {
            let sps_scaling_list_data_present_flag = r.read_flag()?;
            if sps_scaling_list_data_present_flag {
                skip_scaling_list_data(&mut r)?;
            }
        }

        r.read_flag()?; // amp_enabled_flag
        r.read_flag()?; // sample_adaptive_offset_enabled_flag
        let pcm_enabled_flag = r.read_flag()?;
        if pcm_enabled_flag {
            r.read_bits(4)?;
            r.read_bits(4)?;
            r.read_ue()?;
            r.read_ue()?;
            r.read_flag()?;
        }

        let num_short_term_ref_pic_sets = r.read_ue()?;
        let mut short_term_ref_pic_sets = Vec::with_capacity(num_short_term_ref_pic_sets as usize);
        for i in 0..num_short_term_ref_pic_sets as usize {
            let set = ShortTermRefPicSet::parse(&mut r, i, &short_term_ref_pic_sets)?;
            short_term_ref_pic_sets.push(set);
        }

        let long_term_ref_pics_present_flag = r.read_flag()?;
        let mut num_long_term_ref_pics_sps = 0;
        let mut lt_ref_pic_poc_lsb_sps = Vec::new();
        let mut used_by_curr_pic_lt_sps_flag = Vec::new();
        if long_term_ref_pics_present_flag {
            num_long_term_ref_pics_sps = r.read_ue()?;
            let poc_lsb_bits = log2_max_pic_order_cnt_lsb_minus4 + 4;
            for _ in 0..num_long_term_ref_pics_sps {
                lt_ref_pic_poc_lsb_sps.push(r.read_bits(poc_lsb_bits)?);
                used_by_curr_pic_lt_sps_flag.push(r.read_flag()?);
            }
        }

        let sps_temporal_mvp_enabled_flag = r.read_flag()?;
        // strong_intra_smoothing / VUI / sps_extension are not needed by
        // DPB, POC, or the slice-header bit alignment this crate cares
        // about (they all live after the SPS's own parse is done).

        let (crop_l, crop_r, crop_t, crop_b) = conformance_window.unwrap_or((0, 0, 0, 0));
        let (sub_w, sub_h): (u32, u32) = match chroma_format_idc {
            0 => (1, 1),
            1 => (2, 2),
            2 => (2, 1),
            _ => (1, 1),
        };
        let width = pic_width_in_luma_samples.saturating_sub(sub_w * (crop_l + crop_r));
        let height = pic_height_in_luma_samples.saturating_sub(sub_h * (crop_t + crop_b));

        Ok(Sps {
            sps_video_parameter_set_id,
            sps_max_sub_layers_minus1,
            sps_seq_parameter_set_id,
            chroma_format_idc,
            separate_colour_plane_flag,
            pic_width_in_luma_samples,
            pic_height_in_luma_samples,
            conformance_window,
            bit_depth_luma_minus8,
            bit_depth_chroma_minus8,
            log2_max_pic_order_cnt_lsb_minus4,
            sps_max_dec_pic_buffering_minus1,
            sps_max_num_reorder_pics,
            sps_max_latency_increase_plus1,
            num_short_term_ref_pic_sets,
            short_term_ref_pic_sets,
            long_term_ref_pics_present_flag,
            num_long_term_ref_pics_sps,
            lt_ref_pic_poc_lsb_sps,
            used_by_curr_pic_lt_sps_flag,
            sps_temporal_mvp_enabled_flag,
            width,
            height,
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
                r.read_ue()?; // scaling_list_pred_matrix_id_delta
            } else {
                let coef_num = (64.min(1 << (4 + (size_id << 1)))).min(64);
                if size_id > 1 {
                    r.read_se()?; // scaling_list_dc_coef_minus8
                }
                for _ in 0..coef_num {
                    r.read_se()?; // scaling_list_delta_coef
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

    fn minimal_sps_bytes() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(0, 4); // sps_video_parameter_set_id
        w.write_bits(0, 3); // sps_max_sub_layers_minus1
        w.write_bits(0, 1); // nesting flag

        // profile_tier_level(true, 0)
        w.write_bits(0, 2);
        w.write_bits(0, 1);
        w.write_bits(1, 5);
        w.write_bits(0, 32);
        w.write_bits(0, 1);
        w.write_bits(0, 1);
        w.write_bits(0, 1);
        w.write_bits(0, 1);
        w.write_bits(0, 32);
        w.write_bits(0, 12);
        w.write_bits(120, 8);

        w.write_ue(0); // sps_seq_parameter_set_id
        w.write_ue(1); // chroma_format_idc
        w.write_ue(1920); // pic_width_in_luma_samples
        w.write_ue(1080); // pic_height_in_luma_samples
        w.write_bits(0, 1); // conformance_window_flag
        w.write_ue(0); // bit_depth_luma_minus8
        w.write_ue(0); // bit_depth_chroma_minus8
        w.write_ue(4); // log2_max_pic_order_cnt_lsb_minus4
        w.write_bits(1, 1); // sps_sub_layer_ordering_info_present_flag
        w.write_ue(6); // sps_max_dec_pic_buffering_minus1[0]
        w.write_ue(2); // sps_max_num_reorder_pics[0]
        w.write_ue(0); // sps_max_latency_increase_plus1[0]
        w.write_ue(0); // log2_min_luma_coding_block_size_minus3
        w.write_ue(3); // log2_diff_max_min_luma_coding_block_size
        w.write_ue(0); // log2_min_luma_transform_block_size_minus2
        w.write_ue(3); // log2_diff_max_min_luma_transform_block_size
        w.write_ue(0); // max_transform_hierarchy_depth_inter
        w.write_ue(0); // max_transform_hierarchy_depth_intra
        w.write_bits(0, 1); // scaling_list_enabled_flag
        w.write_bits(0, 1); // amp_enabled_flag
        w.write_bits(0, 1); // sao_enabled_flag
        w.write_bits(0, 1); // pcm_enabled_flag
        w.write_ue(0); // num_short_term_ref_pic_sets
        w.write_bits(0, 1); // long_term_ref_pics_present_flag
        w.write_bits(1, 1); // sps_temporal_mvp_enabled_flag
        w.into_bytes()
    }

    #[test]
    fn parses_minimal_sps() {
        let bytes = minimal_sps_bytes();
        let sps = Sps::parse(&bytes).unwrap();
        assert_eq!(sps.chroma_format_idc, 1);
        assert_eq!(sps.width, 1920);
        assert_eq!(sps.height, 1080);
        assert_eq!(sps.max_dec_pic_buffering(), 7);
        assert_eq!(sps.max_num_reorder_pics(), 2);
        assert!(sps.sps_temporal_mvp_enabled_flag);
    }
}

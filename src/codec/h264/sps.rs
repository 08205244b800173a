// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Sequence parameter set (SPS) parsing, Rec. ITU-T H.264 §7.3.2.1.

use crate::bitstream::BitReader;
use crate::error::DecodeError;

#[derive(Debug, Clone, PartialEq)]
pub struct Sps {
    pub profile_idc: u8,
    pub level_idc: u8,
    pub seq_parameter_set_id: u32,

    pub chroma_format_idc: u8,
    pub separate_colour_plane_flag: bool,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub seq_scaling_matrix_present_flag: bool,

    pub log2_max_frame_num_minus4: u8,
    pub pic_order_cnt_type: u8,
    pub log2_max_pic_order_cnt_lsb_minus4: u8,
    pub delta_pic_order_always_zero_flag: bool,
    pub offset_for_non_ref_pic: i32,
    pub offset_for_top_to_bottom_field: i32,
    pub offset_for_ref_frame: Vec<i32>,

    pub max_num_ref_frames: u32,
    pub gaps_in_frame_num_value_allowed_flag: bool,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_mbs_only_flag: bool,
    pub mb_adaptive_frame_field_flag: bool,
    pub direct_8x8_inference_flag: bool,

    pub frame_cropping_flag: bool,
    pub frame_crop_left_offset: u32,
    pub frame_crop_right_offset: u32,
    pub frame_crop_top_offset: u32,
    pub frame_crop_bottom_offset: u32,

    pub vui_parameters_present_flag: bool,
    pub max_num_reorder_frames: Option<u32>,
    pub max_dec_frame_buffering: Option<u32>,

    pub width: u32,
    pub height: u32,
}

impl Sps {
    /// Maximum number of pictures the DPB must retain for reference
    /// (spec §3 `sps_max_dec_pic_buffering`, here derived the way the
    /// standard falls back to `max_num_ref_frames` when VUI is absent).
    pub fn max_dec_pic_buffering(&self) -> u32 {
        self.max_dec_frame_buffering.unwrap_or(self.max_num_ref_frames).max(1)
    }

    pub fn max_num_reorder_pics(&self) -> u32 {
        self.max_num_reorder_frames.unwrap_or(self.max_num_ref_frames)
    }

    pub fn parse(rbsp: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BitReader::new(rbsp);

        let profile_idc = r.read_u8()?;
        let _constraint_flags = r.read_bits(8)?;
        let level_idc = r.read_u8()?;
        let seq_parameter_set_id = r.read_ue()?;

        let mut chroma_format_idc = 1u8;
        let mut separate_colour_plane_flag = false;
        let mut bit_depth_luma_minus8 = 0u8;
        let mut bit_depth_chroma_minus8 = 0u8;
        let mut seq_scaling_matrix_present_flag = false;

        const HIGH_PROFILES: &[u8] =
            &[100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134, 135];
        if HIGH_PROFILES.contains(&profile_idc) {
            chroma_format_idc = r.read_ue()? as u8;
            if chroma_format_idc == 3 {
                separate_colour_plane_flag = r.read_flag()?;
            }
            bit_depth_luma_minus8 = r.read_ue()? as u8;
            bit_depth_chroma_minus8 = r.read_ue()? as u8;
            let _qpprime_y_zero_transform_bypass_flag = r.read_flag()?;
            seq_scaling_matrix_present_flag = r.read_flag()?;
            if seq_scaling_matrix_present_flag {
                let num_lists = if chroma_format_idc != 3 { 8 } else { 12 };
                for i in 0..num_lists {
                    if r.read_flag()? {
                        skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                    }
                }
            }
        }

        let log2_max_frame_num_minus4 = r.read_ue()? as u8;
        let pic_order_cnt_type = r.read_ue()? as u8;

        let mut log2_max_pic_order_cnt_lsb_minus4 = 0u8;
        let mut delta_pic_order_always_zero_flag = false;
        let mut offset_for_non_ref_pic = 0i32;
        let mut offset_for_top_to_bottom_field = 0i32;
        let mut offset_for_ref_frame = Vec::new();

        match pic_order_cnt_type {
            0 => {
                log2_max_pic_order_cnt_lsb_minus4 = r.read_ue()? as u8;
            }
            1 => {
                delta_pic_order_always_zero_flag = r.read_flag()?;
                offset_for_non_ref_pic = r.read_se()?;
                offset_for_top_to_bottom_field = r.read_se()?;
                let num_ref_frames_in_poc_cycle = r.read_ue()?;
                for _ in 0..num_ref_frames_in_poc_cycle {
                    offset_for_ref_frame.push(r.read_se()?);
                }
            }
            2 => {}
            _ => return Err(DecodeError::InvalidFormat("sps: invalid pic_order_cnt_type")),
        }

        let max_num_ref_frames = r.read_ue()?;
        let gaps_in_frame_num_value_allowed_flag = r.read_flag()?;
        let pic_width_in_mbs_minus1 = r.read_ue()?;
        let pic_height_in_map_units_minus1 = r.read_ue()?;
        let frame_mbs_only_flag = r.read_flag()?;
        let mb_adaptive_frame_field_flag =
            if !frame_mbs_only_flag { r.read_flag()? } else { false };
        let direct_8x8_inference_flag = r.read_flag()?;

        let frame_cropping_flag = r.read_flag()?;
        let (mut crop_l, mut crop_r, mut crop_t, mut crop_b) = (0, 0, 0, 0);
        if frame_cropping_flag {
            crop_l = r.read_ue()?;
            crop_r = r.read_ue()?;
            crop_t = r.read_ue()?;
            crop_b = r.read_ue()?;
        }

        let vui_parameters_present_flag = r.read_flag()?;
        let mut max_num_reorder_frames = None;
        let mut max_dec_frame_buffering = None;
        if vui_parameters_present_flag {
            // We don't need full VUI timing info; skip to the bitstream
            // restriction flags where reorder/DPB-size hints live, tolerating
            // absence gracefully (best-effort: VUI is optional content).
            if let Some((reorder, dec_buf)) = try_parse_vui_bitstream_restrictions(&mut r) {
                max_num_reorder_frames = Some(reorder);
                max_dec_frame_buffering = Some(dec_buf);
            }
        }

        let mb_width = pic_width_in_mbs_minus1 + 1;
        let mb_height_units = pic_height_in_map_units_minus1 + 1;
        let frame_mult = if frame_mbs_only_flag { 1 } else { 2 };
        let mut width = mb_width * 16;
        let mut height = mb_height_units * 16 * frame_mult;

        let (sub_w, sub_h): (u32, u32) = match chroma_format_idc {
            0 => (1, 1),
            1 => (2, 2),
            2 => (2, 1),
            3 => (1, 1),
            _ => (1, 1),
        };
        if frame_cropping_flag {
            width = width.saturating_sub(sub_w * (crop_l + crop_r));
            height = height.saturating_sub(sub_h * frame_mult * (crop_t + crop_b));
        }

        Ok(Sps {
            profile_idc,
            level_idc,
            seq_parameter_set_id,
            chroma_format_idc,
            separate_colour_plane_flag,
            bit_depth_luma_minus8,
            bit_depth_chroma_minus8,
            seq_scaling_matrix_present_flag,
            log2_max_frame_num_minus4,
            pic_order_cnt_type,
            log2_max_pic_order_cnt_lsb_minus4,
            delta_pic_order_always_zero_flag,
            offset_for_non_ref_pic,
            offset_for_top_to_bottom_field,
            offset_for_ref_frame,
            max_num_ref_frames,
            gaps_in_frame_num_value_allowed_flag,
            pic_width_in_mbs_minus1,
            pic_height_in_map_units_minus1,
            frame_mbs_only_flag,
            mb_adaptive_frame_field_flag,
            direct_8x8_inference_flag,
            frame_cropping_flag,
            frame_crop_left_offset: crop_l,
            frame_crop_right_offset: crop_r,
            frame_crop_top_offset: crop_t,
            frame_crop_bottom_offset: crop_b,
            vui_parameters_present_flag,
            max_num_reorder_frames,
            max_dec_frame_buffering,
            width,
            height,
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

/// Best-effort VUI skip down to `bitstream_restriction_flag`'s
/// `max_num_reorder_frames`/`max_dec_frame_buffering`, matching how VUI
/// timing info feeds the display-delay computation in spec §4.4.
/// Returns `None` if the VUI doesn't carry bitstream restrictions (still a
/// valid stream, just without this hint).
fn try_parse_vui_bitstream_restrictions(r: &mut BitReader) -> Option<(u32, u32)> {
    let aspect_ratio_info_present_flag = r.read_flag().ok()?;
    if aspect_ratio_info_present_flag {
        let aspect_ratio_idc = r.read_u8().ok()?;
        if aspect_ratio_idc == 255 {
            r.read_u16().ok()?;
            r.read_u16().ok()?;
        }
    }
    if r.read_flag().ok()? {
        r.read_flag().ok()?; // overscan_appropriate_flag
    }
    if r.read_flag().ok()? {
        // video_signal_type_present_flag
        r.read_bits(3).ok()?; // video_format
        r.read_flag().ok()?; // video_full_range_flag
        if r.read_flag().ok()? {
            r.read_bits(24).ok()?; // colour_description
        }
    }
    if r.read_flag().ok()? {
        // chroma_loc_info_present_flag
        r.read_ue().ok()?;
        r.read_ue().ok()?;
    }
    let timing_info_present_flag = r.read_flag().ok()?;
    if timing_info_present_flag {
        r.read_bits(32).ok()?;
        r.read_bits(32).ok()?;
        r.read_flag().ok()?;
    }
    let nal_hrd_present = r.read_flag().ok()?;
    if nal_hrd_present {
        skip_hrd_parameters(r)?;
    }
    let vcl_hrd_present = r.read_flag().ok()?;
    if vcl_hrd_present {
        skip_hrd_parameters(r)?;
    }
    if nal_hrd_present || vcl_hrd_present {
        r.read_flag().ok()?;
    }
    r.read_flag().ok()?; // pic_struct_present_flag
    let bitstream_restriction_flag = r.read_flag().ok()?;
    if !bitstream_restriction_flag {
        return None;
    }
    r.read_flag().ok()?; // motion_vectors_over_pic_boundaries_flag
    r.read_ue().ok()?; // max_bytes_per_pic_denom
    r.read_ue().ok()?; // max_bits_per_mb_denom
    r.read_ue().ok()?; // log2_max_mv_length_horizontal
    r.read_ue().ok()?; // log2_max_mv_length_vertical
    let max_num_reorder_frames = r.read_ue().ok()?;
    let max_dec_frame_buffering = r.read_ue().ok()?;
    Some((max_num_reorder_frames, max_dec_frame_buffering))
}

fn skip_hrd_parameters(r: &mut BitReader) -> Option<()> {
    let cpb_cnt_minus1 = r.read_ue().ok()?;
    r.read_bits(4).ok()?;
    r.read_bits(4).ok()?;
    for _ in 0..=cpb_cnt_minus1 {
        r.read_ue().ok()?;
        r.read_ue().ok()?;
        r.read_flag().ok()?;
    }
    r.read_bits(5).ok()?;
    r.read_bits(5).ok()?;
    r.read_bits(5).ok()?;
    r.read_bits(5).ok()?;
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::ebsp_to_rbsp;

    #[test]
    fn parses_baseline_sps() {
        let ebsp = vec![
            0x42, 0x00, 0x1f, 0xac, 0x34, 0xc8, 0x14, 0x00, 0x00, 0x03, 0x00, 0x04, 0x00, 0x00,
            0x03, 0x00, 0xf0, 0x3c, 0x60, 0xc6, 0x58,
        ];
        let rbsp = ebsp_to_rbsp(&ebsp);
        let sps = Sps::parse(&rbsp).unwrap();
        assert_eq!(sps.profile_idc, 66);
        assert_eq!(sps.level_idc, 31);
        assert!(sps.width > 0);
        assert!(sps.height > 0);
    }
}

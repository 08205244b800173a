// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Slice header parsing, Rec. ITU-T H.264 §7.3.3, §7.3.3.1, §7.3.3.3.

use crate::bitstream::BitReader;
use crate::codec::h264::{pps::Pps, sps::Sps};
use crate::error::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    P,
    B,
    I,
    Sp,
    Si,
}

impl SliceType {
    pub fn from_value(value: u32) -> Option<Self> {
        match value % 5 {
            0 => Some(SliceType::P),
            1 => Some(SliceType::B),
            2 => Some(SliceType::I),
            3 => Some(SliceType::Sp),
            4 => Some(SliceType::Si),
            _ => None,
        }
    }
}

/// One memory_management_control_operation entry (spec §4.4 "AVC ...
/// memory-management-control operations (MMCO) from the slice header").
#[derive(Debug, Clone, Copy)]
pub struct Mmco {
    pub op: u32,
    pub arg1: u32,
    pub arg2: u32,
}

#[derive(Debug, Clone)]
pub struct RefPicListModEntry {
    pub modification_of_pic_nums_idc: u32,
    pub value: u32,
}

#[derive(Debug, Clone)]
pub struct SliceHeader {
    pub first_mb_in_slice: u32,
    pub slice_type: SliceType,
    pub pic_parameter_set_id: u32,
    pub colour_plane_id: u8,
    pub frame_num: u32,
    pub field_pic_flag: bool,
    pub bottom_field_flag: bool,
    pub idr_pic_flag: bool,
    pub idr_pic_id: u32,
    pub pic_order_cnt_lsb: u32,
    pub delta_pic_order_cnt_bottom: i32,
    pub delta_pic_order_cnt: [i32; 2],
    pub redundant_pic_cnt: u32,
    pub direct_spatial_mv_pred_flag: bool,
    pub num_ref_idx_active_override_flag: bool,
    pub num_ref_idx_l0_active_minus1: u32,
    pub num_ref_idx_l1_active_minus1: u32,
    pub ref_pic_list_modification_l0: Vec<RefPicListModEntry>,
    pub ref_pic_list_modification_l1: Vec<RefPicListModEntry>,
    pub no_output_of_prior_pics_flag: bool,
    pub long_term_reference_flag: bool,
    pub adaptive_ref_pic_marking_mode_flag: bool,
    pub mmco: Vec<Mmco>,
    /// Bit offset (from the start of the RBSP) at which `slice_data()`
    /// begins, used by the decode parameter builder to locate the
    /// bitstream payload for hardware submission (spec §4.5).
    pub slice_data_bit_offset: u64,
}

impl SliceHeader {
    pub fn parse(rbsp: &[u8], idr_pic_flag: bool, sps: &Sps, pps: &Pps) -> Result<Self, DecodeError> {
        let mut r = BitReader::new(rbsp);

        let first_mb_in_slice = r.read_ue()?;
        let slice_type_value = r.read_ue()?;
        let slice_type =
            SliceType::from_value(slice_type_value).ok_or(DecodeError::InvalidFormat("slice: bad slice_type"))?;
        let pic_parameter_set_id = r.read_ue()?;

        let colour_plane_id = if sps.separate_colour_plane_flag { r.read_bits(2)? as u8 } else { 0 };

        let frame_num_bits = sps.log2_max_frame_num_minus4 as u32 + 4;
        let frame_num = r.read_bits(frame_num_bits)?;

        let mut field_pic_flag = false;
        let mut bottom_field_flag = false;
        if !sps.frame_mbs_only_flag {
            field_pic_flag = r.read_flag()?;
            if field_pic_flag {
                bottom_field_flag = r.read_flag()?;
            }
        }

        let idr_pic_id = if idr_pic_flag { r.read_ue()? } else { 0 };

        let mut pic_order_cnt_lsb = 0u32;
        let mut delta_pic_order_cnt_bottom = 0i32;
        let mut delta_pic_order_cnt = [0i32; 2];
        if sps.pic_order_cnt_type == 0 {
            let bits = sps.log2_max_pic_order_cnt_lsb_minus4 as u32 + 4;
            pic_order_cnt_lsb = r.read_bits(bits)?;
            if pps.bottom_field_pic_order_in_frame_present_flag && !field_pic_flag {
                delta_pic_order_cnt_bottom = r.read_se()?;
            }
        } else if sps.pic_order_cnt_type == 1 && !sps.delta_pic_order_always_zero_flag {
            delta_pic_order_cnt[0] = r.read_se()?;
            if pps.bottom_field_pic_order_in_frame_present_flag && !field_pic_flag {
                delta_pic_order_cnt[1] = r.read_se()?;
            }
        }

        let redundant_pic_cnt = if pps.redundant_pic_cnt_present_flag { r.read_ue()? } else { 0 };

        let direct_spatial_mv_pred_flag =
            if slice_type == SliceType::B { r.read_flag()? } else { false };

        let mut num_ref_idx_active_override_flag = false;
        let mut num_ref_idx_l0_active_minus1 = pps.num_ref_idx_l0_default_active_minus1 as u32;
        let mut num_ref_idx_l1_active_minus1 = pps.num_ref_idx_l1_default_active_minus1 as u32;
        if matches!(slice_type, SliceType::P | SliceType::Sp | SliceType::B) {
            num_ref_idx_active_override_flag = r.read_flag()?;
            if num_ref_idx_active_override_flag {
                num_ref_idx_l0_active_minus1 = r.read_ue()?;
                if slice_type == SliceType::B {
                    num_ref_idx_l1_active_minus1 = r.read_ue()?;
                }
            }
        }

        let mut ref_pic_list_modification_l0 = Vec::new();
        let mut ref_pic_list_modification_l1 = Vec::new();
        if matches!(slice_type, SliceType::P | SliceType::Sp | SliceType::B) {
            ref_pic_list_modification_l0 = parse_ref_pic_list_modification(&mut r)?;
        }
        if slice_type == SliceType::B {
            ref_pic_list_modification_l1 = parse_ref_pic_list_modification(&mut r)?;
        }

        // pred_weight_table() skipped: only used for weighted prediction,
        // not needed to construct reference lists or the DPB.
        if (pps.weighted_pred_flag && matches!(slice_type, SliceType::P | SliceType::Sp))
            || (pps.weighted_bipred_idc == 1 && slice_type == SliceType::B)
        {
            skip_pred_weight_table(&mut r, sps, num_ref_idx_l0_active_minus1, num_ref_idx_l1_active_minus1, slice_type)?;
        }

        let mut no_output_of_prior_pics_flag = false;
        let mut long_term_reference_flag = false;
        let mut adaptive_ref_pic_marking_mode_flag = false;
        let mut mmco = Vec::new();
        if idr_pic_flag {
            no_output_of_prior_pics_flag = r.read_flag()?;
            long_term_reference_flag = r.read_flag()?;
        } else {
            let adaptive_ref_pic_marking_mode_flag_present = r.read_flag()?;
            adaptive_ref_pic_marking_mode_flag = adaptive_ref_pic_marking_mode_flag_present;
            if adaptive_ref_pic_marking_mode_flag_present {
                loop {
                    let op = r.read_ue()?;
                    if op == 0 {
                        break;
                    }
                    let (arg1, arg2) = match op {
                        1 | 3 => (r.read_ue()?, if op == 3 { r.read_ue()? } else { 0 }),
                        2 => (r.read_ue()?, 0),
                        4 => (r.read_ue()?, 0),
                        5 => (0, 0),
                        6 => (r.read_ue()?, 0),
                        _ => return Err(DecodeError::InvalidFormat("slice: bad mmco op")),
                    };
                    mmco.push(Mmco { op, arg1, arg2 });
                    if mmco.len() > 64 {
                        return Err(DecodeError::InvalidFormat("slice: mmco loop too long"));
                    }
                }
            }
        }

        // entropy_coding / slice_qp / deblocking fields follow but are not
        // needed by the DPB or reference-list logic; the decode parameter
        // builder re-derives the slice_data bit offset from here directly.
        let slice_data_bit_offset = r.bit_offset();

        Ok(SliceHeader {
            first_mb_in_slice,
            slice_type,
            pic_parameter_set_id,
            colour_plane_id,
            frame_num,
            field_pic_flag,
            bottom_field_flag,
            idr_pic_flag,
            idr_pic_id,
            pic_order_cnt_lsb,
            delta_pic_order_cnt_bottom,
            delta_pic_order_cnt,
            redundant_pic_cnt,
            direct_spatial_mv_pred_flag,
            num_ref_idx_active_override_flag,
            num_ref_idx_l0_active_minus1,
            num_ref_idx_l1_active_minus1,
            ref_pic_list_modification_l0,
            ref_pic_list_modification_l1,
            no_output_of_prior_pics_flag,
            long_term_reference_flag,
            adaptive_ref_pic_marking_mode_flag,
            mmco,
            slice_data_bit_offset,
        })
    }

    /// `first_slice_segment_in_pic`-equivalent check used by the picture
    /// boundary detector (spec §4.3: AVC uses `first_mb_in_slice == 0`).
    pub fn is_first_slice_of_picture(&self) -> bool {
        self.first_mb_in_slice == 0
    }
}

fn parse_ref_pic_list_modification(r: &mut BitReader) -> Result<Vec<RefPicListModEntry>, DecodeError> {
    let mut entries = Vec::new();
    if r.read_flag()? {
        loop {
            let idc = r.read_ue()?;
            if idc == 3 {
                break;
            }
            let value = r.read_ue()?;
            entries.push(RefPicListModEntry { modification_of_pic_nums_idc: idc, value });
            if entries.len() > 64 {
                return Err(DecodeError::InvalidFormat("slice: ref list mod loop too long"));
            }
        }
    }
    Ok(entries)
}

fn skip_pred_weight_table(
    r: &mut BitReader,
    sps: &Sps,
    num_ref_idx_l0_active_minus1: u32,
    num_ref_idx_l1_active_minus1: u32,
    slice_type: SliceType,
) -> Result<(), DecodeError> {
    r.read_ue()?; // luma_log2_weight_denom
    if sps.chroma_format_idc != 0 {
        r.read_ue()?; // chroma_log2_weight_denom
    }
    let lists = if slice_type == SliceType::B { 2 } else { 1 };
    for list in 0..lists {
        let count = if list == 0 { num_ref_idx_l0_active_minus1 } else { num_ref_idx_l1_active_minus1 };
        for _ in 0..=count {
            if r.read_flag()? {
                r.read_se()?;
                r.read_se()?;
            }
            if sps.chroma_format_idc != 0 && r.read_flag()? {
                for _ in 0..2 {
                    r.read_se()?;
                    r.read_se()?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_type_wraps_modulo_five() {
        assert_eq!(SliceType::from_value(0), Some(SliceType::P));
        assert_eq!(SliceType::from_value(5), Some(SliceType::P));
        assert_eq!(SliceType::from_value(7), Some(SliceType::I));
    }
}

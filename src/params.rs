// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Backend-neutral picture-parameter marshaling (spec §4.5 "Decode
//! submission").
//!
//! The parser resolves everything a hardware decoder needs into plain
//! Rust structs; this module packs those structs into the flat byte
//! buffers `backend::SubmitBuffers` carries, the same way a real driver's
//! C param-buffer struct would be laid out, using `zerocopy::AsBytes`
//! instead of a hand-rolled byte writer.

use zerocopy::AsBytes;

use crate::decoder::submission::UNUSED_REF_SENTINEL;

pub const MAX_REF_FRAMES: usize = 16;

fn fill_refs(list: &[u8]) -> [u8; MAX_REF_FRAMES] {
    let mut out = [UNUSED_REF_SENTINEL; MAX_REF_FRAMES];
    for (slot, &v) in out.iter_mut().zip(list.iter()) {
        *slot = v;
    }
    out
}

#[derive(Debug, Clone, Copy, AsBytes)]
#[repr(C)]
pub struct H264PicParams {
    pub width: u32,
    pub height: u32,
    pub curr_poc: i32,
    pub frame_num: u32,
    pub pic_order_cnt_type: u8,
    pub is_idr: u8,
    pub num_ref_idx_l0: u8,
    pub num_ref_idx_l1: u8,
    pub ref_list0: [u8; MAX_REF_FRAMES],
    pub ref_list1: [u8; MAX_REF_FRAMES],
}

impl H264PicParams {
    pub fn new(
        width: u32,
        height: u32,
        curr_poc: i32,
        frame_num: u32,
        pic_order_cnt_type: u8,
        is_idr: bool,
        ref_list0: &[u8],
        ref_list1: &[u8],
    ) -> Self {
        Self {
            width,
            height,
            curr_poc,
            frame_num,
            pic_order_cnt_type,
            is_idr: is_idr as u8,
            num_ref_idx_l0: ref_list0.len() as u8,
            num_ref_idx_l1: ref_list1.len() as u8,
            ref_list0: fill_refs(ref_list0),
            ref_list1: fill_refs(ref_list1),
        }
    }
}

#[derive(Debug, Clone, Copy, AsBytes)]
#[repr(C)]
pub struct H265PicParams {
    pub width: u32,
    pub height: u32,
    pub curr_poc: i32,
    pub is_idr: u8,
    pub num_ref_idx_l0: u8,
    pub num_ref_idx_l1: u8,
    pub _reserved: u8,
    pub ref_list0: [u8; MAX_REF_FRAMES],
    pub ref_list1: [u8; MAX_REF_FRAMES],
}

impl H265PicParams {
    pub fn new(width: u32, height: u32, curr_poc: i32, is_idr: bool, ref_list0: &[u8], ref_list1: &[u8]) -> Self {
        Self {
            width,
            height,
            curr_poc,
            is_idr: is_idr as u8,
            num_ref_idx_l0: ref_list0.len() as u8,
            num_ref_idx_l1: ref_list1.len() as u8,
            _reserved: 0,
            ref_list0: fill_refs(ref_list0),
            ref_list1: fill_refs(ref_list1),
        }
    }
}

/// One `slice_params` entry: where this slice's data sits within the
/// concatenated `slice_data` buffer (spec §4.5 "Slice data offset").
///
/// `byte_offset`/`byte_size` bound the whole slice NAL (header included);
/// `slice_data_offset` is the separate, finer-grained offset of
/// `slice_data()` itself within the same buffer, already corrected for
/// emulation-prevention bytes removed during RBSP extraction (spec §4.5
/// "the *bit offset of slice_data()*... must be translated back into an
/// offset inside the original bytes", §8 scenario E3). The hardware reads
/// entropy-coded slice data starting there, not at `byte_offset`.
#[derive(Debug, Clone, Copy, AsBytes)]
#[repr(C)]
pub struct SliceParam {
    pub byte_offset: u32,
    pub byte_size: u32,
    pub slice_data_offset: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn h264_pic_params_pads_missing_refs_with_sentinel() {
        let p = H264PicParams::new(1920, 1080, 4, 1, 0, false, &[2, 5], &[]);
        assert_eq!(p.num_ref_idx_l0, 2);
        assert_eq!(p.ref_list0[0], 2);
        assert_eq!(p.ref_list0[2], UNUSED_REF_SENTINEL);
        assert_eq!(p.as_bytes().len(), std::mem::size_of::<H264PicParams>());
    }

    #[test]
    fn slice_param_is_plain_old_data() {
        let s = SliceParam { byte_offset: 16, byte_size: 128, slice_data_offset: 20 };
        assert_eq!(s.as_bytes().len(), 12);
    }
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! H.265/HEVC bitstream parsing and DPB management (spec §4.4 "HEVC").

pub mod dpb;
pub mod pps;
pub mod profile_tier_level;
pub mod short_term_rps;
pub mod slice;
pub mod sps;
pub mod vps;

pub use dpb::HevcDpb;
pub use pps::Pps;
pub use slice::{SliceHeader, SliceType};
pub use sps::Sps;
pub use vps::Vps;

pub const NUT_TRAIL_N: u8 = 0;
pub const NUT_TRAIL_R: u8 = 1;
pub const NUT_RASL_N: u8 = 8;
pub const NUT_RASL_R: u8 = 9;
pub const NUT_BLA_W_LP: u8 = 16;
pub const NUT_BLA_W_RADL: u8 = 17;
pub const NUT_BLA_N_LP: u8 = 18;
pub const NUT_IDR_W_RADL: u8 = 19;
pub const NUT_IDR_N_LP: u8 = 20;
pub const NUT_CRA_NUT: u8 = 21;
pub const NUT_RSV_IRAP_VCL23: u8 = 23;
pub const NUT_VPS: u8 = 32;
pub const NUT_SPS: u8 = 33;
pub const NUT_PPS: u8 = 34;
pub const NUT_AUD: u8 = 35;
pub const NUT_EOS: u8 = 36;
pub const NUT_EOB: u8 = 37;

pub fn is_slice_nal(nal_type: u8) -> bool {
    nal_type <= NUT_RSV_IRAP_VCL23
}

pub fn is_irap(nal_type: u8) -> bool {
    (NUT_BLA_W_LP..=NUT_RSV_IRAP_VCL23).contains(&nal_type)
}

pub fn is_idr(nal_type: u8) -> bool {
    nal_type == NUT_IDR_W_RADL || nal_type == NUT_IDR_N_LP
}

pub fn is_bla(nal_type: u8) -> bool {
    (NUT_BLA_W_LP..=NUT_BLA_N_LP).contains(&nal_type)
}

pub fn is_rasl(nal_type: u8) -> bool {
    nal_type == NUT_RASL_N || nal_type == NUT_RASL_R
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! H.264/AVC bitstream parsing and DPB management (spec §4.4 "AVC").
//!
//! The original source (`examples/original_source/src/parser/h264_parser.cpp`)
//! stubs this codec entirely (`NotImplemented`); this crate implements it
//! fully against the Rec. ITU-T H.264 semantics called out in spec §6.2,
//! using the plain, dependency-free parsing style of
//! `therishidesai-h264-parser` (bit reader + Exp-Golomb helpers already
//! provided by [`crate::bitstream`]) adapted to this crate's error and
//! parameter-set-store conventions.

pub mod dpb;
pub mod pps;
pub mod slice;
pub mod sps;

pub use dpb::{AvcDpb, RefPicListEntry};
pub use pps::Pps;
pub use slice::{SliceHeader, SliceType};
pub use sps::Sps;

pub const NAL_NON_IDR_SLICE: u8 = 1;
pub const NAL_PARTITION_A: u8 = 2;
pub const NAL_IDR_SLICE: u8 = 5;
pub const NAL_SEI: u8 = 6;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;
pub const NAL_AUD: u8 = 9;
pub const NAL_END_OF_SEQ: u8 = 10;
pub const NAL_END_OF_STREAM: u8 = 11;

pub fn is_slice_nal(nal_type: u8) -> bool {
    matches!(nal_type, NAL_NON_IDR_SLICE | NAL_IDR_SLICE | NAL_PARTITION_A)
}

pub fn is_irap(nal_type: u8) -> bool {
    nal_type == NAL_IDR_SLICE
}

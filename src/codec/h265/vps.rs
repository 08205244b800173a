// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Video parameter set (VPS) parsing, Rec. ITU-T H.265 §7.3.2.1.
//!
//! HEVC's DPB/POC logic does not consult the VPS beyond confirming it
//! exists for the active SPS, so only the identifying fields are kept.

use crate::bitstream::BitReader;
use crate::codec::h265::profile_tier_level::skip_profile_tier_level;
use crate::error::DecodeError;

#[derive(Debug, Clone, PartialEq)]
pub struct Vps {
    pub vps_video_parameter_set_id: u32,
    pub vps_max_sub_layers_minus1: u8,
    pub vps_temporal_id_nesting_flag: bool,
}

impl Vps {
    pub fn parse(rbsp: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BitReader::new(rbsp);

        let vps_video_parameter_set_id = r.read_bits(4)?;
        r.read_bits(2)?; // vps_base_layer_internal_flag + vps_base_layer_available_flag
        r.read_bits(6)?; // vps_max_layers_minus1
        let vps_max_sub_layers_minus1 = r.read_bits(3)? as u8;
        let vps_temporal_id_nesting_flag = r.read_flag()?;
        r.read_bits(16)?; // vps_reserved_0xffff_16bits

        skip_profile_tier_level(&mut r, true, vps_max_sub_layers_minus1)?;

        Ok(Vps { vps_video_parameter_set_id, vps_max_sub_layers_minus1, vps_temporal_id_nesting_flag })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::reader::BitWriter;

    #[test]
    fn parses_id_and_sub_layers() {
        let mut w = BitWriter::new();
        w.write_bits(0, 4); // vps_video_parameter_set_id
        w.write_bits(0b11, 2);
        w.write_bits(0, 6);
        w.write_bits(0, 3); // vps_max_sub_layers_minus1
        w.write_bits(0, 1); // nesting flag
        w.write_bits(0xffff, 16);
        // profile_tier_level(true, 0)
        w.write_bits(0, 2);
        w.write_bits(0, 1);
        w.write_bits(1, 5); // general_profile_idc = 1
        w.write_bits(0, 32);
        w.write_bits(0, 1);
        w.write_bits(0, 1);
        w.write_bits(0, 1);
        w.write_bits(0, 1);
        w.write_bits(0, 32);
        w.write_bits(0, 12);
        w.write_bits(120, 8); // general_level_idc
        let bytes = w.into_bytes();
        let vps = Vps::parse(&bytes).unwrap();
        assert_eq!(vps.vps_video_parameter_set_id, 0);
        assert_eq!(vps.vps_max_sub_layers_minus1, 0);
        assert!(!vps.vps_temporal_id_nesting_flag);
    }
}

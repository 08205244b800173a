// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! `profile_tier_level()`, Rec. ITU-T H.265 §7.3.3. Only the bits needed to
//! stay aligned with the rest of the SPS/VPS are kept; individual
//! profile/constraint flags aren't exposed since nothing downstream of the
//! parser consumes them.

use crate::bitstream::BitReader;
use crate::error::DecodeError;

pub fn skip_profile_tier_level(
    r: &mut BitReader,
    profile_present_flag: bool,
    max_num_sub_layers_minus1: u8,
) -> Result<(), DecodeError> {
    if profile_present_flag {
        r.read_bits(2)?; // general_profile_space
        r.read_flag()?; // general_tier_flag
        r.read_bits(5)?; // general_profile_idc
        r.read_bits(32)?; // general_profile_compatibility_flag[32]
        r.read_flag()?; // general_progressive_source_flag
        r.read_flag()?; // general_interlaced_source_flag
        r.read_flag()?; // general_non_packed_constraint_flag
        r.read_flag()?; // general_frame_only_constraint_flag
        r.read_bits(32)?;
        r.read_bits(12)?; // 44 bits of constraint/reserved flags
    }
    r.read_bits(8)?; // general_level_idc

    let mut sub_layer_profile_present = [false; 8];
    let mut sub_layer_level_present = [false; 8];
    for i in 0..max_num_sub_layers_minus1 as usize {
        sub_layer_profile_present[i] = r.read_flag()?;
        sub_layer_level_present[i] = r.read_flag()?;
    }
    if max_num_sub_layers_minus1 > 0 {
        for _ in max_num_sub_layers_minus1..8 {
            r.read_bits(2)?; // reserved_zero_2bits
        }
    }
    for i in 0..max_num_sub_layers_minus1 as usize {
        if sub_layer_profile_present[i] {
            r.read_bits(2)?;
            r.read_flag()?;
            r.read_bits(5)?;
            r.read_bits(32)?;
            r.read_flag()?;
            r.read_flag()?;
            r.read_flag()?;
            r.read_flag()?;
            r.read_bits(32)?;
            r.read_bits(12)?;
        }
        if sub_layer_level_present[i] {
            r.read_bits(8)?;
        }
    }
    Ok(())
}

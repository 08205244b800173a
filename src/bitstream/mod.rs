// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Byte/bit cursor and NAL framing, the leaf dependency of the whole crate.

pub mod nal;
pub mod reader;

pub use nal::{ebsp_to_rbsp, rbsp_to_ebsp, FramingMode, Nal, NalFramer};
pub use reader::BitReader;

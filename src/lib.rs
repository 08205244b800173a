// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A hardware-accelerated video decoding runtime.
//!
//! Takes H.264/AVC or H.265/HEVC (VP9 frame-header parsing and AV1
//! reference-store scaffolding are also present, see [`codec::vp9`] and
//! [`codec::av1`]) Annex-B or length-prefixed bitstreams in, and hands
//! decoded pictures back out as GPU-accessible compute buffers rather
//! than a mapped-to-the-CPU frame, the same way the original rocDecode-
//! style driver does but with Rust's ownership model replacing manual
//! reference counting at every seam.
//!
//! [`api::Session`] is the entry point: `feed` bitstream bytes in, get
//! `on_display` callbacks out, `map_frame`/`unmap_frame` around whatever
//! you want to read on the compute side.
//!
//! Module layout mirrors the pipeline stages: [`bitstream`] frames NAL
//! units, [`codec`] parses their headers and tracks the DPB, [`picture`]
//! detects picture boundaries and owns picture metadata, [`parser`] wires
//! those into completed pictures, [`params`] packs them for the backend,
//! [`decoder`] drives the [`backend::Backend`] trait and the surface
//! pool, [`dispatcher`] reorders into display order, and [`export`] hands
//! a decoded surface to the compute runtime.

pub mod api;
pub mod backend;
pub mod bitstream;
pub mod codec;
pub mod decoder;
pub mod dispatcher;
pub mod dpb;
pub mod error;
pub mod export;
pub mod params;
pub mod parser;
pub mod picture;
pub mod rect;

pub use api::Session;
pub use error::ApiError;

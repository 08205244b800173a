// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The accelerator backend interface (spec §6.3).
//!
//! The core never reaches around this trait; it is the entire surface the
//! hardware driver exposes. A real implementation wraps a kernel-driver
//! ioctl interface; [`dummy::DummyBackend`] stands in for it in tests, the
//! same role the teacher's `backend::dummy::encoder::Backend` plays for
//! the encoder side.

pub mod dummy;

use crate::codec::Codec;
use crate::picture::DecodeStatus;
use crate::rect::Resolution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConfigId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChromaFormat {
    Monochrome,
    Yuv420,
    Yuv422,
    Yuv444,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Nv12,
    P010,
}

/// One entry of `probe_caps()`'s result, matching the rocDecode capability
/// table (`roc_decoder_caps.h`) this is grounded on (spec SPEC_FULL.md §4.9).
#[derive(Debug, Clone)]
pub struct CodecCap {
    pub codec: Codec,
    pub chroma: ChromaFormat,
    pub max_bit_depth: u8,
    pub output_formats: Vec<OutputFormat>,
    pub min_size: Resolution,
    pub max_size: Resolution,
}

/// Filtered view of a single [`CodecCap`] returned by `get_caps` (spec
/// §6.1).
#[derive(Debug, Clone, Copy)]
pub struct CapsQuery {
    pub is_supported: bool,
    pub output_format_mask: u32,
    pub min_size: Resolution,
    pub max_size: Resolution,
}

/// Raw, hardware-neutral buffers for one `submit()` call (spec §4.5 "Decode
/// submission", §6.3). The backend interprets the byte contents according
/// to `codec`/`profile`; the core never inspects them past this point.
#[derive(Debug, Clone)]
pub struct SubmitBuffers {
    pub pic_params: Vec<u8>,
    pub iq_matrix: Option<Vec<u8>>,
    pub slice_params: Vec<u8>,
    pub slice_data: Vec<u8>,
}

/// A shared DMA descriptor for one surface (spec §4.7 "Map").
#[derive(Debug)]
pub struct ExportDescriptor {
    pub fd: std::os::unix::io::RawFd,
    pub num_objects: u32,
    pub layers: Vec<LayerLayout>,
}

#[derive(Debug, Clone, Copy)]
pub struct LayerLayout {
    pub offset: u64,
    pub pitch: u32,
}

/// Outcome of `sync_surface`: a timeout is retryable, per spec §4.7 "a
/// timeout return from the backend is retried, not fatal" and §5
/// "Timeouts".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Ready,
    Timeout,
}

/// The accelerator backend interface (spec §6.3). Every method that can
/// fail for a backend-internal reason returns `anyhow::Error`; the caller
/// (decoder session / exporter) wraps that into the crate's own error
/// taxonomy.
pub trait Backend {
    fn probe_caps(&self) -> Vec<CodecCap>;

    fn create_config(&mut self, codec: Codec, profile: u32, rt_format: OutputFormat) -> anyhow::Result<ConfigId>;

    fn create_surfaces(
        &mut self,
        format: OutputFormat,
        width: u32,
        height: u32,
        count: usize,
    ) -> anyhow::Result<Vec<SurfaceId>>;

    fn create_context(&mut self, config: ConfigId, surfaces: &[SurfaceId]) -> anyhow::Result<ContextId>;

    fn submit(&mut self, context: ContextId, current_surface: SurfaceId, buffers: SubmitBuffers) -> anyhow::Result<()>;

    fn query_surface_status(&self, surface: SurfaceId) -> DecodeStatus;

    fn sync_surface(&mut self, surface: SurfaceId) -> anyhow::Result<SyncOutcome>;

    fn export_surface(&mut self, surface: SurfaceId) -> anyhow::Result<ExportDescriptor>;

    fn destroy_context(&mut self, context: ContextId);

    fn destroy_config(&mut self, config: ConfigId);

    fn destroy_surfaces(&mut self, surfaces: &[SurfaceId]);
}

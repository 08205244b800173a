// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A trivial in-memory [`Backend`], standing in for a real kernel-driver
//! interface the way `backend::dummy::encoder::Backend` stands in for a
//! real hardware encoder on the teacher's side: every operation succeeds
//! immediately, `sync_surface` always reports `Ready`, and surfaces are
//! plain counters rather than real memory.

use std::collections::HashMap;

use crate::backend::Backend;
use crate::backend::ChromaFormat;
use crate::backend::CodecCap;
use crate::backend::ConfigId;
use crate::backend::ContextId;
use crate::backend::ExportDescriptor;
use crate::backend::LayerLayout;
use crate::backend::OutputFormat;
use crate::backend::SubmitBuffers;
use crate::backend::SurfaceId;
use crate::backend::SyncOutcome;
use crate::codec::Codec;
use crate::picture::DecodeStatus;
use crate::rect::Resolution;

#[derive(Default)]
pub struct DummyBackend {
    next_config: u32,
    next_context: u32,
    next_surface: u32,
    statuses: HashMap<u32, DecodeStatus>,
}

impl DummyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: force a surface's status, e.g. to exercise the `Error`/
    /// `ErrorConcealed` paths in the session without a real backend.
    pub fn set_status(&mut self, surface: SurfaceId, status: DecodeStatus) {
        self.statuses.insert(surface.0, status);
    }
}

impl Backend for DummyBackend {
    fn probe_caps(&self) -> Vec<CodecCap> {
        vec![
            CodecCap {
                codec: Codec::H264,
                chroma: ChromaFormat::Yuv420,
                max_bit_depth: 8,
                output_formats: vec![OutputFormat::Nv12],
                min_size: Resolution::new(16, 16),
                max_size: Resolution::new(4096, 4096),
            },
            CodecCap {
                codec: Codec::H265,
                chroma: ChromaFormat::Yuv420,
                max_bit_depth: 10,
                output_formats: vec![OutputFormat::Nv12, OutputFormat::P010],
                min_size: Resolution::new(16, 16),
                max_size: Resolution::new(8192, 8192),
            },
        ]
    }

    fn create_config(&mut self, _codec: Codec, _profile: u32, _rt_format: OutputFormat) -> anyhow::Result<ConfigId> {
        self.next_config += 1;
        Ok(ConfigId(self.next_config))
    }

    fn create_surfaces(
        &mut self,
        _format: OutputFormat,
        _width: u32,
        _height: u32,
        count: usize,
    ) -> anyhow::Result<Vec<SurfaceId>> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            self.next_surface += 1;
            let id = SurfaceId(self.next_surface);
            self.statuses.insert(id.0, DecodeStatus::Invalid);
            out.push(id);
        }
        Ok(out)
    }

    fn create_context(&mut self, _config: ConfigId, _surfaces: &[SurfaceId]) -> anyhow::Result<ContextId> {
        self.next_context += 1;
        Ok(ContextId(self.next_context))
    }

    fn submit(&mut self, _context: ContextId, current_surface: SurfaceId, _buffers: SubmitBuffers) -> anyhow::Result<()> {
        self.statuses.insert(current_surface.0, DecodeStatus::Success);
        Ok(())
    }

    fn query_surface_status(&self, surface: SurfaceId) -> DecodeStatus {
        self.statuses.get(&surface.0).copied().unwrap_or(DecodeStatus::Invalid)
    }

    fn sync_surface(&mut self, _surface: SurfaceId) -> anyhow::Result<SyncOutcome> {
        Ok(SyncOutcome::Ready)
    }

    fn export_surface(&mut self, _surface: SurfaceId) -> anyhow::Result<ExportDescriptor> {
        Ok(ExportDescriptor {
            fd: -1,
            num_objects: 1,
            layers: vec![LayerLayout { offset: 0, pitch: 0 }],
        })
    }

    fn destroy_context(&mut self, _context: ContextId) {}

    fn destroy_config(&mut self, _config: ConfigId) {}

    fn destroy_surfaces(&mut self, surfaces: &[SurfaceId]) {
        for s in surfaces {
            self.statuses.remove(&s.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_marks_surface_successful() {
        let mut backend = DummyBackend::new();
        let config = backend.create_config(Codec::H264, 0, OutputFormat::Nv12).unwrap();
        let surfaces = backend.create_surfaces(OutputFormat::Nv12, 64, 64, 2).unwrap();
        let context = backend.create_context(config, &surfaces).unwrap();
        let buffers = SubmitBuffers { pic_params: vec![], iq_matrix: None, slice_params: vec![], slice_data: vec![] };
        backend.submit(context, surfaces[0], buffers).unwrap();
        assert_eq!(backend.query_surface_status(surfaces[0]), DecodeStatus::Success);
        assert_eq!(backend.query_surface_status(surfaces[1]), DecodeStatus::Invalid);
    }
}

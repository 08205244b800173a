// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Decoder session state machine (spec §4.6).
//!
//! `DecoderSession` owns the backend config/context handles, the surface
//! pool, and the in-flight picture count, guarded by one `parking_lot`
//! mutex so a consumer thread calling `release_frame` after a display
//! callback can race safely against the parser thread (spec §5 "Shared
//! resources").

use std::time::Duration;

use parking_lot::Condvar;
use parking_lot::Mutex;

use crate::backend::Backend;
use crate::backend::ChromaFormat;
use crate::backend::OutputFormat;
use crate::backend::SubmitBuffers;
use crate::backend::SurfaceId;
use crate::codec::Codec;
use crate::decoder::submission::DecodeSubmission;
use crate::decoder::surface_pool::SurfacePool;
use crate::error::SessionError;
use crate::error::SubmitError;
use crate::picture::DecodeStatus;
use crate::picture::UseFlags;
use crate::rect::Rect;

/// Blocking policy for operations that may need to wait on a resource
/// (spec §6.1 `PoolExhausted` / §4.6 "the session must block (or return
/// `PoolExhausted` if non-blocking is configured)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingMode {
    Blocking,
    NonBlocking,
}

#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub codec: Codec,
    pub chroma_format: ChromaFormat,
    pub bit_depth: u8,
    pub width: u32,
    pub height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub num_surfaces: usize,
    pub target_rect: Rect,
    pub output_format: OutputFormat,
    pub device_id: i32,
    pub blocking_mode: BlockingMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Uninit,
    Ready,
}

struct Inner {
    pool: SurfacePool,
    in_flight: usize,
}

/// Bound on how long `Blocking` mode waits for a slot to free before giving
/// up and reporting `PoolExhausted` like the non-blocking path would.
const ALLOCATE_SLOT_BLOCKING_TIMEOUT: Duration = Duration::from_secs(5);

/// Wraps one [`Backend`] instance through its create/submit/query/destroy
/// lifecycle (spec §4.6 state diagram: `Uninit -> Ready -> (submit |
/// reconfigure | query)* -> destroy`).
pub struct DecoderSession<B: Backend> {
    backend: B,
    state: SessionState,
    config: DecoderConfig,
    config_id: Option<crate::backend::ConfigId>,
    context_id: Option<crate::backend::ContextId>,
    inner: Mutex<Inner>,
    /// Notified from [`Self::release_slot`] so a `Blocking`-mode
    /// `allocate_slot` wakes up as soon as a slot frees instead of
    /// polling (spec §4.6 "the session must block ... until the
    /// dispatcher releases a display-only slot").
    slot_released: Condvar,
}

impl<B: Backend> DecoderSession<B> {
    /// `create_decoder` (spec §6.1): probes the backend's capabilities,
    /// allocates the surface pool, and creates the backend config/context.
    pub fn create(mut backend: B, config: DecoderConfig, profile: u32) -> Result<Self, SessionError> {
        let supported = backend
            .probe_caps()
            .into_iter()
            .any(|cap| cap.codec == config.codec && cap.chroma == config.chroma_format && cap.max_bit_depth >= config.bit_depth);
        if !supported {
            return Err(SessionError::NotSupported);
        }
        if config.device_id < 0 {
            return Err(SessionError::DeviceInvalid(config.device_id));
        }

        let config_id = backend
            .create_config(config.codec, profile, config.output_format)
            .map_err(|_| SessionError::OutOfMemory)?;
        let surface_ids = backend
            .create_surfaces(config.output_format, config.max_width, config.max_height, config.num_surfaces)
            .map_err(|_| SessionError::OutOfMemory)?;
        let context_id = backend
            .create_context(config_id, &surface_ids)
            .map_err(|_| SessionError::OutOfMemory)?;

        log::debug!(
            "decoder session created: codec={:?} {}x{} num_surfaces={}",
            config.codec,
            config.width,
            config.height,
            config.num_surfaces
        );

        Ok(Self {
            backend,
            state: SessionState::Ready,
            config,
            config_id: Some(config_id),
            context_id: Some(context_id),
            inner: Mutex::new(Inner { pool: SurfacePool::new(surface_ids), in_flight: 0 }),
            slot_released: Condvar::new(),
        })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Exposes the backend so callers (the surface exporter) can drive
    /// `map`/`unmap` without this session handing out its other internals.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn require_ready(&self) -> Result<(), SessionError> {
        if self.state != SessionState::Ready {
            return Err(SessionError::NotSupported);
        }
        Ok(())
    }

    /// Allocates a free surface slot for a new picture, per spec §4.6
    /// "Surface slot assignment". In `NonBlocking` mode, an exhausted pool
    /// is reported immediately; in `Blocking` mode this waits on
    /// [`Self::slot_released`], which `release_slot` notifies, until a slot
    /// frees or [`ALLOCATE_SLOT_BLOCKING_TIMEOUT`] elapses.
    pub fn allocate_slot(&self, pts: Option<i64>) -> Result<usize, SubmitError> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(index) = inner.pool.allocate(pts) {
                inner.in_flight += 1;
                return Ok(index);
            }
            if self.config.blocking_mode == BlockingMode::NonBlocking {
                return Err(SubmitError::PoolExhausted);
            }
            let timeout = self.slot_released.wait_for(&mut inner, ALLOCATE_SLOT_BLOCKING_TIMEOUT);
            if timeout.timed_out() {
                return Err(SubmitError::PoolExhausted);
            }
        }
    }

    /// `submit_decode` (spec §6.1, §4.5 "Submission is atomic"). On
    /// backend failure the slot is released immediately so the picture
    /// does not leak a permanently-busy surface.
    pub fn submit(&mut self, slot: usize, submission: DecodeSubmission) -> Result<(), SubmitError> {
        self.require_ready().map_err(|_| SubmitError::DecodeSubmitFailed("session not ready".into()))?;
        let context = self.context_id.ok_or_else(|| SubmitError::DecodeSubmitFailed("no context".into()))?;

        let buffers = SubmitBuffers {
            pic_params: submission.picture_params,
            iq_matrix: if submission.scaling_list.is_empty() { None } else { Some(submission.scaling_list) },
            slice_params: submission.slice_params.concat(),
            slice_data: submission.bitstream,
        };

        let result = self.backend.submit(context, submission.target_surface, buffers);
        if let Err(e) = result {
            log::warn!("decode submission failed for surface {:?}: {e}", submission.target_surface);
            self.release_slot(slot, UseFlags::USED_FOR_DECODE);
            return Err(SubmitError::DecodeSubmitFailed(e.to_string()));
        }
        Ok(())
    }

    /// `query_status` (spec §6.1, §4.6 "Status query"). An `Error` status
    /// frees the slot immediately; the DPB and dispatcher are expected to
    /// flag downstream references as `ErrorConcealed`.
    pub fn query_status(&self, slot: usize) -> Result<DecodeStatus, SessionError> {
        let inner = self.inner.lock();
        let surface = inner.pool.slot(slot).ok_or(SessionError::InvalidParameter("slot out of range"))?.surface_id;
        drop(inner);
        let status = self.backend.query_surface_status(surface);
        if status == DecodeStatus::Error {
            self.release_slot(slot, UseFlags::USED_FOR_DECODE);
        }
        Ok(status)
    }

    pub fn release_slot(&self, slot: usize, flag: UseFlags) {
        let mut inner = self.inner.lock();
        let was_in_flight = inner.pool.slot(slot).map(|s| s.use_status.contains(UseFlags::USED_FOR_DECODE)).unwrap_or(false);
        inner.pool.clear_flag(slot, flag);
        if flag.contains(UseFlags::USED_FOR_DECODE) && was_in_flight {
            inner.in_flight = inner.in_flight.saturating_sub(1);
        }
        drop(inner);
        self.slot_released.notify_one();
    }

    pub fn mark_slot(&self, slot: usize, flag: UseFlags) {
        self.inner.lock().pool.mark_flag(slot, flag);
    }

    /// Current `use_status` for a slot, used by the parser to decide
    /// whether a DPB-evicted slot has actually gone fully free before
    /// bumping its generation counter.
    pub fn slot_use_status(&self, slot: usize) -> Option<UseFlags> {
        self.inner.lock().pool.slot(slot).map(|s| s.use_status)
    }

    pub fn surface_id(&self, slot: usize) -> Option<SurfaceId> {
        self.inner.lock().pool.slot(slot).map(|s| s.surface_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.lock().in_flight
    }

    /// `reconfigure` (spec §6.1, §4.6 "Reconfiguration"). Codec, bit depth
    /// and chroma format are immutable for the lifetime of a session; the
    /// client must destroy and recreate for those.
    pub fn reconfigure(&mut self, width: u32, height: u32, target_rect: Rect, num_surfaces: usize) -> Result<(), SessionError> {
        if self.in_flight_count() > 0 {
            return Err(SessionError::ReconfigureWhileInFlight);
        }
        if width > self.config.max_width || height > self.config.max_height {
            return Err(SessionError::ReconfigureNotAllowed);
        }
        self.config.width = width;
        self.config.height = height;
        self.config.target_rect = target_rect;
        self.config.num_surfaces = num_surfaces;
        log::debug!("decoder session reconfigured: {}x{} target={:?}", width, height, target_rect);
        Ok(())
    }

    /// `destroy_*` (spec §6.1). Aborts without waiting for in-flight work;
    /// the caller is responsible for having drained the dispatcher first
    /// if display callbacks for in-flight pictures are still wanted (spec
    /// §5 "Cancellation").
    pub fn destroy(mut self) {
        if let Some(context) = self.context_id.take() {
            self.backend.destroy_context(context);
        }
        if let Some(config) = self.config_id.take() {
            self.backend.destroy_config(config);
        }
        let surfaces: Vec<SurfaceId> = {
            let inner = self.inner.lock();
            (0..inner.pool.num_surfaces()).filter_map(|i| inner.pool.slot(i).map(|s| s.surface_id)).collect()
        };
        self.backend.destroy_surfaces(&surfaces);
        self.state = SessionState::Uninit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::decoder::submission::DecodeSubmission;
    use crate::rect::Rect;

    fn config() -> DecoderConfig {
        DecoderConfig {
            codec: Codec::H264,
            chroma_format: ChromaFormat::Yuv420,
            bit_depth: 8,
            width: 1920,
            height: 1080,
            max_width: 1920,
            max_height: 1080,
            num_surfaces: 4,
            target_rect: Rect { left: 0, top: 0, right: 1920, bottom: 1080 },
            output_format: OutputFormat::Nv12,
            device_id: 0,
            blocking_mode: BlockingMode::NonBlocking,
        }
    }

    #[test]
    fn create_rejects_unsupported_codec() {
        let mut cfg = config();
        cfg.codec = Codec::Av1;
        let err = DecoderSession::create(DummyBackend::new(), cfg, 0).unwrap_err();
        assert_eq!(err.kind_to_name(), "NotSupported");
    }

    #[test]
    fn submit_and_query_round_trip() {
        let session = DecoderSession::create(DummyBackend::new(), config(), 0).unwrap();
        let slot = session.allocate_slot(Some(1000)).unwrap();
        let surface = session.surface_id(slot).unwrap();
        let mut session = session;
        let submission = DecodeSubmission {
            picture_params: vec![0u8; 4],
            slice_params: vec![vec![1u8; 2]],
            scaling_list: vec![],
            bitstream: vec![2u8; 8],
            target_surface: surface,
        };
        session.submit(slot, submission).unwrap();
        assert_eq!(session.query_status(slot).unwrap(), DecodeStatus::Success);
    }

    #[test]
    fn pool_exhaustion_reported_in_nonblocking_mode() {
        let mut cfg = config();
        cfg.num_surfaces = 1;
        let session = DecoderSession::create(DummyBackend::new(), cfg, 0).unwrap();
        session.allocate_slot(None).unwrap();
        let err = session.allocate_slot(None).unwrap_err();
        assert_eq!(err.kind_to_name(), "PoolExhausted");
    }

    #[test]
    fn blocking_mode_waits_for_release_then_succeeds() {
        use std::sync::Arc;
        use std::thread;

        let mut cfg = config();
        cfg.num_surfaces = 1;
        cfg.blocking_mode = BlockingMode::Blocking;
        let session = Arc::new(DecoderSession::create(DummyBackend::new(), cfg, 0).unwrap());
        let slot = session.allocate_slot(None).unwrap();

        let releaser = Arc::clone(&session);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            releaser.release_slot(slot, UseFlags::USED_FOR_DECODE);
        });

        // Pool has only one surface; this call must block until the
        // spawned thread above releases it, rather than immediately
        // returning `PoolExhausted` the way `NonBlocking` would.
        let second = session.allocate_slot(None).unwrap();
        assert_eq!(second, slot);
        handle.join().unwrap();
    }

    #[test]
    fn reconfigure_rejected_while_in_flight() {
        let mut session = DecoderSession::create(DummyBackend::new(), config(), 0).unwrap();
        session.allocate_slot(None).unwrap();
        let err = session.reconfigure(1280, 720, Rect::default(), 4).unwrap_err();
        assert_eq!(err.kind_to_name(), "ReconfigureWhileInFlight");
    }
}

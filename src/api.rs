// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The client-facing facade: one [`Session`] per decode instance, wiring
//! [`crate::parser::Parser`] output into [`crate::decoder::DecoderSession`],
//! [`crate::dispatcher::Dispatcher`] and [`crate::export::SurfaceExporter`].
//!
//! This is the only module a caller needs to import besides the error and
//! callback types: `feed` pushes bytes in, the wrapped [`Callbacks`] fires
//! back out, and `map_frame`/`unmap_frame` hand the caller a GPU-visible
//! buffer descriptor for whatever it decoded.

use std::collections::HashMap;

use crate::backend::Backend;
use crate::backend::CapsQuery;
use crate::backend::ChromaFormat;
use crate::backend::OutputFormat;
use crate::bitstream::rbsp_to_ebsp;
use crate::bitstream::FramingMode;
use crate::codec::Codec;
use crate::decoder::submission::resolve_ref_indices;
use crate::decoder::DecodeSubmission;
use crate::decoder::DecoderConfig;
use crate::decoder::DecoderSession;
use crate::dispatcher::Callbacks;
use crate::dispatcher::Dispatcher;
use crate::dispatcher::ReadyPicture;
use crate::dpb::SlotHandle;
use crate::error::ApiError;
use crate::export::SurfaceExporter;
use crate::params::H264PicParams;
use crate::params::H265PicParams;
use crate::params::SliceParam;
use crate::parser::AssembledPicture;
use crate::parser::Parser;
use crate::parser::ParserEvent;
use crate::picture::DecodeStatus;
use crate::picture::UseFlags;
use crate::rect::Resolution;
use crate::rect::Rect;

use zerocopy::AsBytes;

/// Queries a backend's capability table for one codec/chroma/bit-depth
/// combination, ahead of actually creating a decoder. Exposed standalone
/// since a caller may want to probe several codecs before committing to
/// one `create_decoder` call.
pub fn get_caps<B: Backend>(backend: &B, codec: Codec, chroma: ChromaFormat, bit_depth: u8) -> CapsQuery {
    let mut output_format_mask = 0u32;
    let mut is_supported = false;
    let mut min_size = Resolution::default();
    let mut max_size = Resolution::default();
    for cap in backend.probe_caps() {
        if cap.codec == codec && cap.chroma == chroma && cap.max_bit_depth >= bit_depth {
            is_supported = true;
            min_size = cap.min_size;
            max_size = cap.max_size;
            for fmt in &cap.output_formats {
                output_format_mask |= 1 << (*fmt as u32);
            }
        }
    }
    CapsQuery { is_supported, output_format_mask, min_size, max_size }
}

/// Where a picture's metadata and GPU surface currently live, tracked for
/// as long as either the parser's DPB or the client still needs it.
struct PictureSlot {
    handle: SlotHandle,
    surface_slot: usize,
}

/// Forwards to the caller's [`Callbacks`] while recording every picture
/// `on_display` fired for, so [`Session`] can release that picture's
/// resources right after the call returns without making the callback
/// trait itself responsible for bookkeeping it has no access to.
struct TrackingCallbacks<C: Callbacks> {
    inner: C,
    displayed: Vec<u64>,
}

impl<C: Callbacks> Callbacks for TrackingCallbacks<C> {
    fn on_sequence(&mut self, width: u32, height: u32) {
        self.inner.on_sequence(width, height);
    }

    fn on_decode(&mut self, picture_id: u64) -> bool {
        self.inner.on_decode(picture_id)
    }

    fn on_display(&mut self, picture: &ReadyPicture) {
        self.displayed.push(picture.picture_id);
        self.inner.on_display(picture);
    }

    fn on_sei(&mut self, picture_id: u64, payload: &[u8]) {
        self.inner.on_sei(picture_id, payload);
    }
}

/// One decode instance: owns the bitstream parser, the backend-bound
/// decoder session, the display-order dispatcher, and the surface
/// exporter. `B` and `C` are fixed for the session's lifetime; reconfigure
/// changes dimensions, not backend or callback implementation.
pub struct Session<B: Backend, C: Callbacks> {
    parser: Parser,
    decoder: DecoderSession<B>,
    dispatcher: Dispatcher<TrackingCallbacks<C>>,
    exporter: SurfaceExporter,
    slots: HashMap<u64, PictureSlot>,
}

impl<B: Backend, C: Callbacks> Session<B, C> {
    /// `create_parser` + `create_decoder` combined: a session only makes
    /// sense with both ends alive at once, since a completed picture must
    /// immediately find a surface to land on.
    pub fn create(
        codec: Codec,
        framing: FramingMode,
        backend: B,
        decoder_config: DecoderConfig,
        profile: u32,
        callbacks: C,
        max_display_delay: usize,
        force_zero_latency: bool,
    ) -> Result<Self, ApiError> {
        let parser = Parser::new(codec, framing);
        let decoder = DecoderSession::create(backend, decoder_config, profile)?;
        let dispatcher = Dispatcher::new(TrackingCallbacks { inner: callbacks, displayed: Vec::new() }, max_display_delay, force_zero_latency);
        Ok(Self { parser, decoder, dispatcher, exporter: SurfaceExporter::new(), slots: HashMap::new() })
    }

    pub fn codec(&self) -> Codec {
        self.parser.codec()
    }

    /// Pushes one packet of bitstream through the parser, submitting every
    /// picture it completes and draining whatever the dispatcher releases
    /// as a result.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), ApiError> {
        let events = self.parser.feed(bytes)?;
        self.handle_events(events)
    }

    /// `feed(EndOfStream)`: forces emission of any in-progress picture,
    /// then drains the dispatcher's reorder queue through `on_display` for
    /// everything still pending.
    pub fn flush(&mut self) -> Result<(), ApiError> {
        let events = self.parser.flush()?;
        self.handle_events(events)?;
        self.dispatcher.flush();
        self.release_displayed();
        Ok(())
    }

    fn handle_events(&mut self, events: Vec<ParserEvent>) -> Result<(), ApiError> {
        for event in events {
            match event {
                ParserEvent::SequenceChanged { width, height } => self.handle_sequence_change(width, height),
                ParserEvent::Picture(picture) => self.handle_picture(picture)?,
            }
        }
        Ok(())
    }

    fn handle_sequence_change(&mut self, width: u32, height: u32) {
        let dropped = self.dispatcher.handle_sequence_change(width, height);
        for picture in dropped {
            self.free_picture(picture.picture_id);
        }
    }

    fn handle_picture(&mut self, picture: AssembledPicture) -> Result<(), ApiError> {
        let surface_slot = match self.decoder.allocate_slot(None) {
            Ok(slot) => slot,
            Err(e) => return Err(e.into()),
        };
        self.slots.insert(picture.picture_id, PictureSlot { handle: picture.handle, surface_slot });

        if !self.dispatcher.notify_decode(picture.picture_id) {
            self.decoder.release_slot(surface_slot, UseFlags::USED_FOR_DECODE);
            self.slots.remove(&picture.picture_id);
            self.parser.release_display(picture.handle);
            return Ok(());
        }

        let submission = self.build_submission(&picture, surface_slot)?;
        if let Err(e) = self.decoder.submit(surface_slot, submission) {
            self.slots.remove(&picture.picture_id);
            self.parser.release_display(picture.handle);
            return Err(e.into());
        }
        self.decoder.mark_slot(surface_slot, UseFlags::USED_FOR_DISPLAY);

        self.dispatcher.submit_for_display(ReadyPicture {
            picture_id: picture.picture_id,
            order_hint: picture.order_hint,
            slot: picture.handle,
            pts: None,
            sei_messages: Vec::new(),
        });
        self.release_displayed();
        Ok(())
    }

    fn build_submission(&self, picture: &AssembledPicture, surface_slot: usize) -> Result<DecodeSubmission, ApiError> {
        let ref_list0: Vec<Option<SlotHandle>> = picture.ref_list0.iter().map(|h| Some(*h)).collect();
        let ref_list1: Vec<Option<SlotHandle>> = picture.ref_list1.iter().map(|h| Some(*h)).collect();
        let resolved0 = resolve_ref_indices(&ref_list0, |h| self.slots.values().find(|s| s.handle == h).map(|s| s.surface_slot as u8));
        let resolved1 = resolve_ref_indices(&ref_list1, |h| self.slots.values().find(|s| s.handle == h).map(|s| s.surface_slot as u8));

        let picture_params = match self.parser.codec() {
            Codec::H264 => H264PicParams::new(
                picture.width,
                picture.height,
                picture.order_hint as i32,
                picture.frame_num,
                picture.pic_order_cnt_type,
                picture.is_idr,
                &resolved0,
                &resolved1,
            )
            .as_bytes()
            .to_vec(),
            Codec::H265 => {
                H265PicParams::new(picture.width, picture.height, picture.order_hint as i32, picture.is_idr, &resolved0, &resolved1).as_bytes().to_vec()
            }
            // VP9/AV1 frame-header parsing does not yet produce a
            // hardware-style picture-params struct; the reference lists
            // are still resolved above so `ReferenceFrameStore` bookkeeping
            // stays exercised even though nothing consumes the resolved
            // indices yet.
            Codec::Vp9 | Codec::Av1 => {
                let _ = (&resolved0, &resolved1);
                Vec::new()
            }
        };

        let mut bitstream = Vec::new();
        let mut slice_params = Vec::new();
        for (index, nal) in picture.slice_nals.iter().enumerate() {
            let ebsp = rbsp_to_ebsp(&nal.rbsp);
            let byte_offset = bitstream.len() as u32;
            // Only the first (primary) slice's header is parsed (see
            // `Parser::assemble`/`assemble_h265`), so only its slice_data()
            // offset has been corrected for emulation-prevention bytes;
            // later slices fall back to their NAL's own start, same as
            // `byte_offset`, since this crate doesn't parse their headers.
            let slice_data_offset = if index == 0 { byte_offset + picture.first_slice_data_byte_offset } else { byte_offset };
            let param = SliceParam { byte_offset, byte_size: ebsp.len() as u32, slice_data_offset };
            slice_params.push(param.as_bytes().to_vec());
            bitstream.extend_from_slice(&ebsp);
        }

        let target_surface = self.decoder.surface_id(surface_slot).ok_or(ApiError::InvalidParameter("surface slot has no backing surface"))?;

        Ok(DecodeSubmission { picture_params, slice_params, scaling_list: Vec::new(), bitstream, target_surface })
    }

    /// Drains whatever `on_display` fired for during the last dispatcher
    /// call and releases those pictures' resources.
    fn release_displayed(&mut self) {
        let displayed = std::mem::take(&mut self.dispatcher.callbacks_mut().displayed);
        for picture_id in displayed {
            self.free_picture(picture_id);
        }
    }

    fn free_picture(&mut self, picture_id: u64) {
        if let Some(slot) = self.slots.remove(&picture_id) {
            if self.exporter.is_mapped(slot.surface_slot) {
                let _ = self.exporter.unmap(slot.surface_slot);
            }
            self.decoder.release_slot(slot.surface_slot, UseFlags::USED_FOR_DISPLAY);
            self.parser.release_display(slot.handle);
        }
    }

    /// `query_status` for one in-flight or decoded picture. A terminal
    /// `Success`/`Error` status also releases that surface's decode flag,
    /// since nothing else will query it again.
    pub fn query_status(&mut self, picture_id: u64) -> Result<DecodeStatus, ApiError> {
        let surface_slot = self.slots.get(&picture_id).ok_or(ApiError::InvalidParameter("unknown picture_id"))?.surface_slot;
        let status = self.decoder.query_status(surface_slot)?;
        if matches!(status, DecodeStatus::Success | DecodeStatus::Error | DecodeStatus::ErrorConcealed) {
            self.decoder.release_slot(surface_slot, UseFlags::USED_FOR_DECODE);
        }
        Ok(status)
    }

    /// `map_frame`: exports the picture's surface as a compute-visible
    /// buffer and returns its per-plane byte offsets and pitches.
    pub fn map_frame(&mut self, picture_id: u64) -> Result<(Vec<u64>, Vec<u32>), ApiError> {
        let surface_slot = self.slots.get(&picture_id).ok_or(ApiError::InvalidParameter("unknown picture_id"))?.surface_slot;
        let surface = self.decoder.surface_id(surface_slot).ok_or(ApiError::InvalidParameter("surface slot has no backing surface"))?;
        let Session { decoder, exporter, .. } = self;
        let (_, offsets, pitches) = exporter.map(decoder.backend_mut(), surface_slot, surface)?;
        Ok((offsets, pitches))
    }

    /// `unmap_frame`: releases the compute-runtime import; does not itself
    /// release the surface's display flag, since the picture may still be
    /// waiting in the reorder queue or be re-mapped before it is freed.
    pub fn unmap_frame(&mut self, picture_id: u64) -> Result<(), ApiError> {
        let surface_slot = self.slots.get(&picture_id).ok_or(ApiError::InvalidParameter("unknown picture_id"))?.surface_slot;
        self.exporter.unmap(surface_slot)?;
        Ok(())
    }

    /// `reconfigure`: rejected while pictures are in flight, same as the
    /// underlying decoder session.
    pub fn reconfigure(&mut self, width: u32, height: u32, target_rect: Rect, num_surfaces: usize) -> Result<(), ApiError> {
        self.decoder.reconfigure(width, height, target_rect, num_surfaces)?;
        Ok(())
    }

    pub fn config(&self) -> &DecoderConfig {
        self.decoder.config()
    }

    /// `destroy_decoder` + `destroy_parser`: aborts any not-yet-displayed
    /// pictures without calling their display callback, then tears down
    /// the backend resources. The caller is responsible for having called
    /// `flush` first if it still wants those callbacks.
    pub fn destroy(mut self) {
        self.dispatcher.abort();
        self.slots.clear();
        self.decoder.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::decoder::BlockingMode;

    #[derive(Default)]
    struct RecordingCallbacks {
        sequences: Vec<(u32, u32)>,
        displayed: Vec<u64>,
    }

    impl Callbacks for RecordingCallbacks {
        fn on_sequence(&mut self, width: u32, height: u32) {
            self.sequences.push((width, height));
        }

        fn on_decode(&mut self, _picture_id: u64) -> bool {
            true
        }

        fn on_display(&mut self, picture: &ReadyPicture) {
            self.displayed.push(picture.picture_id);
        }

        fn on_sei(&mut self, _picture_id: u64, _payload: &[u8]) {}
    }

    fn decoder_config() -> DecoderConfig {
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

    fn avcc_sps() -> Vec<u8> {
        vec![0x42, 0x00, 0x1f, 0xac, 0x34, 0xc8, 0x14, 0x00, 0x00, 0x03, 0x00, 0x04, 0x00, 0x00, 0x03, 0x00, 0xf0, 0x3c, 0x60, 0xc6, 0x58]
    }

    fn avcc_pps() -> Vec<u8> {
        vec![0xee, 0x3c, 0x80]
    }

    fn annex_b_idr_stream() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&[0, 0, 0, 1, 0x67]);
        out.extend_from_slice(&avcc_sps());
        out.extend_from_slice(&[0, 0, 0, 1, 0x68]);
        out.extend_from_slice(&avcc_pps());
        out.extend_from_slice(&[0, 0, 0, 1, 0x65, 0xb8, 0x10, 0x00]);
        out
    }

    fn new_session() -> Session<DummyBackend, RecordingCallbacks> {
        Session::create(
            Codec::H264,
            FramingMode::AnnexB,
            DummyBackend::new(),
            decoder_config(),
            0,
            RecordingCallbacks::default(),
            2,
            true,
        )
        .unwrap()
    }

    /// A non-zero-latency session keeps a decoded picture's slot alive
    /// (pending the reorder queue) past `feed`, so tests that need to
    /// still see it in flight use this instead of `new_session`.
    fn new_buffered_session() -> Session<DummyBackend, RecordingCallbacks> {
        Session::create(
            Codec::H264,
            FramingMode::AnnexB,
            DummyBackend::new(),
            decoder_config(),
            0,
            RecordingCallbacks::default(),
            2,
            false,
        )
        .unwrap()
    }

    #[test]
    fn get_caps_reports_supported_codec() {
        let backend = DummyBackend::new();
        let caps = get_caps(&backend, Codec::H264, ChromaFormat::Yuv420, 8);
        assert!(caps.is_supported);
        let caps = get_caps(&backend, Codec::Av1, ChromaFormat::Yuv420, 8);
        assert!(!caps.is_supported);
    }

    #[test]
    fn feed_assembles_and_displays_one_idr_picture() {
        let mut session = new_session();
        session.feed(&annex_b_idr_stream()).unwrap();
        session.flush().unwrap();
        assert_eq!(session.dispatcher.callbacks_mut().inner.displayed, vec![0]);
        assert!(session.slots.is_empty());
    }

    #[test]
    fn query_status_releases_decode_flag_on_success() {
        let mut session = new_buffered_session();
        session.feed(&annex_b_idr_stream()).unwrap();
        assert!(session.slots.contains_key(&0));
        let status = session.query_status(0).unwrap();
        assert_eq!(status, DecodeStatus::Success);
    }

    #[test]
    fn map_frame_round_trips_before_release() {
        let mut session = new_buffered_session();
        session.feed(&annex_b_idr_stream()).unwrap();
        assert!(session.slots.contains_key(&0));
        let (offsets, pitches) = session.map_frame(0).unwrap();
        assert_eq!(offsets.len(), pitches.len());
        session.unmap_frame(0).unwrap();
    }

    #[test]
    fn reconfigure_rejected_with_picture_in_flight() {
        let mut session = new_buffered_session();
        session.feed(&annex_b_idr_stream()).unwrap();
        assert!(!session.slots.is_empty());
        let err = session.reconfigure(1280, 720, Rect::default(), 4).unwrap_err();
        assert_eq!(err.kind_to_name(), "ReconfigureWhileInFlight");
    }

    #[test]
    fn destroy_does_not_panic() {
        let mut session = new_session();
        session.feed(&annex_b_idr_stream()).unwrap();
        session.destroy();
    }
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Per-codec NAL assembly: the `feed()` entry point from spec §6.1.
//!
//! Combines [`crate::bitstream::NalFramer`], the codec parameter-set
//! stores, [`crate::picture::PictureBoundaryDetector`] and the
//! codec-specific DPB into one state machine per codec. `Parser::feed`
//! drains every NAL unit newly available from the bitstream and returns
//! one [`ParserEvent`] per sequence change or completed picture, in
//! stream order. The caller (see [`crate::api`]) is responsible for
//! turning a completed picture into a [`crate::decoder::DecodeSubmission`]
//! and driving the decoder session and dispatcher from there — this
//! module never touches a [`crate::backend::Backend`].

use crate::bitstream::{FramingMode, Nal, NalFramer};
use crate::codec::h264;
use crate::codec::h265;
use crate::codec::vp9;
use crate::codec::{Codec, ParamSetStore};
use crate::dpb::{SlotArena, SlotHandle};
use crate::error::DecodeError;
use crate::picture::{BoundaryDecision, NalClass, PendingUnit, PictureBoundaryDetector, PictureRecord, UseFlags};

/// Upper bound on pictures a [`Parser`] keeps metadata for at once
/// (in-flight decode + reference + display-pending). Generously sized
/// relative to any real DPB so it is never the limiting factor; the
/// decoder session's surface pool is the actual resource constraint
/// (spec §3 "Surface pool").
const PICTURE_ARENA_CAPACITY: usize = 32;

/// One completed picture, ready for the decode parameter builder (spec
/// §4.5). Reference lists are already resolved to [`SlotHandle`]s into
/// this parser's picture arena; [`crate::api`] maps those to backend
/// surface indices via [`Parser::picture_pool_slot`].
#[derive(Debug, Clone)]
pub struct AssembledPicture {
    pub handle: SlotHandle,
    pub picture_id: u64,
    pub order_hint: i64,
    pub is_idr: bool,
    pub width: u32,
    pub height: u32,
    pub pic_order_cnt_type: u8,
    pub frame_num: u32,
    pub ref_list0: Vec<SlotHandle>,
    pub ref_list1: Vec<SlotHandle>,
    /// Slice NAL units comprising this picture, RBSP already stripped of
    /// emulation-prevention bytes.
    pub slice_nals: Vec<PendingUnit>,
    /// Byte offset of `slice_data()` within the first slice's
    /// *reconstructed EBSP* (i.e. after [`crate::bitstream::rbsp_to_ebsp`]
    /// re-inserts emulation-prevention bytes) — the offset the hardware
    /// actually consumes, already corrected per spec §4.5 "Slice data
    /// offset" / §8 scenario E3.
    pub first_slice_data_byte_offset: u32,
}

#[derive(Debug, Clone)]
pub enum ParserEvent {
    /// A new or materially different SPS/VPS was seen (spec §4.2); the
    /// caller should treat this like the flow diagram's sequence-change
    /// branch before the next picture is submitted.
    SequenceChanged { width: u32, height: u32 },
    Picture(AssembledPicture),
}

struct H264State {
    sps: ParamSetStore<u32, h264::Sps>,
    pps: ParamSetStore<u32, h264::Pps>,
    boundary: PictureBoundaryDetector,
    dpb: h264::AvcDpb,
}

struct H265State {
    vps: ParamSetStore<u32, h265::Vps>,
    sps: ParamSetStore<u32, h265::Sps>,
    pps: ParamSetStore<u32, h265::Pps>,
    boundary: PictureBoundaryDetector,
    dpb: h265::HevcDpb,
    /// Parallels `boundary`'s internal pending queue 1:1 (same push
    /// cadence), since [`PendingUnit`] doesn't carry `temporal_id` and
    /// HEVC POC derivation needs it (§8.3.1 `prevTid0Pic`).
    pending_temporal_ids: Vec<u8>,
}

enum CodecState {
    H264(H264State),
    H265(H265State),
    Vp9(vp9::ReferenceFrameStore),
    Av1,
}

pub struct Parser {
    codec: Codec,
    framer: NalFramer,
    state: CodecState,
    pictures: SlotArena<PictureRecord>,
    next_picture_id: u64,
}

impl Parser {
    pub fn new(codec: Codec, framing: FramingMode) -> Self {
        let framer = match framing {
            FramingMode::AnnexB => NalFramer::new(),
            FramingMode::Avcc { length_size } => NalFramer::new_avcc(length_size),
        };
        let state = match codec {
            Codec::H264 => CodecState::H264(H264State {
                sps: ParamSetStore::new(),
                pps: ParamSetStore::new(),
                boundary: PictureBoundaryDetector::new(),
                dpb: h264::AvcDpb::new(),
            }),
            Codec::H265 => CodecState::H265(H265State {
                vps: ParamSetStore::new(),
                sps: ParamSetStore::new(),
                pps: ParamSetStore::new(),
                boundary: PictureBoundaryDetector::new(),
                dpb: h265::HevcDpb::new(),
                pending_temporal_ids: Vec::new(),
            }),
            Codec::Vp9 => CodecState::Vp9(vp9::ReferenceFrameStore::new()),
            Codec::Av1 => CodecState::Av1,
        };
        Self { codec, framer, state, pictures: SlotArena::with_capacity(PICTURE_ARENA_CAPACITY), next_picture_id: 0 }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn picture_record(&self, handle: SlotHandle) -> Option<&PictureRecord> {
        self.pictures.get(handle)
    }

    /// Marks a picture no longer needed for display once the dispatcher
    /// has fired its display callback, freeing it from the arena if it
    /// is also no longer a reference (spec §3 "a picture may be freed
    /// only when `ref_count == 0` and no flags set").
    pub fn release_display(&mut self, handle: SlotHandle) {
        if let Some(record) = self.pictures.get_mut(handle) {
            record.use_flags.remove(UseFlags::USED_FOR_DISPLAY);
            if record.is_freeable() {
                self.pictures.remove(handle);
            }
        }
    }

    /// Feeds raw bytes (one packet) into the NAL framer and assembles
    /// every picture that becomes complete as a result, in stream order.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<ParserEvent>, DecodeError> {
        self.framer.feed(bytes)?;
        self.drain()
    }

    /// `feed(EndOfStream)` (spec §4.3 "EOS flag... forces emission").
    pub fn flush(&mut self) -> Result<Vec<ParserEvent>, DecodeError> {
        self.framer.flush()?;
        let mut events = self.drain()?;
        let flushed = match &mut self.state {
            CodecState::H264(s) => s.boundary.flush(),
            CodecState::H265(s) => s.boundary.flush(),
            CodecState::Vp9(_) | CodecState::Av1 => None,
        };
        if let Some(units) = flushed {
            if let Some(event) = self.assemble(units)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    fn drain(&mut self) -> Result<Vec<ParserEvent>, DecodeError> {
        let nals = match self.codec {
            Codec::H264 => self.framer.drain(|ebsp| (ebsp[0] & 0x1f, (ebsp[0] >> 5) & 0x3, 0, 1)),
            Codec::H265 => self.framer.drain(|ebsp| {
                let nal_type = (ebsp[0] >> 1) & 0x3f;
                let layer_id = ((ebsp[0] & 0x1) << 5) | (ebsp[1] >> 3);
                let temporal_id = (ebsp[1] & 0x7).saturating_sub(1);
                (nal_type, layer_id, temporal_id, 2)
            }),
            Codec::Vp9 | Codec::Av1 => self.framer.drain(|_| (0, 0, 0, 0)),
        };

        let mut events = Vec::new();
        for nal in nals {
            if let Some(event) = self.handle_nal(nal)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    fn handle_nal(&mut self, nal: Nal) -> Result<Option<ParserEvent>, DecodeError> {
        match self.codec {
            Codec::H264 => self.handle_h264_nal(nal),
            Codec::H265 => self.handle_h265_nal(nal),
            Codec::Vp9 => self.handle_vp9_nal(nal),
            Codec::Av1 => Ok(None),
        }
    }

    fn handle_h264_nal(&mut self, nal: Nal) -> Result<Option<ParserEvent>, DecodeError> {
        let CodecState::H264(s) = &mut self.state else { unreachable!() };

        if nal.nal_type == h264::NAL_SPS {
            let sps = h264::Sps::parse(&nal.rbsp)?;
            let changed = s.sps.upsert(sps.seq_parameter_set_id, sps.clone());
            if changed {
                return Ok(Some(ParserEvent::SequenceChanged { width: sps.width, height: sps.height }));
            }
            return Ok(None);
        }
        if nal.nal_type == h264::NAL_PPS {
            let pps = h264::Pps::parse(&nal.rbsp)?;
            s.pps.upsert(pps.pic_parameter_set_id, pps);
            return Ok(None);
        }

        let is_slice = h264::is_slice_nal(nal.nal_type);
        let is_first = if is_slice { peek_avc_first_slice_flag(&nal.rbsp)? } else { false };
        let class = NalClass {
            is_slice,
            is_param_set_or_aud: nal.nal_type == h264::NAL_AUD || !is_slice,
            is_irap: h264::is_irap(nal.nal_type),
            is_first_slice_of_picture: is_first,
        };

        let decision = s.boundary.feed(nal.nal_type, nal.rbsp, nal.emulation_removed_at, class);
        match decision {
            BoundaryDecision::Continue => Ok(None),
            BoundaryDecision::Emit(units) => self.assemble(units),
        }
    }

    fn handle_h265_nal(&mut self, nal: Nal) -> Result<Option<ParserEvent>, DecodeError> {
        let CodecState::H265(s) = &mut self.state else { unreachable!() };

        if nal.nal_type == h265::NUT_VPS {
            let vps = h265::Vps::parse(&nal.rbsp)?;
            s.vps.upsert(vps.vps_video_parameter_set_id, vps);
            return Ok(None);
        }
        if nal.nal_type == h265::NUT_SPS {
            let sps = h265::Sps::parse(&nal.rbsp)?;
            let changed = s.sps.upsert(sps.sps_seq_parameter_set_id, sps.clone());
            if changed {
                return Ok(Some(ParserEvent::SequenceChanged { width: sps.width, height: sps.height }));
            }
            return Ok(None);
        }
        if nal.nal_type == h265::NUT_PPS {
            let pps = h265::Pps::parse(&nal.rbsp)?;
            s.pps.upsert(pps.pps_pic_parameter_set_id, pps);
            return Ok(None);
        }

        let is_slice = h265::is_slice_nal(nal.nal_type);
        let is_first = if is_slice { peek_hevc_first_slice_flag(&nal.rbsp, nal.nal_type)? } else { false };
        let class = NalClass {
            is_slice,
            is_param_set_or_aud: nal.nal_type == h265::NUT_AUD || !is_slice,
            is_irap: h265::is_irap(nal.nal_type),
            is_first_slice_of_picture: is_first,
        };

        let decision = s.boundary.feed(nal.nal_type, nal.rbsp, nal.emulation_removed_at, class);
        match decision {
            BoundaryDecision::Continue => {
                s.pending_temporal_ids.push(nal.temporal_id);
                Ok(None)
            }
            BoundaryDecision::Emit(units) => {
                // `boundary` just took its whole pending queue the same way
                // (`mem::take` in `PictureBoundaryDetector::feed`); this
                // buffer is pushed to once per `feed()` call exactly like
                // that queue, so the two stay in lockstep.
                let emitted_ids: Vec<u8> = std::mem::take(&mut s.pending_temporal_ids);
                s.pending_temporal_ids.push(nal.temporal_id);
                debug_assert_eq!(emitted_ids.len(), units.len());
                self.assemble_h265(units, &emitted_ids)
            }
        }
    }

    fn handle_vp9_nal(&mut self, nal: Nal) -> Result<Option<ParserEvent>, DecodeError> {
        let CodecState::Vp9(refs) = &mut self.state else { unreachable!() };
        let mut r = crate::bitstream::BitReader::new(&nal.rbsp);
        let header = vp9::Header::parse(&mut r)?;
        if header.show_existing_frame {
            return Ok(None);
        }
        let is_key = header.frame_type == vp9::FrameType::Key;
        let ref_handles = refs.resolve_refs(&header.ref_frame_idx);
        let (width, height) = (header.width, header.height);

        let picture_id = self.next_picture_id;
        self.next_picture_id += 1;
        let record = PictureRecord::new(picture_id, picture_id as i64);
        let handle = self
            .pictures
            .insert(record, PICTURE_ARENA_CAPACITY)
            .ok_or(DecodeError::InvalidFormat("picture arena exhausted"))?;
        refs.update_references(header.refresh_frame_flags, handle);

        Ok(Some(ParserEvent::Picture(AssembledPicture {
            handle,
            picture_id,
            order_hint: picture_id as i64,
            is_idr: is_key,
            width,
            height,
            pic_order_cnt_type: 0,
            frame_num: 0,
            ref_list0: ref_handles.iter().filter_map(|h| *h).collect(),
            ref_list1: Vec::new(),
            slice_nals: vec![PendingUnit { nal_type: 0, rbsp: nal.rbsp.clone(), emulation_removed_at: Vec::new() }],
            first_slice_data_byte_offset: 0,
        })))
    }

    fn assemble(&mut self, units: Vec<PendingUnit>) -> Result<Option<ParserEvent>, DecodeError> {
        let CodecState::H264(s) = &mut self.state else { unreachable!() };

        let slice_nals: Vec<PendingUnit> = units.into_iter().filter(|u| h264::is_slice_nal(u.nal_type)).collect();
        let Some(primary) = slice_nals.first() else {
            return Ok(None);
        };

        let idr_pic_flag = primary.nal_type == h264::NAL_IDR_SLICE;
        let pps_id = peek_avc_pps_id(&primary.rbsp)?;
        let pps = s.pps.get(pps_id).ok_or(DecodeError::MissingParameterSet(pps_id))?.clone();
        let sps = s.sps.get(pps.seq_parameter_set_id).ok_or(DecodeError::MissingParameterSet(pps.seq_parameter_set_id))?.clone();

        let slice = h264::SliceHeader::parse(&primary.rbsp, idr_pic_flag, &sps, &pps)?;
        let emulation_bytes = crate::decoder::submission::emulation_bytes_before(&primary.emulation_removed_at, slice.slice_data_bit_offset);
        let slice_data_byte_offset = crate::decoder::submission::slice_data_byte_offset(slice.slice_data_bit_offset, emulation_bytes) as u32;
        let (top_foc, bottom_foc) = s.dpb.compute_poc(&sps, &slice);
        let curr_poc = top_foc.min(bottom_foc);
        let (ref_list0, ref_list1) = s.dpb.build_ref_lists(&slice, curr_poc);

        let picture_id = self.next_picture_id;
        self.next_picture_id += 1;
        let mut record = PictureRecord::new(picture_id, curr_poc as i64);
        record.use_flags = UseFlags::USED_FOR_DECODE | UseFlags::USED_FOR_DISPLAY;
        let handle = self
            .pictures
            .insert(record, PICTURE_ARENA_CAPACITY)
            .ok_or(DecodeError::InvalidFormat("picture arena exhausted"))?;

        let prev_live: Vec<SlotHandle> = s.dpb.entries().iter().map(|e| e.handle).collect();
        let entry = h264::RefPicListEntry {
            handle,
            frame_num: slice.frame_num,
            frame_num_wrap: slice.frame_num as i32,
            pic_num: slice.frame_num as i32,
            long_term_frame_idx: None,
            top_foc,
            bottom_foc,
            is_long_term: false,
            needed_for_output: true,
        };
        s.dpb.insert(&sps, &slice, entry);
        sync_reference_flags(&mut self.pictures, &prev_live, s.dpb.entries().iter().map(|e| e.handle), handle);

        Ok(Some(ParserEvent::Picture(AssembledPicture {
            handle,
            picture_id,
            order_hint: curr_poc as i64,
            is_idr: idr_pic_flag,
            width: sps.width,
            height: sps.height,
            pic_order_cnt_type: sps.pic_order_cnt_type,
            frame_num: slice.frame_num,
            ref_list0,
            ref_list1,
            first_slice_data_byte_offset: slice_data_byte_offset,
            slice_nals,
        })))
    }

    fn assemble_h265(&mut self, units: Vec<PendingUnit>, temporal_ids: &[u8]) -> Result<Option<ParserEvent>, DecodeError> {
        let CodecState::H265(s) = &mut self.state else { unreachable!() };

        let slice_nals: Vec<PendingUnit> = units.into_iter().filter(|u| h265::is_slice_nal(u.nal_type)).collect();
        let Some(primary) = slice_nals.first() else {
            return Ok(None);
        };
        let primary_temporal_id = temporal_ids.first().copied().unwrap_or(0);

        let pps_id = peek_hevc_pps_id(&primary.rbsp, primary.nal_type)?;
        let pps = s.pps.get(pps_id).ok_or(DecodeError::MissingParameterSet(pps_id))?.clone();
        let sps = s.sps.get(pps.pps_seq_parameter_set_id).ok_or(DecodeError::MissingParameterSet(pps.pps_seq_parameter_set_id))?.clone();

        let slice = h265::SliceHeader::parse(&primary.rbsp, primary.nal_type, &sps, &pps)?;
        let emulation_bytes = crate::decoder::submission::emulation_bytes_before(&primary.emulation_removed_at, slice.slice_data_bit_offset);
        let slice_data_byte_offset = crate::decoder::submission::slice_data_byte_offset(slice.slice_data_bit_offset, emulation_bytes) as u32;
        let is_idr = h265::is_idr(primary.nal_type);
        let poc = s.dpb.compute_poc(&sps, &slice, primary.nal_type, primary_temporal_id);

        let picture_id = self.next_picture_id;
        self.next_picture_id += 1;
        let mut record = PictureRecord::new(picture_id, poc as i64);
        record.use_flags = UseFlags::USED_FOR_DECODE | UseFlags::USED_FOR_DISPLAY;
        let handle = self
            .pictures
            .insert(record, PICTURE_ARENA_CAPACITY)
            .ok_or(DecodeError::InvalidFormat("picture arena exhausted"))?;

        if is_idr {
            s.dpb.reset();
        }
        let prev_live: Vec<SlotHandle> = s.dpb.entries().iter().map(|e| e.handle).collect();
        let sets = s.dpb.build_ref_pic_sets(&sps, &slice, poc);
        let ref_list0: Vec<SlotHandle> = sets.st_curr_before.iter().chain(sets.lt_curr.iter()).copied().collect();
        let ref_list1: Vec<SlotHandle> = sets.st_curr_after.iter().chain(sets.lt_curr.iter()).copied().collect();

        s.dpb.mark_and_insert(
            &sps,
            &sets,
            h265::dpb::DpbEntry { handle, poc, is_long_term: false, needed_for_output: slice.pic_output_flag },
        );
        sync_reference_flags(&mut self.pictures, &prev_live, s.dpb.entries().iter().map(|e| e.handle), handle);

        Ok(Some(ParserEvent::Picture(AssembledPicture {
            handle,
            picture_id,
            order_hint: poc as i64,
            is_idr,
            width: sps.width,
            height: sps.height,
            pic_order_cnt_type: 0,
            frame_num: 0,
            ref_list0,
            ref_list1,
            first_slice_data_byte_offset: slice_data_byte_offset,
            slice_nals,
        })))
    }
}

/// Updates [`UseFlags::SHORT_TERM_REF`] on every picture record to match
/// the codec DPB's live entry set, and frees any record that fell out of
/// the DPB and is also no longer pending display.
fn sync_reference_flags(
    pictures: &mut SlotArena<PictureRecord>,
    prev_live: &[SlotHandle],
    now_live: impl Iterator<Item = SlotHandle>,
    just_inserted: SlotHandle,
) {
    let now_live: Vec<SlotHandle> = now_live.collect();
    for &h in prev_live {
        if !now_live.contains(&h) {
            if let Some(record) = pictures.get_mut(h) {
                record.use_flags.remove(UseFlags::SHORT_TERM_REF);
                if record.is_freeable() {
                    pictures.remove(h);
                }
            }
        }
    }
    for &h in &now_live {
        if h == just_inserted || !prev_live.contains(&h) {
            if let Some(record) = pictures.get_mut(h) {
                record.use_flags.insert(UseFlags::SHORT_TERM_REF);
            }
        }
    }
}

/// Reads just far enough into an AVC slice header to learn
/// `first_mb_in_slice == 0`, without needing the active SPS/PPS yet
/// (spec §4.3 "AVC uses `first_mb_in_slice == 0`").
fn peek_avc_first_slice_flag(rbsp: &[u8]) -> Result<bool, DecodeError> {
    let mut r = crate::bitstream::BitReader::new(rbsp);
    Ok(r.read_ue()? == 0)
}

/// Reads `first_mb_in_slice`, `slice_type`, then `pic_parameter_set_id`
/// from an AVC slice header, matching the field order in
/// [`h264::slice::SliceHeader::parse`].
fn peek_avc_pps_id(rbsp: &[u8]) -> Result<u32, DecodeError> {
    let mut r = crate::bitstream::BitReader::new(rbsp);
    let _first_mb_in_slice = r.read_ue()?;
    let _slice_type = r.read_ue()?;
    r.read_ue()
}

fn peek_hevc_first_slice_flag(rbsp: &[u8], _nal_type: u8) -> Result<bool, DecodeError> {
    let mut r = crate::bitstream::BitReader::new(rbsp);
    r.read_flag()
}

fn peek_hevc_pps_id(rbsp: &[u8], nal_type: u8) -> Result<u32, DecodeError> {
    let mut r = crate::bitstream::BitReader::new(rbsp);
    let _first_slice_segment_in_pic_flag = r.read_flag()?;
    if h265::is_irap(nal_type) {
        let _no_output_of_prior_pics_flag = r.read_flag()?;
    }
    r.read_ue()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avcc_sps() -> Vec<u8> {
        vec![0x42, 0x00, 0x1f, 0xac, 0x34, 0xc8, 0x14, 0x00, 0x00, 0x03, 0x00, 0x04, 0x00, 0x00, 0x03, 0x00, 0xf0, 0x3c, 0x60, 0xc6, 0x58]
    }

    fn avcc_pps() -> Vec<u8> {
        vec![0xee, 0x3c, 0x80]
    }

    fn annex_b_stream() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&[0, 0, 0, 1, 0x67]);
        out.extend_from_slice(&avcc_sps());
        out.extend_from_slice(&[0, 0, 0, 1, 0x68]);
        out.extend_from_slice(&avcc_pps());
        // IDR slice header for this SPS/PPS pair (frame_num is 5 bits,
        // pic_order_cnt_lsb is 4 bits, and frame_mbs_only_flag is false so
        // field_pic_flag is present): first_mb_in_slice=ue(0), slice_type=
        // ue(2) (I), pic_parameter_set_id=ue(0), frame_num=00000,
        // field_pic_flag=0, idr_pic_id=ue(0), pic_order_cnt_lsb=0000,
        // no_output_of_prior_pics_flag=0, long_term_reference_flag=0.
        out.extend_from_slice(&[0, 0, 0, 1, 0x65, 0xb8, 0x10, 0x00]);
        out
    }

    #[test]
    fn feeds_sps_pps_and_assembles_one_idr_picture() {
        let mut parser = Parser::new(Codec::H264, FramingMode::AnnexB);
        let stream = annex_b_stream();
        let mut events = parser.feed(&stream).unwrap();
        events.extend(parser.flush().unwrap());

        let sequence_changes = events.iter().filter(|e| matches!(e, ParserEvent::SequenceChanged { .. })).count();
        assert_eq!(sequence_changes, 1);
        let pictures: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ParserEvent::Picture(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(pictures.len(), 1);
        assert!(pictures[0].is_idr);
        assert!(pictures[0].ref_list0.is_empty());
    }

    #[test]
    fn second_sps_with_same_content_is_not_a_sequence_change() {
        let mut parser = Parser::new(Codec::H264, FramingMode::AnnexB);
        let mut stream = Vec::new();
        stream.extend_from_slice(&[0, 0, 0, 1, 0x67]);
        stream.extend_from_slice(&avcc_sps());
        stream.extend_from_slice(&[0, 0, 0, 1, 0x67]);
        stream.extend_from_slice(&avcc_sps());
        let events = parser.feed(&stream).unwrap();
        let sequence_changes = events.iter().filter(|e| matches!(e, ParserEvent::SequenceChanged { .. })).count();
        assert_eq!(sequence_changes, 1);
    }
}

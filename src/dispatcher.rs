// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Frame dispatcher: reorder queue, callback invocation, and
//! sequence-change handling (spec §4.8, SPEC_FULL.md §4.10).
//!
//! Callbacks fire synchronously on the thread that called `feed`, the same
//! single-threaded-from-the-parser's-perspective model the teacher's
//! encoder pipeline uses for its own output queue (`encoder::stateless::
//! OutputQueue::poll`).

use std::collections::VecDeque;

use crate::dpb::SlotHandle;

/// Default display delay when the sequence doesn't specify one (spec
/// §4.4 "display delay is `max(vui_num_reorder_pics, 2)`").
pub const DEFAULT_MAX_DISPLAY_DELAY: usize = 2;

#[derive(Debug, Clone)]
pub struct ReadyPicture {
    pub picture_id: u64,
    pub order_hint: i64,
    pub slot: SlotHandle,
    pub pts: Option<i64>,
    pub sei_messages: Vec<Vec<u8>>,
}

/// Implemented by the client to receive dispatcher events (spec §9 "Use a
/// trait/interface with `on_sequence`, `on_decode`, `on_display`,
/// `on_sei` methods; the implementer carries its state", replacing the
/// original's `void*` user-data callback soup).
pub trait Callbacks {
    /// Sequence parameters changed (new or materially different SPS/VPS).
    /// `width`/`height` are the new coded dimensions.
    fn on_sequence(&mut self, width: u32, height: u32);

    /// Fires with the fully-built submission before the hardware call;
    /// returning `false` cancels that picture (spec §4.8).
    fn on_decode(&mut self, picture_id: u64) -> bool;

    /// Fires in display order, after reorder delay.
    fn on_display(&mut self, picture: &ReadyPicture);

    /// Fires exactly once per picture, immediately before `on_display` for
    /// that same picture (spec §5 "SEI callbacks for a picture precede the
    /// display callback for the same picture").
    fn on_sei(&mut self, picture_id: u64, payload: &[u8]);
}

/// Holds pictures that have finished decode but not yet been handed to
/// `on_display`, sorted into display (POC/order-hint) order.
#[derive(Debug, Default)]
struct ReorderQueue {
    pending: VecDeque<ReadyPicture>,
}

impl ReorderQueue {
    fn push(&mut self, picture: ReadyPicture) {
        let pos = self.pending.iter().position(|p| p.order_hint > picture.order_hint).unwrap_or(self.pending.len());
        self.pending.insert(pos, picture);
    }

    fn len(&self) -> usize {
        self.pending.len()
    }

    fn pop_front(&mut self) -> Option<ReadyPicture> {
        self.pending.pop_front()
    }

    fn drain(&mut self) -> Vec<ReadyPicture> {
        self.pending.drain(..).collect()
    }
}

/// Orders completed pictures into display order and drives the client's
/// [`Callbacks`] (spec §4.8). Also owns sequence-change handling (spec
/// SPEC_FULL.md §4.10).
pub struct Dispatcher<C: Callbacks> {
    callbacks: C,
    reorder: ReorderQueue,
    max_display_delay: usize,
    force_zero_latency: bool,
    pending_sei: std::collections::HashMap<u64, Vec<Vec<u8>>>,
}

impl<C: Callbacks> Dispatcher<C> {
    pub fn new(callbacks: C, max_display_delay: usize, force_zero_latency: bool) -> Self {
        Self {
            callbacks,
            reorder: ReorderQueue::default(),
            max_display_delay: max_display_delay.max(DEFAULT_MAX_DISPLAY_DELAY),
            force_zero_latency,
            pending_sei: std::collections::HashMap::new(),
        }
    }

    pub fn buffer_sei(&mut self, picture_id: u64, payload: Vec<u8>) {
        self.pending_sei.entry(picture_id).or_default().push(payload);
    }

    /// Invokes `on_decode`; returns `false` if the client cancelled the
    /// picture.
    pub fn notify_decode(&mut self, picture_id: u64) -> bool {
        self.callbacks.on_decode(picture_id)
    }

    /// Enqueues a decoded picture for display, then releases any pictures
    /// whose turn has come (spec §4.8 "possibly with delay `D`" / "force
    /// zero latency" modes).
    pub fn submit_for_display(&mut self, picture: ReadyPicture) {
        self.reorder.push(picture);
        self.drain_ready();
    }

    fn drain_ready(&mut self) {
        let threshold = if self.force_zero_latency { 1 } else { self.max_display_delay + 1 };
        while self.reorder.len() >= threshold {
            if let Some(picture) = self.reorder.pop_front() {
                self.fire_display(picture);
            }
        }
    }

    fn fire_display(&mut self, picture: ReadyPicture) {
        if let Some(sei) = self.pending_sei.remove(&picture.picture_id) {
            for payload in sei {
                self.callbacks.on_sei(picture.picture_id, &payload);
            }
        }
        self.callbacks.on_display(&picture);
    }

    /// `feed(EOS)` (spec §5 "a feed with `EndOfStream` drains the reorder
    /// queue"): flushes every pending picture through `on_display` in
    /// order.
    pub fn flush(&mut self) {
        for picture in self.reorder.drain() {
            self.fire_display(picture);
        }
    }

    /// `destroy` without having consumed display callbacks (spec §5
    /// "Cancellation": "a subsequent `destroy` aborts any not-yet-displayed
    /// pictures without calling their display callbacks").
    pub fn abort(&mut self) {
        self.reorder.pending.clear();
        self.pending_sei.clear();
    }

    /// Notifies the client of a sequence change and resets reorder state:
    /// the original's `ReconfigureDecoder` drains in-flight pictures and
    /// waits for the display queue before resuming (SPEC_FULL.md §4.10).
    /// Returns the pictures that were still pending display so the caller
    /// can finish releasing their surface slots.
    pub fn handle_sequence_change(&mut self, width: u32, height: u32) -> Vec<ReadyPicture> {
        log::debug!("sequence change detected: new dimensions {width}x{height}");
        let drained = self.reorder.drain();
        self.callbacks.on_sequence(width, height);
        drained
    }

    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingCallbacks {
        sequences: Vec<(u32, u32)>,
        decoded: Vec<u64>,
        displayed: Vec<u64>,
        sei: Vec<(u64, Vec<u8>)>,
    }

    impl Callbacks for RecordingCallbacks {
        fn on_sequence(&mut self, width: u32, height: u32) {
            self.sequences.push((width, height));
        }

        fn on_decode(&mut self, picture_id: u64) -> bool {
            self.decoded.push(picture_id);
            true
        }

        fn on_display(&mut self, picture: &ReadyPicture) {
            self.displayed.push(picture.picture_id);
        }

        fn on_sei(&mut self, picture_id: u64, payload: &[u8]) {
            self.sei.push((picture_id, payload.to_vec()));
        }
    }

    fn picture(id: u64, order_hint: i64) -> ReadyPicture {
        ReadyPicture { picture_id: id, order_hint, slot: SlotHandle::new(0, 0), pts: None, sei_messages: vec![] }
    }

    #[test]
    fn reorders_by_order_hint_before_releasing() {
        let mut d = Dispatcher::new(RecordingCallbacks::default(), 2, false);
        d.submit_for_display(picture(0, 2));
        d.submit_for_display(picture(1, 0));
        d.submit_for_display(picture(2, 1));
        assert!(d.callbacks_mut().displayed.is_empty());
        d.submit_for_display(picture(3, 3));
        assert_eq!(d.callbacks_mut().displayed, vec![1]);
    }

    #[test]
    fn force_zero_latency_displays_immediately() {
        let mut d = Dispatcher::new(RecordingCallbacks::default(), 2, true);
        d.submit_for_display(picture(0, 0));
        assert_eq!(d.callbacks_mut().displayed, vec![0]);
    }

    #[test]
    fn flush_drains_all_pending_in_order() {
        let mut d = Dispatcher::new(RecordingCallbacks::default(), 2, false);
        d.submit_for_display(picture(0, 5));
        d.submit_for_display(picture(1, 1));
        d.flush();
        assert_eq!(d.callbacks_mut().displayed, vec![1, 0]);
    }

    #[test]
    fn sei_fires_before_display_for_same_picture() {
        let mut d = Dispatcher::new(RecordingCallbacks::default(), 2, true);
        d.buffer_sei(0, vec![9, 9]);
        d.submit_for_display(picture(0, 0));
        assert_eq!(d.callbacks_mut().sei, vec![(0, vec![9, 9])]);
        assert_eq!(d.callbacks_mut().displayed, vec![0]);
    }

    #[test]
    fn abort_drops_pending_without_display_callback() {
        let mut d = Dispatcher::new(RecordingCallbacks::default(), 2, false);
        d.submit_for_display(picture(0, 0));
        d.abort();
        assert!(d.callbacks_mut().displayed.is_empty());
    }

    #[test]
    fn sequence_change_drains_and_notifies() {
        let mut d = Dispatcher::new(RecordingCallbacks::default(), 2, false);
        d.submit_for_display(picture(0, 0));
        let drained = d.handle_sequence_change(1280, 720);
        assert_eq!(drained.len(), 1);
        assert_eq!(d.callbacks_mut().sequences, vec![(1280, 720)]);
    }
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Codec-specific parsing and DPB management.
//!
//! Each codec module exposes the same shape: parameter-set structs, a
//! slice/frame-header struct, and a `Dpb`/reference-list builder. The
//! dispatch between codecs happens one level up, in [`crate::picture`] and
//! [`crate::decoder`], via the [`Codec`] enum — mirrors the teacher's
//! `StatelessCodec` marker-trait dispatch (`decoder::stateless::{h264,
//! h265, vp9, av1}`) but collapsed to an enum since this crate is not
//! generic over backend the same way.

pub mod av1;
pub mod h264;
pub mod h265;
pub mod vp9;

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    H264,
    H265,
    Vp9,
    Av1,
}

/// Small map keyed by parameter-set id, shared by all codecs for SPS/PPS/
/// VPS storage (spec §4.2). `upsert` returns `true` if the new value
/// differs from any previous entry at the same id, which the caller uses
/// to flag a potential sequence change (spec §3 "Replacing an entry must
/// be treated as a potential sequence change").
#[derive(Debug, Default)]
pub struct ParamSetStore<K, V> {
    sets: HashMap<K, V>,
}

impl<K, V> ParamSetStore<K, V>
where
    K: Eq + Hash + Copy,
    V: PartialEq,
{
    pub fn new() -> Self {
        Self { sets: HashMap::new() }
    }

    /// Inserts or replaces the set at `id`. Returns `true` if this is a
    /// material change (new id, or an id whose content differs from what
    /// was stored before).
    pub fn upsert(&mut self, id: K, value: V) -> bool {
        match self.sets.insert(id, value) {
            None => true,
            Some(old) => self.sets.get(&id).map(|new| *new != old).unwrap_or(true),
        }
    }

    pub fn get(&self, id: K) -> Option<&V> {
        self.sets.get(&id)
    }

    pub fn contains(&self, id: K) -> bool {
        self.sets.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_reports_material_change() {
        let mut store: ParamSetStore<u32, u32> = ParamSetStore::new();
        assert!(store.upsert(0, 10));
        assert!(!store.upsert(0, 10));
        assert!(store.upsert(0, 11));
        assert_eq!(*store.get(0).unwrap(), 11);
    }
}

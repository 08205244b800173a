// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Decoder session, surface pool, and decode parameter builder (spec
//! §4.5, §4.6).

pub mod session;
pub mod submission;
pub mod surface_pool;

pub use session::BlockingMode;
pub use session::DecoderConfig;
pub use session::DecoderSession;
pub use submission::DecodeSubmission;
pub use surface_pool::SurfacePool;

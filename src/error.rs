// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Error taxonomy shared across the crate.
//!
//! Every fallible boundary returns one of these tagged variants rather than
//! unwinding; only internal helpers (parsing loops, bit readers) may use
//! `?` to bubble up into them. The shapes mirror the teacher's
//! `encoder::stateless::{StatelessBackendError, EncodeError}` pair: a
//! backend-facing error type, wrapped by a caller-facing error type that
//! adds its own variants via `#[from]`.

use thiserror::Error;

/// Caller/configuration errors, surfaced directly from the client API.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("device {0} is invalid or unavailable")]
    DeviceInvalid(i32),
    #[error("operation is not supported by this backend")]
    NotSupported,
    #[error("handle has not been initialized")]
    NotInitialized,
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("value out of range: {0}")]
    OutOfRange(&'static str),
    #[error("out of memory")]
    OutOfMemory,
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("end of stream")]
    Eof,
}

impl ApiError {
    /// Stable name for a given error, exposed through `kind_to_name` in the
    /// client API (spec §6.1).
    pub fn kind_to_name(&self) -> &'static str {
        match self {
            ApiError::DeviceInvalid(_) => "DeviceInvalid",
            ApiError::NotSupported => "NotSupported",
            ApiError::NotInitialized => "NotInitialized",
            ApiError::InvalidParameter(_) => "InvalidParameter",
            ApiError::OutOfRange(_) => "OutOfRange",
            ApiError::OutOfMemory => "OutOfMemory",
            ApiError::Decode(e) => e.kind_to_name(),
            ApiError::Submit(e) => e.kind_to_name(),
            ApiError::Session(e) => e.kind_to_name(),
            ApiError::Export(e) => e.kind_to_name(),
            ApiError::Eof => "Eof",
        }
    }
}

/// Per-picture bitstream errors. These stay inside the parser: `feed` logs
/// them and drops the offending picture, continuing with the next one,
/// except when the whole stream is unrecoverable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("bitstream truncated: needed {needed} more bits, had {available}")]
    BitstreamTruncated { needed: u32, available: u32 },
    #[error("invalid bitstream format: {0}")]
    InvalidFormat(&'static str),
    #[error("slice references missing parameter set id {0}")]
    MissingParameterSet(u32),
    #[error("no start code found within {0} buffered bytes")]
    NoStartCode(usize),
}

impl DecodeError {
    pub fn kind_to_name(&self) -> &'static str {
        match self {
            DecodeError::BitstreamTruncated { .. } => "BitstreamTruncated",
            DecodeError::InvalidFormat(_) => "InvalidFormat",
            DecodeError::MissingParameterSet(_) => "MissingParameterSet",
            DecodeError::NoStartCode(_) => "NoStartCode",
        }
    }
}

/// Per-submission errors. The surface slot for the failing picture is
/// always freed by the caller of this error (spec §4.5, "submission is
/// atomic").
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("backend rejected decode submission: {0}")]
    DecodeSubmitFailed(String),
    #[error("backend runtime error: {0}")]
    RuntimeError(#[from] anyhow::Error),
    #[error("no free surface slot available")]
    PoolExhausted,
}

impl SubmitError {
    pub fn kind_to_name(&self) -> &'static str {
        match self {
            SubmitError::DecodeSubmitFailed(_) => "DecodeSubmitFailed",
            SubmitError::RuntimeError(_) => "RuntimeError",
            SubmitError::PoolExhausted => "PoolExhausted",
        }
    }
}

/// Decoder session / configuration errors.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("codec/chroma/bit-depth combination not supported by this device")]
    NotSupported,
    #[error("device {0} is invalid")]
    DeviceInvalid(i32),
    #[error("out of memory creating decoder resources")]
    OutOfMemory,
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("reconfigure requested while pictures are in flight")]
    ReconfigureWhileInFlight,
    #[error("reconfigure changes codec/bit-depth/chroma-format, which requires destroy+recreate")]
    ReconfigureNotAllowed,
}

impl SessionError {
    pub fn kind_to_name(&self) -> &'static str {
        match self {
            SessionError::NotSupported => "NotSupported",
            SessionError::DeviceInvalid(_) => "DeviceInvalid",
            SessionError::OutOfMemory => "OutOfMemory",
            SessionError::InvalidParameter(_) => "InvalidParameter",
            SessionError::ReconfigureWhileInFlight => "ReconfigureWhileInFlight",
            SessionError::ReconfigureNotAllowed => "ReconfigureNotAllowed",
        }
    }
}

/// Surface export / compute-runtime interop errors.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("backend runtime error: {0}")]
    RuntimeError(#[from] anyhow::Error),
    #[error("slot already has an active export")]
    AlreadyMapped,
    #[error("slot has no active export to unmap")]
    NotMapped,
}

impl ExportError {
    pub fn kind_to_name(&self) -> &'static str {
        match self {
            ExportError::InvalidParameter(_) => "InvalidParameter",
            ExportError::RuntimeError(_) => "RuntimeError",
            ExportError::AlreadyMapped => "AlreadyMapped",
            ExportError::NotMapped => "NotMapped",
        }
    }
}

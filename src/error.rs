// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for MXL operations.
//!
//! This module defines the error taxonomy shared by all MXL API calls. Race
//! conditions between readers and the writer are reported as typed
//! out-of-range errors so that callers can decide whether to wait, reset
//! their index, or surface the condition.

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur when using the MXL API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested flow ID does not exist in the domain.
    #[error("Flow not found")]
    FlowNotFound,

    /// The flow was destroyed or re-created while a handle to it was still
    /// open. The handle must be re-opened against the new flow.
    #[error("Flow invalid")]
    FlowInvalid,

    /// Attempted to read data that is no longer available in the ring buffer
    /// (has been overwritten by newer data).
    #[error("Out of range - too late")]
    OutOfRangeTooLate,

    /// Attempted to read data that is not yet available in the ring buffer
    /// (index is ahead of the current head).
    #[error("Out of range - too early")]
    OutOfRangeTooEarly,

    /// A blocking operation timed out before completing.
    #[error("Timeout")]
    Timeout,

    /// An argument passed to an MXL function was invalid.
    #[error("Invalid argument")]
    InvalidArg,

    /// A flow definition failed to parse or validate.
    #[error("Invalid flow definition: {0}")]
    InvalidFlowDef(String),

    /// The domain directory is not writable by the calling process.
    #[error("Permission denied")]
    PermissionDenied,

    /// A resource conflict occurred (e.g., a second writer attached to a flow
    /// that already has one).
    #[error("Conflict")]
    Conflict,

    /// An unexpected operating system failure (mmap, I/O, out of memory).
    #[error("Internal error: {0}")]
    Internal(#[source] std::io::Error),

    /// A generic error for failures not covered by the typed variants.
    #[error("Other error: {0}")]
    Other(String),
}

impl From<std::io::Error> for Error {
    /// Maps an I/O error to the MXL taxonomy.
    ///
    /// Permission and not-found conditions keep their typed variants; every
    /// other kind is an internal failure.
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied,
            std::io::ErrorKind::NotFound => Error::FlowNotFound,
            _ => Error::Internal(error),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::InvalidFlowDef(error.to_string())
    }
}

// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Grain writer implementation for discrete media flows.

use std::sync::atomic::Ordering;

use crate::flow::writer::WriterSession;
use crate::flow::{FlowConfigInfo, FlowInfo, FlowRuntimeInfo};
use crate::time::UNDEFINED_INDEX;
use crate::{Error, GrainWriteAccess, Result};

/// Writer for discrete media grains (video frames, data packets).
///
/// Provides zero-copy write access to the grain ring. Each grain goes
/// through an open/fill/commit cycle driven by a [`GrainWriteAccess`]
/// session; nothing becomes visible to readers before the first commit.
///
/// The writer owns the flow's exclusive writer lock for as long as it lives.
///
/// # Thread Safety
///
/// `GrainWriter` is `Send`; a flow has a single writer and that writer should
/// be driven by one thread.
///
/// # Examples
///
/// ```no_run
/// # use mxl::{MxlInstance, GrainWriter};
/// # fn example(instance: MxlInstance, mut writer: GrainWriter) -> Result<(), mxl::Error> {
/// let rate = writer.get_config_info()?.common().grain_rate()?;
/// let index = instance.get_current_index(&rate);
///
/// let mut access = writer.open_grain(index)?;
/// access.payload_mut().fill(42);
/// access.commit()?;
/// # Ok(())
/// # }
/// ```
pub struct GrainWriter {
    session: WriterSession,
}

impl GrainWriter {
    /// Creates a new grain writer (internal use only).
    pub(crate) fn new(session: WriterSession) -> Self {
        Self { session }
    }

    /// Explicitly releases this writer, dropping the writer lock and the
    /// liveness token.
    pub fn destroy(self) -> Result<()> {
        Ok(())
    }

    /// Retrieves complete flow information (config + runtime).
    pub fn get_info(&self) -> Result<FlowInfo> {
        Ok(FlowInfo {
            config: self.session.mapping().config_info(),
            runtime: self.session.mapping().runtime_info(),
        })
    }

    /// Retrieves flow configuration (format, rate, ring geometry).
    pub fn get_config_info(&self) -> Result<FlowConfigInfo> {
        Ok(self.session.mapping().config_info())
    }

    /// Retrieves flow runtime state (head index, last access times).
    pub fn get_runtime_info(&self) -> Result<FlowRuntimeInfo> {
        Ok(self.session.mapping().runtime_info())
    }

    /// Opens the grain at `index` for writing.
    ///
    /// Locates the ring slot `index % grain_count`, stamps it with the new
    /// index and zero valid slices, and returns a write session exposing the
    /// slot's payload. Nothing is published until the session commits.
    ///
    /// The mutable borrow ensures a writer fills one grain at a time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArg`] if `index` is the undefined sentinel.
    pub fn open_grain(&mut self, index: u64) -> Result<GrainWriteAccess<'_>> {
        if index == UNDEFINED_INDEX {
            return Err(Error::InvalidArg);
        }
        let header = self.session.mapping().header();
        let slot = index % header.buffer_length as u64;
        let info = self.session.mapping().grain_info(slot);

        // Readers ignore this slot until head_index covers the new index, so
        // the stores only need to be ordered against the upcoming commit.
        info.flags.store(0, Ordering::Relaxed);
        info.valid_slices.store(0, Ordering::Relaxed);
        info.index.store(index, Ordering::Release);

        Ok(GrainWriteAccess::new(
            &self.session,
            slot,
            index,
            header.grain_size,
            header.total_slices,
            header.max_commit_batch_size_hint,
        ))
    }
}

// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Sample writer implementation for continuous media flows.

use crate::flow::writer::WriterSession;
use crate::flow::{FlowConfigInfo, FlowInfo, FlowRuntimeInfo};
use crate::samples::data::wrapped_slice_geometry;
use crate::samples::write_access::SamplesWriteAccess;
use crate::time::UNDEFINED_INDEX;
use crate::{Error, Result};

/// Writer for continuous audio sample streams.
///
/// Provides zero-copy write access to the per-channel sample rings. Samples
/// are written in batches addressed by the index of the batch's **last**
/// sample, through [`SamplesWriteAccess`] sessions.
///
/// The writer owns the flow's exclusive writer lock for as long as it lives.
///
/// # Examples
///
/// ```no_run
/// # use mxl::{MxlInstance, SamplesWriter};
/// # fn example(instance: MxlInstance, mut writer: SamplesWriter) -> Result<(), mxl::Error> {
/// let rate = writer.get_config_info()?.common().sample_rate()?;
/// let index = instance.get_current_index(&rate);
///
/// // Open a batch of 480 samples (10 ms at 48 kHz) ending at `index`
/// let mut access = writer.open_samples(index, 480)?;
/// for ch in 0..access.channels() {
///     let (frag1, frag2) = access.channel_data_mut(ch)?;
///     frag1.fill(0x00);
///     frag2.fill(0x00);
/// }
/// access.commit()?;
/// # Ok(())
/// # }
/// ```
pub struct SamplesWriter {
    session: WriterSession,
}

impl SamplesWriter {
    /// Creates a new samples writer (internal use only).
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

    /// Opens the `count` samples ending at `index` for writing.
    ///
    /// Returns a [`SamplesWriteAccess`] session exposing up to two
    /// contiguous fragments per channel (split where the ring wraps).
    /// Nothing becomes visible to readers until the session commits, and a
    /// commit never moves the head index backwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArg`] if `count` is zero, reaches below index
    /// 0, or exceeds half the ring (larger batches could never be read back
    /// safely).
    pub fn open_samples(&mut self, index: u64, count: usize) -> Result<SamplesWriteAccess<'_>> {
        let header = self.session.mapping().header();
        if count == 0
            || index == UNDEFINED_INDEX
            || (index as u128 + 1) < count as u128
            || count as u64 > header.buffer_length as u64 / 2
        {
            return Err(Error::InvalidArg);
        }
        let geometry = wrapped_slice_geometry(
            header.buffer_length,
            header.sample_word_size,
            header.channel_count,
            index,
            count,
        );
        Ok(SamplesWriteAccess::new(&self.session, geometry, index))
    }
}

// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Sample reader implementation for continuous media flows.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::flow::mapping::FlowMapping;
use crate::flow::{FlowConfigInfo, FlowInfo, FlowRuntimeInfo};
use crate::samples::data::{SamplesData, wrapped_slice_geometry};
use crate::time::{self, UNDEFINED_INDEX};
use crate::{Error, Result};

/// Sleep interval between polls while waiting for samples.
const SPIN_SLEEP_NS: u64 = 100_000;

/// Reader for continuous audio sample streams.
///
/// Provides zero-copy access to arbitrary sample ranges in the per-channel
/// ring buffers. A range is addressed by the index of its **last** sample
/// and its length.
///
/// Only the most recent half of the ring is guaranteed race-free against a
/// writer wrapping around; older ranges are reported as too late. Position
/// consumers close to the head.
///
/// # Examples
///
/// ```no_run
/// # use mxl::{MxlInstance, SamplesReader};
/// # use std::time::Duration;
/// # fn example(instance: MxlInstance, reader: SamplesReader) -> Result<(), mxl::Error> {
/// let info = reader.get_config_info()?;
/// let rate = info.common().sample_rate()?;
/// let index = instance.get_current_index(&rate);
///
/// // Read 480 samples (10 ms at 48 kHz) ending at the current index
/// let samples = reader.get_samples(index, 480, Duration::from_millis(50))?;
/// for ch in 0..samples.num_of_channels() {
///     let (frag1, frag2) = samples.channel_data(ch)?;
///     println!("Channel {}: {} + {} bytes", ch, frag1.len(), frag2.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct SamplesReader {
    mapping: Arc<FlowMapping>,
}

impl SamplesReader {
    /// Creates a new samples reader (internal use only).
    pub(crate) fn new(mapping: Arc<FlowMapping>) -> Self {
        Self { mapping }
    }

    /// Explicitly releases this reader.
    pub fn destroy(self) -> Result<()> {
        Ok(())
    }

    /// Retrieves complete flow information (config + runtime).
    pub fn get_info(&self) -> Result<FlowInfo> {
        Ok(FlowInfo {
            config: self.mapping.config_info(),
            runtime: self.mapping.runtime_info(),
        })
    }

    /// Retrieves flow configuration (format, rate, ring geometry).
    pub fn get_config_info(&self) -> Result<FlowConfigInfo> {
        Ok(self.mapping.config_info())
    }

    /// Retrieves flow runtime state (head index, last access times).
    pub fn get_runtime_info(&self) -> Result<FlowRuntimeInfo> {
        Ok(self.mapping.runtime_info())
    }

    /// Retrieves the `count` samples ending at `index`, blocking up to
    /// `timeout` for the writer to produce them.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfRangeTooEarly`] if the range is not produced within
    ///   `timeout`
    /// - [`Error::OutOfRangeTooLate`] if any part of the range has left the
    ///   safe (most recent half) window of the ring
    /// - [`Error::FlowInvalid`] if the flow was destroyed or re-created
    /// - [`Error::InvalidArg`] if `count` is zero or reaches below index 0
    pub fn get_samples(
        &self,
        index: u64,
        count: usize,
        timeout: Duration,
    ) -> Result<SamplesData<'_>> {
        let deadline = time::current_time().saturating_add(timeout.as_nanos() as u64);
        let produced_at = time::index_to_timestamp(&self.mapping.header().rate(), index);

        loop {
            match self.get_samples_non_blocking(index, count) {
                Err(Error::OutOfRangeTooEarly) => {
                    // Not yet produced. Don't wait for ranges that cannot
                    // become current before the deadline either.
                    let now = time::current_time();
                    if now >= deadline
                        || (produced_at != UNDEFINED_INDEX
                            && produced_at.saturating_sub(now) > deadline.saturating_sub(now))
                    {
                        return self.fail(Error::OutOfRangeTooEarly);
                    }
                    time::sleep_for_ns(SPIN_SLEEP_NS);
                }
                result => return result,
            }
        }
    }

    /// Retrieves the `count` samples ending at `index` without blocking.
    ///
    /// # Errors
    ///
    /// As [`Self::get_samples`], with [`Error::OutOfRangeTooEarly`] returned
    /// immediately when the range extends beyond the head.
    pub fn get_samples_non_blocking(&self, index: u64, count: usize) -> Result<SamplesData<'_>> {
        if count == 0 || index == UNDEFINED_INDEX || (index as u128 + 1) < count as u128 {
            return Err(Error::InvalidArg);
        }
        if self.mapping.is_marked_invalid() {
            return Err(Error::FlowInvalid);
        }

        let header = self.mapping.header();
        let buffer_length = header.buffer_length;
        let head = header.head_index.load(Ordering::Acquire);

        if head == 0 || index > head {
            return self.fail(Error::OutOfRangeTooEarly);
        }

        // Only the most recent half of the ring is safe to read without
        // racing a wrapping writer.
        let min_index = head.saturating_sub(buffer_length as u64 / 2);
        if index < min_index || (index - min_index) < count as u64 {
            return self.fail(Error::OutOfRangeTooLate);
        }

        let geometry = wrapped_slice_geometry(
            buffer_length,
            header.sample_word_size,
            header.channel_count,
            index,
            count,
        );
        self.mapping.touch_read();
        Ok(SamplesData::new(self.mapping.channel_base_ptr(), geometry))
    }

    /// Downgrades a race classification to [`Error::FlowInvalid`] when the
    /// flow has been destroyed or superseded underneath this reader.
    fn fail<T>(&self, error: Error) -> Result<T> {
        if self.mapping.is_valid() {
            Err(error)
        } else {
            Err(Error::FlowInvalid)
        }
    }
}

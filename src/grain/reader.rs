// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Grain reader implementation for discrete media flows.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::flow::mapping::FlowMapping;
use crate::flow::{FlowConfigInfo, FlowInfo, FlowRuntimeInfo};
use crate::time::{self, UNDEFINED_INDEX};
use crate::{Error, GrainData, Result};

/// Sleep interval between polls while waiting for a grain.
const SPIN_SLEEP_NS: u64 = 100_000;

/// Reader for discrete media grains (video frames, data packets).
///
/// Provides zero-copy access to grains stored in MXL's ring buffer. Grains
/// are accessed by index, and reads can be blocking (with timeout) or
/// non-blocking. Each read races the single writer independently; the typed
/// out-of-range errors tell the caller which side of the ring window it
/// missed.
///
/// # Thread Safety
///
/// `GrainReader` is `Send`; each reader should be driven by one thread at a
/// time.
///
/// # Examples
///
/// ```no_run
/// # use mxl::{MxlInstance, GrainReader};
/// # use std::time::Duration;
/// # fn example(instance: MxlInstance, reader: GrainReader) -> Result<(), mxl::Error> {
/// let info = reader.get_config_info()?;
/// let rate = info.common().grain_rate()?;
/// let index = instance.get_current_index(&rate);
///
/// // Blocking read with a one-frame timeout
/// let grain = reader.get_grain(index, Duration::from_millis(20))?;
/// println!("Read {} of {} bytes", grain.valid_payload().len(), grain.total_size);
/// # Ok(())
/// # }
/// ```
pub struct GrainReader {
    mapping: Arc<FlowMapping>,
}

impl GrainReader {
    /// Creates a new grain reader (internal use only).
    pub(crate) fn new(mapping: Arc<FlowMapping>) -> Self {
        Self { mapping }
    }

    /// Explicitly releases this reader.
    ///
    /// Dropping the reader has the same effect; this method exists for
    /// callers that want the release to be visible in the code.
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
    ///
    /// Useful for checking how much data is available before reading.
    pub fn get_runtime_info(&self) -> Result<FlowRuntimeInfo> {
        Ok(self.mapping.runtime_info())
    }

    /// Reads the grain at `index`, blocking up to `timeout` for it to be
    /// produced.
    ///
    /// Returns as soon as the grain has been committed at least once, which
    /// may be a partial grain (`valid_slices < total_slices`) when the writer
    /// publishes slice batches. Use [`Self::get_complete_grain`] to wait for
    /// a full grain.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfRangeTooEarly`] if the grain is not expected to be
    ///   produced within `timeout`, or still has not appeared when the
    ///   timeout expires
    /// - [`Error::OutOfRangeTooLate`] if the ring has already wrapped past
    ///   the grain
    /// - [`Error::Timeout`] if the index was skipped by the writer and never
    ///   materialized before the deadline
    /// - [`Error::FlowInvalid`] if the flow was destroyed or re-created
    pub fn get_grain(&self, index: u64, timeout: Duration) -> Result<GrainData<'_>> {
        if index == UNDEFINED_INDEX {
            return Err(Error::InvalidArg);
        }
        let header = self.mapping.header();
        let timeout_ns = timeout.as_nanos() as u64;
        let deadline = time::current_time().saturating_add(timeout_ns);
        let produced_at = time::index_to_timestamp(&header.rate(), index);

        loop {
            if self.mapping.is_marked_invalid() {
                return Err(Error::FlowInvalid);
            }
            let head = header.head_index.load(Ordering::Acquire);
            let buffer_length = header.buffer_length as u64;

            if head == 0 || index > head {
                // Not yet produced. If the index cannot become current before
                // the deadline either (the writer paces against the wall
                // clock), don't wait it out.
                let now = time::current_time();
                if produced_at != UNDEFINED_INDEX && produced_at.saturating_sub(now) > deadline.saturating_sub(now)
                {
                    return self.fail(Error::OutOfRangeTooEarly);
                }
                if now >= deadline {
                    return self.fail(Error::OutOfRangeTooEarly);
                }
                time::sleep_for_ns(SPIN_SLEEP_NS);
                continue;
            }

            let min_index = head.saturating_sub(buffer_length - 1);
            if index < min_index {
                return self.fail(Error::OutOfRangeTooLate);
            }

            let info = self.mapping.grain_info(index % buffer_length);
            let slot_index = info.index.load(Ordering::Acquire);
            if slot_index == index {
                let grain = self.snapshot(index, info);
                self.mapping.touch_read();
                return Ok(grain);
            }
            if slot_index != UNDEFINED_INDEX && slot_index > index {
                // The slot already carries a newer generation.
                return self.fail(Error::OutOfRangeTooLate);
            }

            // The head covers this index but the slot is stale: the writer
            // skipped it. Keep polling until the deadline in case it appears.
            if time::current_time() >= deadline {
                return self.fail(Error::Timeout);
            }
            time::sleep_for_ns(SPIN_SLEEP_NS);
        }
    }

    /// Reads the grain at `index` and waits until it is complete.
    ///
    /// Retries while the writer is still publishing slice batches; returns
    /// once `valid_slices == total_slices` or the timeout expires.
    ///
    /// # Errors
    ///
    /// As [`Self::get_grain`], plus [`Error::Timeout`] if the grain never
    /// completes within `timeout`.
    pub fn get_complete_grain(&self, index: u64, timeout: Duration) -> Result<GrainData<'_>> {
        let deadline = time::current_time().saturating_add(timeout.as_nanos() as u64);
        loop {
            let remaining = deadline.saturating_sub(time::current_time());
            let grain = self.get_grain(index, Duration::from_nanos(remaining))?;
            if grain.is_complete() {
                return Ok(grain);
            }
            if time::current_time() >= deadline {
                return Err(Error::Timeout);
            }
            time::sleep_for_ns(SPIN_SLEEP_NS);
        }
    }

    /// Reads a grain without blocking (may return partial data).
    ///
    /// Unlike [`Self::get_grain`], this returns immediately and classifies an
    /// unproduced index as [`Error::OutOfRangeTooEarly`].
    pub fn get_grain_non_blocking(&self, index: u64) -> Result<GrainData<'_>> {
        if index == UNDEFINED_INDEX {
            return Err(Error::InvalidArg);
        }
        if self.mapping.is_marked_invalid() {
            return Err(Error::FlowInvalid);
        }
        let header = self.mapping.header();
        let head = header.head_index.load(Ordering::Acquire);
        let buffer_length = header.buffer_length as u64;

        if head == 0 || index > head {
            return self.fail(Error::OutOfRangeTooEarly);
        }
        let min_index = head.saturating_sub(buffer_length - 1);
        if index < min_index {
            return self.fail(Error::OutOfRangeTooLate);
        }

        let info = self.mapping.grain_info(index % buffer_length);
        let slot_index = info.index.load(Ordering::Acquire);
        if slot_index == index {
            let grain = self.snapshot(index, info);
            self.mapping.touch_read();
            return Ok(grain);
        }
        if slot_index != UNDEFINED_INDEX && slot_index > index {
            self.fail(Error::OutOfRangeTooLate)
        } else {
            self.fail(Error::OutOfRangeTooEarly)
        }
    }

    /// Builds the zero-copy grain view after the acquire load that made the
    /// payload visible.
    fn snapshot(&self, index: u64, info: &crate::layout::GrainInfo) -> GrainData<'_> {
        let header = self.mapping.header();
        let valid_slices = info.valid_slices.load(Ordering::Acquire);
        let flags = info.flags.load(Ordering::Acquire);
        let grain_size = info.grain_size as usize;
        let slice_length: u32 = header.slice_sizes.iter().sum();
        let valid_length = (valid_slices as usize * slice_length as usize).min(grain_size);

        // The mapping lives as long as this reader, so the payload slice is
        // valid for the returned lifetime. It may be overwritten by a later
        // generation, which readers detect through the index check.
        let payload = unsafe {
            std::slice::from_raw_parts(
                self.mapping.grain_payload_ptr(index % header.buffer_length as u64),
                grain_size,
            )
        };
        GrainData {
            payload,
            total_size: grain_size,
            flags,
            index,
            valid_slices,
            total_slices: info.total_slices,
            valid_length,
        }
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

// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! RAII sample write access for safe zero-copy audio writing.

use std::sync::atomic::Ordering;

use tracing::debug;

use crate::flow::writer::WriterSession;
use crate::samples::data::WrappedSliceGeometry;
use crate::time;
use crate::{Error, Result};

/// RAII-protected audio sample writing session.
///
/// Provides mutable access to the opened sample range of every channel, as
/// up to two contiguous fragments where the ring wraps. Committing advances
/// the flow's head index to the end of the range; an abandoned session
/// publishes nothing.
///
/// The lifetime `'a` is tied to the [`crate::SamplesWriter`] that created
/// this session, which also guarantees a single open range per writer.
///
/// # Examples
///
/// ```no_run
/// # use mxl::SamplesWriter;
/// # fn example(mut writer: SamplesWriter) -> Result<(), mxl::Error> {
/// let mut access = writer.open_samples(1000, 480)?;
///
/// for ch in 0..access.channels() {
///     let (frag1, frag2) = access.channel_data_mut(ch)?;
///     frag1.fill(0x42);
///     frag2.fill(0x42);
/// }
///
/// access.commit()?;
/// # Ok(())
/// # }
/// ```
pub struct SamplesWriteAccess<'a> {
    session: &'a WriterSession,
    geometry: WrappedSliceGeometry,
    end_index: u64,
    committed_or_canceled: bool,
}

impl<'a> SamplesWriteAccess<'a> {
    /// Creates a new samples write session (internal use only).
    pub(crate) fn new(
        session: &'a WriterSession,
        geometry: WrappedSliceGeometry,
        end_index: u64,
    ) -> Self {
        Self {
            session,
            geometry,
            end_index,
            committed_or_canceled: false,
        }
    }

    /// Returns the number of audio channels.
    pub fn channels(&self) -> usize {
        self.geometry.channels
    }

    /// The absolute index of the last sample in the opened range.
    pub fn end_index(&self) -> u64 {
        self.end_index
    }

    /// Returns mutable access to a specific channel's sample range.
    ///
    /// Each channel's range is returned as two mutable byte slices
    /// (fragments). If the range does not wrap the ring, the second fragment
    /// is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArg`] if `channel >= channels()`.
    pub fn channel_data_mut(&mut self, channel: usize) -> Result<(&mut [u8], &mut [u8])> {
        if channel >= self.geometry.channels {
            return Err(Error::InvalidArg);
        }
        // The opened range belongs to this writer until commit, and the two
        // fragments never overlap.
        unsafe {
            let channel_base = self
                .session
                .mapping()
                .channel_base_ptr()
                .add(self.geometry.stride * channel);
            Ok((
                std::slice::from_raw_parts_mut(
                    channel_base.add(self.geometry.frag0_offset),
                    self.geometry.frag0_len,
                ),
                std::slice::from_raw_parts_mut(channel_base, self.geometry.frag1_len),
            ))
        }
    }

    /// Commits the samples, making them visible to readers.
    ///
    /// Advances the head index to the last sample of the range with release
    /// ordering, publishing every byte written into the fragments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArg`] if the commit would move the head index
    /// backwards.
    pub fn commit(mut self) -> Result<()> {
        self.committed_or_canceled = true;

        let header = self.session.mapping().header();
        if self.end_index < header.head_index.load(Ordering::Acquire) {
            return Err(Error::InvalidArg);
        }
        header.head_index.store(self.end_index, Ordering::Release);
        self.session.record_commit(time::current_time());
        Ok(())
    }

    /// Cancels the sample write operation without committing.
    ///
    /// The fragments may still contain the written bytes in shared memory,
    /// but the head index does not advance, so readers never see them.
    pub fn cancel(mut self) {
        self.committed_or_canceled = true;
    }
}

impl Drop for SamplesWriteAccess<'_> {
    /// An abandoned session behaves like [`Self::cancel`].
    fn drop(&mut self) {
        if !self.committed_or_canceled {
            debug!(
                end_index = self.end_index,
                "sample write session dropped without commit"
            );
        }
    }
}

// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! RAII grain write access for safe zero-copy writing.

use std::sync::atomic::Ordering;

use tracing::debug;

use crate::flow::writer::WriterSession;
use crate::time;
use crate::{Error, Result};

/// RAII-protected grain writing session.
///
/// Provides mutable access to a grain's payload buffer for zero-copy
/// writing. Slices can be published progressively with
/// [`Self::commit_slices`]; [`Self::commit`] publishes the complete grain.
/// An abandoned session publishes nothing: the slot stays stamped but the
/// head index never moves to it.
///
/// The lifetime `'a` is tied to the [`crate::GrainWriter`] that created this
/// session, which also guarantees a single open grain per writer.
///
/// # Examples
///
/// ```no_run
/// # use mxl::GrainWriter;
/// # fn example(mut writer: GrainWriter) -> Result<(), mxl::Error> {
/// let mut access = writer.open_grain(100)?;
///
/// // Fill grain with data
/// access.payload_mut().fill(42);
///
/// // Publish everything at once
/// access.commit()?;
/// # Ok(())
/// # }
/// ```
pub struct GrainWriteAccess<'a> {
    session: &'a WriterSession,
    slot: u64,
    index: u64,
    grain_size: u32,
    total_slices: u32,
    batch_hint: u32,
    flags: u32,
    committed_slices: u32,
    finished: bool,
}

impl<'a> GrainWriteAccess<'a> {
    /// Creates a new grain write session (internal use only).
    pub(crate) fn new(
        session: &'a WriterSession,
        slot: u64,
        index: u64,
        grain_size: u32,
        total_slices: u32,
        batch_hint: u32,
    ) -> Self {
        Self {
            session,
            slot,
            index,
            grain_size,
            total_slices,
            batch_hint,
            flags: 0,
            committed_slices: 0,
            finished: false,
        }
    }

    /// The absolute index of the grain being written.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Returns mutable access to the grain's payload buffer.
    ///
    /// This provides zero-copy write access to the shared memory ring
    /// buffer. Modifications become visible to readers once committed.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        // The slot payload belongs to this writer until the grain index
        // advances past it, which cannot happen while this session borrows
        // the writer.
        unsafe {
            std::slice::from_raw_parts_mut(
                self.session.mapping().grain_payload_ptr(self.slot),
                self.grain_size as usize,
            )
        }
    }

    /// Returns the maximum size of the grain payload in bytes.
    pub fn max_size(&self) -> u32 {
        self.grain_size
    }

    /// Returns the total number of slices in this grain.
    pub fn total_slices(&self) -> u32 {
        self.total_slices
    }

    /// Sets the grain flags published with the next commit (e.g.
    /// [`crate::layout::GRAIN_FLAG_INVALID`] to signal corrupt payload).
    pub fn set_flags(&mut self, flags: u32) {
        self.flags = flags;
    }

    /// Progressively publishes the grain up to `valid_slices` slices.
    ///
    /// Readers polling the grain observe `valid_slices` growing with each
    /// call; the head index moves to this grain on the first commit. The
    /// session stays open until `valid_slices` reaches the total, so a frame
    /// can be pushed line batch by line batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArg`] if `valid_slices` regresses, or is not a
    /// multiple of the flow's commit batch size hint (the final batch, which
    /// tops up to `total_slices`, is exempt). Exceeding `total_slices` is
    /// also rejected.
    pub fn commit_slices(&mut self, valid_slices: u32) -> Result<()> {
        if self.finished {
            return Err(Error::InvalidArg);
        }
        if valid_slices > self.total_slices {
            return Err(Error::Other(format!(
                "Valid slices {valid_slices} cannot exceed total slices {}.",
                self.total_slices
            )));
        }
        if valid_slices < self.committed_slices {
            return Err(Error::InvalidArg);
        }
        if valid_slices != self.total_slices && valid_slices % self.batch_hint != 0 {
            return Err(Error::InvalidArg);
        }

        let mapping = self.session.mapping();
        let info = mapping.grain_info(self.slot);
        let now = time::current_time();

        info.flags.store(self.flags, Ordering::Relaxed);
        info.commit_time.store(now, Ordering::Relaxed);
        // The release store of valid_slices publishes every payload byte
        // written before this call; head_index release-publishes the grain
        // itself.
        info.valid_slices.store(valid_slices, Ordering::Release);
        mapping
            .header()
            .head_index
            .fetch_max(self.index, Ordering::AcqRel);
        self.session.record_commit(now);

        self.committed_slices = valid_slices;
        if valid_slices == self.total_slices {
            self.finished = true;
        }
        Ok(())
    }

    /// Commits the complete grain, making every slice visible to readers.
    pub fn commit(mut self) -> Result<()> {
        self.commit_slices(self.total_slices)
    }

    /// Cancels the grain write operation without publishing anything
    /// further.
    ///
    /// Slices already published through [`Self::commit_slices`] remain
    /// visible; an entirely uncommitted grain is never observed by readers
    /// because the head index never moved to it.
    pub fn cancel(mut self) {
        self.finished = true;
    }
}

impl Drop for GrainWriteAccess<'_> {
    /// An abandoned session behaves like [`Self::cancel`].
    fn drop(&mut self) {
        if !self.finished && self.committed_slices == 0 {
            debug!(index = self.index, "grain write session dropped without commit");
        }
    }
}

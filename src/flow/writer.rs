// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Generic flow writer implementation.
//!
//! Provides [`FlowWriter`], a type-erased writer that can be converted to
//! either [`crate::GrainWriter`] or [`crate::SamplesWriter`] based on the
//! flow format, and the shared [`WriterSession`] that keeps the writer lock
//! and liveness token alive for whichever typed writer ends up owning it.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use uuid::Uuid;

use crate::flow::is_discrete_data_format;
use crate::flow::mapping::FlowMapping;
use crate::lock::WriterLock;
use crate::time;
use crate::{DataFormat, Error, GrainWriter, Result, SamplesWriter};

/// The active writer's hold on a flow: the exclusive lock plus the published
/// liveness token.
///
/// Dropping the session clears the nonce and releases the lock, which is how
/// `is_flow_active` observes the writer going away.
pub(crate) struct WriterSession {
    mapping: Arc<FlowMapping>,
    _lock: WriterLock,
}

impl WriterSession {
    /// Publishes the writer-alive nonce and heartbeat and returns the
    /// session guard.
    pub fn start(mapping: Arc<FlowMapping>, lock: WriterLock) -> Self {
        let nonce = (Uuid::new_v4().as_u128() as u64) | 1;
        let header = mapping.header();
        header.writer_nonce.store(nonce, Ordering::Release);
        header
            .writer_heartbeat
            .store(time::current_time(), Ordering::Release);
        Self {
            mapping,
            _lock: lock,
        }
    }

    /// The mapped flow this session writes to.
    pub fn mapping(&self) -> &Arc<FlowMapping> {
        &self.mapping
    }

    /// Records producer activity: commit bookkeeping shared by both flow
    /// kinds (`last_write_time`, heartbeat, sync counter).
    pub fn record_commit(&self, now: u64) {
        let header = self.mapping.header();
        header.last_write_time.store(now, Ordering::Release);
        header.writer_heartbeat.store(now, Ordering::Release);
        header.sync_counter.fetch_add(1, Ordering::AcqRel);
    }
}

impl Drop for WriterSession {
    fn drop(&mut self) {
        self.mapping.header().writer_nonce.store(0, Ordering::Release);
    }
}

/// Generic flow writer handle.
///
/// This is the initial writer type returned by
/// [`crate::MxlInstance::create_flow_writer`]. It must be converted to a
/// typed writer ([`GrainWriter`] or [`SamplesWriter`]) using the appropriate
/// conversion method based on the flow's data format.
///
/// While any writer handle exists the flow's writer lock is held; a second
/// `create_flow_writer` on the same flow fails with [`Error::Conflict`].
///
/// # Examples
///
/// ```no_run
/// # use mxl::MxlInstance;
/// # fn example(instance: MxlInstance) -> Result<(), mxl::Error> {
/// let writer = instance.create_flow_writer("flow-uuid")?;
///
/// let info = writer.get_info()?;
/// if info.config.is_discrete_flow() {
///     let grain_writer = writer.to_grain_writer()?;
///     // Use grain_writer for video/data
/// } else {
///     let samples_writer = writer.to_samples_writer()?;
///     // Use samples_writer for audio
/// }
/// # Ok(())
/// # }
/// ```
pub struct FlowWriter {
    session: Option<WriterSession>,
    id: Uuid,
}

impl FlowWriter {
    /// Creates a new flow writer (internal use only).
    pub(crate) fn new(session: WriterSession, id: Uuid) -> Self {
        Self {
            session: Some(session),
            id,
        }
    }

    /// The UUID of the flow this writer is attached to.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Retrieves complete flow information (config + runtime).
    pub fn get_info(&self) -> Result<crate::flow::FlowInfo> {
        let session = self.session.as_ref().ok_or(Error::InvalidArg)?;
        Ok(crate::flow::FlowInfo {
            config: session.mapping().config_info(),
            runtime: session.mapping().runtime_info(),
        })
    }

    /// Converts this generic writer into a [`GrainWriter`] for discrete
    /// flows.
    ///
    /// # Errors
    ///
    /// Returns an error if the flow is continuous (audio).
    pub fn to_grain_writer(mut self) -> Result<GrainWriter> {
        let session = self.session.take().ok_or(Error::InvalidArg)?;
        let format = session.mapping().header().format;
        if !is_discrete_data_format(format) {
            return Err(Error::Other(format!(
                "Cannot convert FlowWriter to GrainWriter for continuous flow of type \"{:?}\".",
                DataFormat::from(format)
            )));
        }
        Ok(GrainWriter::new(session))
    }

    /// Converts this generic writer into a [`SamplesWriter`] for continuous
    /// flows.
    ///
    /// # Errors
    ///
    /// Returns an error if the flow is discrete (video/data).
    pub fn to_samples_writer(mut self) -> Result<SamplesWriter> {
        let session = self.session.take().ok_or(Error::InvalidArg)?;
        let format = session.mapping().header().format;
        if is_discrete_data_format(format) {
            return Err(Error::Other(format!(
                "Cannot convert FlowWriter to SamplesWriter for discrete flow of type \"{:?}\".",
                DataFormat::from(format)
            )));
        }
        Ok(SamplesWriter::new(session))
    }
}

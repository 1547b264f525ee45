// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! MXL instance management and core domain operations.
//!
//! This module provides [`MxlInstance`], the main entry point for interacting
//! with an MXL domain. An instance represents a binding to a shared memory
//! domain directory and provides methods to create flows, attach readers and
//! writers, and work with TAI timing.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use uuid::Uuid;

use crate::flow::flowdef::FlowDef;
use crate::flow::mapping::{FLOW_WRITER_LOCK_FILE, flow_directory};
use crate::flow::reader::FlowReader;
use crate::flow::writer::{FlowWriter, WriterSession};
use crate::lock::WriterLock;
use crate::manager::FlowManager;
use crate::options::{FlowOptions, InstanceOptions};
use crate::time::{self, Rational, UNDEFINED_INDEX};
use crate::{Error, FlowConfigInfo, Result};

/// Internal shared context for an MXL instance.
///
/// Readers and writers hold a clone of this context so they stay usable even
/// after the instance handle itself is dropped.
pub(crate) struct InstanceContext {
    pub(crate) manager: FlowManager,
    pub(crate) options: InstanceOptions,
}

/// Main entry point for interacting with an MXL domain.
///
/// An `MxlInstance` represents a binding to a domain directory (typically on
/// a tmpfs like `/dev/shm`). It provides methods to:
///
/// - Create and destroy flows
/// - Create flow readers and writers
/// - Query flow liveness and definitions
/// - Convert between TAI timestamps and media indices
///
/// The instance is cheaply cloneable and thread-safe (`Send + Sync`); readers
/// and writers created from it are `Send` but should each be driven by a
/// single thread.
///
/// # Examples
///
/// ```no_run
/// use mxl::MxlInstance;
///
/// # fn main() -> Result<(), mxl::Error> {
/// let instance = MxlInstance::new("/dev/shm/my_domain", "")?;
///
/// let flow_def = r#"{"id": "...", "format": "urn:x-nmos:format:video", ...}"#;
/// let info = instance.create_flow(flow_def, None)?;
///
/// let writer = instance.create_flow_writer(&info.common().id().to_string())?;
/// let mut grain_writer = writer.to_grain_writer()?;
///
/// let rate = info.common().grain_rate()?;
/// let index = instance.get_current_index(&rate);
/// let mut access = grain_writer.open_grain(index)?;
/// access.payload_mut().fill(42);
/// access.commit()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MxlInstance {
    context: Arc<InstanceContext>,
}

impl MxlInstance {
    /// Creates a new MXL instance bound to the specified domain directory.
    ///
    /// The domain must already exist; write permission is only needed by
    /// processes that create flows.
    ///
    /// # Arguments
    ///
    /// * `domain` - Filesystem path to the domain directory
    /// * `options` - Instance options JSON (may be empty); see
    ///   [`crate::options::InstanceOptions`]
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArg`] if the domain path is not an existing
    /// directory, or [`Error::InvalidFlowDef`] if the options JSON is
    /// malformed.
    pub fn new(domain: impl AsRef<Path>, options: &str) -> Result<Self> {
        let options = InstanceOptions::from_json(Some(options))?;
        let manager = FlowManager::new(domain.as_ref())?;
        Ok(Self {
            context: Arc::new(InstanceContext { manager, options }),
        })
    }

    /// Creates a new flow in the domain from an NMOS flow definition.
    ///
    /// The descriptor is validated, the shared region is materialized, and
    /// the flow becomes visible under `<domain>/<flow-id>/`. If a flow with
    /// the same UUID already exists it is destroyed and re-created; readers
    /// still holding the old region observe [`Error::FlowInvalid`] on their
    /// next access.
    ///
    /// # Arguments
    ///
    /// * `flow_def` - JSON flow definition (NMOS IS-04 shaped)
    /// * `options` - Optional flow options JSON; see
    ///   [`crate::options::FlowOptions`]
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidFlowDef`] if the definition fails to parse or
    ///   validate (no side effects)
    /// - [`Error::PermissionDenied`] if the domain is not writable (no files
    ///   are left behind)
    pub fn create_flow(&self, flow_def: &str, options: Option<&str>) -> Result<FlowConfigInfo> {
        let parsed = FlowDef::from_json(flow_def)?;
        let flow_options = self
            .context
            .options
            .merge_into(FlowOptions::from_json(options)?);
        let mapping = self
            .context
            .manager
            .create_flow(&parsed, flow_def, &flow_options)?;
        Ok(mapping.config_info())
    }

    /// Destroys a flow: marks it invalid and unlinks it from the domain.
    ///
    /// Existing readers keep their mappings until they close them, but every
    /// subsequent read fails with [`Error::FlowInvalid`] and the flow is no
    /// longer discoverable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FlowNotFound`] if the flow does not exist, including
    /// on a second destroy of the same flow.
    pub fn destroy_flow(&self, flow_id: &str) -> Result<()> {
        self.context.manager.delete_flow(parse_flow_id(flow_id)?)
    }

    /// Reports whether a flow currently has a live writer.
    ///
    /// A flow is active if its writer lock is held, or if the writer's last
    /// heartbeat is within the instance's liveness threshold. Liveness is
    /// derived, not authoritative.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FlowNotFound`] if the flow does not exist.
    pub fn is_flow_active(&self, flow_id: &str) -> Result<bool> {
        let id = parse_flow_id(flow_id)?;
        let flow_dir = flow_directory(self.context.manager.domain(), id);
        if !flow_dir.is_dir() {
            return Err(Error::FlowNotFound);
        }
        if WriterLock::is_held(&flow_dir.join(FLOW_WRITER_LOCK_FILE)) {
            return Ok(true);
        }
        // A writer that detached cleanly has cleared its nonce; a crashed one
        // leaves the nonce behind and ages out of the heartbeat window.
        let mapping = self.context.manager.open_flow(id)?;
        let header = mapping.header();
        if header.writer_nonce.load(Ordering::Acquire) == 0 {
            return Ok(false);
        }
        let heartbeat = header.writer_heartbeat.load(Ordering::Acquire);
        let age = time::current_time().saturating_sub(heartbeat);
        Ok(age <= self.context.options.liveness_threshold_ns())
    }

    /// Creates a flow reader for an existing flow in the domain.
    ///
    /// The returned [`FlowReader`] is a generic reader that must be converted
    /// to either a [`crate::GrainReader`] (discrete flows) or a
    /// [`crate::SamplesReader`] (continuous flows) using the appropriate
    /// `to_*` method. Readers are unlimited.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FlowNotFound`] if no flow with the given ID exists.
    pub fn create_flow_reader(&self, flow_id: &str) -> Result<FlowReader> {
        let id = parse_flow_id(flow_id)?;
        let mapping = self.context.manager.open_flow(id)?;
        Ok(FlowReader::new(Arc::new(mapping)))
    }

    /// Attaches the writer to an existing flow.
    ///
    /// Takes the exclusive writer lock and publishes a writer-alive nonce and
    /// heartbeat. The returned [`FlowWriter`] must be converted to a
    /// [`crate::GrainWriter`] or [`crate::SamplesWriter`].
    ///
    /// # Errors
    ///
    /// - [`Error::FlowNotFound`] if the flow does not exist
    /// - [`Error::Conflict`] if another writer already holds the flow
    pub fn create_flow_writer(&self, flow_id: &str) -> Result<FlowWriter> {
        let id = parse_flow_id(flow_id)?;
        let mapping = Arc::new(self.context.manager.open_flow(id)?);
        let lock_path =
            flow_directory(self.context.manager.domain(), id).join(FLOW_WRITER_LOCK_FILE);
        let lock = WriterLock::acquire(&lock_path)?;
        let session = WriterSession::start(mapping, lock);
        Ok(FlowWriter::new(session, id))
    }

    /// Retrieves the JSON flow definition for an existing flow.
    ///
    /// The returned string is byte-for-byte identical to the descriptor the
    /// flow was created with.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArg`] if `flow_id` is not a valid UUID
    /// - [`Error::FlowNotFound`] if the flow does not exist
    pub fn get_flow_def(&self, flow_id: &str) -> Result<String> {
        self.context.manager.flow_def(parse_flow_id(flow_id)?)
    }

    /// C-style two-call variant of [`Self::get_flow_def`].
    ///
    /// With `buffer == None`, stores the required size (the descriptor length
    /// plus a terminating NUL) into `buffer_size` and fails with
    /// [`Error::InvalidArg`]. With a sufficiently large buffer, copies the
    /// NUL-terminated descriptor and stores the used size.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArg`] if the ID is unparseable, the buffer is absent,
    ///   or the buffer is too small (with `buffer_size` updated to the
    ///   required size in the latter two cases)
    /// - [`Error::FlowNotFound`] if the flow does not exist (`buffer_size`
    ///   untouched)
    pub fn get_flow_def_buffered(
        &self,
        flow_id: &str,
        buffer: Option<&mut [u8]>,
        buffer_size: &mut usize,
    ) -> Result<()> {
        let flow_def = self.get_flow_def(flow_id)?;
        let required = flow_def.len() + 1;
        match buffer {
            Some(buffer) if *buffer_size >= required && buffer.len() >= required => {
                buffer[..flow_def.len()].copy_from_slice(flow_def.as_bytes());
                buffer[flow_def.len()] = 0;
                *buffer_size = required;
                Ok(())
            }
            _ => {
                *buffer_size = required;
                Err(Error::InvalidArg)
            }
        }
    }

    /// Enumerates the flows currently published in the domain.
    pub fn list_flows(&self) -> Result<Vec<Uuid>> {
        self.context.manager.list_flows()
    }

    /// Returns the current TAI time in nanoseconds.
    ///
    /// TAI (International Atomic Time) follows SMPTE ST 2059 and has no leap
    /// seconds; the epoch is 1970-01-01 00:00:00 TAI.
    pub fn get_time(&self) -> u64 {
        time::current_time()
    }

    /// Returns the current media index for a given rate.
    pub fn get_current_index(&self, rate: &Rational) -> u64 {
        time::current_index(rate)
    }

    /// Converts a TAI timestamp to a media index.
    ///
    /// # Errors
    ///
    /// Returns an error if the rate is invalid or the timestamp is zero.
    pub fn timestamp_to_index(&self, timestamp: u64, rate: &Rational) -> Result<u64> {
        let index = time::timestamp_to_index(rate, timestamp);
        if index == UNDEFINED_INDEX {
            Err(Error::Other(format!(
                "Failed to convert timestamp to index, invalid rate {rate}."
            )))
        } else {
            Ok(index)
        }
    }

    /// Converts a media index to the TAI nanosecond at which it becomes
    /// current.
    ///
    /// # Errors
    ///
    /// Returns an error if the rate is invalid.
    pub fn index_to_timestamp(&self, index: u64, rate: &Rational) -> Result<u64> {
        let timestamp = time::index_to_timestamp(rate, index);
        if timestamp == UNDEFINED_INDEX {
            Err(Error::Other(format!(
                "Failed to convert index to timestamp, invalid rate {rate}."
            )))
        } else {
            Ok(timestamp)
        }
    }

    /// Calculates the duration until the grain period of `index` has elapsed.
    ///
    /// Writers use this to pace themselves between grains.
    ///
    /// # Errors
    ///
    /// Returns an error if the rate is invalid.
    pub fn get_duration_until_index(
        &self,
        index: u64,
        rate: &Rational,
    ) -> Result<std::time::Duration> {
        let duration_ns = time::ns_until_index(index, rate);
        if duration_ns == UNDEFINED_INDEX {
            Err(Error::Other(format!(
                "Failed to get duration until index, invalid rate {rate}."
            )))
        } else {
            Ok(std::time::Duration::from_nanos(duration_ns))
        }
    }

    /// Blocks the calling thread for at least the given duration.
    pub fn sleep_for(&self, duration: std::time::Duration) {
        time::sleep_for_ns(duration.as_nanos() as u64);
    }

    /// Forces immediate release of the instance, consuming `self`.
    ///
    /// # Errors
    ///
    /// Returns an error if readers, writers, or clones of this instance are
    /// still alive.
    pub fn destroy(self) -> Result<()> {
        Arc::into_inner(self.context)
            .map(|_| ())
            .ok_or_else(|| Error::Other("Instance is still in use.".to_string()))
    }
}

/// Parses a flow ID string, mapping failures to [`Error::InvalidArg`].
fn parse_flow_id(flow_id: &str) -> Result<Uuid> {
    Uuid::parse_str(flow_id).map_err(|_| Error::InvalidArg)
}

// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Flow lifecycle management inside a domain directory.
//!
//! The [`FlowManager`] materializes, opens, enumerates and removes flows.
//! Creation is all-or-nothing: a flow is assembled under a hidden temporary
//! directory and published into the domain with a single `rename`, so no
//! half-created flow is ever observable and every failure path leaves the
//! domain untouched.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use tracing::{debug, trace};
use uuid::Uuid;

use crate::flow::flowdef::FlowDef;
use crate::flow::mapping::{
    FLOW_DATA_FILE, FLOW_DESCRIPTOR_FILE, FLOW_OPTIONS_FILE, FLOW_WRITER_LOCK_FILE, FlowMapping,
    flow_directory,
};
use crate::layout::{
    self, FLOW_DATA_VERSION, FLOW_MAGIC, FlowHeader, GRAIN_HEADER_VERSION, GrainInfo,
};
use crate::options::FlowOptions;
use crate::shm::SharedRegion;
use crate::time::{self, UNDEFINED_INDEX};
use crate::{Error, Result};

/// Creates, opens, enumerates and deletes the flows of one domain.
pub(crate) struct FlowManager {
    domain: PathBuf,
}

impl FlowManager {
    /// Binds a manager to an existing domain directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArg`] if the path does not exist or is not a
    /// directory. Write permission is not required until a flow is created.
    pub fn new(domain: &Path) -> Result<Self> {
        if !domain.is_dir() {
            return Err(Error::InvalidArg);
        }
        let domain = domain
            .canonicalize()
            .map_err(|_| Error::InvalidArg)?;
        Ok(Self { domain })
    }

    /// The canonical domain directory.
    pub fn domain(&self) -> &Path {
        &self.domain
    }

    /// Materializes a new flow from a validated definition.
    ///
    /// Writes `descriptor.json` (the caller's original JSON, byte for byte)
    /// and `options.json` (effective options after defaults), creates and
    /// initializes the shared data region, then publishes the directory under
    /// the flow's UUID. If a flow with the same UUID already exists it is
    /// poisoned and removed first, so readers still holding the old region
    /// observe `FlowInvalid`.
    pub fn create_flow(
        &self,
        flow_def: &FlowDef,
        descriptor_json: &str,
        options: &FlowOptions,
    ) -> Result<FlowMapping> {
        let id = flow_def.id;
        debug!(flow_id = %id, "creating flow");

        let temp_dir = self.create_temporary_flow_directory()?;
        let result = self
            .populate_flow_directory(&temp_dir, flow_def, descriptor_json, options)
            .and_then(|region| {
                self.publish_flow_directory(&temp_dir, id)?;
                Ok(FlowMapping::from_created(self.domain.clone(), id, region))
            });
        if result.is_err() {
            let _ = std::fs::remove_dir_all(&temp_dir);
        }
        result
    }

    /// Atomically moves a fully assembled flow directory to its published
    /// name, superseding any flow already there.
    fn publish_flow_directory(&self, temp_dir: &Path, id: Uuid) -> Result<()> {
        let final_dir = flow_directory(&self.domain, id);
        if final_dir.exists() {
            debug!(flow_id = %id, "flow already exists, superseding");
            self.poison_flow(id);
            std::fs::remove_dir_all(&final_dir)?;
        }
        std::fs::rename(temp_dir, &final_dir)?;
        Ok(())
    }

    /// Opens an existing flow by UUID.
    pub fn open_flow(&self, id: Uuid) -> Result<FlowMapping> {
        FlowMapping::open(&self.domain, id)
    }

    /// Poisons and removes a flow from the domain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FlowNotFound`] if the flow does not exist (including
    /// on a second delete of the same flow).
    pub fn delete_flow(&self, id: Uuid) -> Result<()> {
        trace!(flow_id = %id, "deleting flow");
        let flow_dir = flow_directory(&self.domain, id);
        if !flow_dir.is_dir() {
            return Err(Error::FlowNotFound);
        }
        self.poison_flow(id);
        std::fs::remove_dir_all(&flow_dir)?;
        Ok(())
    }

    /// Enumerates the flows currently published in the domain.
    ///
    /// Entries that do not parse as UUIDs are skipped. Liveness is a separate
    /// question answered by the writer lock and heartbeat.
    pub fn list_flows(&self) -> Result<Vec<Uuid>> {
        let mut flow_ids = Vec::new();
        for entry in std::fs::read_dir(&self.domain)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && let Ok(id) = Uuid::parse_str(name)
            {
                flow_ids.push(id);
            }
        }
        Ok(flow_ids)
    }

    /// Returns the original descriptor JSON of a flow, byte for byte.
    pub fn flow_def(&self, id: Uuid) -> Result<String> {
        let descriptor_path = flow_directory(&self.domain, id).join(FLOW_DESCRIPTOR_FILE);
        std::fs::read_to_string(&descriptor_path).map_err(|error| {
            if error.kind() == std::io::ErrorKind::NotFound {
                Error::FlowNotFound
            } else {
                error.into()
            }
        })
    }

    /// Best-effort poison of an existing flow's mapped header.
    fn poison_flow(&self, id: Uuid) {
        if let Ok(mapping) = FlowMapping::open(&self.domain, id) {
            mapping.mark_invalid();
        }
    }

    /// Creates a hidden temporary directory inside the domain. The name
    /// cannot clash with published flows, which are plain UUIDs.
    fn create_temporary_flow_directory(&self) -> Result<PathBuf> {
        let temp_dir = self
            .domain
            .join(format!(".mxl-tmp-{}", Uuid::new_v4().simple()));
        std::fs::create_dir(&temp_dir)?;
        Ok(temp_dir)
    }

    /// Writes the descriptor, options, and initialized data region into a
    /// (temporary) flow directory.
    fn populate_flow_directory(
        &self,
        flow_dir: &Path,
        flow_def: &FlowDef,
        descriptor_json: &str,
        options: &FlowOptions,
    ) -> Result<SharedRegion> {
        std::fs::write(flow_dir.join(FLOW_DESCRIPTOR_FILE), descriptor_json)?;
        let effective = serde_json::to_string(&options.effective())
            .map_err(|error| Error::Other(format!("failed to serialize options: {error}")))?;
        std::fs::write(flow_dir.join(FLOW_OPTIONS_FILE), effective)?;
        std::fs::write(flow_dir.join(FLOW_WRITER_LOCK_FILE), "")?;

        let data_path = flow_dir.join(FLOW_DATA_FILE);
        let region = if flow_def.is_discrete() {
            create_discrete_region(&data_path, flow_def, options)?
        } else {
            create_continuous_region(&data_path, flow_def, options)?
        };
        Ok(region)
    }
}

/// Fills in the header fields common to both flow kinds.
fn init_common_header(
    header: &mut FlowHeader,
    flow_def: &FlowDef,
    rate: time::Rational,
    options: &FlowOptions,
    data_path: &Path,
) -> Result<()> {
    use std::os::unix::fs::MetadataExt;

    header.magic = FLOW_MAGIC;
    header.version = FLOW_DATA_VERSION;
    header.format = flow_def.data_format().into();
    header.id = *flow_def.id.as_bytes();
    header.rate_numerator = rate.numerator;
    header.rate_denominator = rate.denominator;
    header.max_commit_batch_size_hint = options.max_commit_batch_size();
    header.inode = std::fs::metadata(data_path)?.ino();

    let now = time::current_time();
    header.last_write_time.store(now, Ordering::Relaxed);
    header.last_read_time.store(now, Ordering::Relaxed);
    Ok(())
}

/// Creates and initializes the data region of a discrete flow: the header
/// followed by a ring of grain slots.
fn create_discrete_region(
    data_path: &Path,
    flow_def: &FlowDef,
    options: &FlowOptions,
) -> Result<SharedRegion> {
    let grain_rate = flow_def.grain_rate()?;
    let grain_size = flow_def.payload_size();
    let total_slices = flow_def.total_slices();
    let buffer_length = layout::discrete_buffer_length(&grain_rate, options.history_duration_ns());

    debug!(
        grain_count = buffer_length,
        grain_size, "creating discrete flow region"
    );

    let region = SharedRegion::create(data_path, layout::discrete_region_len(buffer_length, grain_size))?;

    // The region is private until the publishing rename, so plain stores are
    // fine here.
    let header = unsafe { &mut *(region.as_ptr() as *mut FlowHeader) };
    init_common_header(header, flow_def, grain_rate, options, data_path)?;
    header.grain_size = grain_size;
    header.total_slices = total_slices;
    header.slice_sizes = flow_def.slice_sizes();
    header.buffer_length = buffer_length;

    let stride = layout::grain_slot_stride(grain_size);
    for slot in 0..buffer_length as usize {
        let grain = unsafe {
            &mut *(region
                .as_ptr()
                .add(layout::FLOW_HEADER_SIZE + slot * stride) as *mut GrainInfo)
        };
        grain.version = GRAIN_HEADER_VERSION;
        grain.grain_size = grain_size;
        grain.total_slices = total_slices;
        grain.index.store(UNDEFINED_INDEX, Ordering::Relaxed);
        grain.valid_slices.store(0, Ordering::Relaxed);
    }
    Ok(region)
}

/// Creates and initializes the data region of a continuous flow: the header
/// followed by one sample ring per channel.
fn create_continuous_region(
    data_path: &Path,
    flow_def: &FlowDef,
    options: &FlowOptions,
) -> Result<SharedRegion> {
    let sample_rate = flow_def.sample_rate()?;
    let channel_count = flow_def.channel_count()?;
    let word_size = flow_def.sample_word_size()?;
    let buffer_length =
        layout::continuous_buffer_length(&sample_rate, options.history_duration_ns());

    debug!(
        channel_count,
        buffer_length, word_size, "creating continuous flow region"
    );

    let region = SharedRegion::create(
        data_path,
        layout::continuous_region_len(channel_count, buffer_length, word_size),
    )?;

    let header = unsafe { &mut *(region.as_ptr() as *mut FlowHeader) };
    init_common_header(header, flow_def, sample_rate, options, data_path)?;
    header.channel_count = channel_count;
    header.sample_word_size = word_size;
    header.buffer_length = buffer_length;
    Ok(region)
}

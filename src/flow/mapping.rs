// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Typed access to a mapped flow shared region.
//!
//! A [`FlowMapping`] couples one [`SharedRegion`] with the layout knowledge
//! needed to reach the header, grain slots and channel buffers inside it.
//! Readers and writers share a mapping through `Arc`; the mapping outlives
//! the on-disk flow (invalidation is detected, not enforced by unmapping).

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use uuid::Uuid;

use crate::flow::{
    ContinuousFlowConfigInfo, DiscreteFlowConfigInfo, FlowConfigInfo, FlowRuntimeInfo,
    is_discrete_data_format,
};
use crate::layout::{
    FLOW_DATA_VERSION, FLOW_FLAG_INVALID, FLOW_HEADER_SIZE, FLOW_MAGIC, FlowHeader, GrainInfo,
    continuous_region_len, discrete_region_len, grain_slot_stride,
};
use crate::shm::SharedRegion;
use crate::time;
use crate::{Error, Result};

/// File names inside a flow directory.
pub(crate) const FLOW_DATA_FILE: &str = "data";
pub(crate) const FLOW_DESCRIPTOR_FILE: &str = "descriptor.json";
pub(crate) const FLOW_OPTIONS_FILE: &str = "options.json";
pub(crate) const FLOW_WRITER_LOCK_FILE: &str = "writer.lock";

/// Returns the directory of a flow inside a domain.
pub(crate) fn flow_directory(domain: &Path, id: Uuid) -> PathBuf {
    domain.join(id.to_string())
}

/// A mapped flow shared region with typed accessors.
pub(crate) struct FlowMapping {
    domain: PathBuf,
    id: Uuid,
    region: SharedRegion,
}

impl FlowMapping {
    /// Wraps a freshly created region. The caller has already initialized
    /// the header.
    pub fn from_created(domain: PathBuf, id: Uuid, region: SharedRegion) -> Self {
        Self { domain, id, region }
    }

    /// Maps the data file of an existing flow and validates it.
    ///
    /// # Errors
    ///
    /// - [`Error::FlowNotFound`] if the flow directory or data file is gone.
    /// - [`Error::Other`] if the magic, version, or region size do not match
    ///   what the header declares.
    pub fn open(domain: &Path, id: Uuid) -> Result<Self> {
        let data_path = flow_directory(domain, id).join(FLOW_DATA_FILE);
        let region = SharedRegion::open(&data_path)?;
        if region.len() < FLOW_HEADER_SIZE {
            return Err(Error::Other(format!(
                "Flow region is truncated ({} bytes).",
                region.len()
            )));
        }

        let mapping = Self {
            domain: domain.to_path_buf(),
            id,
            region,
        };
        let header = mapping.header();
        if header.magic != FLOW_MAGIC {
            return Err(Error::Other("Not an MXL flow data file.".to_string()));
        }
        if header.version != FLOW_DATA_VERSION {
            return Err(Error::Other(format!(
                "Unsupported flow data version: {}, supported is: {}.",
                header.version, FLOW_DATA_VERSION
            )));
        }
        let expected_len = if is_discrete_data_format(header.format) {
            discrete_region_len(header.buffer_length, header.grain_size)
        } else {
            continuous_region_len(
                header.channel_count,
                header.buffer_length,
                header.sample_word_size,
            )
        };
        if mapping.region.len() < expected_len {
            return Err(Error::Other(format!(
                "Flow region is smaller than its header declares ({} < {expected_len}).",
                mapping.region.len()
            )));
        }
        Ok(mapping)
    }

    /// The shared flow header at the start of the region.
    pub fn header(&self) -> &FlowHeader {
        // The region is at least FLOW_HEADER_SIZE bytes and page aligned,
        // which satisfies FlowHeader's alignment.
        unsafe { &*(self.region.as_ptr() as *const FlowHeader) }
    }

    /// The [`GrainInfo`] block of a ring slot.
    pub fn grain_info(&self, slot: u64) -> &GrainInfo {
        let header = self.header();
        debug_assert!(slot < header.buffer_length as u64);
        let stride = grain_slot_stride(header.grain_size);
        unsafe {
            let base = self
                .region
                .as_ptr()
                .add(FLOW_HEADER_SIZE + slot as usize * stride);
            &*(base as *const GrainInfo)
        }
    }

    /// Raw pointer to the payload of a ring slot.
    pub fn grain_payload_ptr(&self, slot: u64) -> *mut u8 {
        let header = self.header();
        debug_assert!(slot < header.buffer_length as u64);
        let stride = grain_slot_stride(header.grain_size);
        unsafe {
            self.region.as_ptr().add(
                FLOW_HEADER_SIZE
                    + slot as usize * stride
                    + crate::layout::GRAIN_INFO_SIZE,
            )
        }
    }

    /// Base pointer of the first channel's sample array. Subsequent channels
    /// follow at `buffer_length * sample_word_size` byte intervals.
    pub fn channel_base_ptr(&self) -> *mut u8 {
        unsafe { self.region.as_ptr().add(FLOW_HEADER_SIZE) }
    }

    /// Builds the public configuration view from the header.
    pub fn config_info(&self) -> FlowConfigInfo {
        let header = self.header();
        let id = Uuid::from_bytes(header.id);
        if is_discrete_data_format(header.format) {
            FlowConfigInfo::new_discrete(
                id,
                header.format,
                header.max_commit_batch_size_hint,
                DiscreteFlowConfigInfo {
                    grain_rate: header.rate(),
                    grain_count: header.buffer_length,
                    slice_sizes: header.slice_sizes,
                    grain_size: header.grain_size,
                    total_slices: header.total_slices,
                },
            )
        } else {
            FlowConfigInfo::new_continuous(
                id,
                header.format,
                header.max_commit_batch_size_hint,
                ContinuousFlowConfigInfo {
                    sample_rate: header.rate(),
                    channel_count: header.channel_count,
                    buffer_length: header.buffer_length,
                    sample_word_size: header.sample_word_size,
                },
            )
        }
    }

    /// Snapshot of the runtime state (head index, access times).
    pub fn runtime_info(&self) -> FlowRuntimeInfo {
        let header = self.header();
        FlowRuntimeInfo {
            head_index: header.head_index.load(Ordering::Acquire),
            last_write_time: header.last_write_time.load(Ordering::Acquire),
            last_read_time: header.last_read_time.load(Ordering::Acquire),
        }
    }

    /// Marks the flow invalid; every subsequent read fails with
    /// [`Error::FlowInvalid`].
    pub fn mark_invalid(&self) {
        self.header()
            .flags
            .fetch_or(FLOW_FLAG_INVALID, Ordering::Release);
    }

    /// Fast poison check against the mapped header flag.
    pub fn is_marked_invalid(&self) -> bool {
        self.header().flags.load(Ordering::Acquire) & FLOW_FLAG_INVALID != 0
    }

    /// Full validity check: the header flag plus an inode comparison against
    /// the path the flow was opened under, which detects destroy/re-create
    /// races even when the new creator never touched our mapping.
    pub fn is_valid(&self) -> bool {
        if self.is_marked_invalid() {
            return false;
        }
        let data_path = flow_directory(&self.domain, self.id).join(FLOW_DATA_FILE);
        match std::fs::metadata(&data_path) {
            Ok(metadata) => metadata.ino() == self.header().inode,
            Err(_) => false,
        }
    }

    /// Records a consumer read in the control block.
    pub fn touch_read(&self) {
        self.header()
            .last_read_time
            .store(time::current_time(), Ordering::Release);
    }
}

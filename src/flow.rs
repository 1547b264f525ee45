// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Flow types and metadata structures.
//!
//! This module defines data types for working with MXL flows, including:
//! - Flow readers and writers ([`reader`], [`writer`])
//! - Flow definitions and schema ([`flowdef`])
//! - Configuration and runtime metadata ([`FlowConfigInfo`], [`FlowRuntimeInfo`])
//! - Media format classification ([`DataFormat`])

pub mod flowdef;
pub(crate) mod mapping;
pub mod reader;
pub mod writer;

use uuid::Uuid;

use crate::layout;
use crate::time::Rational;
use crate::{Error, Result};

/// Media data format classification for MXL flows.
///
/// Flows are classified as either discrete (grain-based) or continuous
/// (sample-based) depending on the data format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// Format not specified or unknown.
    Unspecified,
    /// Video data (discrete, grain-based).
    Video,
    /// Audio data (continuous, sample-based).
    Audio,
    /// Generic data packets (discrete, grain-based).
    Data,
}

impl From<u32> for DataFormat {
    /// Converts the raw format constant stored in the flow header.
    fn from(value: u32) -> Self {
        match value {
            layout::FORMAT_VIDEO => DataFormat::Video,
            layout::FORMAT_AUDIO => DataFormat::Audio,
            layout::FORMAT_DATA => DataFormat::Data,
            _ => DataFormat::Unspecified,
        }
    }
}

impl From<DataFormat> for u32 {
    fn from(value: DataFormat) -> Self {
        match value {
            DataFormat::Unspecified => layout::FORMAT_UNSPECIFIED,
            DataFormat::Video => layout::FORMAT_VIDEO,
            DataFormat::Audio => layout::FORMAT_AUDIO,
            DataFormat::Data => layout::FORMAT_DATA,
        }
    }
}

/// Determines whether a format uses discrete (grain-based) delivery.
///
/// Video and generic data flows use discrete delivery, while audio uses
/// continuous (sample-based) delivery.
pub(crate) fn is_discrete_data_format(format: u32) -> bool {
    format == layout::FORMAT_VIDEO || format == layout::FORMAT_DATA
}

/// Complete flow information including configuration and runtime state.
pub struct FlowInfo {
    /// Static flow configuration.
    pub config: FlowConfigInfo,
    /// Dynamic runtime state.
    pub runtime: FlowRuntimeInfo,
}

/// Discrete flow configuration (video and data flows).
#[derive(Debug, Clone, Copy)]
pub struct DiscreteFlowConfigInfo {
    /// Grains per second. For interlaced video this is the field rate.
    pub grain_rate: Rational,
    /// Number of grain slots in the ring.
    pub grain_count: u32,
    /// Per-plane slice (line) lengths in bytes.
    pub slice_sizes: [u32; layout::MAX_PLANES_PER_GRAIN],
    /// Total payload bytes per grain.
    pub grain_size: u32,
    /// Number of slices in a complete grain.
    pub total_slices: u32,
}

/// Continuous flow configuration (audio flows).
#[derive(Debug, Clone, Copy)]
pub struct ContinuousFlowConfigInfo {
    /// Samples per second.
    pub sample_rate: Rational,
    /// Number of channels, each with its own ring buffer.
    pub channel_count: u32,
    /// Samples per channel ring buffer (a power of two).
    pub buffer_length: u32,
    /// Bytes per sample.
    pub sample_word_size: u32,
}

/// Format-specific half of [`FlowConfigInfo`].
#[derive(Debug, Clone, Copy)]
enum FlowConfigDetail {
    Discrete(DiscreteFlowConfigInfo),
    Continuous(ContinuousFlowConfigInfo),
}

/// Flow configuration metadata.
///
/// Contains static information about a flow's format, rate, and buffer
/// configuration. This is set when the flow is created and does not change.
#[derive(Debug, Clone, Copy)]
pub struct FlowConfigInfo {
    pub(crate) id: Uuid,
    pub(crate) format: u32,
    pub(crate) max_commit_batch_size_hint: u32,
    detail: FlowConfigDetail,
}

impl FlowConfigInfo {
    pub(crate) fn new_discrete(
        id: Uuid,
        format: u32,
        max_commit_batch_size_hint: u32,
        discrete: DiscreteFlowConfigInfo,
    ) -> Self {
        Self {
            id,
            format,
            max_commit_batch_size_hint,
            detail: FlowConfigDetail::Discrete(discrete),
        }
    }

    pub(crate) fn new_continuous(
        id: Uuid,
        format: u32,
        max_commit_batch_size_hint: u32,
        continuous: ContinuousFlowConfigInfo,
    ) -> Self {
        Self {
            id,
            format,
            max_commit_batch_size_hint,
            detail: FlowConfigDetail::Continuous(continuous),
        }
    }

    /// Returns discrete flow configuration (for video and data flows).
    ///
    /// # Errors
    ///
    /// Returns an error if this flow is continuous (audio).
    pub fn discrete(&self) -> Result<&DiscreteFlowConfigInfo> {
        match &self.detail {
            FlowConfigDetail::Discrete(discrete) => Ok(discrete),
            FlowConfigDetail::Continuous(_) => Err(Error::Other(format!(
                "Flow format is {:?}, video or data required.",
                DataFormat::from(self.format)
            ))),
        }
    }

    /// Returns continuous flow configuration (for audio flows).
    ///
    /// # Errors
    ///
    /// Returns an error if this flow is discrete (video/data).
    pub fn continuous(&self) -> Result<&ContinuousFlowConfigInfo> {
        match &self.detail {
            FlowConfigDetail::Continuous(continuous) => Ok(continuous),
            FlowConfigDetail::Discrete(_) => Err(Error::Other(format!(
                "Flow format is {:?}, audio required.",
                DataFormat::from(self.format)
            ))),
        }
    }

    /// Returns the common configuration fields shared by all flow types.
    pub fn common(&self) -> CommonFlowConfigInfo<'_> {
        CommonFlowConfigInfo(self)
    }

    /// Returns `true` if this is a discrete (grain-based) flow.
    pub fn is_discrete_flow(&self) -> bool {
        is_discrete_data_format(self.format)
    }
}

/// Common flow configuration fields shared across all flow types.
pub struct CommonFlowConfigInfo<'a>(&'a FlowConfigInfo);

impl CommonFlowConfigInfo<'_> {
    /// Returns the flow's unique identifier (UUID).
    pub fn id(&self) -> Uuid {
        self.0.id
    }

    /// Returns the media data format of this flow.
    pub fn data_format(&self) -> DataFormat {
        DataFormat::from(self.0.format)
    }

    /// Returns `true` if this is a discrete (grain-based) flow.
    pub fn is_discrete_flow(&self) -> bool {
        self.0.is_discrete_flow()
    }

    /// Returns the grain rate for discrete flows (video/data).
    ///
    /// # Errors
    ///
    /// Returns an error if this flow is continuous (audio).
    pub fn grain_rate(&self) -> Result<Rational> {
        Ok(self.0.discrete()?.grain_rate)
    }

    /// Returns the sample rate for continuous flows (audio).
    ///
    /// # Errors
    ///
    /// Returns an error if this flow is discrete (video/data).
    pub fn sample_rate(&self) -> Result<Rational> {
        Ok(self.0.continuous()?.sample_rate)
    }

    /// Returns the rate without checking the flow kind (grain rate for
    /// discrete flows, sample rate for continuous flows).
    pub fn grain_or_sample_rate(&self) -> Rational {
        match &self.0.detail {
            FlowConfigDetail::Discrete(discrete) => discrete.grain_rate,
            FlowConfigDetail::Continuous(continuous) => continuous.sample_rate,
        }
    }

    /// Returns the maximum commit batch size hint of the producer.
    ///
    /// Partial grain commits move `valid_slices` in multiples of this value;
    /// readers can use it to match the writer's pacing.
    pub fn max_commit_batch_size_hint(&self) -> u32 {
        self.0.max_commit_batch_size_hint
    }
}

/// Dynamic runtime information about a flow.
///
/// Contains state that changes as data is written and read, such as the
/// current head index and last access timestamps.
#[derive(Debug, Clone, Copy)]
pub struct FlowRuntimeInfo {
    pub(crate) head_index: u64,
    pub(crate) last_write_time: u64,
    pub(crate) last_read_time: u64,
}

impl FlowRuntimeInfo {
    /// Returns the current head index of the flow.
    ///
    /// For discrete flows, this is the index of the most recently committed
    /// grain. For continuous flows, this is the index of the last committed
    /// sample.
    pub fn head_index(&self) -> u64 {
        self.head_index
    }

    /// Returns the TAI timestamp of the last write operation (in nanoseconds).
    pub fn last_write_time(&self) -> u64 {
        self.last_write_time
    }

    /// Returns the TAI timestamp of the last read operation (in nanoseconds).
    pub fn last_read_time(&self) -> u64 {
        self.last_read_time
    }
}

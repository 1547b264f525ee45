// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Generic flow reader implementation.
//!
//! Provides [`FlowReader`], a type-erased reader that can be converted to
//! either [`crate::GrainReader`] or [`crate::SamplesReader`] based on the
//! flow format.

use std::sync::Arc;

use crate::flow::mapping::FlowMapping;
use crate::flow::{FlowInfo, is_discrete_data_format};
use crate::{DataFormat, Error, GrainReader, Result, SamplesReader};

/// Generic flow reader handle.
///
/// This is the initial reader type returned by
/// [`crate::MxlInstance::create_flow_reader`]. It must be converted to a
/// typed reader ([`GrainReader`] or [`SamplesReader`]) using the appropriate
/// conversion method based on the flow's data format.
///
/// # Examples
///
/// ```no_run
/// # use mxl::MxlInstance;
/// # fn example(instance: MxlInstance) -> Result<(), mxl::Error> {
/// let reader = instance.create_flow_reader("flow-uuid")?;
///
/// if reader.get_info()?.config.is_discrete_flow() {
///     let grain_reader = reader.to_grain_reader()?;
///     // Use grain_reader for video/data
/// } else {
///     let samples_reader = reader.to_samples_reader()?;
///     // Use samples_reader for audio
/// }
/// # Ok(())
/// # }
/// ```
pub struct FlowReader {
    mapping: Arc<FlowMapping>,
}

impl FlowReader {
    /// Creates a new `FlowReader` over a mapped flow (internal use only).
    pub(crate) fn new(mapping: Arc<FlowMapping>) -> Self {
        Self { mapping }
    }

    /// Retrieves complete flow information (config + runtime).
    pub fn get_info(&self) -> Result<FlowInfo> {
        Ok(FlowInfo {
            config: self.mapping.config_info(),
            runtime: self.mapping.runtime_info(),
        })
    }

    /// Converts this generic reader into a [`GrainReader`] for discrete
    /// flows.
    ///
    /// # Errors
    ///
    /// Returns an error if the flow is continuous (audio).
    pub fn to_grain_reader(self) -> Result<GrainReader> {
        let format = self.mapping.header().format;
        if !is_discrete_data_format(format) {
            return Err(Error::Other(format!(
                "Cannot convert FlowReader to GrainReader for continuous flow of type \"{:?}\".",
                DataFormat::from(format)
            )));
        }
        Ok(GrainReader::new(self.mapping))
    }

    /// Converts this generic reader into a [`SamplesReader`] for continuous
    /// flows.
    ///
    /// # Errors
    ///
    /// Returns an error if the flow is discrete (video/data).
    pub fn to_samples_reader(self) -> Result<SamplesReader> {
        let format = self.mapping.header().format;
        if is_discrete_data_format(format) {
            return Err(Error::Other(format!(
                "Cannot convert FlowReader to SamplesReader for discrete flow of type \"{:?}\".",
                DataFormat::from(format)
            )));
        }
        Ok(SamplesReader::new(self.mapping))
    }
}

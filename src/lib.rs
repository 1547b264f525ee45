// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # MXL - Media eXchange Layer
//!
//! Native Rust implementation of the Media eXchange Layer: high-performance
//! zero-copy shared-memory media exchange for video, audio, and data streams
//! between processes on the same host.
//!
//! ## Overview
//!
//! MXL enables inter-process media exchange using memory-mapped ring buffers
//! in a shared **domain** directory (typically on tmpfs). Producers and
//! consumers are independent processes that rendezvous through the domain;
//! all cross-process synchronization happens through atomic fields in the
//! shared flow headers, with no kernel IPC primitive beyond the filesystem
//! and shared memory mappings.
//!
//! ### Key Concepts
//!
//! - **Domain**: A directory containing the shared memory of all flows
//!   visible to cooperating processes
//! - **Instance**: A binding to an MXL domain ([`MxlInstance`])
//! - **Flow**: A unidirectional ring buffer for media data, either discrete
//!   or continuous, identified by UUID
//! - **Grain**: A discrete unit of media (video frame, data packet) accessed
//!   via [`GrainReader`]/[`GrainWriter`]
//! - **Samples**: Continuous media data (audio) accessed via
//!   [`SamplesReader`]/[`SamplesWriter`]
//!
//! ### Flow Types
//!
//! MXL supports two media flow patterns:
//!
//! - **Discrete (grain-based)**: Video frames and data packets delivered as
//!   complete units, optionally published slice by slice
//! - **Continuous (sample-based)**: Audio streams delivered as per-channel
//!   sample ranges
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │ MxlInstance │  (bound to a domain)
//! └──────┬──────┘
//!        │
//!        ├─► FlowWriter ──► GrainWriter   (video/data)
//!        │              └─► SamplesWriter  (audio)
//!        │
//!        └─► FlowReader ──► GrainReader   (video/data)
//!                       └─► SamplesReader  (audio)
//! ```
//!
//! ## Examples
//!
//! ### Creating a flow and writing video grains
//!
//! ```no_run
//! use mxl::MxlInstance;
//!
//! # fn main() -> Result<(), mxl::Error> {
//! // Bind to a tmpfs domain
//! let instance = MxlInstance::new("/dev/shm/my_domain", "")?;
//!
//! // Create a flow from a JSON flow definition
//! let flow_def = r#"{"id": "...", "format": "urn:x-nmos:format:video", ...}"#;
//! let info = instance.create_flow(flow_def, None)?;
//!
//! // Attach the writer and convert it for discrete video data
//! let writer = instance.create_flow_writer(&info.common().id().to_string())?;
//! let mut grain_writer = writer.to_grain_writer()?;
//!
//! // Write a grain at the current index
//! let rate = info.common().grain_rate()?;
//! let index = instance.get_current_index(&rate);
//! let mut access = grain_writer.open_grain(index)?;
//! access.payload_mut().fill(42); // Fill with test data
//! access.commit()?; // Publish all slices
//! # Ok(())
//! # }
//! ```
//!
//! ### Reading audio samples
//!
//! ```no_run
//! use mxl::MxlInstance;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), mxl::Error> {
//! let instance = MxlInstance::new("/dev/shm/my_domain", "")?;
//!
//! // Connect to an existing audio flow
//! let reader = instance.create_flow_reader("flow-uuid")?;
//! let samples_reader = reader.to_samples_reader()?;
//!
//! // Read 480 samples (10ms at 48kHz) ending at the head
//! let head = samples_reader.get_runtime_info()?.head_index();
//! let samples = samples_reader.get_samples(head, 480, Duration::from_millis(50))?;
//!
//! // Access per-channel data (may wrap at the ring boundary)
//! for ch in 0..samples.num_of_channels() {
//!     let (fragment1, fragment2) = samples.channel_data(ch)?;
//!     println!("Channel {}: {} + {} bytes", ch, fragment1.len(), fragment2.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Timing and Synchronization
//!
//! MXL uses TAI timestamps (nanoseconds since the SMPTE ST 2059 epoch,
//! 1970-01-01 00:00:00 TAI):
//!
//! - [`MxlInstance::get_time`] returns current TAI time
//! - [`MxlInstance::index_to_timestamp`] / [`MxlInstance::timestamp_to_index`]
//!   convert between indices and timestamps
//! - [`MxlInstance::sleep_for`] blocks with nanosecond granularity for
//!   writer pacing
//!
//! ## Thread Safety
//!
//! - [`MxlInstance`] is `Send + Sync` and can be shared across threads
//! - Readers and writers are `Send`; each should be driven by a single
//!   thread
//! - A flow has at most one writer at a time (enforced with a file lock) and
//!   any number of readers

pub mod error;
pub mod flow;
pub mod grain;
mod instance;
pub mod layout;
mod lock;
mod manager;
pub mod options;
pub mod samples;
mod shm;
pub mod time;

pub use error::{Error, Result};
pub use flow::{reader::FlowReader, writer::FlowWriter, *};
pub use grain::{
    data::*, reader::GrainReader, write_access::GrainWriteAccess, writer::GrainWriter,
};
pub use instance::MxlInstance;
pub use layout::{FLOW_FLAG_INVALID, GRAIN_FLAG_INVALID};
pub use samples::{
    data::*, reader::SamplesReader, write_access::SamplesWriteAccess, writer::SamplesWriter,
};
pub use time::{Rational, UNDEFINED_INDEX};

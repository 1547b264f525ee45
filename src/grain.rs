// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Discrete (grain-based) flow access.
//!
//! Video frames and ancillary data packets are exchanged as grains: fixed
//! size payloads in a ring of slots, addressed by a monotonically increasing
//! grain index. Writers publish grains (optionally slice by slice) through
//! [`writer::GrainWriter`]; readers retrieve them by index through
//! [`reader::GrainReader`].

pub mod data;
pub mod reader;
pub mod write_access;
pub mod writer;

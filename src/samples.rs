// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Continuous (sample-based) flow access.
//!
//! Audio is exchanged as per-channel sample rings addressed by absolute
//! sample index. A batch of samples is identified by the index of its last
//! sample; ranges that cross the ring boundary are exposed as wrapped
//! two-fragment slices so no copying is required.

pub mod data;
pub mod reader;
pub mod write_access;
pub mod writer;

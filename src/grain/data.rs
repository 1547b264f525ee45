// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Grain data structures for zero-copy media access.

/// Zero-copy view of a grain's payload data.
///
/// Provides read-only access to a grain stored in MXL's shared memory ring
/// buffer. The lifetime `'a` is tied to the [`crate::GrainReader`] that
/// produced it.
///
/// For partial grains (not yet fully written), `valid_slices` is below
/// `total_slices` and only [`Self::valid_payload`] is guaranteed to hold
/// published bytes.
pub struct GrainData<'a> {
    /// The full grain payload buffer.
    ///
    /// This is a zero-copy view into shared memory. The data remains valid
    /// for the lifetime `'a` but may be overwritten once the ring wraps past
    /// this grain's slot.
    pub payload: &'a [u8],

    /// Total size of a complete grain payload in bytes.
    pub total_size: usize,

    /// Grain metadata flags ([`crate::layout::GRAIN_FLAG_INVALID`]).
    pub flags: u32,

    /// Absolute index of the grain.
    pub index: u64,

    /// Number of slices published so far.
    pub valid_slices: u32,

    /// Number of slices in a complete grain.
    pub total_slices: u32,

    /// Bytes covered by the published slices.
    pub(crate) valid_length: usize,
}

impl<'a> GrainData<'a> {
    /// Returns `true` once every slice of the grain has been committed.
    pub fn is_complete(&self) -> bool {
        self.valid_slices == self.total_slices
    }

    /// The prefix of the payload covered by committed slices.
    pub fn valid_payload(&self) -> &'a [u8] {
        &self.payload[..self.valid_length]
    }

    /// Creates an owned copy of this grain's payload.
    ///
    /// Allocates a `Vec` and copies the payload bytes. Use this when you need
    /// to store the grain data beyond the reader's lifetime.
    pub fn to_owned(&self) -> OwnedGrainData {
        self.into()
    }
}

impl<'a> AsRef<GrainData<'a>> for GrainData<'a> {
    fn as_ref(&self) -> &GrainData<'a> {
        self
    }
}

/// Owned copy of grain payload data.
///
/// Unlike [`GrainData`], this owns its data and can outlive the reader.
pub struct OwnedGrainData {
    /// Owned copy of the grain payload bytes.
    pub payload: Vec<u8>,
}

impl<'a> From<&GrainData<'a>> for OwnedGrainData {
    /// Creates an owned copy by cloning the payload.
    fn from(value: &GrainData<'a>) -> Self {
        Self {
            payload: value.payload.to_vec(),
        }
    }
}

impl<'a> From<GrainData<'a>> for OwnedGrainData {
    /// Creates an owned copy by cloning the payload.
    fn from(value: GrainData<'a>) -> Self {
        value.as_ref().into()
    }
}

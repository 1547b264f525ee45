// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Sample data structures for zero-copy audio access.

use std::marker::PhantomData;

use crate::Error;

/// Placement of a wrapped sample range inside the per-channel rings.
///
/// Fragment 0 starts `frag0_offset` bytes into a channel's ring; fragment 1,
/// if non-empty, continues at the start of the ring. Channel `c`'s ring
/// begins `c * stride` bytes after the payload base.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WrappedSliceGeometry {
    pub frag0_offset: usize,
    pub frag0_len: usize,
    pub frag1_len: usize,
    pub stride: usize,
    pub channels: usize,
}

/// Computes the two-fragment placement of the `count` samples ending at
/// `end_index` inside rings of `buffer_length` samples.
///
/// `buffer_length` is a power of two, so the index-to-offset mapping is a
/// mask.
pub(crate) fn wrapped_slice_geometry(
    buffer_length: u32,
    word_size: u32,
    channel_count: u32,
    end_index: u64,
    count: usize,
) -> WrappedSliceGeometry {
    let length = buffer_length as u64;
    let word = word_size as usize;
    let start = end_index + 1 - count as u64;
    let start_offset = (start & (length - 1)) as usize;
    let samples_to_end = buffer_length as usize - start_offset;
    let frag0_samples = count.min(samples_to_end);

    WrappedSliceGeometry {
        frag0_offset: start_offset * word,
        frag0_len: frag0_samples * word,
        frag1_len: (count - frag0_samples) * word,
        stride: buffer_length as usize * word,
        channels: channel_count as usize,
    }
}

/// Zero-copy view of multi-channel audio sample data.
///
/// Provides read-only access to audio samples stored in MXL's shared memory
/// ring buffers. Each channel is stored separately, and data may be split
/// into two fragments if the ring wraps around.
///
/// The lifetime `'a` is tied to the [`crate::SamplesReader`] that produced
/// it.
///
/// # Examples
///
/// ```no_run
/// # use mxl::SamplesData;
/// # fn example(samples: SamplesData) -> Result<(), mxl::Error> {
/// for ch in 0..samples.num_of_channels() {
///     let (frag1, frag2) = samples.channel_data(ch)?;
///     println!("Channel {}: {} + {} bytes", ch, frag1.len(), frag2.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct SamplesData<'a> {
    base: *const u8,
    geometry: WrappedSliceGeometry,
    phantom: PhantomData<&'a ()>,
}

impl<'a> SamplesData<'a> {
    /// Creates a new samples data view (internal use only).
    pub(crate) fn new(base: *const u8, geometry: WrappedSliceGeometry) -> Self {
        Self {
            base,
            geometry,
            phantom: PhantomData,
        }
    }

    /// Returns the number of audio channels.
    pub fn num_of_channels(&self) -> usize {
        self.geometry.channels
    }

    /// Returns zero-copy access to a specific channel's sample data.
    ///
    /// Each channel's data is returned as two byte slices (fragments). If
    /// the range does not wrap the ring, the second fragment is empty.
    ///
    /// The returned slices are raw bytes; interpret them according to the
    /// flow's sample word size (e.g. 4 bytes for 32-bit samples).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArg`] if `channel >= num_of_channels()`.
    pub fn channel_data(&self, channel: usize) -> crate::Result<(&'a [u8], &'a [u8])> {
        if channel >= self.geometry.channels {
            return Err(Error::InvalidArg);
        }
        unsafe {
            let channel_base = self.base.add(self.geometry.stride * channel);
            Ok((
                std::slice::from_raw_parts(
                    channel_base.add(self.geometry.frag0_offset),
                    self.geometry.frag0_len,
                ),
                std::slice::from_raw_parts(channel_base, self.geometry.frag1_len),
            ))
        }
    }

    /// Creates an owned copy of this sample data.
    ///
    /// Allocates vectors and copies all channel data. Use this when you need
    /// to store the samples beyond the reader's lifetime.
    pub fn to_owned(&self) -> OwnedSamplesData {
        self.into()
    }
}

impl<'a> AsRef<SamplesData<'a>> for SamplesData<'a> {
    fn as_ref(&self) -> &SamplesData<'a> {
        self
    }
}

/// Owned copy of multi-channel sample data.
///
/// Unlike [`SamplesData`], this owns its data and can outlive the reader.
/// Each channel is stored as a contiguous `Vec<u8>` (fragments are joined).
pub struct OwnedSamplesData {
    /// Per-channel sample data (raw bytes), fragments concatenated.
    pub payload: Vec<Vec<u8>>,
}

impl<'a> From<&SamplesData<'a>> for OwnedSamplesData {
    /// Creates an owned copy by cloning and joining fragments for each
    /// channel.
    fn from(value: &SamplesData<'a>) -> Self {
        let mut payload = Vec::with_capacity(value.num_of_channels());
        for channel in 0..value.num_of_channels() {
            // The channel index is always in range here.
            let (data_1, data_2) = value.channel_data(channel).unwrap();
            let mut channel_payload = Vec::with_capacity(data_1.len() + data_2.len());
            channel_payload.extend_from_slice(data_1);
            channel_payload.extend_from_slice(data_2);
            payload.push(channel_payload);
        }
        Self { payload }
    }
}

impl<'a> From<SamplesData<'a>> for OwnedSamplesData {
    /// Creates an owned copy by cloning and joining fragments for each
    /// channel.
    fn from(value: SamplesData<'a>) -> Self {
        value.as_ref().into()
    }
}

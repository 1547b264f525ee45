// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Binary layout of the flow shared region.
//!
//! Every flow is backed by a single memory-mapped `data` file: a page-sized
//! [`FlowHeader`] followed by the payload area. For discrete flows the
//! payload area is a ring of fixed-size grain slots, each preceded by a
//! [`GrainInfo`] block; for continuous flows it is one contiguous sample
//! array per channel.
//!
//! All cross-process synchronization happens through the atomic fields in
//! these structs. Each atomic has a stable byte offset, natural alignment,
//! and a defined wire size; the compile-time assertions at the bottom of
//! this module guard the layout against accidental change.

use std::sync::atomic::{AtomicU32, AtomicU64};

use crate::time::Rational;

/// Magic value at offset 0 of every flow data file (`"MXLFLOW1"`).
pub const FLOW_MAGIC: u64 = u64::from_be_bytes(*b"MXLFLOW1");

/// The version of the flow data structs in shared memory that we expect and
/// support.
pub const FLOW_DATA_VERSION: u32 = 1;

/// The version of the grain header structs in shared memory that we expect
/// and support.
pub const GRAIN_HEADER_VERSION: u32 = 1;

/// Maximum number of payload planes per grain. Current video formats use one
/// (v210) or two (v210 + alpha).
pub const MAX_PLANES_PER_GRAIN: usize = 4;

/// The first 4 KiB of the region are reserved for the [`FlowHeader`]. The
/// payload area starts page aligned.
pub const FLOW_HEADER_SIZE: usize = 4096;

/// Reserved space in front of each grain payload for the [`GrainInfo`]
/// block. Payloads are cache-line (64 byte) aligned.
pub const GRAIN_INFO_SIZE: usize = 64;

/// Payload alignment for grain slots and channel buffers.
pub const PAYLOAD_ALIGN: usize = 64;

/// Fixed payload size of ANC data grains.
pub const DATA_GRAIN_PAYLOAD_SIZE: u32 = 4096;

/// Minimum number of slots in a discrete ring.
pub const MIN_GRAIN_COUNT: u32 = 3;

/// Minimum number of samples in a continuous ring.
pub const MIN_SAMPLE_BUFFER_LENGTH: u32 = 128;

/// Flow flag: the flow was destroyed or superseded; every subsequent read
/// must fail with `FlowInvalid`.
pub const FLOW_FLAG_INVALID: u32 = 1;

/// Grain flag: the producer signalled that the payload is corrupt.
pub const GRAIN_FLAG_INVALID: u32 = 1;

/// Flow data formats as stored in [`FlowHeader::format`].
pub const FORMAT_UNSPECIFIED: u32 = 0;
pub const FORMAT_VIDEO: u32 = 1;
pub const FORMAT_AUDIO: u32 = 2;
pub const FORMAT_DATA: u32 = 3;

/// Header of the flow shared region.
///
/// The geometry fields are written once at creation time and never change;
/// the atomics form the control block shared between the writer and all
/// readers.
#[repr(C)]
pub struct FlowHeader {
    /// [`FLOW_MAGIC`].
    pub magic: u64,
    /// [`FLOW_DATA_VERSION`].
    pub version: u32,
    /// One of the `FORMAT_*` constants.
    pub format: u32,
    /// The flow UUID, identical to the domain directory entry.
    pub id: [u8; 16],
    /// Grain rate (discrete) or sample rate (continuous), normalized.
    pub rate_numerator: i64,
    pub rate_denominator: i64,
    /// Total payload bytes per grain. Zero for continuous flows.
    pub grain_size: u32,
    /// Number of slices per grain. Zero for continuous flows.
    pub total_slices: u32,
    /// Per-plane slice (line) lengths in bytes.
    pub slice_sizes: [u32; MAX_PLANES_PER_GRAIN],
    /// Ring length: grain slots (discrete) or samples per channel
    /// (continuous, always a power of two).
    pub buffer_length: u32,
    /// Number of channels. Zero for discrete flows.
    pub channel_count: u32,
    /// Bytes per sample. Zero for discrete flows.
    pub sample_word_size: u32,
    /// The largest batch, in slices or samples, in which the producer commits
    /// new data. Partial grain commits must be multiples of this value.
    pub max_commit_batch_size_hint: u32,
    /// Inode of the data file at creation time, used to detect re-creation.
    pub inode: u64,
    /// Flow-level flags (`FLOW_FLAG_INVALID`).
    pub flags: AtomicU32,
    /// Incremented on every commit.
    pub sync_counter: AtomicU32,
    /// Index of the most recently committed grain / last committed sample.
    /// Monotonically non-decreasing under a single writer.
    pub head_index: AtomicU64,
    /// TAI nanoseconds of the last producer commit.
    pub last_write_time: AtomicU64,
    /// TAI nanoseconds of the last consumer read.
    pub last_read_time: AtomicU64,
    /// Random token published by the active writer; zero when no writer is
    /// attached.
    pub writer_nonce: AtomicU64,
    /// TAI nanoseconds of the writer's last heartbeat.
    pub writer_heartbeat: AtomicU64,
    /// Reserved space for future extensions.
    _reserved: [u8; 64],
}

impl FlowHeader {
    /// Rate stored in the header (grain rate or sample rate).
    pub fn rate(&self) -> Rational {
        Rational::new(self.rate_numerator, self.rate_denominator)
    }
}

/// Per-slot grain metadata stored in front of every grain payload.
///
/// A reader that observes `index == requested` and a `valid_slices` value
/// through an acquire load sees every payload byte written before the
/// matching release commit.
#[repr(C)]
pub struct GrainInfo {
    /// [`GRAIN_HEADER_VERSION`].
    pub version: u32,
    /// Grain flags (`GRAIN_FLAG_INVALID`).
    pub flags: AtomicU32,
    /// Absolute grain index currently occupying this slot.
    /// `UNDEFINED_INDEX` until the slot is first opened.
    pub index: AtomicU64,
    /// Total payload bytes of the grain.
    pub grain_size: u32,
    /// Number of slices in a complete grain.
    pub total_slices: u32,
    /// Number of slices published so far; equals `total_slices` once the
    /// grain is complete.
    pub valid_slices: AtomicU32,
    _pad: u32,
    /// TAI nanoseconds of the most recent commit of this grain.
    pub commit_time: AtomicU64,
    /// Reserved space for future extensions.
    _reserved: [u8; 24],
}

/// Rounds `value` up to the next multiple of `align` (a power of two).
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Byte stride of one grain slot: the info block plus the payload, padded to
/// cache-line alignment.
pub fn grain_slot_stride(grain_size: u32) -> usize {
    GRAIN_INFO_SIZE + align_up(grain_size as usize, PAYLOAD_ALIGN)
}

/// Total region length for a discrete flow.
pub fn discrete_region_len(buffer_length: u32, grain_size: u32) -> usize {
    FLOW_HEADER_SIZE + buffer_length as usize * grain_slot_stride(grain_size)
}

/// Total region length for a continuous flow.
pub fn continuous_region_len(channel_count: u32, buffer_length: u32, word_size: u32) -> usize {
    FLOW_HEADER_SIZE + channel_count as usize * buffer_length as usize * word_size as usize
}

/// Number of media units (grains or samples) covering `history_ns` at the
/// given rate, rounded up.
fn units_for_duration(rate: &Rational, history_ns: u64) -> u64 {
    let num = rate.numerator as u128;
    let den = rate.denominator as u128;
    (history_ns as u128 * num).div_ceil(den * 1_000_000_000) as u64
}

/// Ring length in slots for a discrete flow: at least `history_ns` of media
/// and never fewer than [`MIN_GRAIN_COUNT`] slots.
pub fn discrete_buffer_length(rate: &Rational, history_ns: u64) -> u32 {
    (units_for_duration(rate, history_ns).max(MIN_GRAIN_COUNT as u64)).min(u32::MAX as u64) as u32
}

/// Ring length in samples for a continuous flow: the next power of two that
/// covers `history_ns`, never below [`MIN_SAMPLE_BUFFER_LENGTH`]. Power-of-two
/// lengths let index-to-offset mapping use a mask.
pub fn continuous_buffer_length(rate: &Rational, history_ns: u64) -> u32 {
    let units = units_for_duration(rate, history_ns)
        .max(MIN_SAMPLE_BUFFER_LENGTH as u64)
        .min(1 << 31);
    (units as u32).next_power_of_two()
}

// Layout guards: the atomics below are shared across processes, so their
// offsets and the overall struct sizes are part of the wire format.
const _: () = {
    assert!(std::mem::size_of::<FlowHeader>() == 208);
    assert!(std::mem::size_of::<FlowHeader>() <= FLOW_HEADER_SIZE);
    assert!(std::mem::align_of::<FlowHeader>() == 8);
    assert!(std::mem::offset_of!(FlowHeader, magic) == 0);
    assert!(std::mem::offset_of!(FlowHeader, version) == 8);
    assert!(std::mem::offset_of!(FlowHeader, format) == 12);
    assert!(std::mem::offset_of!(FlowHeader, id) == 16);
    assert!(std::mem::offset_of!(FlowHeader, rate_numerator) == 32);
    assert!(std::mem::offset_of!(FlowHeader, rate_denominator) == 40);
    assert!(std::mem::offset_of!(FlowHeader, grain_size) == 48);
    assert!(std::mem::offset_of!(FlowHeader, total_slices) == 52);
    assert!(std::mem::offset_of!(FlowHeader, slice_sizes) == 56);
    assert!(std::mem::offset_of!(FlowHeader, buffer_length) == 72);
    assert!(std::mem::offset_of!(FlowHeader, channel_count) == 76);
    assert!(std::mem::offset_of!(FlowHeader, sample_word_size) == 80);
    assert!(std::mem::offset_of!(FlowHeader, max_commit_batch_size_hint) == 84);
    assert!(std::mem::offset_of!(FlowHeader, inode) == 88);
    assert!(std::mem::offset_of!(FlowHeader, flags) == 96);
    assert!(std::mem::offset_of!(FlowHeader, sync_counter) == 100);
    assert!(std::mem::offset_of!(FlowHeader, head_index) == 104);
    assert!(std::mem::offset_of!(FlowHeader, last_write_time) == 112);
    assert!(std::mem::offset_of!(FlowHeader, last_read_time) == 120);
    assert!(std::mem::offset_of!(FlowHeader, writer_nonce) == 128);
    assert!(std::mem::offset_of!(FlowHeader, writer_heartbeat) == 136);
};

const _: () = {
    assert!(std::mem::size_of::<GrainInfo>() == GRAIN_INFO_SIZE);
    assert!(std::mem::align_of::<GrainInfo>() == 8);
    assert!(std::mem::offset_of!(GrainInfo, version) == 0);
    assert!(std::mem::offset_of!(GrainInfo, flags) == 4);
    assert!(std::mem::offset_of!(GrainInfo, index) == 8);
    assert!(std::mem::offset_of!(GrainInfo, grain_size) == 16);
    assert!(std::mem::offset_of!(GrainInfo, total_slices) == 20);
    assert!(std::mem::offset_of!(GrainInfo, valid_slices) == 24);
    assert!(std::mem::offset_of!(GrainInfo, commit_time) == 32);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_stride_is_cache_line_aligned() {
        for grain_size in [1u32, 63, 64, 65, 4096, 5_529_600] {
            let stride = grain_slot_stride(grain_size);
            assert_eq!(stride % PAYLOAD_ALIGN, 0);
            assert!(stride >= GRAIN_INFO_SIZE + grain_size as usize);
        }
    }

    #[test]
    fn discrete_ring_covers_one_second_by_default() {
        let rate = Rational::new(60000, 1001);
        let slots = discrete_buffer_length(&rate, 1_000_000_000);
        // 59.94 fps needs 60 slots to cover a full second.
        assert_eq!(slots, 60);
    }

    #[test]
    fn discrete_ring_has_a_floor_of_three_slots() {
        let rate = Rational::new(1, 1);
        assert_eq!(discrete_buffer_length(&rate, 1), MIN_GRAIN_COUNT);
    }

    #[test]
    fn continuous_ring_is_a_power_of_two() {
        let rate = Rational::new(48000, 1);
        let len = continuous_buffer_length(&rate, 1_000_000_000);
        assert!(len.is_power_of_two());
        assert!(len >= 48000);
        assert_eq!(len, 65536);
    }

    #[test]
    fn continuous_ring_has_a_floor() {
        let rate = Rational::new(48000, 1);
        let len = continuous_buffer_length(&rate, 1);
        assert_eq!(len, MIN_SAMPLE_BUFFER_LENGTH);
    }
}

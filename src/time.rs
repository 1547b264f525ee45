// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Time and rate arithmetic.
//!
//! MXL addresses media by *index*: the integer time coordinate of a grain or
//! sample under a rational rate. This module converts between TAI timestamps
//! (nanoseconds since the SMPTE ST 2059 epoch, 1970-01-01 00:00:00 TAI) and
//! indices, and provides the pacing sleep used by writers.
//!
//! All conversions use 128-bit intermediates so that 8K video rates and
//! 192 kHz sample rates stay exact over decades of TAI time.

use serde::{Deserialize, Serialize};

/// Sentinel index value meaning "no index" / "conversion failed".
pub const UNDEFINED_INDEX: u64 = u64::MAX;

/// Nanoseconds per second.
const NS_PER_SEC: u128 = 1_000_000_000;

/// Current TAI-UTC offset in nanoseconds, applied when the kernel cannot
/// provide `CLOCK_TAI` directly. 37 s since 2017-01-01.
const TAI_UTC_OFFSET_NS: u64 = 37_000_000_000;

/// A rational number used for grain rates (e.g. 60000/1001) and sample rates
/// (e.g. 48000/1).
///
/// The JSON form follows the NMOS convention: `{"numerator": n,
/// "denominator": d}` where the denominator defaults to 1 when omitted.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rational {
    /// Numerator of the rate.
    pub numerator: i64,
    /// Denominator of the rate (defaults to 1 if omitted in JSON).
    #[serde(default = "default_denominator")]
    pub denominator: i64,
}

/// Default denominator for rates (integer rates like 48000 Hz).
fn default_denominator() -> i64 {
    1
}

impl Rational {
    /// Creates a rational from numerator and denominator without reducing.
    pub const fn new(numerator: i64, denominator: i64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Returns `true` if this rational is a usable rate (both terms strictly
    /// positive).
    pub fn is_valid(&self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    /// Returns this rational reduced by the greatest common divisor.
    ///
    /// Flow descriptors may carry unreduced rates (`100000/2000`); MXL always
    /// exposes the normalized form (`50/1`).
    pub fn normalized(self) -> Self {
        let g = gcd(self.numerator.unsigned_abs(), self.denominator.unsigned_abs());
        if g <= 1 {
            return self;
        }
        Self {
            numerator: self.numerator / g as i64,
            denominator: self.denominator / g as i64,
        }
    }
}

impl std::fmt::Display for Rational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Greatest common divisor by Euclid's algorithm.
fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Returns the current TAI time in nanoseconds since the epoch.
///
/// Uses `CLOCK_TAI` where the kernel maintains it; falls back to
/// `CLOCK_REALTIME` plus the static TAI-UTC offset. Either way the value
/// advances monotonically in practice (TAI has no leap-second jumps).
pub fn current_time() -> u64 {
    #[cfg(target_os = "linux")]
    {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        if unsafe { libc::clock_gettime(libc::CLOCK_TAI, &mut ts) } == 0 && ts.tv_sec > 0 {
            return ts.tv_sec as u64 * NS_PER_SEC as u64 + ts.tv_nsec as u64;
        }
    }
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
    ts.tv_sec as u64 * NS_PER_SEC as u64 + ts.tv_nsec as u64 + TAI_UTC_OFFSET_NS
}

/// Converts a TAI timestamp to the index that is current at that instant.
///
/// `index = floor(timestamp * num / (den * 1e9))`.
///
/// Returns [`UNDEFINED_INDEX`] if the timestamp is zero or the rate is
/// invalid.
pub fn timestamp_to_index(rate: &Rational, timestamp: u64) -> u64 {
    if timestamp == 0 || !rate.is_valid() {
        return UNDEFINED_INDEX;
    }
    let num = rate.numerator as u128;
    let den = rate.denominator as u128;
    (timestamp as u128 * num / (den * NS_PER_SEC)) as u64
}

/// Converts an index to the TAI nanosecond at which it first becomes current.
///
/// `timestamp = ceil(index * den * 1e9 / num)`, the exact inverse of
/// [`timestamp_to_index`].
///
/// Returns [`UNDEFINED_INDEX`] if the index is undefined or the rate is
/// invalid.
pub fn index_to_timestamp(rate: &Rational, index: u64) -> u64 {
    if index == UNDEFINED_INDEX || !rate.is_valid() {
        return UNDEFINED_INDEX;
    }
    let num = rate.numerator as u128;
    let den = rate.denominator as u128;
    let product = index as u128 * den * NS_PER_SEC;
    (product.div_ceil(num)) as u64
}

/// Returns the index that is current right now for the given rate.
pub fn current_index(rate: &Rational) -> u64 {
    timestamp_to_index(rate, current_time())
}

/// Returns the number of nanoseconds until the grain period for `index` has
/// elapsed (i.e. until `index + 1` becomes current). Zero if that boundary is
/// already in the past.
///
/// Writers use this to pace themselves between grains.
///
/// Returns [`UNDEFINED_INDEX`] if the rate is invalid.
pub fn ns_until_index(index: u64, rate: &Rational) -> u64 {
    if !rate.is_valid() || index == UNDEFINED_INDEX {
        return UNDEFINED_INDEX;
    }
    let boundary = index_to_timestamp(rate, index + 1);
    boundary.saturating_sub(current_time())
}

/// Blocks the calling thread for at least `duration_ns` nanoseconds.
///
/// Interrupted sleeps are resumed with the remaining time.
pub fn sleep_for_ns(duration_ns: u64) {
    let mut request = libc::timespec {
        tv_sec: (duration_ns / NS_PER_SEC as u64) as libc::time_t,
        tv_nsec: (duration_ns % NS_PER_SEC as u64) as libc::c_long,
    };
    loop {
        let mut remaining = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let rc = unsafe { libc::nanosleep(&request, &mut remaining) };
        if rc == 0 || std::io::Error::last_os_error().raw_os_error() != Some(libc::EINTR) {
            return;
        }
        request = remaining;
    }
}

//! Simulated time. The engine counts nanoseconds from simulation start in a
//! plain `u64`; these helpers convert at the API edges.

pub const NANOS_PER_SEC: u64 = 1_000_000_000;
pub const NANOS_PER_MILLI: u64 = 1_000_000;
pub const NANOS_PER_MICRO: u64 = 1_000;

pub fn secs(s: f64) -> u64 {
    (s * NANOS_PER_SEC as f64).round() as u64
}

pub fn millis(ms: f64) -> u64 {
    (ms * NANOS_PER_MILLI as f64).round() as u64
}

pub fn as_secs_f64(ns: u64) -> f64 {
    ns as f64 / NANOS_PER_SEC as f64
}

/// Serialization delay of `bytes` at `rate_bps`, rounded up to whole
/// nanoseconds so back-to-back packets never overlap. A zero-rate link
/// never finishes serializing, so the delay saturates.
pub fn transmission_delay(bytes: u32, rate_bps: u64) -> u64 {
    if rate_bps == 0 {
        return u64::MAX;
    }
    let bits = bytes as u128 * 8;
    let ns = (bits * NANOS_PER_SEC as u128).div_ceil(rate_bps as u128);
    ns.min(u64::MAX as u128) as u64
}

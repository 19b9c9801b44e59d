use std::time::Instant;

lazy_static::lazy_static! {
    static ref ORIGIN: Instant = Instant::now();
}

/// Monotonic seconds since the first call. Starts at 1: the liveness slot
/// reserves 0 as its cleared marker.
pub fn monotonic_secs() -> u64 {
    ORIGIN.elapsed().as_secs() + 1
}

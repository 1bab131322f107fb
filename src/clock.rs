use once_cell::sync::Lazy;
use std::time::Instant;

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Current time in seconds relative to the process epoch.
///
/// Last-write timestamps and transaction start times only ever get
/// compared against each other, so a process-relative origin is enough.
pub fn now() -> f64 {
    EPOCH.elapsed().as_secs_f64()
}

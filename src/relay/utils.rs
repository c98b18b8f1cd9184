//! # Clock Helpers
//!
//! Wall-clock timestamps for responses and logs, derived from a monotonic
//! base so they never run backwards when the system clock is adjusted.

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

// Wall-clock epoch microseconds captured at first use, advanced with a
// monotonic Instant from then on.
static START_TIME_BASE: OnceLock<(Instant, u64)> = OnceLock::new();

#[inline(always)]
fn time_base() -> &'static (Instant, u64) {
    START_TIME_BASE.get_or_init(|| {
        let epoch_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;
        (Instant::now(), epoch_us)
    })
}

/// Returns the current time in milliseconds since UNIX epoch.
///
/// # Example
///
/// ```rust
/// use keyrelay::current_time_ms;
///
/// let before = current_time_ms();
/// let after = current_time_ms();
/// assert!(after >= before);
/// ```
#[inline(always)]
pub fn current_time_ms() -> u64 {
    let (start, base_us) = time_base();
    (base_us / 1000).saturating_add(start.elapsed().as_millis() as u64)
}

/// Returns the current time as fractional seconds since UNIX epoch.
///
/// This is the `timestamp` / `tiempo` value reported over HTTP.
#[inline(always)]
pub fn unix_timestamp() -> f64 {
    let (start, base_us) = time_base();
    let now_us = base_us.saturating_add(start.elapsed().as_micros() as u64);
    now_us as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_functions_are_monotonic() {
        let ms1 = current_time_ms();
        let ts1 = unix_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let ms2 = current_time_ms();
        let ts2 = unix_timestamp();

        assert!(ms2 >= ms1 + 10);
        assert!(ts2 > ts1);
    }

    #[test]
    fn test_time_units_agree() {
        let ms = current_time_ms() as f64 / 1000.0;
        let secs = unix_timestamp();

        // Same base, so the two never drift more than a rounding step apart.
        assert!((secs - ms).abs() < 1.0);
        // Sometime after 2020.
        assert!(secs > 1_577_836_800.0);
    }
}

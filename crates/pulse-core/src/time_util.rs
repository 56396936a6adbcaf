//! Wall-clock utilities.
//!
//! The wire format and the shared price store both carry timestamps as f64
//! epoch seconds, so that is the one representation exposed here. Uses
//! `clock_gettime(CLOCK_REALTIME)` on Linux and `SystemTime` elsewhere.

#[cfg(target_os = "linux")]
#[inline]
fn clock_realtime() -> (u64, u64) {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: CLOCK_REALTIME is always valid. Failure returns -1 but the
    // zeroed ts is a safe fallback (epoch).
    unsafe {
        libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts);
    }
    (ts.tv_sec as u64, ts.tv_nsec as u64)
}

#[cfg(not(target_os = "linux"))]
#[inline]
fn clock_realtime() -> (u64, u64) {
    use std::time::{SystemTime, UNIX_EPOCH};
    let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    (d.as_secs(), d.subsec_nanos() as u64)
}

/// Current time as **f64 seconds** since Unix epoch.
#[inline]
pub fn now_secs_f64() -> f64 {
    let (sec, nsec) = clock_realtime();
    sec as f64 + nsec as f64 * 1e-9
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_past_2020() {
        // 2020-01-01 in epoch seconds.
        assert!(now_secs_f64() > 1_577_836_800.0);
    }

    #[test]
    fn clock_does_not_go_backwards() {
        let a = now_secs_f64();
        let b = now_secs_f64();
        assert!(b >= a);
    }
}

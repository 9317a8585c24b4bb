//! Frame pacing

use std::thread;
use std::time::{Duration, Instant};

/// How close to the deadline a strict wait stops sleeping and starts spinning
const SPIN_MARGIN: Duration = Duration::from_millis(1);

/// One frame at `frame_rate` frames per second (clamped to at least 1)
pub fn frame_period(frame_rate: u32) -> Duration {
    Duration::from_secs(1) / frame_rate.max(1)
}

/// Time this frame is allowed to occupy
///
/// With frame sync, an overrun frame is stretched to the next whole period
/// so later frames stay on the period grid.
pub fn frame_budget(elapsed: Duration, period: Duration, frame_sync: bool) -> Duration {
    if !frame_sync || period.is_zero() {
        return period;
    }
    let periods = elapsed.as_nanos().div_ceil(period.as_nanos()).max(1);
    period.saturating_mul(u32::try_from(periods).unwrap_or(u32::MAX))
}

/// Block until `deadline`
///
/// Strict waits sleep until just short of the deadline and spin for the rest,
/// trading one core for sub-millisecond accuracy.
pub fn wait_until(deadline: Instant, strict: bool) {
    let now = Instant::now();
    if deadline <= now {
        return;
    }
    let remaining = deadline - now;
    if !strict {
        thread::sleep(remaining);
        return;
    }

    if remaining > SPIN_MARGIN {
        thread::sleep(remaining - SPIN_MARGIN);
    }
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_period() {
        assert_eq!(frame_period(50), Duration::from_millis(20));
        assert_eq!(frame_period(0), Duration::from_secs(1));
    }

    #[test]
    fn test_frame_sync_rounds_up_to_whole_periods() {
        let period = frame_period(60);
        let elapsed = period.mul_f64(1.4);
        assert_eq!(frame_budget(elapsed, period, true), period * 2);
    }

    #[test]
    fn test_frame_sync_minimum_one_period() {
        let period = frame_period(60);
        assert_eq!(frame_budget(Duration::ZERO, period, true), period);
        assert_eq!(frame_budget(period / 2, period, true), period);
        assert_eq!(frame_budget(period, period, true), period);
    }

    #[test]
    fn test_frame_sync_huge_overrun_saturates() {
        let period = Duration::from_nanos(1);
        assert_eq!(
            frame_budget(Duration::MAX, period, true),
            Duration::from_nanos(u64::from(u32::MAX))
        );
        let period = Duration::from_secs(1);
        assert_eq!(
            frame_budget(Duration::from_secs(u64::MAX / 2), period, true),
            period * u32::MAX
        );
    }

    #[test]
    fn test_without_frame_sync_budget_is_one_period() {
        let period = frame_period(60);
        assert_eq!(frame_budget(period * 3, period, false), period);
    }

    #[test]
    fn test_wait_until_reaches_deadline() {
        for strict in [false, true] {
            let deadline = Instant::now() + Duration::from_millis(3);
            wait_until(deadline, strict);
            assert!(Instant::now() >= deadline);
        }
        // Past deadlines return immediately
        wait_until(Instant::now() - Duration::from_millis(1), true);
    }
}

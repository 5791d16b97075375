//! Monotonic time source shared by the sequencer and the sensor cache.

use core::time::Duration;

/// Trait implemented by monotonic instant wrappers driving the control loop.
///
/// Countdown, burn, and refresh intervals are all measured with
/// [`saturating_duration_since`](StandInstant::saturating_duration_since) from
/// an instant captured at phase entry. Counter wrap-around is not handled.
pub trait StandInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

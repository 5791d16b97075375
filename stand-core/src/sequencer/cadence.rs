use core::time::Duration;

use crate::clock::StandInstant;

/// Decides when the next telemetry sample is due.
///
/// The first poll after a reset is always due; afterwards a sample is due once
/// at least `interval` has passed since the previous one.
#[derive(Copy, Clone, Debug)]
pub struct SampleCadence<I> {
    interval: Duration,
    last: Option<I>,
}

impl<I> SampleCadence<I>
where
    I: StandInstant,
{
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Forgets the previous sample so the next poll fires immediately.
    pub fn reset(&mut self) {
        self.last = None;
    }

    #[must_use]
    pub fn is_due(&self, now: I) -> bool {
        match self.last {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        }
    }

    /// Returns `true` and marks `now` as sampled when a sample is due.
    pub fn poll(&mut self, now: I) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.last = Some(now);
        true
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

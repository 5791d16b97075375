//! Timing constants and build-time sampling profiles.

use core::time::Duration;

use crate::sensors::{TEMPERATURE_REFRESH_INTERVAL, WeightPolicy};

/// Countdown length from `GO` to T0.
pub const COUNTDOWN_DURATION: Duration = Duration::from_millis(40_000);

/// Time the fire-control output stays HIGH after T0.
pub const BURN_DURATION: Duration = Duration::from_millis(4_000);

/// Sample interval of the 4 Hz profile.
pub const LOW_RATE_INTERVAL: Duration = Duration::from_millis(250);

/// Sample interval of the 80 Hz profile.
pub const HIGH_RATE_INTERVAL: Duration = Duration::from_micros(12_500);

/// Readiness polls the low-rate profile spends waiting for the load cell.
pub const LOW_RATE_READY_POLLS: u32 = 2_000;

/// Countdown and burn timing. Fixed for the life of the process.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CountdownConfig {
    duration: Duration,
    burn: Duration,
}

impl CountdownConfig {
    /// 40 s countdown followed by a 4 s burn window.
    pub const STANDARD: Self = Self {
        duration: COUNTDOWN_DURATION,
        burn: BURN_DURATION,
    };

    /// Time from countdown start to T0.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Length of the burn window after T0.
    #[must_use]
    pub const fn burn(&self) -> Duration {
        self.burn
    }
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Telemetry sampling profile selected at build or launch time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SamplingProfile {
    /// 4 Hz with a bounded wait for each load conversion.
    LowRate,
    /// 80 Hz with non-blocking load reads.
    HighRate,
}

impl SamplingProfile {
    /// Minimum spacing between two streamed samples.
    #[must_use]
    pub const fn sample_interval(self) -> Duration {
        match self {
            SamplingProfile::LowRate => LOW_RATE_INTERVAL,
            SamplingProfile::HighRate => HIGH_RATE_INTERVAL,
        }
    }

    /// Load-cell read policy paired with this profile.
    #[must_use]
    pub const fn weight_policy(self) -> WeightPolicy {
        match self {
            SamplingProfile::LowRate => WeightPolicy::BoundedWait {
                polls: LOW_RATE_READY_POLLS,
            },
            SamplingProfile::HighRate => WeightPolicy::NonBlocking,
        }
    }

    /// Short name used in logs and on the command line.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            SamplingProfile::LowRate => "low",
            SamplingProfile::HighRate => "high",
        }
    }
}

/// Complete stand configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StandConfig {
    pub countdown: CountdownConfig,
    pub sampling: SamplingProfile,
    pub temperature_refresh: Duration,
}

impl StandConfig {
    /// Standard timing with the given sampling profile.
    #[must_use]
    pub const fn new(sampling: SamplingProfile) -> Self {
        Self {
            countdown: CountdownConfig::STANDARD,
            sampling,
            temperature_refresh: TEMPERATURE_REFRESH_INTERVAL,
        }
    }
}

impl Default for StandConfig {
    fn default() -> Self {
        Self::new(SamplingProfile::HighRate)
    }
}

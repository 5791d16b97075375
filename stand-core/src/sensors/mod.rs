//! Load cell and thermocouple sampling.
//!
//! [`SensorSource`] wraps the two sensor collaborators behind the access
//! pattern the control loop needs: the load cell is polled without waiting
//! (or with a bounded wait on the low-rate profile), and the slow
//! thermocouple bank is refreshed at a fixed interval no matter how often the
//! caller asks. Faulty channels produce whatever sentinel the driver reports;
//! values are passed through uninterpreted and never retried here.

use core::time::Duration;

use crate::clock::StandInstant;

/// Number of thermocouple channels wired to the stand.
pub const THERMOCOUPLE_CHANNELS: usize = 6;

/// Interval between thermocouple refreshes.
pub const TEMPERATURE_REFRESH_INTERVAL: Duration = Duration::from_millis(250);

/// Load value reported before the first conversion has been read.
pub const NO_WEIGHT_READING: i32 = 0;

/// Temperatures reported before the first refresh.
pub const INITIAL_TEMPERATURES: [f32; THERMOCOUPLE_CHANNELS] = [0.0; THERMOCOUPLE_CHANNELS];

/// Load-cell ADC collaborator (HX711-style).
pub trait LoadCell {
    /// Returns `true` when a conversion is waiting to be read. Must not block.
    fn is_ready(&mut self) -> bool;

    /// Reads the pending conversion as a raw signed value.
    ///
    /// Only called after [`is_ready`](LoadCell::is_ready) returned `true`.
    fn read_raw(&mut self) -> i32;
}

/// Thermocouple bank collaborator (MAX6675-style). Reads may block.
pub trait ThermocoupleBank {
    /// Reads one channel in °C. Disconnected or faulty channels return an
    /// implementation-defined out-of-range sentinel.
    fn read_celsius(&mut self, channel: usize) -> f32;
}

/// How long a weight read may wait for the ADC.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WeightPolicy {
    /// Single readiness check; never blocks the tick.
    NonBlocking,
    /// Poll readiness up to `polls` times before giving up.
    BoundedWait { polls: u32 },
}

/// One telemetry sample.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sample {
    relative_time_s: f32,
    load_raw: i32,
    temps: [f32; THERMOCOUPLE_CHANNELS],
}

impl Sample {
    /// Creates a new sample.
    #[must_use]
    pub const fn new(
        relative_time_s: f32,
        load_raw: i32,
        temps: [f32; THERMOCOUPLE_CHANNELS],
    ) -> Self {
        Self {
            relative_time_s,
            load_raw,
            temps,
        }
    }

    /// Seconds relative to T0 (negative during the countdown).
    #[must_use]
    pub const fn relative_time_s(&self) -> f32 {
        self.relative_time_s
    }

    /// Raw load-cell reading.
    #[must_use]
    pub const fn load_raw(&self) -> i32 {
        self.load_raw
    }

    /// Thermocouple readings in °C, by channel.
    #[must_use]
    pub const fn temps(&self) -> &[f32; THERMOCOUPLE_CHANNELS] {
        &self.temps
    }
}

/// Sensor front-end used by the sequencer.
pub struct SensorSource<C, H, I> {
    load_cell: C,
    thermocouples: H,
    weight_policy: WeightPolicy,
    temperature_refresh: Duration,
    last_weight: Option<i32>,
    temps: [f32; THERMOCOUPLE_CHANNELS],
    temps_read_at: Option<I>,
}

impl<C, H, I> SensorSource<C, H, I>
where
    C: LoadCell,
    H: ThermocoupleBank,
    I: StandInstant,
{
    /// Creates a sensor source with the default thermocouple refresh interval.
    #[must_use]
    pub fn new(load_cell: C, thermocouples: H, weight_policy: WeightPolicy) -> Self {
        Self::with_refresh(
            load_cell,
            thermocouples,
            weight_policy,
            TEMPERATURE_REFRESH_INTERVAL,
        )
    }

    /// Creates a sensor source with an explicit thermocouple refresh interval.
    #[must_use]
    pub fn with_refresh(
        load_cell: C,
        thermocouples: H,
        weight_policy: WeightPolicy,
        temperature_refresh: Duration,
    ) -> Self {
        Self {
            load_cell,
            thermocouples,
            weight_policy,
            temperature_refresh,
            last_weight: None,
            temps: INITIAL_TEMPERATURES,
            temps_read_at: None,
        }
    }

    /// Returns a fresh load reading, or `None` when no conversion is ready.
    pub fn try_read_weight(&mut self) -> Option<i32> {
        let ready = match self.weight_policy {
            WeightPolicy::NonBlocking => self.load_cell.is_ready(),
            WeightPolicy::BoundedWait { polls } => self.wait_until_ready(polls),
        };

        if !ready {
            return None;
        }

        let reading = self.load_cell.read_raw();
        self.last_weight = Some(reading);
        Some(reading)
    }

    /// Returns the six thermocouple readings, refreshing the hardware only when
    /// the refresh interval has passed since the previous refresh.
    pub fn read_temperatures(&mut self, now: I) -> [f32; THERMOCOUPLE_CHANNELS] {
        let stale = match self.temps_read_at {
            Some(read_at) => now.saturating_duration_since(read_at) >= self.temperature_refresh,
            None => true,
        };

        if stale {
            for (channel, slot) in self.temps.iter_mut().enumerate() {
                *slot = self.thermocouples.read_celsius(channel);
            }
            self.temps_read_at = Some(now);
        }

        self.temps
    }

    /// Builds a sample, reusing the previous load reading when the ADC has
    /// nothing new.
    pub fn sample(&mut self, relative_time_s: f32, now: I) -> Sample {
        let load_raw = self
            .try_read_weight()
            .or(self.last_weight)
            .unwrap_or(NO_WEIGHT_READING);
        let temps = self.read_temperatures(now);
        Sample::new(relative_time_s, load_raw, temps)
    }

    /// Most recent load reading, if any conversion has been read.
    #[must_use]
    pub fn last_weight(&self) -> Option<i32> {
        self.last_weight
    }

    /// Active weight read policy.
    #[must_use]
    pub fn weight_policy(&self) -> WeightPolicy {
        self.weight_policy
    }

    /// Returns the wrapped load cell.
    #[must_use]
    pub fn load_cell(&self) -> &C {
        &self.load_cell
    }

    /// Returns the wrapped load cell mutably.
    pub fn load_cell_mut(&mut self) -> &mut C {
        &mut self.load_cell
    }

    /// Returns the wrapped thermocouple bank.
    #[must_use]
    pub fn thermocouples(&self) -> &H {
        &self.thermocouples
    }

    /// Returns the wrapped thermocouple bank mutably.
    pub fn thermocouples_mut(&mut self) -> &mut H {
        &mut self.thermocouples
    }

    fn wait_until_ready(&mut self, polls: u32) -> bool {
        for _ in 0..polls.max(1) {
            if self.load_cell.is_ready() {
                return true;
            }
            core::hint::spin_loop();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    struct MockInstant(u64);

    impl MockInstant {
        fn millis(value: u64) -> Self {
            Self(value * 1_000)
        }
    }

    impl StandInstant for MockInstant {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_micros(self.0.saturating_sub(earlier.0))
        }
    }

    /// Becomes ready after `not_ready_polls` readiness checks.
    struct MockLoadCell {
        not_ready_polls: u32,
        polls: u32,
        value: i32,
    }

    impl MockLoadCell {
        fn ready_after(not_ready_polls: u32, value: i32) -> Self {
            Self {
                not_ready_polls,
                polls: 0,
                value,
            }
        }
    }

    impl LoadCell for MockLoadCell {
        fn is_ready(&mut self) -> bool {
            self.polls += 1;
            self.polls > self.not_ready_polls
        }

        fn read_raw(&mut self) -> i32 {
            self.polls = 0;
            self.value
        }
    }

    #[derive(Default)]
    struct CountingBank {
        reads: usize,
    }

    impl ThermocoupleBank for CountingBank {
        #[allow(clippy::cast_precision_loss)]
        fn read_celsius(&mut self, channel: usize) -> f32 {
            self.reads += 1;
            if channel == 3 {
                f32::NAN
            } else {
                20.0 + channel as f32
            }
        }
    }

    type Source = SensorSource<MockLoadCell, CountingBank, MockInstant>;

    #[test]
    fn non_blocking_read_checks_readiness_once() {
        let mut source: Source = SensorSource::new(
            MockLoadCell::ready_after(1, 42),
            CountingBank::default(),
            WeightPolicy::NonBlocking,
        );

        assert_eq!(source.try_read_weight(), None);
        assert_eq!(source.load_cell().polls, 1);
        assert_eq!(source.try_read_weight(), Some(42));
    }

    #[test]
    fn bounded_wait_gives_up_after_budget() {
        let mut source: Source = SensorSource::new(
            MockLoadCell::ready_after(10, 7),
            CountingBank::default(),
            WeightPolicy::BoundedWait { polls: 4 },
        );

        assert_eq!(source.try_read_weight(), None);
        assert_eq!(source.load_cell().polls, 4);

        let mut patient: Source = SensorSource::new(
            MockLoadCell::ready_after(10, 7),
            CountingBank::default(),
            WeightPolicy::BoundedWait { polls: 32 },
        );
        assert_eq!(patient.try_read_weight(), Some(7));
    }

    #[test]
    fn sample_reuses_last_weight_when_stale() {
        let mut source: Source = SensorSource::new(
            MockLoadCell::ready_after(1, 900),
            CountingBank::default(),
            WeightPolicy::NonBlocking,
        );

        let first = source.sample(-40.0, MockInstant::millis(0));
        assert_eq!(first.load_raw(), NO_WEIGHT_READING);

        let second = source.sample(-39.9, MockInstant::millis(100));
        assert_eq!(second.load_raw(), 900);

        let third = source.sample(-39.8, MockInstant::millis(200));
        assert_eq!(third.load_raw(), 900);
        assert_eq!(source.last_weight(), Some(900));
    }

    #[test]
    fn temperatures_refresh_at_fixed_interval() {
        let mut source: Source = SensorSource::new(
            MockLoadCell::ready_after(0, 0),
            CountingBank::default(),
            WeightPolicy::NonBlocking,
        );

        let temps = source.read_temperatures(MockInstant::millis(0));
        assert_eq!(source.thermocouples().reads, THERMOCOUPLE_CHANNELS);
        assert_eq!(temps[0], 20.0);
        assert!(temps[3].is_nan(), "fault sentinel must pass through");

        source.read_temperatures(MockInstant::millis(100));
        source.read_temperatures(MockInstant::millis(249));
        assert_eq!(source.thermocouples().reads, THERMOCOUPLE_CHANNELS);

        source.read_temperatures(MockInstant::millis(250));
        assert_eq!(source.thermocouples().reads, 2 * THERMOCOUPLE_CHANNELS);
    }
}

//! Build configuration and event logging for the stand control loop.

use stand_core::sequencer::{SamplingProfile, StandConfig};
use stand_core::telemetry::{EventId, EventLog, StandEvent};

use crate::clock::FirmwareInstant;

/// Sampling profile chosen by the `low-rate` feature.
#[cfg(feature = "low-rate")]
pub const SAMPLING: SamplingProfile = SamplingProfile::LowRate;
#[cfg(not(feature = "low-rate"))]
pub const SAMPLING: SamplingProfile = SamplingProfile::HighRate;

/// Configuration the firmware runs with.
pub const STAND_CONFIG: StandConfig = StandConfig::new(SAMPLING);

/// Control-loop period. Divides both sample intervals evenly.
pub const TICK_PERIOD_US: u64 = 500;

/// Forwards newly recorded sequencer events to the log sink.
#[derive(Debug, Default)]
pub struct EventForwarder {
    last_seen: Option<EventId>,
}

impl EventForwarder {
    pub const fn new() -> Self {
        Self { last_seen: None }
    }

    /// Logs every event recorded since the previous call and returns how many
    /// were forwarded.
    pub fn forward(&mut self, events: &EventLog<FirmwareInstant>) -> usize {
        let mut forwarded = 0;
        for event in events.events_after(self.last_seen) {
            log_stand_event(event);
            self.last_seen = Some(event.id);
            forwarded += 1;
        }
        forwarded
    }
}

#[cfg(target_os = "none")]
fn log_stand_event(event: &StandEvent<FirmwareInstant>) {
    defmt::info!(
        "stand: #{} {} t={}us",
        event.id,
        defmt::Display2Format(&event.kind),
        event.timestamp.as_micros()
    );
}

#[cfg(not(target_os = "none"))]
fn log_stand_event(event: &StandEvent<FirmwareInstant>) {
    println!(
        "stand: #{} {} t={}us",
        event.id,
        event.kind,
        event.timestamp.as_micros()
    );
}

#[cfg(target_os = "none")]
#[allow(clippy::cast_possible_truncation)]
pub fn log_boot(config: &StandConfig) {
    defmt::info!(
        "stand: boot sampling={} interval={}us countdown={}ms burn={}ms",
        config.sampling.label(),
        config.sampling.sample_interval().as_micros() as u64,
        config.countdown.duration().as_millis() as u64,
        config.countdown.burn().as_millis() as u64
    );
}

#[cfg(not(target_os = "none"))]
pub fn log_boot(config: &StandConfig) {
    println!(
        "stand: boot sampling={} interval={}us countdown={}ms burn={}ms",
        config.sampling.label(),
        config.sampling.sample_interval().as_micros(),
        config.countdown.duration().as_millis(),
        config.countdown.burn().as_millis()
    );
}

//! Countdown and fire-control state machine.
//!
//! The [`Sequencer`] is the only writer of the fire-control output. Each call
//! to [`Sequencer::tick`] runs one pass of the control loop, in this order:
//!
//! 1. retire a dead client and accept a waiting one (deferred while the burn
//!    window is live),
//! 2. apply at most one received command,
//! 3. check the link and abort a countdown whose client has gone,
//! 4. advance the phase (T0 and burn cutoff),
//! 5. take and stream a sample when the cadence says one is due.
//!
//! The fire-control output is HIGH exactly while the sequencer is running and
//! less than the burn duration has passed since T0. Ignition happens at most
//! once per client connection.

use core::time::Duration;

use crate::clock::StandInstant;
use crate::link::{Listener, TelemetryLink};
use crate::protocol::{Command, ControlLine, PacketEncoder};
use crate::sensors::{LoadCell, Sample, SensorSource, ThermocoupleBank};
use crate::telemetry::{AbortReason, EventLog, StandEventKind};

mod cadence;
pub mod config;

pub use cadence::SampleCadence;
pub use config::{
    BURN_DURATION, COUNTDOWN_DURATION, CountdownConfig, HIGH_RATE_INTERVAL, LOW_RATE_INTERVAL,
    LOW_RATE_READY_POLLS, SamplingProfile, StandConfig,
};

/// Externally visible sequencer state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SequencerState {
    Idle,
    Countdown,
    Running,
    Aborted,
}

impl SequencerState {
    /// Returns `true` in the phases that stream telemetry.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, SequencerState::Countdown | SequencerState::Running)
    }

    /// Short label for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            SequencerState::Idle => "idle",
            SequencerState::Countdown => "countdown",
            SequencerState::Running => "running",
            SequencerState::Aborted => "aborted",
        }
    }
}

/// Level of the fire-control output.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FireLevel {
    Low,
    High,
}

/// Fire-control output driver (igniter relay or GPIO).
pub trait FireControl {
    /// Drives the output to `level`.
    fn drive(&mut self, level: FireLevel);
}

/// Fire control that performs no hardware interaction.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopFireControl;

impl NoopFireControl {
    /// Creates a new no-op fire control.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl FireControl for NoopFireControl {
    fn drive(&mut self, _level: FireLevel) {}
}

#[derive(Copy, Clone, Debug)]
enum Phase<I> {
    Idle,
    Countdown { started_at: I },
    Running { started_at: I, t0: I, cut_off: bool },
    Aborted,
}

/// Stand state machine.
pub struct Sequencer<F, I>
where
    F: FireControl,
    I: StandInstant,
{
    config: StandConfig,
    fire: F,
    fire_level: FireLevel,
    phase: Phase<I>,
    cadence: SampleCadence<I>,
    link_attached: bool,
    events: EventLog<I>,
}

impl<F, I> Sequencer<F, I>
where
    F: FireControl,
    I: StandInstant,
{
    /// Creates an idle sequencer and drives the fire-control output LOW.
    #[must_use]
    pub fn new(config: StandConfig, mut fire: F) -> Self {
        fire.drive(FireLevel::Low);
        Self {
            config,
            fire,
            fire_level: FireLevel::Low,
            phase: Phase::Idle,
            cadence: SampleCadence::new(config.sampling.sample_interval()),
            link_attached: false,
            events: EventLog::new(),
        }
    }

    /// Runs one pass of the control loop. Returns the sample streamed this
    /// tick, if any.
    pub fn tick<L, C, H>(
        &mut self,
        now: I,
        link: &mut TelemetryLink<L>,
        sensors: &mut SensorSource<C, H, I>,
    ) -> Option<Sample>
    where
        L: Listener,
        C: LoadCell,
        H: ThermocoupleBank,
    {
        if !self.burn_active() {
            self.check_link(now, link);
            if link.accept() {
                self.reset_for_new_client(now);
            }
        }

        if let Some(command) = link.try_receive_line().as_deref().and_then(Command::parse) {
            self.apply_command(command, now, link);
        }

        self.check_link(now, link);
        self.advance(now, link);
        self.stream(now, link, sensors)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SequencerState {
        match self.phase {
            Phase::Idle => SequencerState::Idle,
            Phase::Countdown { .. } => SequencerState::Countdown,
            Phase::Running { .. } => SequencerState::Running,
            Phase::Aborted => SequencerState::Aborted,
        }
    }

    /// Level last written to the fire-control output.
    #[must_use]
    pub fn fire_level(&self) -> FireLevel {
        self.fire_level
    }

    /// When the current countdown began, while counting down or running.
    #[must_use]
    pub fn countdown_started_at(&self) -> Option<I> {
        match self.phase {
            Phase::Countdown { started_at } | Phase::Running { started_at, .. } => {
                Some(started_at)
            }
            Phase::Idle | Phase::Aborted => None,
        }
    }

    /// T0 of the current activation, once reached.
    #[must_use]
    pub fn ignition_at(&self) -> Option<I> {
        match self.phase {
            Phase::Running { t0, .. } => Some(t0),
            _ => None,
        }
    }

    /// Returns `true` between T0 and the burn cutoff.
    #[must_use]
    pub fn burn_active(&self) -> bool {
        matches!(self.phase, Phase::Running { cut_off: false, .. })
    }

    /// Returns `true` while the sequencer believes a client is attached.
    #[must_use]
    pub fn link_attached(&self) -> bool {
        self.link_attached
    }

    /// Recorded stand events.
    #[must_use]
    pub fn events(&self) -> &EventLog<I> {
        &self.events
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &StandConfig {
        &self.config
    }

    /// Returns the fire-control driver.
    #[must_use]
    pub fn fire_control(&self) -> &F {
        &self.fire
    }

    fn apply_command<L>(&mut self, command: Command, now: I, link: &mut TelemetryLink<L>)
    where
        L: Listener,
    {
        match (command, self.phase) {
            (Command::Go, Phase::Idle) => self.begin_countdown(now, link),
            (Command::Abort, Phase::Countdown { started_at }) => {
                if !self.countdown_expired(started_at, now) {
                    self.abort(AbortReason::Operator, now, link);
                }
            }
            _ => {}
        }
    }

    fn begin_countdown<L>(&mut self, now: I, link: &mut TelemetryLink<L>)
    where
        L: Listener,
    {
        self.phase = Phase::Countdown { started_at: now };
        self.cadence.reset();
        self.events.record(StandEventKind::CountdownStarted, now);
        self.send(ControlLine::CountdownStart, now, link);
    }

    fn abort<L>(&mut self, reason: AbortReason, now: I, link: &mut TelemetryLink<L>)
    where
        L: Listener,
    {
        self.phase = Phase::Aborted;
        self.drive_fire(FireLevel::Low);
        self.events.record(StandEventKind::Aborted(reason), now);
        let _ = link.send_control(ControlLine::Aborted);
    }

    /// Tracks link attachment and aborts a countdown that lost its client.
    /// Once the countdown has expired the T0 transition wins.
    fn check_link<L>(&mut self, now: I, link: &mut TelemetryLink<L>)
    where
        L: Listener,
    {
        let connected = link.is_connected();
        if self.link_attached && !connected {
            self.events.record(StandEventKind::LinkLost, now);
        }
        self.link_attached = connected;

        if connected {
            return;
        }
        if let Phase::Countdown { started_at } = self.phase
            && !self.countdown_expired(started_at, now)
        {
            self.abort(AbortReason::LinkLost, now, link);
        }
    }

    fn advance<L>(&mut self, now: I, link: &mut TelemetryLink<L>)
    where
        L: Listener,
    {
        if let Phase::Countdown { started_at } = self.phase
            && self.countdown_expired(started_at, now)
        {
            self.phase = Phase::Running {
                started_at,
                t0: now,
                cut_off: false,
            };
            self.drive_fire(FireLevel::High);
            self.events.record(StandEventKind::T0Reached, now);
            let _ = link.send_control(ControlLine::T0Reached);
        }

        if let Phase::Running {
            started_at,
            t0,
            cut_off: false,
        } = self.phase
            && now.saturating_duration_since(t0) >= self.config.countdown.burn()
        {
            self.phase = Phase::Running {
                started_at,
                t0,
                cut_off: true,
            };
            self.drive_fire(FireLevel::Low);
            self.events.record(StandEventKind::BurnCutoff, now);
        }
    }

    fn stream<L, C, H>(
        &mut self,
        now: I,
        link: &mut TelemetryLink<L>,
        sensors: &mut SensorSource<C, H, I>,
    ) -> Option<Sample>
    where
        L: Listener,
        C: LoadCell,
        H: ThermocoupleBank,
    {
        if !self.state().is_active() || !link.is_connected() || !self.cadence.poll(now) {
            return None;
        }

        let sample = sensors.sample(self.relative_time(now), now);
        let packet = PacketEncoder::encode(&sample);
        if link.send_line(&packet).is_err() {
            self.check_link(now, link);
        }
        Some(sample)
    }

    /// Sends a control line; a failure that leaves the link down is handled
    /// like any other link loss.
    fn send<L>(&mut self, control: ControlLine, now: I, link: &mut TelemetryLink<L>)
    where
        L: Listener,
    {
        if link.send_control(control).is_err() {
            self.check_link(now, link);
        }
    }

    fn reset_for_new_client(&mut self, now: I) {
        self.phase = Phase::Idle;
        self.drive_fire(FireLevel::Low);
        self.cadence.reset();
        self.link_attached = true;
        self.events.record(StandEventKind::ClientConnected, now);
    }

    fn countdown_expired(&self, started_at: I, now: I) -> bool {
        now.saturating_duration_since(started_at) >= self.config.countdown.duration()
    }

    /// Seconds relative to T0: negative during the countdown, zero at T0.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn relative_time(&self, now: I) -> f32 {
        let micros = match self.phase {
            Phase::Countdown { started_at } => {
                micros(now.saturating_duration_since(started_at))
                    - micros(self.config.countdown.duration())
            }
            Phase::Running { t0, .. } => micros(now.saturating_duration_since(t0)),
            Phase::Idle | Phase::Aborted => 0,
        };
        (micros as f64 / 1_000_000.0) as f32
    }

    fn drive_fire(&mut self, level: FireLevel) {
        self.fire.drive(level);
        self.fire_level = level;
    }
}

fn micros(duration: Duration) -> i64 {
    i64::try_from(duration.as_micros()).unwrap_or(i64::MAX)
}

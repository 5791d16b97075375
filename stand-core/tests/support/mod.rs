#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use stand_core::clock::StandInstant;
use stand_core::link::{Listener, Session, TelemetryLink};
use stand_core::sensors::{LoadCell, Sample, SensorSource, ThermocoupleBank};
use stand_core::sequencer::{FireControl, FireLevel, SamplingProfile, Sequencer, StandConfig};

/// Microsecond timestamp.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MockInstant(pub u64);

impl MockInstant {
    pub fn millis(ms: u64) -> Self {
        Self(ms * 1_000)
    }
}

impl StandInstant for MockInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Both ends of one simulated client connection.
#[derive(Debug, Default)]
pub struct Wire {
    pub connected: bool,
    pub drop_on_write: bool,
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct Client(Rc<RefCell<Wire>>);

impl Client {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(Wire {
            connected: true,
            ..Wire::default()
        })))
    }

    pub fn send(&self, line: &str) {
        let mut wire = self.0.borrow_mut();
        wire.inbound.extend(line.as_bytes());
        wire.inbound.push_back(b'\n');
    }

    pub fn hang_up(&self) {
        self.0.borrow_mut().connected = false;
    }

    /// Next write from the stand fails and tears the connection down.
    pub fn drop_on_next_write(&self) {
        self.0.borrow_mut().drop_on_write = true;
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8(self.0.borrow().outbound.clone())
            .expect("stand wrote invalid UTF-8")
            .lines()
            .map(str::to_owned)
            .collect()
    }

    pub fn count(&self, line: &str) -> usize {
        self.lines().iter().filter(|seen| seen.as_str() == line).count()
    }

    /// Telemetry packets received, in order.
    pub fn packets(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.contains(','))
            .collect()
    }
}

pub struct MockSession(Client);

impl Session for MockSession {
    type Error = ();

    fn is_connected(&mut self) -> bool {
        self.0.0.borrow().connected
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        let mut wire = self.0.0.borrow_mut();
        if !wire.connected {
            return Err(());
        }
        if wire.drop_on_write {
            wire.connected = false;
            return Err(());
        }
        wire.outbound.extend_from_slice(bytes);
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut wire = self.0.0.borrow_mut();
        let count = buf.len().min(wire.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(wire.inbound.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

#[derive(Default)]
pub struct MockListener {
    waiting: VecDeque<Client>,
}

impl Listener for MockListener {
    type Session = MockSession;

    fn try_accept(&mut self) -> Option<Self::Session> {
        self.waiting.pop_front().map(MockSession)
    }
}

/// The reading counts up by one per conversion. Ready on every
/// `ready_every`-th readiness poll; every poll when left at zero.
#[derive(Default)]
pub struct CountingLoadCell {
    next: i32,
    pub ready_every: u32,
    pub polls: u32,
}

impl LoadCell for CountingLoadCell {
    fn is_ready(&mut self) -> bool {
        self.polls += 1;
        self.ready_every <= 1 || self.polls % self.ready_every == 0
    }

    fn read_raw(&mut self) -> i32 {
        self.next += 1;
        self.next
    }
}

#[derive(Default)]
pub struct FixedThermocouples;

impl ThermocoupleBank for FixedThermocouples {
    #[allow(clippy::cast_precision_loss)]
    fn read_celsius(&mut self, channel: usize) -> f32 {
        20.0 + channel as f32
    }
}

/// Fire control that remembers the line level and counts ignitions.
#[derive(Debug)]
pub struct RecordingFireControl {
    pub level: FireLevel,
    pub rising_edges: u32,
}

impl Default for RecordingFireControl {
    fn default() -> Self {
        Self {
            level: FireLevel::Low,
            rising_edges: 0,
        }
    }
}

impl FireControl for RecordingFireControl {
    fn drive(&mut self, level: FireLevel) {
        if self.level == FireLevel::Low && level == FireLevel::High {
            self.rising_edges += 1;
        }
        self.level = level;
    }
}

/// Sequencer wired to mock collaborators.
pub struct Bench {
    pub sequencer: Sequencer<RecordingFireControl, MockInstant>,
    pub link: TelemetryLink<MockListener>,
    pub sensors: SensorSource<CountingLoadCell, FixedThermocouples, MockInstant>,
    pub now_ms: u64,
}

impl Bench {
    pub fn new() -> Self {
        Self::with_sampling(SamplingProfile::HighRate)
    }

    pub fn with_sampling(sampling: SamplingProfile) -> Self {
        let config = StandConfig::new(sampling);
        Self {
            sequencer: Sequencer::new(config, RecordingFireControl::default()),
            link: TelemetryLink::new(MockListener::default()),
            sensors: SensorSource::with_refresh(
                CountingLoadCell::default(),
                FixedThermocouples,
                config.sampling.weight_policy(),
                config.temperature_refresh,
            ),
            now_ms: 0,
        }
    }

    /// Queues a new client; it is accepted on a later tick.
    pub fn connect(&mut self) -> Client {
        let client = Client::new();
        self.link.listener_mut().waiting.push_back(client.clone());
        client
    }

    pub fn tick_at(&mut self, ms: u64) -> Option<Sample> {
        self.now_ms = ms;
        self.sequencer
            .tick(MockInstant::millis(ms), &mut self.link, &mut self.sensors)
    }

    /// Ticks every millisecond after the current time up to and including `ms`.
    pub fn run_until(&mut self, ms: u64) -> Vec<Sample> {
        let mut samples = Vec::new();
        while self.now_ms < ms {
            let next = self.now_ms + 1;
            samples.extend(self.tick_at(next));
        }
        samples
    }

    /// Connects a client and sends `GO` so the countdown starts on the tick at `ms`.
    pub fn connect_and_go(&mut self, ms: u64) -> Client {
        let client = self.connect();
        client.send("GO");
        self.tick_at(ms);
        client
    }

    pub fn fire(&self) -> &RecordingFireControl {
        self.sequencer.fire_control()
    }
}

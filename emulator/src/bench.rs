//! Host bench that runs the stand sequencer against a TCP client and
//! simulated sensors.
//!
//! The TCP transport mirrors the original board's access point: one client at a
//! time on port 5050, newline-terminated text both ways. The fire-control line
//! is only logged, but it also feeds the simulated load cell and thermocouples
//! so a run produces a plausible thrust and temperature trace.

use std::cell::Cell;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::rc::Rc;
use std::time::{Duration, Instant};

use stand_core::clock::StandInstant;
use stand_core::link::{Listener, Session, TelemetryLink};
use stand_core::sensors::{LoadCell, Sample, SensorSource, THERMOCOUPLE_CHANNELS, ThermocoupleBank};
use stand_core::sequencer::{
    FireControl, FireLevel, SamplingProfile, Sequencer, SequencerState, StandConfig,
};
use stand_core::telemetry::{EventId, StandEventKind};
use tracing::{debug, info, warn};

/// Port the original stand listened on.
pub const DEFAULT_PORT: u16 = 5050;

/// HX711 conversion period at 80 samples per second.
pub const LOAD_CONVERSION_INTERVAL: Duration = Duration::from_micros(12_500);

/// Raw reading of the unloaded cell.
pub const LOAD_TARE: i32 = 8_400;

/// Raw counts added at peak thrust.
pub const PEAK_THRUST_COUNTS: i32 = 250_000;

/// Ambient temperature reported by every channel at rest.
pub const AMBIENT_C: f32 = 21.0;

/// Bytes held back for a client that reads slower than the stand streams.
pub const OUTBOUND_BACKLOG: usize = 16 * 1024;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct HostInstant(Instant);

impl HostInstant {
    pub fn now() -> Self {
        Self(Instant::now())
    }
}

impl From<Instant> for HostInstant {
    fn from(instant: Instant) -> Self {
        Self(instant)
    }
}

impl StandInstant for HostInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }
}

/// Non-blocking TCP listener handing out one client at a time.
pub struct TcpLinkListener {
    listener: TcpListener,
}

impl TcpLinkListener {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Listener for TcpLinkListener {
    type Session = TcpSession;

    fn try_accept(&mut self) -> Option<Self::Session> {
        match self.listener.accept() {
            Ok((stream, peer)) => match TcpSession::new(stream, peer) {
                Ok(session) => {
                    info!(%peer, "ground station connected");
                    Some(session)
                }
                Err(err) => {
                    warn!(%peer, error = %err, "failed to configure client socket");
                    None
                }
            },
            Err(err) if err.kind() == ErrorKind::WouldBlock => None,
            Err(err) => {
                warn!(error = %err, "accept failed");
                None
            }
        }
    }
}

/// Accepted TCP client.
///
/// The socket is non-blocking, so the kernel may take only part of a line.
/// The rest waits in `outbound` and goes out before anything newer; a line
/// that does not fit in the backlog is refused whole.
pub struct TcpSession {
    stream: TcpStream,
    peer: SocketAddr,
    open: bool,
    outbound: Vec<u8>,
}

impl TcpSession {
    fn new(stream: TcpStream, peer: SocketAddr) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            peer,
            open: true,
            outbound: Vec::with_capacity(OUTBOUND_BACKLOG),
        })
    }

    /// Bytes accepted by `write_all` that the socket has not taken yet.
    pub fn pending_bytes(&self) -> usize {
        self.outbound.len()
    }

    fn flush(&mut self) -> io::Result<()> {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => {
                    self.close("socket accepted no bytes");
                    return Err(ErrorKind::WriteZero.into());
                }
                Ok(written) => {
                    self.outbound.drain(..written);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    self.close("write failed");
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn close(&mut self, reason: &str) {
        if self.open {
            info!(peer = %self.peer, reason, "ground station disconnected");
        }
        self.open = false;
    }
}

impl Session for TcpSession {
    type Error = io::Error;

    fn is_connected(&mut self) -> bool {
        if !self.open {
            return false;
        }

        let mut peeked = [0u8; 1];
        let alive = match self.stream.peek(&mut peeked) {
            Ok(0) => {
                self.close("closed by peer");
                false
            }
            Ok(_) => true,
            Err(err) if err.kind() == ErrorKind::WouldBlock => true,
            Err(_) => {
                self.close("socket error");
                false
            }
        };
        alive && self.flush().is_ok()
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        if !self.open {
            return Err(ErrorKind::NotConnected.into());
        }

        self.flush()?;
        if self.outbound.len() + bytes.len() > OUTBOUND_BACKLOG {
            debug!(peer = %self.peer, backlog = self.outbound.len(), "client backlog full, line dropped");
            return Err(io::Error::new(
                ErrorKind::WouldBlock,
                "client is not keeping up",
            ));
        }

        self.outbound.extend_from_slice(bytes);
        self.flush()
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match self.stream.read(buf) {
            Ok(0) if !buf.is_empty() => {
                self.close("closed by peer");
                Ok(0)
            }
            Ok(count) => Ok(count),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(err) => {
                self.close("read failed");
                Err(err)
            }
        }
    }
}

/// Fire-control line shared with the simulated sensors.
pub type FireLine = Rc<Cell<FireLevel>>;

/// Logs every change of the fire-control line.
pub struct LoggedFireControl {
    line: FireLine,
}

impl LoggedFireControl {
    pub fn new(line: FireLine) -> Self {
        Self { line }
    }
}

impl FireControl for LoggedFireControl {
    fn drive(&mut self, level: FireLevel) {
        let previous = self.line.replace(level);
        match (previous, level) {
            (FireLevel::Low, FireLevel::High) => warn!("fire line HIGH"),
            (FireLevel::High, FireLevel::Low) => info!("fire line LOW"),
            _ => debug!(?level, "fire line unchanged"),
        }
    }
}

/// Load cell that reads tare plus a thrust curve while the fire line is HIGH.
pub struct SimulatedLoadCell {
    fire: FireLine,
    converted_at: Option<Instant>,
    burn_reads: u32,
    noise: u32,
}

impl SimulatedLoadCell {
    pub fn new(fire: FireLine) -> Self {
        Self {
            fire,
            converted_at: None,
            burn_reads: 0,
            noise: 0x2545_F491,
        }
    }

    fn jitter(&mut self) -> i32 {
        // xorshift32
        self.noise ^= self.noise << 13;
        self.noise ^= self.noise >> 17;
        self.noise ^= self.noise << 5;
        i32::try_from(self.noise % 64).unwrap_or(0) - 32
    }

    fn thrust(&mut self) -> i32 {
        if self.fire.get() == FireLevel::Low {
            self.burn_reads = 0;
            return 0;
        }
        self.burn_reads = self.burn_reads.saturating_add(1);
        // Fast rise over the first 40 conversions, then a slow regressive tail.
        let reads = i32::try_from(self.burn_reads).unwrap_or(i32::MAX);
        if reads < 40 {
            PEAK_THRUST_COUNTS / 40 * reads
        } else {
            (PEAK_THRUST_COUNTS - (reads - 40) * 500).max(PEAK_THRUST_COUNTS / 3)
        }
    }
}

impl LoadCell for SimulatedLoadCell {
    fn is_ready(&mut self) -> bool {
        self.converted_at
            .is_none_or(|at| at.elapsed() >= LOAD_CONVERSION_INTERVAL)
    }

    fn read_raw(&mut self) -> i32 {
        self.converted_at = Some(Instant::now());
        LOAD_TARE + self.thrust() + self.jitter()
    }
}

/// Thermocouples that warm up while the motor burns.
pub struct SimulatedThermocouples {
    fire: FireLine,
    heat: [f32; THERMOCOUPLE_CHANNELS],
    faulty_channel: Option<usize>,
}

impl SimulatedThermocouples {
    pub fn new(fire: FireLine, faulty_channel: Option<usize>) -> Self {
        Self {
            fire,
            heat: [0.0; THERMOCOUPLE_CHANNELS],
            faulty_channel,
        }
    }
}

impl ThermocoupleBank for SimulatedThermocouples {
    #[allow(clippy::cast_precision_loss)]
    fn read_celsius(&mut self, channel: usize) -> f32 {
        if self.faulty_channel == Some(channel) || channel >= THERMOCOUPLE_CHANNELS {
            return f32::NAN;
        }

        let heat = &mut self.heat[channel];
        if self.fire.get() == FireLevel::High {
            // Channels nearer the nozzle heat faster.
            *heat += 12.0 / (channel as f32 + 1.0);
        } else {
            *heat *= 0.995;
        }
        AMBIENT_C + 0.25 * channel as f32 + *heat
    }
}

/// Launch options for the bench.
#[derive(Copy, Clone, Debug)]
pub struct BenchOptions {
    pub sampling: SamplingProfile,
    pub faulty_channel: Option<usize>,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            sampling: SamplingProfile::HighRate,
            faulty_channel: None,
        }
    }
}

type BenchSequencer = Sequencer<LoggedFireControl, HostInstant>;
type BenchSensors = SensorSource<SimulatedLoadCell, SimulatedThermocouples, HostInstant>;

/// Sequencer wired to the TCP link and simulated sensors.
pub struct Bench {
    sequencer: BenchSequencer,
    link: TelemetryLink<TcpLinkListener>,
    sensors: BenchSensors,
    last_event: Option<EventId>,
    last_state: SequencerState,
    samples_streamed: u64,
}

impl Bench {
    pub fn new(listener: TcpLinkListener, options: BenchOptions) -> Self {
        let config = StandConfig::new(options.sampling);
        let fire: FireLine = Rc::new(Cell::new(FireLevel::Low));
        let sequencer = Sequencer::new(config, LoggedFireControl::new(Rc::clone(&fire)));
        let sensors = SensorSource::with_refresh(
            SimulatedLoadCell::new(Rc::clone(&fire)),
            SimulatedThermocouples::new(fire, options.faulty_channel),
            config.sampling.weight_policy(),
            config.temperature_refresh,
        );

        Self {
            sequencer,
            link: TelemetryLink::new(listener),
            sensors,
            last_event: None,
            last_state: SequencerState::Idle,
            samples_streamed: 0,
        }
    }

    /// Runs one control-loop pass and mirrors new events to the log.
    pub fn tick(&mut self, now: HostInstant) -> Option<Sample> {
        let sample = self
            .sequencer
            .tick(now, &mut self.link, &mut self.sensors);

        if let Some(sample) = &sample {
            self.samples_streamed += 1;
            debug!(
                t = sample.relative_time_s(),
                load = sample.load_raw(),
                "sample streamed"
            );
        }

        self.forward_events();

        let state = self.sequencer.state();
        if state != self.last_state {
            info!(from = self.last_state.label(), to = state.label(), "stand state changed");
            self.last_state = state;
        }

        sample
    }

    pub fn state(&self) -> SequencerState {
        self.sequencer.state()
    }

    pub fn fire_level(&self) -> FireLevel {
        self.sequencer.fire_level()
    }

    pub fn samples_streamed(&self) -> u64 {
        self.samples_streamed
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.link.listener().local_addr()
    }

    fn forward_events(&mut self) {
        for event in self.sequencer.events().events_after(self.last_event) {
            match event.kind {
                StandEventKind::Aborted(_) | StandEventKind::LinkLost => {
                    warn!(id = event.id, event = %event.kind, "stand event");
                }
                _ => info!(id = event.id, event = %event.kind, "stand event"),
            }
            self.last_event = Some(event.id);
        }
    }
}

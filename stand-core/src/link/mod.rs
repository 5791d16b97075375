//! Ground-station link management.
//!
//! [`TelemetryLink`] owns at most one client session at a time. The transport
//! underneath is a collaborator: a [`Listener`] hands out [`Session`]s, and a
//! session moves raw bytes without ever blocking. On top of that the link
//! provides the accept/replace semantics, the `CONNECTED` banner, best-effort
//! line sends, and reassembly of received bytes into command lines.

use core::fmt;

use heapless::{String, Vec};

use crate::protocol::ControlLine;

/// Longest command line delivered to the sequencer (after trimming).
pub const MAX_COMMAND_LINE: usize = 64;

/// Bytes buffered while waiting for a line terminator.
pub const RX_BUFFER_CAPACITY: usize = 128;

/// Transport reads attempted per [`TelemetryLink::try_receive_line`] call.
pub const MAX_READS_PER_POLL: usize = 4;

/// Trimmed command line received from the client.
pub type CommandLine = String<MAX_COMMAND_LINE>;

/// One accepted client connection.
pub trait Session {
    /// Transport-specific error type.
    type Error;

    /// Reports live connection state from the transport itself.
    fn is_connected(&mut self) -> bool;

    /// Writes the whole buffer or fails.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Copies whatever bytes are already available into `buf` without
    /// waiting. Returns `Ok(0)` when nothing is pending.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Source of new client sessions.
pub trait Listener {
    /// Session type produced on accept.
    type Session: Session;

    /// Returns a newly connected client, if one is waiting. Must not block.
    fn try_accept(&mut self) -> Option<Self::Session>;
}

/// Errors reported by link operations.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinkError {
    /// No client is connected.
    NotConnected,
    /// The transport rejected the write.
    Write,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::NotConnected => f.write_str("no client connected"),
            LinkError::Write => f.write_str("transport write failed"),
        }
    }
}

enum Assembled {
    Line(CommandLine),
    Ignored,
    Pending,
}

/// Reassembles newline-terminated lines from arbitrary byte chunks.
struct LineAssembler {
    pending: Vec<u8, RX_BUFFER_CAPACITY>,
    discarding: bool,
}

impl LineAssembler {
    const fn new() -> Self {
        Self {
            pending: Vec::new(),
            discarding: false,
        }
    }

    fn clear(&mut self) {
        self.pending.clear();
        self.discarding = false;
    }

    fn free_space(&self) -> usize {
        RX_BUFFER_CAPACITY - self.pending.len()
    }

    fn extend(&mut self, bytes: &[u8]) {
        let take = bytes.len().min(self.free_space());
        // `take` is bounded by the remaining capacity.
        let _ = self.pending.extend_from_slice(&bytes[..take]);
    }

    fn pop(&mut self) -> Assembled {
        let Some(end) = self.pending.iter().position(|&byte| byte == b'\n') else {
            if self.pending.is_full() {
                // Too long to be a command; drop it through the next newline.
                self.pending.clear();
                self.discarding = true;
            }
            return Assembled::Pending;
        };

        let assembled = if core::mem::replace(&mut self.discarding, false) {
            Assembled::Ignored
        } else {
            decode_line(&self.pending[..end])
        };

        self.consume(end + 1);
        assembled
    }

    fn consume(&mut self, count: usize) {
        let remaining = self.pending.len() - count;
        self.pending.copy_within(count.., 0);
        self.pending.truncate(remaining);
    }
}

fn decode_line(bytes: &[u8]) -> Assembled {
    let Ok(text) = core::str::from_utf8(bytes) else {
        return Assembled::Ignored;
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Assembled::Ignored;
    }

    let mut line = CommandLine::new();
    match line.push_str(trimmed) {
        Ok(()) => Assembled::Line(line),
        Err(_) => Assembled::Ignored,
    }
}

/// Single-client telemetry link.
pub struct TelemetryLink<L>
where
    L: Listener,
{
    listener: L,
    session: Option<L::Session>,
    rx: LineAssembler,
    sessions_accepted: u32,
}

impl<L> TelemetryLink<L>
where
    L: Listener,
{
    /// Creates a link with no client attached.
    #[must_use]
    pub fn new(listener: L) -> Self {
        Self {
            listener,
            session: None,
            rx: LineAssembler::new(),
            sessions_accepted: 0,
        }
    }

    /// Polls for a new client without blocking.
    ///
    /// Returns `false` while the current session is still live. Otherwise any
    /// dead session is dropped and, if the listener has a client waiting, it
    /// becomes the active session, the receive buffer is cleared, and the
    /// `CONNECTED` banner is sent. Returns `true` only in that last case.
    pub fn accept(&mut self) -> bool {
        if self.is_connected() {
            return false;
        }

        self.session = None;
        let Some(session) = self.listener.try_accept() else {
            return false;
        };

        self.session = Some(session);
        self.rx.clear();
        self.sessions_accepted = self.sessions_accepted.wrapping_add(1);
        let _ = self.send_control(ControlLine::Connected);
        true
    }

    /// Returns `true` when a session exists and its transport reports it live.
    pub fn is_connected(&mut self) -> bool {
        self.session.as_mut().is_some_and(Session::is_connected)
    }

    /// Sends one line to the client, best-effort.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::NotConnected`] without a live session and
    /// [`LinkError::Write`] when the transport rejects the bytes.
    pub fn send_line(&mut self, line: &str) -> Result<(), LinkError> {
        let Some(session) = self.session.as_mut() else {
            return Err(LinkError::NotConnected);
        };

        if !session.is_connected() {
            return Err(LinkError::NotConnected);
        }

        session
            .write_all(line.as_bytes())
            .map_err(|_| LinkError::Write)
    }

    /// Sends a protocol control line.
    ///
    /// # Errors
    ///
    /// Same as [`TelemetryLink::send_line`].
    pub fn send_control(&mut self, control: ControlLine) -> Result<(), LinkError> {
        self.send_line(control.as_line())
    }

    /// Returns at most one trimmed, non-empty line from the connected client.
    ///
    /// Partial lines stay buffered across calls. Lines longer than
    /// [`MAX_COMMAND_LINE`] or not valid UTF-8 are skipped.
    pub fn try_receive_line(&mut self) -> Option<CommandLine> {
        if !self.is_connected() {
            return None;
        }

        let mut chunk = [0u8; RX_BUFFER_CAPACITY];
        let mut reads = 0;

        loop {
            match self.rx.pop() {
                Assembled::Line(line) => return Some(line),
                Assembled::Ignored => {}
                Assembled::Pending => {
                    if reads == MAX_READS_PER_POLL {
                        return None;
                    }
                    reads += 1;

                    let space = self.rx.free_space();
                    let session = self.session.as_mut()?;
                    let read = match session.read_available(&mut chunk[..space]) {
                        Ok(0) | Err(_) => return None,
                        Ok(count) => count.min(space),
                    };
                    self.rx.extend(&chunk[..read]);
                }
            }
        }
    }

    /// Number of sessions accepted since start-up.
    #[must_use]
    pub fn sessions_accepted(&self) -> u32 {
        self.sessions_accepted
    }

    /// Returns the underlying listener.
    #[must_use]
    pub fn listener(&self) -> &L {
        &self.listener
    }

    /// Returns the underlying listener mutably.
    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }
}

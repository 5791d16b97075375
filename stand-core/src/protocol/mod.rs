//! Ground-station wire protocol.
//!
//! Everything on the link is newline-terminated text over one persistent
//! connection. The stand greets a new client with a banner, announces phase
//! changes with control lines, and streams telemetry packets built by
//! [`PacketEncoder`]. The client may only send `GO` or `ABORT`; any other line
//! is ignored without a reply.

use core::fmt;

use winnow::combinator::alt;
use winnow::error::ContextError;
use winnow::prelude::*;

pub mod packet;

pub use packet::{PACKET_CAPACITY, PacketEncoder, PacketLine};

/// Control lines sent from the stand to the ground station.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControlLine {
    /// Banner sent once when a client is accepted.
    Connected,
    /// Countdown has begun.
    CountdownStart,
    /// Countdown was aborted; the stand will not fire this session.
    Aborted,
    /// T0 reached and the fire-control output went HIGH.
    T0Reached,
}

impl ControlLine {
    /// All control lines, in protocol order.
    pub const ALL: [ControlLine; 4] = [
        ControlLine::Connected,
        ControlLine::CountdownStart,
        ControlLine::Aborted,
        ControlLine::T0Reached,
    ];

    /// Keyword carried by the line, without the terminator.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            ControlLine::Connected => "CONNECTED",
            ControlLine::CountdownStart => "COUNTDOWN_START",
            ControlLine::Aborted => "ABORTED",
            ControlLine::T0Reached => "T0_REACHED",
        }
    }

    /// Full wire representation including the trailing newline.
    #[must_use]
    pub const fn as_line(self) -> &'static str {
        match self {
            ControlLine::Connected => "CONNECTED\n",
            ControlLine::CountdownStart => "COUNTDOWN_START\n",
            ControlLine::Aborted => "ABORTED\n",
            ControlLine::T0Reached => "T0_REACHED\n",
        }
    }

    /// Classifies a received line, ignoring surrounding whitespace.
    #[must_use]
    pub fn from_keyword(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        Self::ALL
            .into_iter()
            .find(|control| control.keyword() == trimmed)
    }
}

impl fmt::Display for ControlLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Commands accepted from the connected client.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// Start the countdown.
    Go,
    /// Abort a countdown in progress.
    Abort,
}

impl Command {
    /// Parses a received line.
    ///
    /// Surrounding whitespace is trimmed and the keyword must match the whole
    /// line exactly (case-sensitive). Returns `None` for anything else.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        Self::parser().parse(line.trim()).ok()
    }

    /// Wire keyword for the command.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Command::Go => "GO",
            Command::Abort => "ABORT",
        }
    }

    /// Full wire representation including the trailing newline.
    #[must_use]
    pub const fn as_line(self) -> &'static str {
        match self {
            Command::Go => "GO\n",
            Command::Abort => "ABORT\n",
        }
    }

    fn parser<'a>() -> impl Parser<&'a str, Command, ContextError> {
        alt(("GO".value(Command::Go), "ABORT".value(Command::Abort)))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

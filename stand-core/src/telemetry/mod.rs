//! Stand event history shared by firmware and host targets.
//!
//! Every phase change the sequencer makes is recorded into a fixed-size ring
//! so front-ends can mirror them to their log sinks (defmt on the stand,
//! `tracing` on the bench) without the core depending on either. The ring is
//! volatile; nothing here is persisted.

use core::fmt;

use heapless::HistoryBuf;

/// Identifier assigned to each recorded event, increasing from zero.
pub type EventId = u32;

/// Total number of events retained in memory.
pub const EVENT_LOG_CAPACITY: usize = 64;

/// Why a countdown was aborted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AbortReason {
    /// The client sent `ABORT`.
    Operator,
    /// The client disappeared before T0.
    LinkLost,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Operator => f.write_str("operator"),
            AbortReason::LinkLost => f.write_str("link-lost"),
        }
    }
}

/// Discriminated stand events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StandEventKind {
    ClientConnected,
    LinkLost,
    CountdownStarted,
    Aborted(AbortReason),
    T0Reached,
    BurnCutoff,
}

impl fmt::Display for StandEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StandEventKind::ClientConnected => f.write_str("client-connected"),
            StandEventKind::LinkLost => f.write_str("link-lost"),
            StandEventKind::CountdownStarted => f.write_str("countdown-started"),
            StandEventKind::Aborted(reason) => write!(f, "aborted ({reason})"),
            StandEventKind::T0Reached => f.write_str("t0-reached"),
            StandEventKind::BurnCutoff => f.write_str("burn-cutoff"),
        }
    }
}

/// Event record stored in the ring.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StandEvent<TInstant> {
    pub id: EventId,
    pub timestamp: TInstant,
    pub kind: StandEventKind,
}

/// Records stand events into a fixed-size ring buffer.
pub struct EventLog<TInstant, const CAPACITY: usize = EVENT_LOG_CAPACITY>
where
    TInstant: Copy,
{
    ring: HistoryBuf<StandEvent<TInstant>, CAPACITY>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> EventLog<TInstant, CAPACITY>
where
    TInstant: Copy,
{
    /// Creates an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Appends an event, evicting the oldest entry when full.
    pub fn record(&mut self, kind: StandEventKind, timestamp: TInstant) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.ring.write(StandEvent {
            id,
            timestamp,
            kind,
        });
        id
    }

    /// Returns the most recent event, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&StandEvent<TInstant>> {
        self.ring.recent()
    }

    /// Returns the number of retained events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Iterates retained events in chronological order.
    #[must_use]
    pub fn oldest_first(&self) -> impl Iterator<Item = &StandEvent<TInstant>> + '_ {
        self.ring.oldest_ordered()
    }

    /// Iterates retained events recorded after `after` (all of them for `None`).
    ///
    /// Front-ends use this to forward only new events to their log sink.
    #[must_use]
    pub fn events_after(
        &self,
        after: Option<EventId>,
    ) -> impl Iterator<Item = &StandEvent<TInstant>> + '_ {
        self.oldest_first()
            .filter(move |event| after.is_none_or(|seen| event.id > seen))
    }

    /// Counts retained events of the given kind.
    #[must_use]
    pub fn count(&self, kind: StandEventKind) -> usize {
        self.oldest_first()
            .filter(|event| event.kind == kind)
            .count()
    }
}

impl<TInstant, const CAPACITY: usize> Default for EventLog<TInstant, CAPACITY>
where
    TInstant: Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

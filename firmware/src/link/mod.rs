//! USB CDC transport for the ground-station link.
//!
//! The USB task owns the CDC endpoints and moves raw packets through two
//! Embassy channels; the stand task sees them through [`UsbListener`] and
//! [`UsbSession`], which implement the `stand-core` link traits without ever
//! awaiting. "Connected" means the host has DTR asserted. Every DTR assertion
//! bumps a generation counter so a session accepted before a re-plug can
//! never write into the new one.

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};
use stand_core::link::{Listener, Session};

/// Largest CDC bulk packet.
pub const FRAME_CAPACITY: usize = 64;

/// Host→stand frames buffered between the USB and stand tasks.
pub const RX_QUEUE_DEPTH: usize = 4;

/// Stand→host frames buffered; sized for two worst-case packet lines.
pub const TX_QUEUE_DEPTH: usize = 16;

/// One USB bulk packet worth of bytes.
pub type UsbFrame = Vec<u8, FRAME_CAPACITY>;

#[cfg(target_os = "none")]
pub type LinkMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
pub type LinkMutex = NoopRawMutex;

pub type RxQueue = Channel<LinkMutex, UsbFrame, RX_QUEUE_DEPTH>;
pub type TxQueue = Channel<LinkMutex, UsbFrame, TX_QUEUE_DEPTH>;

/// DTR state published by the USB task.
pub struct LinkState {
    connected: AtomicBool,
    generation: AtomicU32,
}

impl LinkState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            generation: AtomicU32::new(0),
        }
    }

    /// Host asserted DTR.
    pub fn attach(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.connected.store(true, Ordering::Release);
    }

    /// Host dropped DTR or the endpoints were disabled.
    pub fn detach(&self) {
        self.connected.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors surfaced by [`UsbSession`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UsbLinkError {
    /// DTR dropped or a newer host session replaced this one.
    Disconnected,
    /// The transmit queue cannot hold the whole line.
    TxOverflow,
}

/// Hands out a session each time the host asserts DTR.
pub struct UsbListener<'a> {
    state: &'a LinkState,
    rx: &'a RxQueue,
    tx: &'a TxQueue,
    accepted_generation: u32,
}

impl<'a> UsbListener<'a> {
    #[must_use]
    pub fn new(state: &'a LinkState, rx: &'a RxQueue, tx: &'a TxQueue) -> Self {
        Self {
            state,
            rx,
            tx,
            accepted_generation: 0,
        }
    }
}

impl<'a> Listener for UsbListener<'a> {
    type Session = UsbSession<'a>;

    fn try_accept(&mut self) -> Option<Self::Session> {
        let generation = self.state.generation();
        if !self.state.is_connected() || generation == self.accepted_generation {
            return None;
        }

        // Bytes queued before this host attached belong to nobody.
        while self.rx.try_receive().is_ok() {}

        self.accepted_generation = generation;
        Some(UsbSession {
            state: self.state,
            rx: self.rx,
            tx: self.tx,
            generation,
            pending: UsbFrame::new(),
            offset: 0,
        })
    }
}

/// Session bound to one DTR assertion.
pub struct UsbSession<'a> {
    state: &'a LinkState,
    rx: &'a RxQueue,
    tx: &'a TxQueue,
    generation: u32,
    pending: UsbFrame,
    offset: usize,
}

impl Session for UsbSession<'_> {
    type Error = UsbLinkError;

    fn is_connected(&mut self) -> bool {
        self.state.is_connected() && self.state.generation() == self.generation
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        if !self.is_connected() {
            return Err(UsbLinkError::Disconnected);
        }

        let frames = bytes.len().div_ceil(FRAME_CAPACITY);
        if self.tx.free_capacity() < frames {
            return Err(UsbLinkError::TxOverflow);
        }

        for chunk in bytes.chunks(FRAME_CAPACITY) {
            let mut frame = UsbFrame::new();
            // Chunks never exceed the frame capacity.
            let _ = frame.extend_from_slice(chunk);
            self.tx
                .try_send(frame)
                .map_err(|_| UsbLinkError::TxOverflow)?;
        }
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if !self.is_connected() {
            return Err(UsbLinkError::Disconnected);
        }

        if self.offset >= self.pending.len() {
            match self.rx.try_receive() {
                Ok(frame) => {
                    self.pending = frame;
                    self.offset = 0;
                }
                Err(_) => return Ok(0),
            }
        }

        let remaining = &self.pending[self.offset..];
        let count = remaining.len().min(buf.len());
        buf[..count].copy_from_slice(&remaining[..count]);
        self.offset += count;
        Ok(count)
    }
}

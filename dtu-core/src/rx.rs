//! Interrupt-fed receive ring.
//!
//! The radio interrupt is the only producer and the receive drain the only
//! consumer. Both sides touch the queue inside a critical section, so the
//! ring can live in a `static` shared between interrupt and thread context.

use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;
use heapless::Deque;

/// Default ring depth.
pub const PACKET_RING_DEPTH: usize = 50;

/// Largest raw radio frame.
pub const MAX_RF_PAYLOAD: usize = 32;

/// One raw frame as captured by the interrupt handler.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RxPacket {
    pub channel: u8,
    pub len: u8,
    pub bytes: [u8; MAX_RF_PAYLOAD],
}

impl RxPacket {
    /// Copies `frame` into a packet, truncating anything past [`MAX_RF_PAYLOAD`].
    #[must_use]
    pub fn new(channel: u8, frame: &[u8]) -> Self {
        let mut bytes = [0; MAX_RF_PAYLOAD];
        let len = frame.len().min(MAX_RF_PAYLOAD);
        bytes[..len].copy_from_slice(&frame[..len]);
        Self {
            channel,
            len: u8::try_from(len).unwrap_or(u8::MAX),
            bytes,
        }
    }

    /// Valid portion of the frame.
    #[must_use]
    pub fn frame(&self) -> &[u8] {
        let len = usize::from(self.len).min(MAX_RF_PAYLOAD);
        &self.bytes[..len]
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RingError {
    /// The consumer fell behind; the frame was discarded.
    Full,
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingError::Full => f.write_str("receive ring full"),
        }
    }
}

/// Bounded FIFO of received frames.
pub struct PacketRing<const N: usize = PACKET_RING_DEPTH> {
    inner: Mutex<RefCell<Deque<RxPacket, N>>>,
}

impl<const N: usize> PacketRing<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Producer side, safe to call from interrupt context.
    pub fn push(&self, packet: RxPacket) -> Result<(), RingError> {
        critical_section::with(|cs| {
            self.inner
                .borrow_ref_mut(cs)
                .push_back(packet)
                .map_err(|_| RingError::Full)
        })
    }

    /// Consumer side: removes the oldest frame.
    pub fn pop(&self) -> Option<RxPacket> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).pop_front())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<const N: usize> Default for PacketRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

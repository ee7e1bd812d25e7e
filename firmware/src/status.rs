#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The DTU task owns the polling core; everything else (debugger probes, a
//! future network stack) only sees these atomics. The epoch handed over by an
//! external time-sync lives behind a blocking mutex because it is stored
//! together with the uptime it was captured at.

use core::cell::Cell;

use dtu_core::status::DtuStatus;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use portable_atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

/// Epoch seconds last published by the DTU task (0 == unknown).
static TIMESTAMP: AtomicU32 = AtomicU32::new(0);
static SUNRISE: AtomicU32 = AtomicU32::new(0);
static SUNSET: AtomicU32 = AtomicU32::new(0);
static COMMUNICATION_ALLOWED: AtomicBool = AtomicBool::new(false);
static FRAMES_RECEIVED: AtomicU32 = AtomicU32::new(0);
static NO_ANSWER: AtomicU32 = AtomicU32::new(0);
static PARTIAL_FAILURE: AtomicU32 = AtomicU32::new(0);
static RX_SUCCESS: AtomicU32 = AtomicU32::new(0);
/// Bitmask of slots that reported production (bit n == slot n).
static PRODUCING_MASK: AtomicU8 = AtomicU8::new(0);
/// Frames the interrupt path could not queue.
static RING_OVERFLOWS: AtomicU32 = AtomicU32::new(0);

/// Epoch captured at a known uptime.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct EpochSample {
    epoch: u32,
    uptime_secs: u32,
}

static SYNCED_EPOCH: Mutex<CriticalSectionRawMutex, Cell<Option<EpochSample>>> =
    Mutex::new(Cell::new(None));

/// Plain copy of the mirrored values.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StatusMirror {
    pub timestamp: u32,
    pub sunrise: u32,
    pub sunset: u32,
    pub communication_allowed: bool,
    pub frames_received: u32,
    pub no_answer: u32,
    pub partial_failure: u32,
    pub rx_success: u32,
    pub producing_mask: u8,
    pub ring_overflows: u32,
}

/// Copies a core snapshot into the atomics.
pub fn publish(status: &DtuStatus) {
    TIMESTAMP.store(status.timestamp, Ordering::Relaxed);
    SUNRISE.store(status.sunrise, Ordering::Relaxed);
    SUNSET.store(status.sunset, Ordering::Relaxed);
    COMMUNICATION_ALLOWED.store(status.communication_allowed, Ordering::Relaxed);
    FRAMES_RECEIVED.store(status.stats.frames_received(), Ordering::Relaxed);
    NO_ANSWER.store(status.stats.no_answer(), Ordering::Relaxed);
    PARTIAL_FAILURE.store(status.stats.partial_failure(), Ordering::Relaxed);
    RX_SUCCESS.store(status.stats.rx_success(), Ordering::Relaxed);

    let mask = status
        .slots
        .iter()
        .filter(|slot| slot.producing && slot.index < 8)
        .fold(0u8, |mask, slot| mask | (1 << slot.index));
    PRODUCING_MASK.store(mask, Ordering::Relaxed);
}

/// Counts a frame dropped because the receive ring was full.
pub fn record_ring_overflow() {
    RING_OVERFLOWS.fetch_add(1, Ordering::Relaxed);
}

/// Reads back every mirrored value.
pub fn snapshot() -> StatusMirror {
    StatusMirror {
        timestamp: TIMESTAMP.load(Ordering::Relaxed),
        sunrise: SUNRISE.load(Ordering::Relaxed),
        sunset: SUNSET.load(Ordering::Relaxed),
        communication_allowed: COMMUNICATION_ALLOWED.load(Ordering::Relaxed),
        frames_received: FRAMES_RECEIVED.load(Ordering::Relaxed),
        no_answer: NO_ANSWER.load(Ordering::Relaxed),
        partial_failure: PARTIAL_FAILURE.load(Ordering::Relaxed),
        rx_success: RX_SUCCESS.load(Ordering::Relaxed),
        producing_mask: PRODUCING_MASK.load(Ordering::Relaxed),
        ring_overflows: RING_OVERFLOWS.load(Ordering::Relaxed),
    }
}

/// Hands a freshly synchronised epoch to the DTU task.
pub fn publish_epoch(epoch: u32, uptime_secs: u32) {
    SYNCED_EPOCH.lock(|cell| cell.set(Some(EpochSample { epoch, uptime_secs })));
}

/// Epoch extrapolated to `uptime_secs`, if a time-sync ever published one.
pub fn synced_epoch(uptime_secs: u32) -> Option<u32> {
    let sample = SYNCED_EPOCH.lock(Cell::get)?;
    let elapsed = uptime_secs.saturating_sub(sample.uptime_secs);
    Some(sample.epoch.saturating_add(elapsed))
}

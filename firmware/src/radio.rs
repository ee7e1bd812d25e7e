#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Board-side radio plumbing.
//!
//! The transceiver driver is attached separately; until it is, the DTU runs
//! against [`DetachedRadio`], which reports the link as down so every poll
//! cycle is skipped cleanly, and [`DetachedPayload`], which never assembles.
//! The receive interrupt deposits frames through [`deposit_frame`].

use dtu_core::inverter::{DevControlCmd, InfoCommand, ProductionRecord, RadioAddress, TxCommand};
use dtu_core::radio::{AssembledSlots, PacketError, Payload, Radio};
use dtu_core::rx::{PacketRing, RingError, RxPacket};
use dtu_core::stats::Statistics;

use crate::status;

/// Interrupt-fed receive ring shared with the DTU task.
pub static PACKET_RING: PacketRing = PacketRing::new();

/// Called from the receive interrupt with one raw frame. Only copies the
/// frame into the ring.
pub fn deposit_frame(channel: u8, frame: &[u8]) -> Result<(), RingError> {
    let result = PACKET_RING.push(RxPacket::new(channel, frame));
    if result.is_err() {
        status::record_ring_overflow();
    }
    result
}

/// Stand-in used while no transceiver driver is attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct DetachedRadio {
    channel: usize,
}

/// Receive channels Hoymiles inverters answer on.
const RX_CHANNELS: [u8; 5] = [3, 23, 40, 61, 75];

impl DetachedRadio {
    #[must_use]
    pub const fn new() -> Self {
        Self { channel: 0 }
    }

    #[must_use]
    pub const fn channel(&self) -> u8 {
        RX_CHANNELS[self.channel]
    }
}

impl Radio for DetachedRadio {
    fn is_link_connected(&self) -> bool {
        false
    }

    fn switch_channel(&mut self) -> bool {
        self.channel = (self.channel + 1) % RX_CHANNELS.len();
        false
    }

    fn validate_and_unpack(&mut self, _packet: &mut RxPacket) -> Result<usize, PacketError> {
        Err(PacketError::Corrupt)
    }

    fn send_control_packet(
        &mut self,
        _address: RadioAddress,
        _command: DevControlCmd,
        _limit: [u16; 2],
    ) {
    }

    fn send_time_packet(
        &mut self,
        _address: RadioAddress,
        _command: InfoCommand,
        _last_timestamp: u32,
        _alarm_index: u16,
    ) {
    }
}

/// Assembler stand-in matching [`DetachedRadio`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DetachedPayload;

impl Payload for DetachedPayload {
    fn is_complete(&self, _slot: usize) -> bool {
        false
    }

    fn advance_assembly(
        &mut self,
        _force_final: bool,
        _max_retransmits: u8,
        _stats: &mut Statistics,
    ) -> AssembledSlots {
        AssembledSlots::new()
    }

    fn reset_window(&mut self, _slot: usize, _timestamp: u32) {}

    fn record_transmitted_command(&mut self, _slot: usize, _command: TxCommand) {}

    fn max_observed_packet_id(&self, _slot: usize) -> u8 {
        0
    }

    fn retransmit_count(&self, _slot: usize) -> u8 {
        0
    }

    fn add_fragment(&mut self, _frame: &[u8]) {}

    fn latest_record(&self, _slot: usize) -> Option<ProductionRecord> {
        None
    }

    fn alarm_index(&self, _slot: usize) -> Option<u16> {
        None
    }
}

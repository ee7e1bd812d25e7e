//! Collaborator seams: the radio link, the payload assembler and the status LED.

use core::fmt;

use heapless::Vec;

use crate::config::MAX_NUM_INVERTERS;
use crate::inverter::{DevControlCmd, InfoCommand, ProductionRecord, RadioAddress, TxCommand};
use crate::rx::RxPacket;
use crate::stats::Statistics;

/// Integrity failure reported by [`Radio::validate_and_unpack`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PacketError {
    Corrupt,
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::Corrupt => f.write_str("packet failed integrity check"),
        }
    }
}

/// Radio link framing and transmission.
pub trait Radio {
    fn is_link_connected(&self) -> bool;

    /// Hops to the next receive channel. Returns `true` once the link is idle
    /// and an assembly pass may run.
    fn switch_channel(&mut self) -> bool;

    /// Checks the frame CRC and unpacks it in place, returning the usable length.
    fn validate_and_unpack(&mut self, packet: &mut RxPacket) -> Result<usize, PacketError>;

    fn send_control_packet(
        &mut self,
        address: RadioAddress,
        command: DevControlCmd,
        limit: [u16; 2],
    );

    fn send_time_packet(
        &mut self,
        address: RadioAddress,
        command: InfoCommand,
        last_timestamp: u32,
        alarm_index: u16,
    );
}

/// Slots whose payload became complete during an assembly pass.
pub type AssembledSlots = Vec<usize, MAX_NUM_INVERTERS>;

/// Multi-fragment payload reassembly, owned outside the polling core.
pub trait Payload {
    fn is_complete(&self, slot: usize) -> bool;

    /// Tries to assemble every outstanding payload, requesting missing
    /// fragments up to `max_retransmits`. With `force_final` the assembler
    /// may finish a payload whose last fragment never arrived.
    fn advance_assembly(
        &mut self,
        force_final: bool,
        max_retransmits: u8,
        stats: &mut Statistics,
    ) -> AssembledSlots;

    /// Starts a new assembly window for `slot`.
    fn reset_window(&mut self, slot: usize, timestamp: u32);

    fn record_transmitted_command(&mut self, slot: usize, command: TxCommand);

    /// Highest fragment id seen for the current window; zero when nothing arrived.
    fn max_observed_packet_id(&self, slot: usize) -> u8;

    fn retransmit_count(&self, slot: usize) -> u8;

    /// Feeds one validated frame.
    fn add_fragment(&mut self, frame: &[u8]);

    /// Real-time record decoded from the last assembled payload.
    fn latest_record(&self, slot: usize) -> Option<ProductionRecord>;

    /// Index of the newest alarm-log entry read back from `slot`.
    fn alarm_index(&self, slot: usize) -> Option<u16>;
}

/// Producing indicator.
pub trait StatusLed {
    fn set(&mut self, on: bool);
}

/// LED sink for boards without an indicator.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoLed;

impl StatusLed for NoLed {
    fn set(&mut self, _on: bool) {}
}

//! Simulated inverter fleet.
//!
//! [`SimRadio`] answers every transmission by depositing frames into the
//! packet ring, the way the receive interrupt would. [`SimPayload`]
//! reassembles those frames per slot. Frames are laid out as
//! `[0x95, slot, id, data.., xor]`, where bit 7 of `id` marks the last
//! fragment and `xor` covers every preceding byte.

use std::fmt;

use dtu_core::clock::TimeSource;
use dtu_core::config::MAX_NUM_INVERTERS;
use dtu_core::inverter::{DevControlCmd, InfoCommand, ProductionRecord, RadioAddress, TxCommand};
use dtu_core::radio::{AssembledSlots, PacketError, Payload, Radio};
use dtu_core::rx::{PacketRing, RxPacket};
use dtu_core::stats::Statistics;

const FRAME_TYPE: u8 = 0x95;
const LAST_FRAGMENT: u8 = 0x80;
const FRAGMENTS_PER_ANSWER: u8 = 3;
const RX_CHANNELS: [u8; 5] = [3, 23, 40, 61, 75];

/// How a simulated inverter answers.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Behaviour {
    #[default]
    Healthy,
    Silent,
    /// Answers without the middle fragment.
    Partial,
    /// Answers with broken checksums.
    Corrupt,
}

impl Behaviour {
    pub fn from_tag(tag: &str) -> Option<Self> {
        [
            Behaviour::Healthy,
            Behaviour::Silent,
            Behaviour::Partial,
            Behaviour::Corrupt,
        ]
        .into_iter()
        .find(|behaviour| behaviour.label().eq_ignore_ascii_case(tag))
    }

    pub fn label(self) -> &'static str {
        match self {
            Behaviour::Healthy => "healthy",
            Behaviour::Silent => "silent",
            Behaviour::Partial => "partial",
            Behaviour::Corrupt => "corrupt",
        }
    }
}

impl fmt::Display for Behaviour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug)]
struct SimInverter {
    address: RadioAddress,
    behaviour: Behaviour,
    ac_power_dw: u32,
}

/// Radio side of the simulation.
pub struct SimRadio<'r> {
    ring: &'r PacketRing,
    inverters: [Option<SimInverter>; MAX_NUM_INVERTERS],
    link_up: bool,
    channel: usize,
    transmissions: usize,
    dropped_frames: usize,
}

impl<'r> SimRadio<'r> {
    pub fn new(ring: &'r PacketRing) -> Self {
        Self {
            ring,
            inverters: [None; MAX_NUM_INVERTERS],
            link_up: true,
            channel: 0,
            transmissions: 0,
            dropped_frames: 0,
        }
    }

    /// Places a simulated inverter behind `slot`.
    pub fn attach(&mut self, slot: usize, address: RadioAddress, ac_power_dw: u32) {
        if let Some(entry) = self.inverters.get_mut(slot) {
            *entry = Some(SimInverter {
                address,
                behaviour: Behaviour::Healthy,
                ac_power_dw,
            });
        }
    }

    /// Returns `false` when nothing is attached to `slot`.
    pub fn set_behaviour(&mut self, slot: usize, behaviour: Behaviour) -> bool {
        match self.inverters.get_mut(slot) {
            Some(Some(inverter)) => {
                inverter.behaviour = behaviour;
                true
            }
            _ => false,
        }
    }

    pub fn behaviour(&self, slot: usize) -> Option<Behaviour> {
        self.inverters
            .get(slot)
            .copied()
            .flatten()
            .map(|inverter| inverter.behaviour)
    }

    pub fn set_link(&mut self, up: bool) {
        self.link_up = up;
    }

    pub fn transmissions(&self) -> usize {
        self.transmissions
    }

    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }

    fn answer(&mut self, address: RadioAddress, command: TxCommand) {
        self.transmissions += 1;
        let Some((slot, inverter)) = self
            .inverters
            .iter()
            .enumerate()
            .find_map(|(slot, entry)| {
                entry
                    .filter(|inverter| inverter.address == address)
                    .map(|inverter| (slot, inverter))
            })
        else {
            return;
        };

        let slot = u8::try_from(slot).unwrap_or(u8::MAX);
        for id in 1..=FRAGMENTS_PER_ANSWER {
            let skip = match inverter.behaviour {
                Behaviour::Silent => true,
                Behaviour::Partial => id == 2,
                Behaviour::Healthy | Behaviour::Corrupt => false,
            };
            if skip {
                continue;
            }

            let mut frame = build_fragment(slot, id, command, inverter.ac_power_dw);
            if let (Behaviour::Corrupt, Some(check)) = (inverter.behaviour, frame.last_mut()) {
                *check ^= 0xFF;
            }
            let packet = RxPacket::new(RX_CHANNELS[self.channel], &frame);
            if self.ring.push(packet).is_err() {
                self.dropped_frames += 1;
            }
        }
    }
}

fn build_fragment(slot: u8, id: u8, command: TxCommand, ac_power_dw: u32) -> Vec<u8> {
    let marker = if id == FRAGMENTS_PER_ANSWER {
        id | LAST_FRAGMENT
    } else {
        id
    };
    let mut frame = vec![FRAME_TYPE, slot, marker];
    if id == 1 && command == TxCommand::Info(InfoCommand::RealTimeRunData) {
        frame.extend_from_slice(&ac_power_dw.to_be_bytes());
    } else {
        frame.push(0);
    }
    let check = frame.iter().fold(0, |acc, byte| acc ^ byte);
    frame.push(check);
    frame
}

impl Radio for SimRadio<'_> {
    fn is_link_connected(&self) -> bool {
        self.link_up
    }

    /// Sweeps the receive channels; a full sweep makes the radio ready.
    fn switch_channel(&mut self) -> bool {
        self.channel = (self.channel + 1) % RX_CHANNELS.len();
        self.channel == 0
    }

    fn validate_and_unpack(&mut self, packet: &mut RxPacket) -> Result<usize, PacketError> {
        let frame = packet.frame();
        let Some((&check, body)) = frame.split_last() else {
            return Err(PacketError::Corrupt);
        };
        if body.len() < 3 || body[0] != FRAME_TYPE {
            return Err(PacketError::Corrupt);
        }
        if body.iter().fold(0, |acc, byte| acc ^ byte) != check {
            return Err(PacketError::Corrupt);
        }
        Ok(body.len())
    }

    fn send_control_packet(
        &mut self,
        address: RadioAddress,
        command: DevControlCmd,
        _limit: [u16; 2],
    ) {
        self.answer(address, TxCommand::Control(command));
    }

    fn send_time_packet(
        &mut self,
        address: RadioAddress,
        command: InfoCommand,
        _last_timestamp: u32,
        _alarm_index: u16,
    ) {
        self.answer(address, TxCommand::Info(command));
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct AssemblyWindow {
    active: bool,
    timestamp: u32,
    command: Option<TxCommand>,
    received: u8,
    last_id: Option<u8>,
    max_id: u8,
    retransmits: u8,
    complete: bool,
    ac_power_dw: Option<u32>,
}

impl AssemblyWindow {
    fn all_received(&self) -> bool {
        self.last_id
            .is_some_and(|last| (1..=last).all(|id| self.received & (1 << id) != 0))
    }
}

/// Per-slot fragment reassembly.
#[derive(Debug, Default)]
pub struct SimPayload {
    windows: [AssemblyWindow; MAX_NUM_INVERTERS],
    records: [Option<ProductionRecord>; MAX_NUM_INVERTERS],
    alarm_indices: [Option<u16>; MAX_NUM_INVERTERS],
}

impl SimPayload {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Payload for SimPayload {
    fn is_complete(&self, slot: usize) -> bool {
        self.windows.get(slot).is_some_and(|window| window.complete)
    }

    fn advance_assembly(
        &mut self,
        force_final: bool,
        max_retransmits: u8,
        stats: &mut Statistics,
    ) -> AssembledSlots {
        let mut assembled = AssembledSlots::new();
        for (slot, window) in self.windows.iter_mut().enumerate() {
            if !window.active || window.complete {
                continue;
            }

            if window.all_received() {
                window.complete = true;
                stats.record_success();
                match window.command {
                    Some(TxCommand::Info(InfoCommand::RealTimeRunData)) => {
                        self.records[slot] = Some(ProductionRecord {
                            timestamp: window.timestamp,
                            ac_power_dw: window.ac_power_dw.unwrap_or(0),
                        });
                    }
                    // Every alarm readout moves the simulated log one entry on.
                    Some(TxCommand::Info(InfoCommand::AlarmData | InfoCommand::AlarmUpdate)) => {
                        let next = self.alarm_indices[slot].map_or(0, |index| index.wrapping_add(1));
                        self.alarm_indices[slot] = Some(next);
                    }
                    _ => {}
                }
                let _ = assembled.push(slot);
            } else if force_final && window.max_id > 0 && window.retransmits < max_retransmits {
                window.retransmits += 1;
            }
        }
        assembled
    }

    fn reset_window(&mut self, slot: usize, timestamp: u32) {
        if let Some(window) = self.windows.get_mut(slot) {
            *window = AssemblyWindow {
                active: true,
                timestamp,
                ..AssemblyWindow::default()
            };
        }
    }

    fn record_transmitted_command(&mut self, slot: usize, command: TxCommand) {
        if let Some(window) = self.windows.get_mut(slot) {
            window.command = Some(command);
        }
    }

    fn max_observed_packet_id(&self, slot: usize) -> u8 {
        self.windows.get(slot).map_or(0, |window| window.max_id)
    }

    fn retransmit_count(&self, slot: usize) -> u8 {
        self.windows.get(slot).map_or(0, |window| window.retransmits)
    }

    fn add_fragment(&mut self, frame: &[u8]) {
        let [_, slot, marker, data @ ..] = frame else {
            return;
        };
        let Some(window) = self.windows.get_mut(usize::from(*slot)) else {
            return;
        };
        let id = marker & !LAST_FRAGMENT;
        if !window.active || id == 0 || id > 7 {
            return;
        }

        window.received |= 1 << id;
        window.max_id = window.max_id.max(id);
        if marker & LAST_FRAGMENT != 0 {
            window.last_id = Some(id);
        }
        if let ([a, b, c, d], 1) = (data, id) {
            window.ac_power_dw = Some(u32::from_be_bytes([*a, *b, *c, *d]));
        }
    }

    fn latest_record(&self, slot: usize) -> Option<ProductionRecord> {
        self.records.get(slot).copied().flatten()
    }

    fn alarm_index(&self, slot: usize) -> Option<u16> {
        self.alarm_indices.get(slot).copied().flatten()
    }
}

/// Network time as seen from the virtual clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimClock {
    anchor: Option<(u32, u64)>,
    now_ms: u64,
}

impl SimClock {
    /// Anchors `epoch` at the current virtual time; `None` takes the source offline.
    pub fn set_epoch(&mut self, epoch: Option<u32>) {
        self.anchor = epoch.map(|epoch| (epoch, self.now_ms));
    }

    pub fn advance_to(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }
}

impl TimeSource for SimClock {
    fn fetch_epoch(&mut self) -> Option<u32> {
        let (epoch, anchored_ms) = self.anchor?;
        let elapsed = self.now_ms.saturating_sub(anchored_ms) / 1_000;
        Some(epoch.saturating_add(u32::try_from(elapsed).unwrap_or(u32::MAX)))
    }
}

#![allow(dead_code)]

use dtu_core::clock::TimeSource;
use dtu_core::config::MAX_NUM_INVERTERS;
use dtu_core::inverter::{DevControlCmd, InfoCommand, ProductionRecord, RadioAddress, TxCommand};
use dtu_core::listener::DtuListener;
use dtu_core::radio::{AssembledSlots, PacketError, Payload, Radio, StatusLed};
use dtu_core::rx::RxPacket;
use dtu_core::stats::Statistics;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RadioCall {
    Control {
        address: RadioAddress,
        command: DevControlCmd,
        limit: [u16; 2],
    },
    Time {
        address: RadioAddress,
        command: InfoCommand,
        timestamp: u32,
        alarm_index: u16,
    },
}

/// Radio that records transmissions and validates frames by a marker byte.
#[derive(Debug)]
pub struct MockRadio {
    pub connected: bool,
    pub channel_ready: bool,
    pub sent: Vec<RadioCall>,
    pub channel_switches: usize,
}

/// Frames starting with this byte fail validation.
pub const CORRUPT_MARKER: u8 = 0xEE;

impl MockRadio {
    pub fn new() -> Self {
        Self {
            connected: true,
            channel_ready: false,
            sent: Vec::new(),
            channel_switches: 0,
        }
    }
}

impl Radio for MockRadio {
    fn is_link_connected(&self) -> bool {
        self.connected
    }

    fn switch_channel(&mut self) -> bool {
        self.channel_switches += 1;
        self.channel_ready
    }

    fn validate_and_unpack(&mut self, packet: &mut RxPacket) -> Result<usize, PacketError> {
        match packet.frame().first() {
            Some(&CORRUPT_MARKER) => Err(PacketError::Corrupt),
            _ => Ok(packet.frame().len()),
        }
    }

    fn send_control_packet(
        &mut self,
        address: RadioAddress,
        command: DevControlCmd,
        limit: [u16; 2],
    ) {
        self.sent.push(RadioCall::Control {
            address,
            command,
            limit,
        });
    }

    fn send_time_packet(
        &mut self,
        address: RadioAddress,
        command: InfoCommand,
        last_timestamp: u32,
        alarm_index: u16,
    ) {
        self.sent.push(RadioCall::Time {
            address,
            command,
            timestamp: last_timestamp,
            alarm_index,
        });
    }
}

/// Scripted payload assembler.
///
/// Slots listed in `complete_on_advance` become complete on the next
/// assembly pass; `max_packet_id` fakes how far a partial answer got.
#[derive(Debug, Default)]
pub struct MockPayload {
    pub complete: [bool; MAX_NUM_INVERTERS],
    pub max_packet_id: [u8; MAX_NUM_INVERTERS],
    pub retransmits: [u8; MAX_NUM_INVERTERS],
    pub records: [Option<ProductionRecord>; MAX_NUM_INVERTERS],
    pub alarm_indices: [Option<u16>; MAX_NUM_INVERTERS],
    pub complete_on_advance: Vec<usize>,
    pub advance_calls: Vec<bool>,
    pub resets: Vec<(usize, u32)>,
    pub transmitted: Vec<(usize, TxCommand)>,
    pub fragments: Vec<Vec<u8>>,
}

impl MockPayload {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Payload for MockPayload {
    fn is_complete(&self, slot: usize) -> bool {
        self.complete[slot]
    }

    fn advance_assembly(
        &mut self,
        force_final: bool,
        _max_retransmits: u8,
        stats: &mut Statistics,
    ) -> AssembledSlots {
        self.advance_calls.push(force_final);
        let mut assembled = AssembledSlots::new();
        for slot in self.complete_on_advance.drain(..) {
            self.complete[slot] = true;
            stats.record_success();
            assembled.push(slot).unwrap();
        }
        assembled
    }

    fn reset_window(&mut self, slot: usize, timestamp: u32) {
        self.complete[slot] = false;
        self.max_packet_id[slot] = 0;
        self.resets.push((slot, timestamp));
    }

    fn record_transmitted_command(&mut self, slot: usize, command: TxCommand) {
        self.transmitted.push((slot, command));
    }

    fn max_observed_packet_id(&self, slot: usize) -> u8 {
        self.max_packet_id[slot]
    }

    fn retransmit_count(&self, slot: usize) -> u8 {
        self.retransmits[slot]
    }

    fn add_fragment(&mut self, frame: &[u8]) {
        self.fragments.push(frame.to_vec());
    }

    fn latest_record(&self, slot: usize) -> Option<ProductionRecord> {
        self.records[slot]
    }

    fn alarm_index(&self, slot: usize) -> Option<u16> {
        self.alarm_indices[slot]
    }
}

/// Time source answering from a script, then repeating the last answer.
#[derive(Debug)]
pub struct ScriptedTime {
    answers: Vec<Option<u32>>,
    pub calls: usize,
}

impl ScriptedTime {
    pub fn new(answers: &[Option<u32>]) -> Self {
        Self {
            answers: answers.to_vec(),
            calls: 0,
        }
    }
}

impl TimeSource for ScriptedTime {
    fn fetch_epoch(&mut self) -> Option<u32> {
        let answer = self
            .answers
            .get(self.calls)
            .or_else(|| self.answers.last())
            .copied()
            .flatten();
        self.calls += 1;
        answer
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    PayloadReady(usize),
    SunWindow { sunrise: u32, sunset: u32 },
    Sunrise(u32),
    Sunset(u32),
    Minute(u32),
}

/// Listener that records everything except second ticks.
#[derive(Debug, Default)]
pub struct RecordingListener {
    pub events: Vec<Notification>,
    pub seconds: usize,
}

impl DtuListener for RecordingListener {
    fn payload_ready(&mut self, slot: usize) {
        self.events.push(Notification::PayloadReady(slot));
    }

    fn sun_window_changed(&mut self, sunrise: u32, sunset: u32) {
        self.events.push(Notification::SunWindow { sunrise, sunset });
    }

    fn sunrise(&mut self, timestamp: u32) {
        self.events.push(Notification::Sunrise(timestamp));
    }

    fn sunset(&mut self, timestamp: u32) {
        self.events.push(Notification::Sunset(timestamp));
    }

    fn second_tick(&mut self, _timestamp: u32) {
        self.seconds += 1;
    }

    fn minute_tick(&mut self, timestamp: u32) {
        self.events.push(Notification::Minute(timestamp));
    }
}

#[derive(Debug, Default)]
pub struct RecordingLed {
    pub states: Vec<bool>,
}

impl StatusLed for RecordingLed {
    fn set(&mut self, on: bool) {
        self.states.push(on);
    }
}

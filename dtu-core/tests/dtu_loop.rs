mod common;

use common::{MockPayload, MockRadio, Notification, RadioCall, RecordingLed, RecordingListener, ScriptedTime};
use dtu_core::app::{ConsoleReply, Dtu};
use dtu_core::config::{DtuConfig, InverterConfig};
use dtu_core::console::ConsoleError;
use dtu_core::coordinator::{PollOutcome, RequestFailure, Resolution};
use dtu_core::drain::FrameOutcome;
use dtu_core::inverter::{DevControlCmd, FleetError, InfoCommand, RadioAddress, TxCommand};
use dtu_core::rx::{PacketRing, RxPacket};
use dtu_core::status::StatusFormatter;

type TestDtu<'r> = Dtu<'r, MockRadio, MockPayload, ScriptedTime, RecordingListener, RecordingLed>;

const SERIAL: u64 = 0x1161_2345_6789;

static RING: PacketRing = PacketRing::new();

fn build(config: DtuConfig, ring: &PacketRing) -> TestDtu<'_> {
    let mut dtu = Dtu::new(
        config,
        ring,
        MockRadio::new(),
        MockPayload::new(),
        ScriptedTime::new(&[None]),
        RecordingListener::default(),
        RecordingLed::default(),
    );
    dtu.add_inverter(InverterConfig::new(SERIAL)).unwrap();
    dtu.start().unwrap();
    dtu
}

fn timeless() -> DtuConfig {
    DtuConfig::new().with_timeless(true)
}

#[test]
fn send_interval_paces_transmissions() {
    let ring = PacketRing::new();
    let mut dtu = build(timeless(), &ring);

    dtu.poll(14_999);
    assert!(dtu.radio().sent.is_empty());
    assert_eq!(dtu.last_outcome(), None);

    dtu.poll(15_000);
    assert_eq!(
        dtu.radio().sent,
        vec![RadioCall::Time {
            address: RadioAddress::from_serial(SERIAL),
            command: InfoCommand::RealTimeRunData,
            timestamp: 16,
            alarm_index: 0,
        }]
    );
    assert_eq!(
        dtu.last_outcome(),
        Some(PollOutcome::Dispatched {
            slot: 0,
            resolution: Resolution::Idle,
            sent: TxCommand::Info(InfoCommand::RealTimeRunData),
        })
    );

    dtu.poll(29_999);
    assert_eq!(dtu.radio().sent.len(), 1);

    dtu.poll(30_000);
    assert_eq!(dtu.radio().sent.len(), 2);
    assert_eq!(
        dtu.last_outcome().map(|outcome| matches!(
            outcome,
            PollOutcome::Dispatched {
                resolution: Resolution::Failed(RequestFailure::NoAnswer),
                ..
            }
        )),
        Some(true)
    );
    assert_eq!(dtu.context().stats.no_answer(), 1);
}

#[test]
fn slow_iteration_catches_up_second_by_second() {
    let ring = PacketRing::new();
    let mut dtu = build(timeless().with_publish(true), &ring);

    dtu.poll(60_000);
    assert_eq!(dtu.uptime_secs(), 60);
    assert_eq!(dtu.radio().sent.len(), 4);
    assert_eq!(dtu.listener().seconds, 60);
    assert_eq!(dtu.context().time.timestamp(), 61);
    assert_eq!(dtu.listener().events, vec![Notification::Minute(61)]);
}

#[test]
fn fleet_rejects_fifth_inverter() {
    let ring = PacketRing::new();
    let mut dtu = build(timeless(), &ring);

    for serial in 1..4 {
        dtu.add_inverter(InverterConfig::new(serial)).unwrap();
    }
    assert_eq!(
        dtu.add_inverter(InverterConfig::new(99)),
        Err(FleetError::FleetFull)
    );
}

#[test]
fn console_limit_goes_out_on_next_cycle() {
    let ring = PacketRing::new();
    let mut dtu = build(timeless(), &ring);

    assert_eq!(
        dtu.execute("limit 0 300w persist"),
        Ok(ConsoleReply::Accepted { slot: 0 })
    );
    assert!(dtu.radio().sent.is_empty(), "nothing is sent outside the cycle");

    dtu.poll(15_000);
    assert_eq!(
        dtu.radio().sent,
        vec![RadioCall::Control {
            address: RadioAddress::from_serial(SERIAL),
            command: DevControlCmd::ActivePowerLimit,
            limit: [3_000, 0x0100],
        }]
    );
}

#[test]
fn console_errors_surface_to_caller() {
    let ring = PacketRing::new();
    let mut dtu = build(timeless(), &ring);

    assert_eq!(dtu.execute("power 2 off"), Err(ConsoleError::UnknownSlot));
    assert_eq!(dtu.execute("limit 0 120%"), Err(ConsoleError::LimitOutOfRange));
    assert_eq!(dtu.execute("dance"), Err(ConsoleError::Syntax));
}

#[test]
fn status_reply_renders_slots() {
    let ring = PacketRing::new();
    let mut dtu = build(timeless(), &ring);
    dtu.poll(15_000);

    let Ok(ConsoleReply::Status(status)) = dtu.execute("status") else {
        panic!("status should be answered");
    };
    assert_eq!(status.slots.len(), 1);
    assert!(status.slots[0].busy);
    assert!(status.communication_allowed);

    let mut rendered = String::new();
    StatusFormatter::new(&status).write_all(&mut rendered).unwrap();
    assert!(rendered.starts_with("time ts=16 "), "{rendered}");
    assert!(rendered.contains("inv0 sn=116123456789 busy"), "{rendered}");
}

#[test]
fn manual_send_bypasses_interval() {
    let ring = PacketRing::new();
    let mut dtu = build(timeless(), &ring);

    let outcome = dtu.send();
    assert!(outcome.sent().is_some());
    assert_eq!(dtu.radio().sent.len(), 1);
}

#[test]
fn interrupt_frames_reach_assembler() {
    let mut dtu = build(timeless(), &RING);
    RING.push(RxPacket::new(61, &[0x95, 0x80, 0x01])).unwrap();
    RING.push(RxPacket::new(75, &[0x95, 0x81, 0x02])).unwrap();

    let report = dtu.poll(1).expect("drain runs on the first poll");
    assert_eq!(report.backlog, 2);
    assert_eq!(report.frame, Some(FrameOutcome::Accepted { len: 3 }));

    assert!(dtu.poll(3).is_none());
    assert!(dtu.poll(6).is_some());
    assert_eq!(
        dtu.payload().fragments,
        vec![vec![0x95, 0x80, 0x01], vec![0x95, 0x81, 0x02]]
    );
    assert_eq!(dtu.context().stats.frames_received(), 2);
    assert!(RING.is_empty());
}

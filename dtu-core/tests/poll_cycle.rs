mod common;

use common::{MockPayload, MockRadio, Notification, RadioCall, RecordingLed, RecordingListener};
use dtu_core::config::{DtuConfig, InverterConfig, Location};
use dtu_core::context::DtuContext;
use dtu_core::coordinator::{
    Collaborators, PollCoordinator, PollCursor, PollOutcome, RequestFailure, Resolution,
    SkipReason,
};
use dtu_core::drain::{DrainReport, ReceiveDrain};
use dtu_core::inverter::{
    ControlRequest, DevControlCmd, Fleet, InfoCommand, LimitUnit, PowerLimit, ProductionRecord,
    RadioAddress, TxCommand,
};
use dtu_core::rx::PacketRing;
use dtu_core::stats::Statistics;
use dtu_core::telemetry::TelemetryEventKind;

/// 2024-06-21 12:00:00 UTC.
const NOON: u32 = 1_718_971_200;
const BERLIN_SUNRISE: u32 = 1_718_937_858;
const BERLIN_SUNSET: u32 = 1_718_998_461;

const SERIAL_A: u64 = 0x1141_7234_5678;
const SERIAL_B: u64 = 0x1161_8765_4321;

struct Harness {
    ctx: DtuContext,
    fleet: Fleet,
    drain: ReceiveDrain,
    coordinator: PollCoordinator,
    radio: MockRadio,
    payload: MockPayload,
    led: RecordingLed,
    listener: RecordingListener,
}

impl Harness {
    fn new(config: DtuConfig) -> Self {
        Self {
            ctx: DtuContext::new(config),
            fleet: Fleet::new(),
            drain: ReceiveDrain::new(config.rx_drain_period_ms),
            coordinator: PollCoordinator::new(),
            radio: MockRadio::new(),
            payload: MockPayload::new(),
            led: RecordingLed::default(),
            listener: RecordingListener::default(),
        }
    }

    fn at_noon(config: DtuConfig) -> Self {
        let mut harness = Self::new(config);
        harness.ctx.time.set_timestamp(NOON);
        harness
    }

    fn poll(&mut self) -> PollOutcome {
        let mut io = Collaborators {
            radio: &mut self.radio,
            payload: &mut self.payload,
            led: &mut self.led,
            listener: &mut self.listener,
        };
        self.coordinator
            .poll(&mut self.ctx, &mut self.fleet, &mut self.drain, &mut io)
    }

    fn drain_at(&mut self, now_ms: u64, ring: &PacketRing) -> Option<DrainReport> {
        let mut io = Collaborators {
            radio: &mut self.radio,
            payload: &mut self.payload,
            led: &mut self.led,
            listener: &mut self.listener,
        };
        self.drain
            .poll(now_ms, ring, &mut self.ctx, &mut self.fleet, &mut io)
    }

    fn events(&self) -> Vec<TelemetryEventKind> {
        self.ctx
            .telemetry
            .oldest_first()
            .map(|record| record.event)
            .collect()
    }
}

const REALTIME: TxCommand = TxCommand::Info(InfoCommand::RealTimeRunData);

#[test]
fn unknown_time_skips_without_side_effects() {
    let mut harness = Harness::new(DtuConfig::new());
    harness.fleet.insert(0, InverterConfig::new(SERIAL_A)).unwrap();

    assert_eq!(harness.poll(), PollOutcome::Skipped(SkipReason::TimeUnknown));
    assert!(harness.radio.sent.is_empty());
    assert!(harness.payload.resets.is_empty());
    assert!(harness.payload.advance_calls.is_empty());
    assert_eq!(harness.ctx.stats, Statistics::new());
    assert_eq!(harness.coordinator.cursor(), PollCursor::new());
    assert!(!harness.fleet.get(0).unwrap().is_busy());
    assert!(
        harness.events().is_empty(),
        "gate skips are only logged in verbose mode"
    );
}

#[test]
fn verbose_mode_logs_gate_skips() {
    let mut harness = Harness::new(DtuConfig::new().with_serial_debug(true));
    harness.fleet.insert(0, InverterConfig::new(SERIAL_A)).unwrap();

    harness.poll();
    assert_eq!(
        harness.events(),
        vec![TelemetryEventKind::CycleSkipped(SkipReason::TimeUnknown)]
    );
}

#[test]
fn sparse_fleet_selects_next_configured_slot() {
    let mut harness = Harness::at_noon(DtuConfig::new());
    harness.fleet.insert(0, InverterConfig::new(SERIAL_A)).unwrap();
    harness.fleet.insert(2, InverterConfig::new(SERIAL_B)).unwrap();

    assert_eq!(
        harness.poll(),
        PollOutcome::Dispatched {
            slot: 2,
            resolution: Resolution::Idle,
            sent: REALTIME,
        }
    );
    assert_eq!(
        harness.radio.sent,
        vec![RadioCall::Time {
            address: RadioAddress::from_serial(SERIAL_B),
            command: InfoCommand::RealTimeRunData,
            timestamp: NOON,
            alarm_index: 0,
        }]
    );
    assert_eq!(harness.payload.resets, vec![(2, NOON)]);
    assert_eq!(harness.payload.transmitted, vec![(2, REALTIME)]);
    assert!(harness.fleet.get(2).unwrap().is_busy());
    assert!(!harness.fleet.get(0).unwrap().is_busy());

    let second = harness.poll();
    assert!(matches!(second, PollOutcome::Dispatched { slot: 0, .. }));
    assert_eq!(harness.coordinator.cursor().index(), 0);
}

#[test]
fn every_cycle_sends_exactly_one_command() {
    let mut harness = Harness::at_noon(DtuConfig::new());
    for index in 0..4 {
        harness
            .fleet
            .insert(index, InverterConfig::new(SERIAL_A + index as u64))
            .unwrap();
    }

    let mut visited = Vec::new();
    for cycle in 0..8 {
        match harness.poll() {
            PollOutcome::Dispatched { slot, .. } => visited.push(slot),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(harness.radio.sent.len(), cycle + 1);
    }
    assert_eq!(visited, vec![1, 2, 3, 0, 1, 2, 3, 0]);
}

#[test]
fn silent_inverter_counts_no_answer_and_frees_slot() {
    let mut harness = Harness::at_noon(DtuConfig::new());
    harness.fleet.insert(0, InverterConfig::new(SERIAL_A)).unwrap();

    harness.poll();
    assert!(harness.fleet.get(0).unwrap().is_busy());

    assert_eq!(
        harness.poll(),
        PollOutcome::Dispatched {
            slot: 0,
            resolution: Resolution::Failed(RequestFailure::NoAnswer),
            sent: REALTIME,
        }
    );
    assert_eq!(harness.ctx.stats.no_answer(), 1);
    assert_eq!(harness.ctx.stats.partial_failure(), 0);
    assert_eq!(harness.payload.advance_calls, vec![false]);
    assert_eq!(harness.payload.resets.len(), 2);
    assert!(
        harness.fleet.get(0).unwrap().is_busy(),
        "the freed slot carries the freshly sent request"
    );
}

#[test]
fn partial_answer_counts_partial_failure() {
    let mut harness = Harness::at_noon(DtuConfig::new().with_serial_debug(true));
    harness.fleet.insert(0, InverterConfig::new(SERIAL_A)).unwrap();

    harness.poll();
    harness.payload.max_packet_id[0] = 3;
    harness.payload.retransmits[0] = 2;

    assert_eq!(
        harness.poll(),
        PollOutcome::Dispatched {
            slot: 0,
            resolution: Resolution::Failed(RequestFailure::PartialFailure),
            sent: REALTIME,
        }
    );
    assert_eq!(harness.ctx.stats.partial_failure(), 1);
    assert_eq!(harness.ctx.stats.no_answer(), 0);
    assert!(harness
        .events()
        .contains(&TelemetryEventKind::RequestFailed(0)));
}

#[test]
fn assembled_payload_completes_request_and_lights_led() {
    let mut harness = Harness::at_noon(DtuConfig::new());
    harness.fleet.insert(0, InverterConfig::new(SERIAL_A)).unwrap();

    harness.poll();
    assert!(harness.led.states.is_empty(), "no record yet");

    let record = ProductionRecord {
        timestamp: NOON,
        ac_power_dw: 4_000,
    };
    harness.payload.complete_on_advance.push(0);
    harness.payload.records[0] = Some(record);

    assert_eq!(
        harness.poll(),
        PollOutcome::Dispatched {
            slot: 0,
            resolution: Resolution::Complete,
            sent: REALTIME,
        }
    );
    assert_eq!(harness.ctx.stats.rx_success(), 1);
    assert_eq!(harness.ctx.stats.no_answer(), 0);
    assert_eq!(harness.fleet.get(0).unwrap().record, Some(record));
    assert_eq!(harness.listener.events, vec![Notification::PayloadReady(0)]);
    assert_eq!(harness.led.states, vec![true]);
}

#[test]
fn assembled_alarm_index_rides_on_next_time_packet() {
    let mut harness = Harness::at_noon(DtuConfig::new());
    harness.fleet.insert(0, InverterConfig::new(SERIAL_A)).unwrap();

    harness.poll();
    harness.payload.complete_on_advance.push(0);
    harness.payload.alarm_indices[0] = Some(7);

    assert!(matches!(
        harness.poll(),
        PollOutcome::Dispatched {
            resolution: Resolution::Complete,
            ..
        }
    ));
    assert_eq!(harness.fleet.get(0).unwrap().alarm_index, 7);
    assert_eq!(
        harness.radio.sent.last(),
        Some(&RadioCall::Time {
            address: RadioAddress::from_serial(SERIAL_A),
            command: InfoCommand::RealTimeRunData,
            timestamp: NOON,
            alarm_index: 7,
        })
    );

    harness.payload.alarm_indices[0] = None;
    harness.poll();
    assert!(matches!(
        harness.radio.sent.last(),
        Some(RadioCall::Time { alarm_index: 7, .. })
    ));
}

#[test]
fn led_stays_untouched_when_disabled() {
    let mut harness = Harness::at_noon(DtuConfig::new().with_status_led(false));
    harness.fleet.insert(0, InverterConfig::new(SERIAL_A)).unwrap();
    harness.fleet.get_mut(0).unwrap().record = Some(ProductionRecord {
        timestamp: NOON,
        ac_power_dw: 10,
    });

    harness.poll();
    assert!(harness.led.states.is_empty());
}

#[test]
fn night_gate_blocks_outside_sun_window() {
    let config = DtuConfig::new()
        .with_location(Location::new(52.52, 13.405))
        .with_night_communication_disabled(true);
    let mut harness = Harness::new(config);
    harness.fleet.insert(0, InverterConfig::new(SERIAL_A)).unwrap();
    harness
        .ctx
        .time
        .set_sun_window(BERLIN_SUNRISE, BERLIN_SUNSET);

    harness.ctx.time.set_timestamp(BERLIN_SUNRISE - 1);
    assert_eq!(harness.poll(), PollOutcome::Skipped(SkipReason::NightGated));
    assert!(harness.radio.sent.is_empty());

    harness.ctx.time.set_timestamp(BERLIN_SUNRISE);
    assert!(matches!(harness.poll(), PollOutcome::Dispatched { .. }));

    harness.ctx.time.set_timestamp(BERLIN_SUNSET + 1);
    assert_eq!(harness.poll(), PollOutcome::Skipped(SkipReason::NightGated));
    assert_eq!(harness.radio.sent.len(), 1);
}

#[test]
fn night_gate_applies_without_location() {
    let config = DtuConfig::new().with_night_communication_disabled(true);
    assert!(config.location.is_none());
    let mut harness = Harness::new(config);
    harness.fleet.insert(0, InverterConfig::new(SERIAL_A)).unwrap();

    harness.ctx.time.set_timestamp(NOON);
    assert_eq!(harness.poll(), PollOutcome::Skipped(SkipReason::NightGated));

    harness
        .ctx
        .time
        .set_sun_window(BERLIN_SUNRISE, BERLIN_SUNSET);
    harness.ctx.time.set_timestamp(BERLIN_SUNRISE - 1);
    assert_eq!(harness.poll(), PollOutcome::Skipped(SkipReason::NightGated));
    assert!(harness.radio.sent.is_empty());

    harness.ctx.time.set_timestamp(NOON);
    assert!(matches!(harness.poll(), PollOutcome::Dispatched { .. }));
}

#[test]
fn night_gate_is_off_by_default() {
    let config = DtuConfig::new();
    assert!(!config.night_communication_disabled);
    let mut harness = Harness::at_noon(config);
    harness.fleet.insert(0, InverterConfig::new(SERIAL_A)).unwrap();

    assert!(matches!(harness.poll(), PollOutcome::Dispatched { .. }));
}

#[test]
fn night_communication_can_be_enabled() {
    let config = DtuConfig::new()
        .with_location(Location::new(52.52, 13.405))
        .with_night_communication_disabled(false);
    let mut harness = Harness::new(config);
    harness.fleet.insert(0, InverterConfig::new(SERIAL_A)).unwrap();
    harness
        .ctx
        .time
        .set_sun_window(BERLIN_SUNRISE, BERLIN_SUNSET);
    harness.ctx.time.set_timestamp(BERLIN_SUNSET + 3_600);

    assert!(matches!(harness.poll(), PollOutcome::Dispatched { .. }));
}

#[test]
fn link_down_skips_before_anything_else() {
    let mut harness = Harness::at_noon(DtuConfig::new());
    harness.fleet.insert(1, InverterConfig::new(SERIAL_A)).unwrap();
    harness.fleet.get_mut(1).unwrap().record = Some(ProductionRecord {
        timestamp: NOON,
        ac_power_dw: 10,
    });
    harness.radio.connected = false;

    assert_eq!(
        harness.poll(),
        PollOutcome::Skipped(SkipReason::LinkUnavailable)
    );
    assert!(harness.radio.sent.is_empty());
    assert!(harness.led.states.is_empty());
    assert_eq!(harness.coordinator.cursor().index(), 0);
    assert_eq!(
        harness.events(),
        vec![TelemetryEventKind::CycleSkipped(SkipReason::LinkUnavailable)]
    );
}

#[test]
fn empty_fleet_reports_no_inverters() {
    let mut harness = Harness::at_noon(DtuConfig::new());

    assert_eq!(harness.poll(), PollOutcome::Skipped(SkipReason::NoInverters));
    assert_eq!(
        harness.events(),
        vec![TelemetryEventKind::CycleSkipped(SkipReason::NoInverters)]
    );
}

#[test]
fn control_request_replaces_queue_with_config_readback() {
    let mut harness = Harness::at_noon(DtuConfig::new());
    harness.fleet.insert(0, InverterConfig::new(SERIAL_A)).unwrap();
    {
        let slot = harness.fleet.get_mut(0).unwrap();
        slot.enqueue(InfoCommand::AlarmData).unwrap();
        slot.request_control(ControlRequest::power_limit(PowerLimit::new(
            400,
            LimitUnit::Watts,
            true,
        )));
    }

    let outcome = harness.poll();
    assert_eq!(
        outcome.sent(),
        Some(TxCommand::Control(DevControlCmd::ActivePowerLimit))
    );
    assert_eq!(
        harness.radio.sent,
        vec![RadioCall::Control {
            address: RadioAddress::from_serial(SERIAL_A),
            command: DevControlCmd::ActivePowerLimit,
            limit: [4_000, 0x0100],
        }]
    );
    {
        let slot = harness.fleet.get(0).unwrap();
        assert_eq!(slot.queued(), 1);
        assert_eq!(slot.next_command(), InfoCommand::SystemConfigPara);
        assert!(slot.pending_control().is_none());
    }
    assert!(harness
        .events()
        .contains(&TelemetryEventKind::ControlSent(0)));

    // Unanswered control keeps the read-back queued.
    let outcome = harness.poll();
    assert_eq!(
        outcome,
        PollOutcome::Dispatched {
            slot: 0,
            resolution: Resolution::Failed(RequestFailure::NoAnswer),
            sent: TxCommand::Info(InfoCommand::SystemConfigPara),
        }
    );
    assert_eq!(harness.fleet.get(0).unwrap().queued(), 1);

    harness.payload.complete_on_advance.push(0);
    let outcome = harness.poll();
    assert_eq!(outcome.sent(), Some(REALTIME));
    assert_eq!(harness.fleet.get(0).unwrap().queued(), 0);
}

#[test]
fn info_dispatch_expedites_receive_drain() {
    let ring = PacketRing::new();
    let mut harness = Harness::at_noon(DtuConfig::new());
    harness.fleet.insert(0, InverterConfig::new(SERIAL_A)).unwrap();

    assert!(harness.drain_at(100, &ring).is_some());
    assert!(!harness.drain.is_due(101));

    harness.poll();
    assert!(harness.drain.is_due(101));
    assert!(harness.drain_at(101, &ring).is_some());
}

#[test]
fn control_dispatch_keeps_drain_cadence() {
    let ring = PacketRing::new();
    let mut harness = Harness::at_noon(DtuConfig::new());
    harness.fleet.insert(0, InverterConfig::new(SERIAL_A)).unwrap();
    harness
        .fleet
        .get_mut(0)
        .unwrap()
        .request_control(ControlRequest::new(DevControlCmd::Restart));

    assert!(harness.drain_at(100, &ring).is_some());
    harness.poll();
    assert!(!harness.drain.is_due(101));
}

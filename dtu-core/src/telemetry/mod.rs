//! Telemetry event catalog and the in-memory record ring.
//!
//! Every decision the polling core would otherwise print is captured here as a
//! typed event with a compact numeric code, so firmware and host targets can
//! mirror the ring to their own log sinks without the core depending on one.

use core::fmt;

use heapless::HistoryBuf;

use crate::coordinator::{RequestFailure, SkipReason};
use crate::inverter::TxCommand;
use crate::scheduler::ScheduleError;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 128;

/// Monotonic identifier of a telemetry record.
pub type EventId = u32;

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    CycleSkipped(SkipReason),
    RequestSent(u8),
    ControlSent(u8),
    RequestFailed(u8),
    PayloadReady(u8),
    ControlAccepted(u8),
    FrameReceived,
    PacketDropped,
    ReceiveBacklog,
    NtpSynced,
    NtpRetry,
    SunWindow,
    Sunrise,
    Sunset,
    ChoreFault,
    Custom(u16),
}

impl TelemetryEventKind {
    const SKIP_BASE: u16 = 0x0000;
    const REQUEST_SENT_BASE: u16 = 0x0010;
    const CONTROL_SENT_BASE: u16 = 0x0020;
    const REQUEST_FAILED_BASE: u16 = 0x0030;
    const PAYLOAD_READY_BASE: u16 = 0x0040;
    const CONTROL_ACCEPTED_BASE: u16 = 0x0050;
    const SLOT_RANGE: u16 = 0x0010;
    const FRAME_RECEIVED_CODE: u16 = 0x0100;
    const PACKET_DROPPED_CODE: u16 = 0x0101;
    const RECEIVE_BACKLOG_CODE: u16 = 0x0102;
    const NTP_SYNCED_CODE: u16 = 0x0110;
    const NTP_RETRY_CODE: u16 = 0x0111;
    const SUN_WINDOW_CODE: u16 = 0x0120;
    const SUNRISE_CODE: u16 = 0x0121;
    const SUNSET_CODE: u16 = 0x0122;
    const CHORE_FAULT_CODE: u16 = 0x01F0;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::CycleSkipped(reason) => Self::SKIP_BASE + skip_index(reason),
            TelemetryEventKind::RequestSent(slot) => Self::REQUEST_SENT_BASE + slot_code(slot),
            TelemetryEventKind::ControlSent(slot) => Self::CONTROL_SENT_BASE + slot_code(slot),
            TelemetryEventKind::RequestFailed(slot) => {
                Self::REQUEST_FAILED_BASE + slot_code(slot)
            }
            TelemetryEventKind::PayloadReady(slot) => Self::PAYLOAD_READY_BASE + slot_code(slot),
            TelemetryEventKind::ControlAccepted(slot) => {
                Self::CONTROL_ACCEPTED_BASE + slot_code(slot)
            }
            TelemetryEventKind::FrameReceived => Self::FRAME_RECEIVED_CODE,
            TelemetryEventKind::PacketDropped => Self::PACKET_DROPPED_CODE,
            TelemetryEventKind::ReceiveBacklog => Self::RECEIVE_BACKLOG_CODE,
            TelemetryEventKind::NtpSynced => Self::NTP_SYNCED_CODE,
            TelemetryEventKind::NtpRetry => Self::NTP_RETRY_CODE,
            TelemetryEventKind::SunWindow => Self::SUN_WINDOW_CODE,
            TelemetryEventKind::Sunrise => Self::SUNRISE_CODE,
            TelemetryEventKind::Sunset => Self::SUNSET_CODE,
            TelemetryEventKind::ChoreFault => Self::CHORE_FAULT_CODE,
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant, falling back to [`TelemetryEventKind::Custom`].
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        match code {
            Self::FRAME_RECEIVED_CODE => TelemetryEventKind::FrameReceived,
            Self::PACKET_DROPPED_CODE => TelemetryEventKind::PacketDropped,
            Self::RECEIVE_BACKLOG_CODE => TelemetryEventKind::ReceiveBacklog,
            Self::NTP_SYNCED_CODE => TelemetryEventKind::NtpSynced,
            Self::NTP_RETRY_CODE => TelemetryEventKind::NtpRetry,
            Self::SUN_WINDOW_CODE => TelemetryEventKind::SunWindow,
            Self::SUNRISE_CODE => TelemetryEventKind::Sunrise,
            Self::SUNSET_CODE => TelemetryEventKind::Sunset,
            Self::CHORE_FAULT_CODE => TelemetryEventKind::ChoreFault,
            value if value < Self::REQUEST_SENT_BASE => skip_from_index(value)
                .map_or(TelemetryEventKind::Custom(value), |reason| {
                    TelemetryEventKind::CycleSkipped(reason)
                }),
            value if value < Self::CONTROL_ACCEPTED_BASE + Self::SLOT_RANGE => {
                let base = value - value % Self::SLOT_RANGE;
                let Ok(slot) = u8::try_from(value - base) else {
                    return TelemetryEventKind::Custom(value);
                };
                match base {
                    Self::REQUEST_SENT_BASE => TelemetryEventKind::RequestSent(slot),
                    Self::CONTROL_SENT_BASE => TelemetryEventKind::ControlSent(slot),
                    Self::REQUEST_FAILED_BASE => TelemetryEventKind::RequestFailed(slot),
                    Self::PAYLOAD_READY_BASE => TelemetryEventKind::PayloadReady(slot),
                    _ => TelemetryEventKind::ControlAccepted(slot),
                }
            }
            other => TelemetryEventKind::Custom(other),
        }
    }

    /// Short static label, usable by log sinks without `core::fmt`.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            TelemetryEventKind::CycleSkipped(reason) => reason.label(),
            TelemetryEventKind::RequestSent(_) => "request-sent",
            TelemetryEventKind::ControlSent(_) => "control-sent",
            TelemetryEventKind::RequestFailed(_) => "request-failed",
            TelemetryEventKind::PayloadReady(_) => "payload-ready",
            TelemetryEventKind::ControlAccepted(_) => "control-accepted",
            TelemetryEventKind::FrameReceived => "frame-received",
            TelemetryEventKind::PacketDropped => "packet-dropped",
            TelemetryEventKind::ReceiveBacklog => "receive-backlog",
            TelemetryEventKind::NtpSynced => "ntp-synced",
            TelemetryEventKind::NtpRetry => "ntp-retry",
            TelemetryEventKind::SunWindow => "sun-window",
            TelemetryEventKind::Sunrise => "sunrise",
            TelemetryEventKind::Sunset => "sunset",
            TelemetryEventKind::ChoreFault => "chore-fault",
            TelemetryEventKind::Custom(_) => "custom",
        }
    }

    /// Inverter slot the event refers to, if any.
    #[must_use]
    pub const fn slot(self) -> Option<u8> {
        match self {
            TelemetryEventKind::RequestSent(slot)
            | TelemetryEventKind::ControlSent(slot)
            | TelemetryEventKind::RequestFailed(slot)
            | TelemetryEventKind::PayloadReady(slot)
            | TelemetryEventKind::ControlAccepted(slot) => Some(slot),
            _ => None,
        }
    }
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
            other => match other.slot() {
                Some(slot) => write!(f, "{} slot={slot}", other.label()),
                None => f.write_str(other.label()),
            },
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    None,
    /// Command put on air.
    Request(TxCommand),
    Failure(FailureTelemetry),
    /// Frames waiting in the receive ring.
    Backlog { fill: u8 },
    /// Sun window in epoch seconds.
    Sun { sunrise: u32, sunset: u32 },
    /// Delay until the next time-sync attempt.
    Ntp { next_attempt_secs: u32 },
    Fault(ScheduleError),
}

impl TelemetryPayload {
    /// Convenience constructor when no payload data is needed.
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }
}

/// Renders the payload as space-prefixed `key=value` pairs; empty for `None`.
impl fmt::Display for TelemetryPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryPayload::None => Ok(()),
            TelemetryPayload::Request(command) => write!(f, " cmd=\"{command}\""),
            TelemetryPayload::Failure(details) => write!(
                f,
                " {} max-id={} retransmits={}",
                details.failure, details.max_packet_id, details.retransmits
            ),
            TelemetryPayload::Backlog { fill } => write!(f, " fill={fill}"),
            TelemetryPayload::Sun { sunrise, sunset } => {
                write!(f, " sunrise={sunrise} sunset={sunset}")
            }
            TelemetryPayload::Ntp { next_attempt_secs } => {
                write!(f, " next={next_attempt_secs}s")
            }
            TelemetryPayload::Fault(error) => write!(f, " error=\"{error}\""),
        }
    }
}

/// Diagnostics for a request that ended without a complete payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FailureTelemetry {
    pub failure: RequestFailure,
    pub max_packet_id: u8,
    pub retransmits: u8,
}

impl FailureTelemetry {
    #[must_use]
    pub const fn new(failure: RequestFailure, max_packet_id: u8, retransmits: u8) -> Self {
        Self {
            failure,
            max_packet_id,
            retransmits,
        }
    }
}

/// Time reference attached to every record.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Stamp {
    pub uptime_ms: u64,
    /// Epoch seconds; zero while the time is unknown.
    pub epoch: u32,
}

impl Stamp {
    #[must_use]
    pub const fn new(uptime_ms: u64, epoch: u32) -> Self {
        Self { uptime_ms, epoch }
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub stamp: Stamp,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// `#12 t=1500ms ts=1718971200 request-failed slot=0 no-answer max-id=0 retransmits=0`
impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} t={}ms ts={} {}{}",
            self.id, self.stamp.uptime_ms, self.stamp.epoch, self.event, self.details
        )
    }
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: TelemetryRing<CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> impl Iterator<Item = &TelemetryRecord> + '_ {
        self.ring.oldest_ordered()
    }

    /// Records written after `last_seen`, oldest first. `None` yields everything retained.
    pub fn newer_than(
        &self,
        last_seen: Option<EventId>,
    ) -> impl Iterator<Item = &TelemetryRecord> + '_ {
        self.oldest_first()
            .filter(move |record| last_seen.is_none_or(|seen| record.id > seen))
    }

    /// Returns the most recent telemetry record, if available.
    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        stamp: Stamp,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            stamp,
            event,
            details: payload,
        });

        id
    }

    pub fn record_skip(&mut self, reason: SkipReason, stamp: Stamp) -> EventId {
        self.record(
            TelemetryEventKind::CycleSkipped(reason),
            TelemetryPayload::none(),
            stamp,
        )
    }

    /// Records an outbound request, distinguishing control from info commands.
    pub fn record_sent(&mut self, slot: usize, command: TxCommand, stamp: Stamp) -> EventId {
        let slot = truncate_slot(slot);
        let event = match command {
            TxCommand::Control(_) => TelemetryEventKind::ControlSent(slot),
            TxCommand::Info(_) => TelemetryEventKind::RequestSent(slot),
        };
        self.record(event, TelemetryPayload::Request(command), stamp)
    }

    pub fn record_failure(
        &mut self,
        slot: usize,
        details: FailureTelemetry,
        stamp: Stamp,
    ) -> EventId {
        self.record(
            TelemetryEventKind::RequestFailed(truncate_slot(slot)),
            TelemetryPayload::Failure(details),
            stamp,
        )
    }

    pub fn record_slot_event(
        &mut self,
        event: fn(u8) -> TelemetryEventKind,
        slot: usize,
        stamp: Stamp,
    ) -> EventId {
        self.record(event(truncate_slot(slot)), TelemetryPayload::none(), stamp)
    }

    pub fn record_backlog(&mut self, fill: usize, stamp: Stamp) -> EventId {
        self.record(
            TelemetryEventKind::ReceiveBacklog,
            TelemetryPayload::Backlog {
                fill: truncate_count(fill),
            },
            stamp,
        )
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_slot(slot: usize) -> u8 {
    u8::try_from(slot).unwrap_or(u8::MAX)
}

fn truncate_count(count: usize) -> u8 {
    match u8::try_from(count) {
        Ok(value) => value,
        Err(_) => u8::MAX,
    }
}

#[allow(clippy::cast_lossless)]
const fn slot_code(slot: u8) -> u16 {
    let slot = slot as u16;
    if slot < TelemetryEventKind::SLOT_RANGE {
        slot
    } else {
        TelemetryEventKind::SLOT_RANGE - 1
    }
}

const fn skip_index(reason: SkipReason) -> u16 {
    match reason {
        SkipReason::LinkUnavailable => 0,
        SkipReason::TimeUnknown => 1,
        SkipReason::NightGated => 2,
        SkipReason::NoInverters => 3,
    }
}

fn skip_from_index(index: u16) -> Option<SkipReason> {
    match index {
        0 => Some(SkipReason::LinkUnavailable),
        1 => Some(SkipReason::TimeUnknown),
        2 => Some(SkipReason::NightGated),
        3 => Some(SkipReason::NoInverters),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inverter::{DevControlCmd, InfoCommand};

    #[test]
    fn slot_events_decode_from_raw() {
        let fixtures = [
            TelemetryEventKind::CycleSkipped(SkipReason::NightGated),
            TelemetryEventKind::RequestSent(2),
            TelemetryEventKind::ControlSent(0),
            TelemetryEventKind::RequestFailed(3),
            TelemetryEventKind::PayloadReady(1),
            TelemetryEventKind::ControlAccepted(2),
            TelemetryEventKind::ReceiveBacklog,
            TelemetryEventKind::Sunset,
        ];

        for event in fixtures {
            assert_eq!(TelemetryEventKind::from_raw(event.to_raw()), event);
        }
        assert_eq!(
            TelemetryEventKind::from_raw(0x0009),
            TelemetryEventKind::Custom(0x0009)
        );
        assert_eq!(
            TelemetryEventKind::from_raw(0x4242),
            TelemetryEventKind::Custom(0x4242)
        );
    }

    #[test]
    fn display_includes_slot() {
        let mut rendered = heapless::String::<32>::new();
        core::fmt::write(&mut rendered, format_args!("{}", TelemetryEventKind::RequestFailed(2)))
            .unwrap();
        assert_eq!(rendered.as_str(), "request-failed slot=2");
    }

    #[test]
    fn record_renders_event_and_payload() {
        let record = TelemetryRecord {
            id: 12,
            stamp: Stamp::new(1_500, 1_718_971_200),
            event: TelemetryEventKind::RequestFailed(0),
            details: TelemetryPayload::Failure(FailureTelemetry::new(
                RequestFailure::NoAnswer,
                0,
                0,
            )),
        };
        let mut rendered = heapless::String::<96>::new();
        core::fmt::write(&mut rendered, format_args!("{record}")).unwrap();
        assert_eq!(
            rendered.as_str(),
            "#12 t=1500ms ts=1718971200 request-failed slot=0 no-answer max-id=0 retransmits=0"
        );

        let ntp = TelemetryRecord {
            id: 3,
            stamp: Stamp::new(2_000, 0),
            event: TelemetryEventKind::NtpRetry,
            details: TelemetryPayload::Ntp {
                next_attempt_secs: 5,
            },
        };
        rendered.clear();
        core::fmt::write(&mut rendered, format_args!("{ntp}")).unwrap();
        assert_eq!(rendered.as_str(), "#3 t=2000ms ts=0 ntp-retry next=5s");
    }

    #[test]
    fn sent_events_split_by_command_kind() {
        let mut recorder = TelemetryRecorder::<8>::new();
        let stamp = Stamp::new(1_000, 1_700_000_000);

        recorder.record_sent(1, TxCommand::Info(InfoCommand::RealTimeRunData), stamp);
        assert_eq!(
            recorder.latest().unwrap().event,
            TelemetryEventKind::RequestSent(1)
        );

        recorder.record_sent(1, TxCommand::Control(DevControlCmd::Restart), stamp);
        let latest = recorder.latest().unwrap();
        assert_eq!(latest.event, TelemetryEventKind::ControlSent(1));
        assert_eq!(latest.id, 1);
        assert_eq!(
            latest.details,
            TelemetryPayload::Request(TxCommand::Control(DevControlCmd::Restart))
        );
    }

    #[test]
    fn ring_keeps_newest_records() {
        let mut recorder = TelemetryRecorder::<2>::new();
        for uptime in 0..3 {
            recorder.record_skip(SkipReason::TimeUnknown, Stamp::new(uptime, 0));
        }
        assert_eq!(recorder.len(), 2);
        let ids: heapless::Vec<EventId, 2> = recorder.oldest_first().map(|r| r.id).collect();
        assert_eq!(ids.as_slice(), &[1, 2]);
    }

    #[test]
    fn newer_than_filters_seen_records() {
        let mut recorder = TelemetryRecorder::<8>::new();
        for _ in 0..4 {
            recorder.record_backlog(300, Stamp::default());
        }
        assert_eq!(recorder.newer_than(None).count(), 4);
        assert_eq!(recorder.newer_than(Some(1)).count(), 2);
        assert_eq!(
            recorder.latest().unwrap().details,
            TelemetryPayload::Backlog { fill: u8::MAX }
        );
    }
}

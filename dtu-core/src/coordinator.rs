//! Inverter poll coordinator.
//!
//! One invocation per send interval. The cycle is strictly ordered:
//!
//! 1. bail out when the radio link is down,
//! 2. bail out while the time is unknown or, with night gating, outside the
//!    sun window,
//! 3. advance the round-robin cursor to the next configured slot,
//! 4. settle the outcome of the request still in flight for that slot,
//! 5. open a new assembly window and put exactly one command on air,
//! 6. refresh the producing LED.
//!
//! Step 4 looks at the slot chosen in step 3, so with sparse fleets the
//! request being judged is that slot's own previous one.

use core::fmt;

use crate::context::DtuContext;
use crate::drain::ReceiveDrain;
use crate::inverter::{Fleet, InfoCommand, InverterSlot, RequestState, TxCommand};
use crate::listener::DtuListener;
use crate::radio::{Payload, Radio, StatusLed};
use crate::telemetry::{FailureTelemetry, TelemetryEventKind};

/// Why a cycle did not talk to any inverter. None of these are faults.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SkipReason {
    LinkUnavailable,
    TimeUnknown,
    NightGated,
    NoInverters,
}

impl SkipReason {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            SkipReason::LinkUnavailable => "link-unavailable",
            SkipReason::TimeUnknown => "time-unknown",
            SkipReason::NightGated => "night-gated",
            SkipReason::NoInverters => "no-inverters",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classification of a request that never assembled.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RequestFailure {
    /// Not a single fragment arrived.
    NoAnswer,
    /// Some fragments arrived but the payload stayed incomplete.
    PartialFailure,
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestFailure::NoAnswer => f.write_str("no-answer"),
            RequestFailure::PartialFailure => f.write_str("partial-failure"),
        }
    }
}

/// What happened to the selected slot's previous request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Resolution {
    /// Nothing was in flight.
    Idle,
    Complete,
    Failed(RequestFailure),
}

/// Result of one coordinator cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PollOutcome {
    Skipped(SkipReason),
    Dispatched {
        slot: usize,
        resolution: Resolution,
        sent: TxCommand,
    },
}

impl PollOutcome {
    /// Command put on air during the cycle, if any.
    #[must_use]
    pub const fn sent(&self) -> Option<TxCommand> {
        match self {
            PollOutcome::Skipped(_) => None,
            PollOutcome::Dispatched { sent, .. } => Some(*sent),
        }
    }
}

/// Borrowed collaborators for one call into the core.
pub struct Collaborators<'a, R, P, S, L>
where
    R: Radio + ?Sized,
    P: Payload + ?Sized,
    S: StatusLed + ?Sized,
    L: DtuListener + ?Sized,
{
    pub radio: &'a mut R,
    pub payload: &'a mut P,
    pub led: &'a mut S,
    pub listener: &'a mut L,
}

/// Round-robin position; always the last slot attempted.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PollCursor {
    index: usize,
}

impl PollCursor {
    #[must_use]
    pub const fn new() -> Self {
        Self { index: 0 }
    }

    #[must_use]
    pub const fn at(index: usize) -> Self {
        Self { index }
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Moves to the next slot, wrapping at `capacity`.
    pub fn advance(&mut self, capacity: usize) -> usize {
        self.index = if self.index + 1 >= capacity {
            0
        } else {
            self.index + 1
        };
        self.index
    }

    /// Advances at least once and at most `N` times until a configured slot
    /// is under the cursor.
    pub fn select<const N: usize>(&mut self, fleet: &Fleet<N>) -> Option<usize> {
        for _ in 0..N {
            let index = self.advance(N);
            if fleet.is_configured(index) {
                return Some(index);
            }
        }
        None
    }
}

/// Drives the per-interval poll cycle.
#[derive(Copy, Clone, Debug, Default)]
pub struct PollCoordinator {
    cursor: PollCursor,
}

impl PollCoordinator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cursor: PollCursor::new(),
        }
    }

    #[must_use]
    pub const fn with_cursor(cursor: PollCursor) -> Self {
        Self { cursor }
    }

    #[must_use]
    pub const fn cursor(&self) -> PollCursor {
        self.cursor
    }

    /// Whether the gate currently allows radio traffic.
    pub fn communication_allowed(ctx: &DtuContext) -> Result<(), SkipReason> {
        if !ctx.time.is_known() {
            return Err(SkipReason::TimeUnknown);
        }
        if ctx.config.night_communication_disabled && !ctx.time.is_daytime() {
            return Err(SkipReason::NightGated);
        }
        Ok(())
    }

    /// Runs one cycle. At most one command is sent.
    pub fn poll<R, P, S, L, const N: usize>(
        &mut self,
        ctx: &mut DtuContext,
        fleet: &mut Fleet<N>,
        drain: &mut ReceiveDrain,
        io: &mut Collaborators<'_, R, P, S, L>,
    ) -> PollOutcome
    where
        R: Radio + ?Sized,
        P: Payload + ?Sized,
        S: StatusLed + ?Sized,
        L: DtuListener + ?Sized,
    {
        if !io.radio.is_link_connected() {
            let stamp = ctx.stamp();
            ctx.telemetry.record_skip(SkipReason::LinkUnavailable, stamp);
            return PollOutcome::Skipped(SkipReason::LinkUnavailable);
        }

        let outcome = self.communicate(ctx, fleet, drain, io);
        update_led(ctx, fleet, io.led);
        outcome
    }

    fn communicate<R, P, S, L, const N: usize>(
        &mut self,
        ctx: &mut DtuContext,
        fleet: &mut Fleet<N>,
        drain: &mut ReceiveDrain,
        io: &mut Collaborators<'_, R, P, S, L>,
    ) -> PollOutcome
    where
        R: Radio + ?Sized,
        P: Payload + ?Sized,
        S: StatusLed + ?Sized,
        L: DtuListener + ?Sized,
    {
        if let Err(reason) = Self::communication_allowed(ctx) {
            if ctx.verbose() {
                let stamp = ctx.stamp();
                ctx.telemetry.record_skip(reason, stamp);
            }
            return PollOutcome::Skipped(reason);
        }

        let Some(index) = self.cursor.select(fleet) else {
            let stamp = ctx.stamp();
            ctx.telemetry.record_skip(SkipReason::NoInverters, stamp);
            return PollOutcome::Skipped(SkipReason::NoInverters);
        };

        let resolution = evaluate(ctx, fleet, index, io);

        let timestamp = ctx.time.timestamp();
        let Some(slot) = fleet.get_mut(index) else {
            return PollOutcome::Skipped(SkipReason::NoInverters);
        };
        io.payload.reset_window(index, timestamp);
        let sent = dispatch(slot, index, timestamp, drain, io);

        let stamp = ctx.stamp();
        ctx.telemetry.record_sent(index, sent, stamp);

        PollOutcome::Dispatched {
            slot: index,
            resolution,
            sent,
        }
    }
}

/// Settles the selected slot's carried-over request.
fn evaluate<R, P, S, L, const N: usize>(
    ctx: &mut DtuContext,
    fleet: &mut Fleet<N>,
    index: usize,
    io: &mut Collaborators<'_, R, P, S, L>,
) -> Resolution
where
    R: Radio + ?Sized,
    P: Payload + ?Sized,
    S: StatusLed + ?Sized,
    L: DtuListener + ?Sized,
{
    if !fleet.get(index).is_some_and(InverterSlot::is_busy) {
        return Resolution::Idle;
    }

    if !io.payload.is_complete(index) {
        let assembled = io.payload.advance_assembly(
            false,
            ctx.config.max_retransmits_per_payload,
            &mut ctx.stats,
        );
        settle_assembled(ctx, fleet, &assembled, io);
    }

    let Some(slot) = fleet.get_mut(index) else {
        return Resolution::Idle;
    };

    if io.payload.is_complete(index) {
        if slot.is_busy() {
            finish_request(slot);
        }
        return Resolution::Complete;
    }

    let max_packet_id = io.payload.max_observed_packet_id(index);
    let failure = if max_packet_id == 0 {
        ctx.stats.record_no_answer();
        RequestFailure::NoAnswer
    } else {
        ctx.stats.record_partial_failure();
        RequestFailure::PartialFailure
    };
    finish_request(slot);

    if ctx.verbose() {
        let retransmits = io.payload.retransmit_count(index);
        let details = FailureTelemetry::new(failure, max_packet_id, retransmits);
        let stamp = ctx.stamp();
        ctx.telemetry.record_failure(index, details, stamp);
    }

    Resolution::Failed(failure)
}

fn dispatch<R, P, S, L>(
    slot: &mut InverterSlot,
    index: usize,
    timestamp: u32,
    drain: &mut ReceiveDrain,
    io: &mut Collaborators<'_, R, P, S, L>,
) -> TxCommand
where
    R: Radio + ?Sized,
    P: Payload + ?Sized,
    S: StatusLed + ?Sized,
    L: DtuListener + ?Sized,
{
    let sent = if let Some(control) = slot.take_control() {
        io.radio
            .send_control_packet(slot.address, control.command, control.limit.payload());
        slot.clear_queue();
        // Cannot overflow right after a clear.
        let _ = slot.enqueue(InfoCommand::SystemConfigPara);
        TxCommand::Control(control.command)
    } else {
        let command = slot.next_command();
        io.radio
            .send_time_packet(slot.address, command, timestamp, slot.alarm_index);
        drain.expedite();
        TxCommand::Info(command)
    };

    io.payload.record_transmitted_command(index, sent);
    slot.request = RequestState::Sent(sent);
    slot.last_command = Some(sent);
    sent
}

/// Frees a slot's in-flight request. Answered (or abandoned) info commands
/// leave the queue; a control command's read-back stays queued.
fn finish_request(slot: &mut InverterSlot) {
    if matches!(slot.request, RequestState::Sent(TxCommand::Info(_))) {
        slot.set_queued_cmd_finished();
    }
    slot.request = RequestState::Idle;
}

/// Resolves every slot whose payload just assembled.
pub(crate) fn settle_assembled<R, P, S, L, const N: usize>(
    ctx: &mut DtuContext,
    fleet: &mut Fleet<N>,
    assembled: &[usize],
    io: &mut Collaborators<'_, R, P, S, L>,
) where
    R: Radio + ?Sized,
    P: Payload + ?Sized,
    S: StatusLed + ?Sized,
    L: DtuListener + ?Sized,
{
    for &index in assembled {
        let Some(slot) = fleet.get_mut(index) else {
            continue;
        };
        if !slot.is_busy() {
            continue;
        }

        finish_request(slot);
        if let Some(record) = io.payload.latest_record(index) {
            slot.record = Some(record);
        }
        if let Some(alarm_index) = io.payload.alarm_index(index) {
            slot.alarm_index = alarm_index;
        }

        let stamp = ctx.stamp();
        ctx.telemetry
            .record_slot_event(TelemetryEventKind::PayloadReady, index, stamp);
        io.listener.payload_ready(index);
    }
}

fn update_led<S, const N: usize>(ctx: &DtuContext, fleet: &Fleet<N>, led: &mut S)
where
    S: StatusLed + ?Sized,
{
    if !ctx.config.status_led {
        return;
    }
    let Some((_, first)) = fleet.first() else {
        return;
    };
    if first.record.is_some() {
        led.set(first.is_producing(ctx.time.timestamp()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InverterConfig;

    #[test]
    fn cursor_wraps_at_capacity() {
        let mut cursor = PollCursor::at(3);
        assert_eq!(cursor.advance(4), 0);
        assert_eq!(cursor.advance(4), 1);
    }

    #[test]
    fn select_skips_empty_slots() {
        let mut fleet = Fleet::<4>::new();
        fleet.insert(0, InverterConfig::new(10)).unwrap();
        fleet.insert(2, InverterConfig::new(20)).unwrap();

        let mut cursor = PollCursor::new();
        assert_eq!(cursor.select(&fleet), Some(2));
        assert_eq!(cursor.select(&fleet), Some(0));
        assert_eq!(cursor.select(&fleet), Some(2));
    }

    #[test]
    fn select_visits_single_slot_after_full_lap() {
        let mut fleet = Fleet::<4>::new();
        fleet.insert(1, InverterConfig::new(10)).unwrap();

        let mut cursor = PollCursor::at(1);
        assert_eq!(cursor.select(&fleet), Some(1));
        assert_eq!(cursor.index(), 1);
    }

    #[test]
    fn empty_fleet_returns_cursor_to_start() {
        let fleet = Fleet::<4>::new();
        let mut cursor = PollCursor::at(2);
        assert_eq!(cursor.select(&fleet), None);
        assert_eq!(cursor.index(), 2);
    }
}

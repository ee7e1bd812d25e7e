//! Device-control console.
//!
//! Lines such as `limit 0 400w persist` or `power 1 off` are parsed with
//! `winnow` into [`ConsoleCommand`] values. [`ControlExecutor`] applies the
//! fleet-mutating ones by parking a control request on the target slot; the
//! poll coordinator transmits it on that slot's next visit.

use core::fmt;

use winnow::ascii::{Caseless, dec_uint, space0, space1};
use winnow::combinator::{alt, eof, opt, preceded, terminated};
use winnow::error::ContextError;
use winnow::prelude::*;

use crate::context::DtuContext;
use crate::inverter::{ControlRequest, DevControlCmd, Fleet, InfoCommand, LimitUnit, PowerLimit};
use crate::telemetry::{TelemetryEventKind, TelemetryPayload};

/// Largest absolute limit whose tenths still fit the wire payload.
pub const MAX_LIMIT_WATTS: u16 = u16::MAX / 10;
pub const MAX_LIMIT_PERCENT: u16 = 100;

/// Parsed console line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleCommand {
    Limit { slot: usize, limit: PowerLimit },
    Power { slot: usize, on: bool },
    Restart { slot: usize },
    Request { slot: usize, command: InfoCommand },
    Status,
    Stats,
}

impl ConsoleCommand {
    /// Target slot of a fleet-mutating command.
    #[must_use]
    pub const fn slot(&self) -> Option<usize> {
        match self {
            ConsoleCommand::Limit { slot, .. }
            | ConsoleCommand::Power { slot, .. }
            | ConsoleCommand::Restart { slot }
            | ConsoleCommand::Request { slot, .. } => Some(*slot),
            ConsoleCommand::Status | ConsoleCommand::Stats => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleError {
    Syntax,
    UnknownSlot,
    LimitOutOfRange,
    QueueFull,
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Syntax => f.write_str("syntax error"),
            ConsoleError::UnknownSlot => f.write_str("no inverter in that slot"),
            ConsoleError::LimitOutOfRange => f.write_str("limit out of range"),
            ConsoleError::QueueFull => f.write_str("command queue full"),
        }
    }
}

/// Parses one console line.
pub fn parse_command(line: &str) -> Result<ConsoleCommand, ConsoleError> {
    let command = command
        .parse(line.trim())
        .map_err(|_| ConsoleError::Syntax)?;

    if let ConsoleCommand::Limit { limit, .. } = command {
        let max = match limit.unit {
            LimitUnit::Watts => MAX_LIMIT_WATTS,
            LimitUnit::Percent => MAX_LIMIT_PERCENT,
        };
        if limit.value > max {
            return Err(ConsoleError::LimitOutOfRange);
        }
    }
    Ok(command)
}

fn command(input: &mut &str) -> Result<ConsoleCommand, ContextError> {
    terminated(
        alt((
            preceded((Caseless("limit"), space1), limit),
            preceded((Caseless("power"), space1), power),
            preceded((Caseless("restart"), space1), slot)
                .map(|slot| ConsoleCommand::Restart { slot }),
            preceded((Caseless("request"), space1), request),
            Caseless("status").value(ConsoleCommand::Status),
            Caseless("stats").value(ConsoleCommand::Stats),
        )),
        (space0, eof),
    )
    .parse_next(input)
}

fn slot(input: &mut &str) -> Result<usize, ContextError> {
    dec_uint::<_, u8, _>.map(usize::from).parse_next(input)
}

fn limit_unit(input: &mut &str) -> Result<LimitUnit, ContextError> {
    alt((
        Caseless("w").value(LimitUnit::Watts),
        "%".value(LimitUnit::Percent),
    ))
    .parse_next(input)
}

fn limit(input: &mut &str) -> Result<ConsoleCommand, ContextError> {
    (
        slot,
        space1,
        dec_uint::<_, u16, _>,
        opt(limit_unit),
        opt((space1, Caseless("persist"))),
    )
        .map(|(slot, _, value, unit, persist)| ConsoleCommand::Limit {
            slot,
            limit: PowerLimit::new(value, unit.unwrap_or(LimitUnit::Watts), persist.is_some()),
        })
        .parse_next(input)
}

fn power(input: &mut &str) -> Result<ConsoleCommand, ContextError> {
    (
        slot,
        space1,
        alt((Caseless("on").value(true), Caseless("off").value(false))),
    )
        .map(|(slot, _, on)| ConsoleCommand::Power { slot, on })
        .parse_next(input)
}

fn request(input: &mut &str) -> Result<ConsoleCommand, ContextError> {
    (
        slot,
        space1,
        alt((
            Caseless("realtime").value(InfoCommand::RealTimeRunData),
            Caseless("config").value(InfoCommand::SystemConfigPara),
            Caseless("alarms").value(InfoCommand::AlarmData),
            Caseless("firmware").value(InfoCommand::DevInformAll),
        )),
    )
        .map(|(slot, _, command)| ConsoleCommand::Request { slot, command })
        .parse_next(input)
}

/// Applies fleet-mutating console commands.
#[derive(Copy, Clone, Debug, Default)]
pub struct ControlExecutor;

impl ControlExecutor {
    /// Parks a control request or queues an info request on the target slot
    /// and returns that slot. Query commands (`status`, `stats`) carry no
    /// slot and are rejected.
    pub fn apply<const N: usize>(
        command: ConsoleCommand,
        fleet: &mut Fleet<N>,
        ctx: &mut DtuContext,
    ) -> Result<usize, ConsoleError> {
        let Some(index) = command.slot() else {
            return Err(ConsoleError::Syntax);
        };
        let slot = fleet
            .configured_mut(index)
            .map_err(|_| ConsoleError::UnknownSlot)?;

        match command {
            ConsoleCommand::Limit { limit, .. } => {
                slot.request_control(ControlRequest::power_limit(limit));
            }
            ConsoleCommand::Power { on, .. } => {
                let command = if on {
                    DevControlCmd::TurnOn
                } else {
                    DevControlCmd::TurnOff
                };
                slot.request_control(ControlRequest::new(command));
            }
            ConsoleCommand::Restart { .. } => {
                slot.request_control(ControlRequest::new(DevControlCmd::Restart));
            }
            ConsoleCommand::Request { command, .. } => {
                slot.enqueue(command).map_err(|_| ConsoleError::QueueFull)?;
            }
            ConsoleCommand::Status | ConsoleCommand::Stats => return Err(ConsoleError::Syntax),
        }

        let stamp = ctx.stamp();
        let slot_id = u8::try_from(index).unwrap_or(u8::MAX);
        ctx.telemetry.record(
            TelemetryEventKind::ControlAccepted(slot_id),
            TelemetryPayload::none(),
            stamp,
        );
        Ok(index)
    }
}

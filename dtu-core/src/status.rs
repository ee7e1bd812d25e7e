//! Status snapshot shared by the console front-ends.
//!
//! [`DtuStatus`] captures clock, sun window, counters and a per-slot summary at
//! one instant. [`StatusFormatter`] keeps the textual rendering identical on
//! firmware and host.

use core::fmt;

use heapless::Vec;

use crate::config::MAX_NUM_INVERTERS;
use crate::context::DtuContext;
use crate::coordinator::PollCursor;
use crate::inverter::{DevControlCmd, Fleet, TxCommand};
use crate::stats::Statistics;

/// Summary of one configured slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SlotStatus {
    pub index: usize,
    pub serial: u64,
    pub busy: bool,
    pub queued: usize,
    pub pending_control: Option<DevControlCmd>,
    pub last_command: Option<TxCommand>,
    pub producing: bool,
}

/// Point-in-time view of the polling core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DtuStatus {
    pub timestamp: u32,
    pub sunrise: u32,
    pub sunset: u32,
    pub communication_allowed: bool,
    pub cursor: usize,
    pub stats: Statistics,
    pub slots: Vec<SlotStatus, MAX_NUM_INVERTERS>,
}

impl DtuStatus {
    /// Collects a snapshot. Slots past [`MAX_NUM_INVERTERS`] are not listed.
    #[must_use]
    pub fn capture<const N: usize>(
        ctx: &DtuContext,
        fleet: &Fleet<N>,
        cursor: PollCursor,
        communication_allowed: bool,
    ) -> Self {
        let time = ctx.time.state();
        let mut slots = Vec::new();
        for (index, slot) in fleet.iter() {
            let summary = SlotStatus {
                index,
                serial: slot.serial(),
                busy: slot.is_busy(),
                queued: slot.queued(),
                pending_control: slot.pending_control().map(|request| request.command),
                last_command: slot.last_command,
                producing: slot.is_producing(time.timestamp),
            };
            if slots.push(summary).is_err() {
                break;
            }
        }

        Self {
            timestamp: time.timestamp,
            sunrise: time.sunrise,
            sunset: time.sunset,
            communication_allowed,
            cursor: cursor.index(),
            stats: ctx.stats,
            slots,
        }
    }
}

/// Renders a [`DtuStatus`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    status: &'a DtuStatus,
}

impl<'a> StatusFormatter<'a> {
    #[must_use]
    pub const fn new(status: &'a DtuStatus) -> Self {
        Self { status }
    }

    /// `time ts=1718971200 sunrise=... sunset=... comm=on`
    pub fn write_time_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        writer.write_str("time ts=")?;
        write_epoch(writer, self.status.timestamp)?;
        writer.write_str(" sunrise=")?;
        write_epoch(writer, self.status.sunrise)?;
        writer.write_str(" sunset=")?;
        write_epoch(writer, self.status.sunset)?;
        writer.write_str(if self.status.communication_allowed {
            " comm=on"
        } else {
            " comm=off"
        })
    }

    /// `stats frames=12 no-answer=1 partial=0 ok=3`
    pub fn write_stats_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let stats = &self.status.stats;
        write!(
            writer,
            "stats frames={} no-answer={} partial={} ok={}",
            stats.frames_received(),
            stats.no_answer(),
            stats.partial_failure(),
            stats.rx_success()
        )
    }

    /// One line per slot, e.g. `inv0 sn=114172345678 busy queued=1 last=info realtime producing`.
    pub fn write_slot_line<W: fmt::Write>(&self, writer: &mut W, slot: &SlotStatus) -> fmt::Result {
        write!(writer, "inv{} sn={:x}", slot.index, slot.serial)?;
        writer.write_str(if slot.busy { " busy" } else { " idle" })?;
        write!(writer, " queued={}", slot.queued)?;
        if let Some(command) = slot.pending_control {
            write!(writer, " pending={command}")?;
        }
        match slot.last_command {
            Some(command) => write!(writer, " last={command}")?,
            None => writer.write_str(" last=none")?,
        }
        if slot.producing {
            writer.write_str(" producing")?;
        }
        if self.status.cursor == slot.index {
            writer.write_str(" <")?;
        }
        Ok(())
    }

    /// Writes every line, newline-separated.
    pub fn write_all<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        self.write_time_line(writer)?;
        writer.write_char('\n')?;
        self.write_stats_line(writer)?;
        for slot in &self.status.slots {
            writer.write_char('\n')?;
            self.write_slot_line(writer, slot)?;
        }
        Ok(())
    }
}

fn write_epoch<W: fmt::Write>(writer: &mut W, epoch: u32) -> fmt::Result {
    if epoch == 0 {
        writer.write_str("unknown")
    } else {
        write!(writer, "{epoch}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DtuConfig, InverterConfig};
    use heapless::String;

    #[test]
    fn renders_time_and_slots() {
        let mut ctx = DtuContext::new(DtuConfig::new());
        ctx.time.set_timestamp(1_718_971_200);
        ctx.stats.record_no_answer();

        let mut fleet = Fleet::<4>::new();
        fleet.insert(2, InverterConfig::new(0x1141_7234_5678)).unwrap();

        let status = DtuStatus::capture(&ctx, &fleet, PollCursor::at(2), true);
        let formatter = StatusFormatter::new(&status);

        let mut time = String::<96>::new();
        formatter.write_time_line(&mut time).unwrap();
        assert_eq!(
            time.as_str(),
            "time ts=1718971200 sunrise=unknown sunset=unknown comm=on"
        );

        let mut stats = String::<96>::new();
        formatter.write_stats_line(&mut stats).unwrap();
        assert_eq!(
            stats.as_str(),
            "stats frames=0 no-answer=1 partial=0 ok=0"
        );

        let mut slot = String::<96>::new();
        formatter.write_slot_line(&mut slot, &status.slots[0]).unwrap();
        assert_eq!(slot.as_str(), "inv2 sn=114172345678 idle queued=0 last=none <");
    }
}

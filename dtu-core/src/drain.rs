//! Receive drain: moves at most one frame per run from the interrupt ring to
//! the payload assembler.

use crate::context::DtuContext;
use crate::coordinator::{Collaborators, settle_assembled};
use crate::inverter::Fleet;
use crate::listener::DtuListener;
use crate::radio::{Payload, Radio, StatusLed};
use crate::rx::PacketRing;
use crate::telemetry::{TelemetryEventKind, TelemetryPayload};

/// What happened to the frame popped during a run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrameOutcome {
    /// Valid frame forwarded to the assembler.
    Accepted { len: usize },
    /// Valid frame without usable bytes; counted but not forwarded.
    Empty,
    /// Failed the integrity check; neither counted nor forwarded.
    Dropped,
}

/// Summary of one drain run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DrainReport {
    /// Channel switch reported the radio ready for an assembly pass.
    pub ready: bool,
    pub frame: Option<FrameOutcome>,
    /// Frames that were waiting when the run started.
    pub backlog: usize,
}

/// Fixed-cadence consumer of the receive ring.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReceiveDrain {
    period_ms: u32,
    last_run_ms: Option<u64>,
}

impl ReceiveDrain {
    #[must_use]
    pub const fn new(period_ms: u32) -> Self {
        Self {
            period_ms,
            last_run_ms: None,
        }
    }

    #[must_use]
    pub const fn period_ms(&self) -> u32 {
        self.period_ms
    }

    #[must_use]
    pub fn is_due(&self, now_ms: u64) -> bool {
        self.last_run_ms
            .is_none_or(|last| now_ms.saturating_sub(last) >= u64::from(self.period_ms))
    }

    /// Makes the next call to [`ReceiveDrain::poll`] run regardless of cadence.
    pub fn expedite(&mut self) {
        self.last_run_ms = None;
    }

    /// Runs the drain when its cadence has elapsed.
    pub fn poll<R, P, S, L, const RING: usize, const N: usize>(
        &mut self,
        now_ms: u64,
        ring: &PacketRing<RING>,
        ctx: &mut DtuContext,
        fleet: &mut Fleet<N>,
        io: &mut Collaborators<'_, R, P, S, L>,
    ) -> Option<DrainReport>
    where
        R: Radio + ?Sized,
        P: Payload + ?Sized,
        S: StatusLed + ?Sized,
        L: DtuListener + ?Sized,
    {
        if !self.is_due(now_ms) {
            return None;
        }
        self.last_run_ms = Some(now_ms);
        Some(Self::run(ring, ctx, fleet, io))
    }

    /// One unconditional drain pass.
    pub fn run<R, P, S, L, const RING: usize, const N: usize>(
        ring: &PacketRing<RING>,
        ctx: &mut DtuContext,
        fleet: &mut Fleet<N>,
        io: &mut Collaborators<'_, R, P, S, L>,
    ) -> DrainReport
    where
        R: Radio + ?Sized,
        P: Payload + ?Sized,
        S: StatusLed + ?Sized,
        L: DtuListener + ?Sized,
    {
        let ready = io.radio.switch_channel();
        let backlog = ring.len();
        if backlog > 1 && ctx.verbose() {
            let stamp = ctx.stamp();
            ctx.telemetry.record_backlog(backlog, stamp);
        }

        let frame = ring.pop().map(|mut packet| {
            let outcome = match io.radio.validate_and_unpack(&mut packet) {
                Ok(len) => {
                    ctx.stats.record_frame();
                    let frame = packet.frame();
                    let len = len.min(frame.len());
                    if len == 0 {
                        FrameOutcome::Empty
                    } else {
                        io.payload.add_fragment(&frame[..len]);
                        FrameOutcome::Accepted { len }
                    }
                }
                Err(_) => FrameOutcome::Dropped,
            };
            if ctx.verbose() {
                let event = match outcome {
                    FrameOutcome::Dropped => TelemetryEventKind::PacketDropped,
                    _ => TelemetryEventKind::FrameReceived,
                };
                let stamp = ctx.stamp();
                ctx.telemetry.record(event, TelemetryPayload::none(), stamp);
            }
            outcome
        });

        if ready {
            let assembled = io.payload.advance_assembly(
                true,
                ctx.config.max_retransmits_per_payload,
                &mut ctx.stats,
            );
            settle_assembled(ctx, fleet, &assembled, io);
        }

        DrainReport {
            ready,
            frame,
            backlog,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_and_expedite() {
        let mut drain = ReceiveDrain::new(5);
        assert!(drain.is_due(0));

        drain.last_run_ms = Some(100);
        assert!(!drain.is_due(104));
        assert!(drain.is_due(105));

        drain.expedite();
        assert!(drain.is_due(101));
    }
}

//! Application shell wiring the scheduler chores to the polling core.
//!
//! The platform owns the loop: it calls [`Dtu::poll`] with a monotonic
//! millisecond clock and yields between calls. Each elapsed second is ticked
//! individually so no chore is skipped after a slow iteration. The receive
//! drain runs after the chores, on its own millisecond cadence.

use crate::clock::{self, TimeSource};
use crate::config::{
    DtuConfig, FIRST_NTP_DELAY_SECS, FIRST_SUN_DELAY_SECS, InverterConfig, MAX_NUM_INVERTERS,
};
use crate::console::{self, ConsoleCommand, ConsoleError, ControlExecutor};
use crate::context::DtuContext;
use crate::coordinator::{Collaborators, PollCoordinator, PollOutcome};
use crate::drain::{DrainReport, ReceiveDrain};
use crate::inverter::{Fleet, FleetError};
use crate::listener::DtuListener;
use crate::radio::{Payload, Radio, StatusLed};
use crate::rx::{PACKET_RING_DEPTH, PacketRing};
use crate::scheduler::{ScheduleError, TickScheduler};
use crate::stats::Statistics;
use crate::status::DtuStatus;
use crate::sun::{self, SunChores, SunRecompute};
use crate::telemetry::{TelemetryEventKind, TelemetryPayload};

/// Work items the scheduler hands back to the shell.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Chore {
    Second,
    Minute,
    Send,
    NtpUpdate,
    SunRecompute,
    SunWindowChanged,
    Sunrise,
    Sunset,
}

const SUN_CHORES: SunChores<Chore> = SunChores {
    recompute: Chore::SunRecompute,
    window_changed: Chore::SunWindowChanged,
    sunrise: Chore::Sunrise,
    sunset: Chore::Sunset,
};

/// Answer to a console line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleReply {
    /// A control or info request was queued for the slot.
    Accepted { slot: usize },
    Status(DtuStatus),
    Stats(Statistics),
}

/// The polling core plus its collaborators.
pub struct Dtu<'r, R, P, T, L, S, const RING: usize = PACKET_RING_DEPTH>
where
    R: Radio,
    P: Payload,
    T: TimeSource,
    L: DtuListener,
    S: StatusLed,
{
    ctx: DtuContext,
    scheduler: TickScheduler<Chore>,
    fleet: Fleet<MAX_NUM_INVERTERS>,
    coordinator: PollCoordinator,
    drain: ReceiveDrain,
    ring: &'r PacketRing<RING>,
    radio: R,
    payload: P,
    time_source: T,
    listener: L,
    led: S,
    uptime_secs: u32,
    last_outcome: Option<PollOutcome>,
}

impl<'r, R, P, T, L, S, const RING: usize> Dtu<'r, R, P, T, L, S, RING>
where
    R: Radio,
    P: Payload,
    T: TimeSource,
    L: DtuListener,
    S: StatusLed,
{
    #[must_use]
    pub fn new(
        config: DtuConfig,
        ring: &'r PacketRing<RING>,
        radio: R,
        payload: P,
        time_source: T,
        listener: L,
        led: S,
    ) -> Self {
        Self {
            ctx: DtuContext::new(config),
            scheduler: TickScheduler::new(),
            fleet: Fleet::new(),
            coordinator: PollCoordinator::new(),
            drain: ReceiveDrain::new(config.rx_drain_period_ms),
            ring,
            radio,
            payload,
            time_source,
            listener,
            led,
            uptime_secs: 0,
            last_outcome: None,
        }
    }

    /// Adds a paired inverter to the first free slot.
    pub fn add_inverter(&mut self, config: InverterConfig) -> Result<usize, FleetError> {
        self.fleet.add(config)
    }

    /// Registers the standing chores. Call once before the first [`Dtu::poll`].
    pub fn start(&mut self) -> Result<(), ScheduleError> {
        let config = self.ctx.config;
        self.scheduler.register_every_second(Chore::Second)?;
        self.scheduler
            .register_every(config.send_interval_secs, Chore::Send)?;

        if !config.timeless {
            self.scheduler
                .register_once(FIRST_NTP_DELAY_SECS, Chore::NtpUpdate)?;
            if config.location.is_some() {
                self.scheduler
                    .register_once(FIRST_SUN_DELAY_SECS, Chore::SunRecompute)?;
            }
        }

        if config.publish_enabled {
            self.scheduler.register_every_minute(Chore::Minute)?;
        }
        Ok(())
    }

    /// One main-loop iteration at monotonic time `now_ms`.
    pub fn poll(&mut self, now_ms: u64) -> Option<DrainReport> {
        self.ctx.set_uptime_ms(now_ms);

        let target = u32::try_from(now_ms / 1_000).unwrap_or(u32::MAX);
        while self.uptime_secs < target {
            self.uptime_secs += 1;
            self.scheduler
                .tick(self.uptime_secs, self.ctx.time.timestamp());
            while let Some((_, chore)) = self.scheduler.next_due(self.ctx.time.timestamp()) {
                self.run_chore(chore);
            }
        }

        let mut io = Collaborators {
            radio: &mut self.radio,
            payload: &mut self.payload,
            led: &mut self.led,
            listener: &mut self.listener,
        };
        self.drain
            .poll(now_ms, self.ring, &mut self.ctx, &mut self.fleet, &mut io)
    }

    fn run_chore(&mut self, chore: Chore) {
        let timestamp = self.ctx.time.timestamp();
        let publish = self.ctx.config.publish_enabled;

        match chore {
            Chore::Second => {
                self.ctx.time.advance_second();
                if publish {
                    self.listener.second_tick(self.ctx.time.timestamp());
                }
            }
            Chore::Minute => self.listener.minute_tick(timestamp),
            Chore::Send => {
                let outcome = self.send();
                self.last_outcome = Some(outcome);
            }
            Chore::NtpUpdate => self.update_time(),
            Chore::SunRecompute => self.recompute_sun(),
            Chore::SunWindowChanged => {
                let state = self.ctx.time.state();
                self.listener.sun_window_changed(state.sunrise, state.sunset);
            }
            Chore::Sunrise => {
                self.record(TelemetryEventKind::Sunrise, TelemetryPayload::none());
                self.listener.sunrise(timestamp);
            }
            Chore::Sunset => {
                self.record(TelemetryEventKind::Sunset, TelemetryPayload::none());
                self.listener.sunset(timestamp);
            }
        }
    }

    /// Runs the poll coordinator immediately, outside the send interval.
    pub fn send(&mut self) -> PollOutcome {
        let mut io = Collaborators {
            radio: &mut self.radio,
            payload: &mut self.payload,
            led: &mut self.led,
            listener: &mut self.listener,
        };
        self.coordinator
            .poll(&mut self.ctx, &mut self.fleet, &mut self.drain, &mut io)
    }

    fn update_time(&mut self) {
        match clock::run_ntp_update(
            &mut self.ctx.time,
            &mut self.time_source,
            &mut self.scheduler,
            Chore::NtpUpdate,
        ) {
            Ok(attempt) => {
                let event = if attempt.synced.is_some() {
                    TelemetryEventKind::NtpSynced
                } else {
                    TelemetryEventKind::NtpRetry
                };
                self.record(
                    event,
                    TelemetryPayload::Ntp {
                        next_attempt_secs: attempt.next_attempt_secs,
                    },
                );
            }
            Err(error) => self.record(TelemetryEventKind::ChoreFault, TelemetryPayload::Fault(error)),
        }
    }

    fn recompute_sun(&mut self) {
        let Some(location) = self.ctx.config.location else {
            return;
        };
        match sun::recompute(
            &mut self.ctx.time,
            location,
            self.ctx.config.publish_enabled,
            &mut self.scheduler,
            SUN_CHORES,
        ) {
            Ok(SunRecompute::Computed { window, .. }) => self.record(
                TelemetryEventKind::SunWindow,
                TelemetryPayload::Sun {
                    sunrise: window.sunrise,
                    sunset: window.sunset,
                },
            ),
            Ok(SunRecompute::Deferred) => {}
            Err(error) => self.record(TelemetryEventKind::ChoreFault, TelemetryPayload::Fault(error)),
        }
    }

    fn record(&mut self, event: TelemetryEventKind, payload: TelemetryPayload) {
        let stamp = self.ctx.stamp();
        self.ctx.telemetry.record(event, payload, stamp);
    }

    /// Parses and applies one console line.
    pub fn execute(&mut self, line: &str) -> Result<ConsoleReply, ConsoleError> {
        let command = console::parse_command(line)?;
        match command {
            ConsoleCommand::Status => Ok(ConsoleReply::Status(self.status())),
            ConsoleCommand::Stats => Ok(ConsoleReply::Stats(self.ctx.stats)),
            other => Ok(ConsoleReply::Accepted {
                slot: ControlExecutor::apply(other, &mut self.fleet, &mut self.ctx)?,
            }),
        }
    }

    #[must_use]
    pub fn status(&self) -> DtuStatus {
        let allowed = PollCoordinator::communication_allowed(&self.ctx).is_ok();
        DtuStatus::capture(&self.ctx, &self.fleet, self.coordinator.cursor(), allowed)
    }

    #[must_use]
    pub const fn context(&self) -> &DtuContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut DtuContext {
        &mut self.ctx
    }

    #[must_use]
    pub const fn fleet(&self) -> &Fleet<MAX_NUM_INVERTERS> {
        &self.fleet
    }

    pub fn fleet_mut(&mut self) -> &mut Fleet<MAX_NUM_INVERTERS> {
        &mut self.fleet
    }

    #[must_use]
    pub const fn scheduler(&self) -> &TickScheduler<Chore> {
        &self.scheduler
    }

    #[must_use]
    pub const fn last_outcome(&self) -> Option<PollOutcome> {
        self.last_outcome
    }

    #[must_use]
    pub const fn uptime_secs(&self) -> u32 {
        self.uptime_secs
    }

    #[must_use]
    pub const fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    #[must_use]
    pub const fn payload(&self) -> &P {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut P {
        &mut self.payload
    }

    pub fn time_source_mut(&mut self) -> &mut T {
        &mut self.time_source
    }

    #[must_use]
    pub const fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    #[must_use]
    pub const fn led(&self) -> &S {
        &self.led
    }
}

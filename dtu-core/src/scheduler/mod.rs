//! Cooperative one-second tick scheduler.
//!
//! Chores are registered as plain `Copy` tokens instead of bound callbacks.
//! The owner advances the scheduler once per elapsed second with
//! [`TickScheduler::tick`] and then drains due chores with
//! [`TickScheduler::next_due`], dispatching each token itself. Because the
//! scheduler is not borrowed while a chore runs, the chore is free to register
//! follow-up work (this is how the NTP and sun chores re-arm themselves).
//!
//! Tasks due in the same tick fire in registration order. Work registered
//! while a tick is being drained becomes eligible on the next tick at the
//! earliest, which keeps every drain bounded.

use core::fmt;

use heapless::Vec;

/// Default number of tasks the scheduler can hold at once.
pub const SCHEDULER_CAPACITY: usize = 16;

/// Seconds in a calendar minute.
const MINUTE_SECS: u32 = 60;

/// Monotonic identifier handed out on registration.
pub type TaskId = u32;

/// Reference clock a task's next-fire value is compared against.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TriggerKind {
    /// Scheduler uptime in seconds.
    Relative,
    /// Epoch timestamp in seconds (never fires while the epoch is unknown).
    Absolute,
}

/// How a task re-arms after firing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RepeatKind {
    Once,
    FixedInterval(u32),
    CalendarSecond,
    CalendarMinute,
}

impl RepeatKind {
    const fn interval(self) -> Option<u32> {
        match self {
            RepeatKind::Once => None,
            RepeatKind::FixedInterval(secs) => Some(secs),
            RepeatKind::CalendarSecond => Some(1),
            RepeatKind::CalendarMinute => Some(MINUTE_SECS),
        }
    }
}

/// Registration flavour, mirroring the public `register_*` entry points.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaskKind {
    Once,
    OnceAt,
    Every,
    EverySecond,
    EveryMinute,
}

impl TaskKind {
    /// Returns the trigger clock used by this flavour.
    #[must_use]
    pub const fn trigger(self) -> TriggerKind {
        match self {
            TaskKind::OnceAt => TriggerKind::Absolute,
            _ => TriggerKind::Relative,
        }
    }
}

/// A registered chore and its firing bookkeeping.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ScheduledTask<C> {
    pub id: TaskId,
    pub kind: TaskKind,
    pub repeat: RepeatKind,
    pub next_fire: u32,
    pub chore: C,
    pub enabled: bool,
    last_fired_tick: Option<u32>,
}

impl<C> ScheduledTask<C> {
    /// Returns the clock this task is measured against.
    #[must_use]
    pub const fn trigger(&self) -> TriggerKind {
        self.kind.trigger()
    }

    fn is_due(&self, uptime: u32, epoch: u32) -> bool {
        if !self.enabled || self.last_fired_tick == Some(uptime) {
            return false;
        }

        match self.trigger() {
            TriggerKind::Relative => self.next_fire <= uptime,
            TriggerKind::Absolute => epoch != 0 && self.next_fire <= epoch,
        }
    }

    /// Re-arms a repeating task from its previous fire value. Returns `false`
    /// for one-shot tasks, which must be removed instead.
    fn rearm(&mut self, uptime: u32) -> bool {
        let Some(interval) = self.repeat.interval() else {
            return false;
        };

        let interval = interval.max(1);
        self.last_fired_tick = Some(uptime);
        self.next_fire = self.next_fire.saturating_add(interval);
        while self.next_fire <= uptime {
            self.next_fire = self.next_fire.saturating_add(interval);
        }
        true
    }
}

/// Errors reported when registering a task.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScheduleError {
    /// Every slot of the fixed-capacity registry is taken.
    RegistryFull,
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::RegistryFull => f.write_str("scheduler registry full"),
        }
    }
}

/// Fixed-capacity registry of chores keyed by [`TaskId`].
#[derive(Clone, Debug)]
pub struct TickScheduler<C, const CAPACITY: usize = SCHEDULER_CAPACITY> {
    tasks: Vec<ScheduledTask<C>, CAPACITY>,
    next_id: TaskId,
    uptime: u32,
    epoch: u32,
    watermark: TaskId,
}

impl<C, const CAPACITY: usize> TickScheduler<C, CAPACITY>
where
    C: Copy,
{
    /// Creates an empty scheduler at uptime zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tasks: Vec::new(),
            next_id: 0,
            uptime: 0,
            epoch: 0,
            watermark: 0,
        }
    }

    /// Current tick (seconds since the scheduler started).
    #[must_use]
    pub fn uptime(&self) -> u32 {
        self.uptime
    }

    /// Epoch value captured by the most recent tick.
    #[must_use]
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Iterates tasks in registration order.
    #[must_use]
    pub fn iter(&self) -> core::slice::Iter<'_, ScheduledTask<C>> {
        self.tasks.iter()
    }

    /// Looks up a task by identifier.
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&ScheduledTask<C>> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Fires `chore` once, `delay_secs` after the current tick.
    pub fn register_once(&mut self, delay_secs: u32, chore: C) -> Result<TaskId, ScheduleError> {
        let next_fire = self.uptime.saturating_add(delay_secs);
        self.insert(TaskKind::Once, RepeatKind::Once, next_fire, chore)
    }

    /// Fires `chore` once the epoch timestamp reaches `epoch`.
    pub fn register_once_at(&mut self, epoch: u32, chore: C) -> Result<TaskId, ScheduleError> {
        self.insert(TaskKind::OnceAt, RepeatKind::Once, epoch, chore)
    }

    /// Fires `chore` every `interval_secs`, first one interval from now.
    pub fn register_every(
        &mut self,
        interval_secs: u32,
        chore: C,
    ) -> Result<TaskId, ScheduleError> {
        let interval = interval_secs.max(1);
        let next_fire = self.uptime.saturating_add(interval);
        self.insert(
            TaskKind::Every,
            RepeatKind::FixedInterval(interval),
            next_fire,
            chore,
        )
    }

    /// Fires `chore` on every tick.
    pub fn register_every_second(&mut self, chore: C) -> Result<TaskId, ScheduleError> {
        let next_fire = self.uptime.saturating_add(1);
        self.insert(
            TaskKind::EverySecond,
            RepeatKind::CalendarSecond,
            next_fire,
            chore,
        )
    }

    /// Fires `chore` once a minute, aligned to the epoch minute boundary when
    /// the epoch is known.
    pub fn register_every_minute(&mut self, chore: C) -> Result<TaskId, ScheduleError> {
        let delay = if self.epoch == 0 {
            MINUTE_SECS
        } else {
            MINUTE_SECS - self.epoch % MINUTE_SECS
        };
        let next_fire = self.uptime.saturating_add(delay);
        self.insert(
            TaskKind::EveryMinute,
            RepeatKind::CalendarMinute,
            next_fire,
            chore,
        )
    }

    /// Moves the scheduler to `uptime` and captures the current epoch.
    ///
    /// Only tasks registered before this call are eligible during the drain
    /// that follows.
    pub fn tick(&mut self, uptime: u32, epoch: u32) {
        self.uptime = uptime;
        self.epoch = epoch;
        self.watermark = self.next_id;
    }

    /// Pops the earliest-registered due chore for the current tick.
    ///
    /// `epoch` is re-read on every call so a chore that moves the clock is
    /// observed by absolute tasks later in the same drain.
    pub fn next_due(&mut self, epoch: u32) -> Option<(TaskId, C)> {
        self.epoch = epoch;
        let uptime = self.uptime;
        let watermark = self.watermark;
        let index = self
            .tasks
            .iter()
            .position(|task| task.id < watermark && task.is_due(uptime, epoch))?;

        let task = &mut self.tasks[index];
        let fired = (task.id, task.chore);
        if !task.rearm(uptime) {
            self.tasks.remove(index);
        }

        Some(fired)
    }

    fn insert(
        &mut self,
        kind: TaskKind,
        repeat: RepeatKind,
        next_fire: u32,
        chore: C,
    ) -> Result<TaskId, ScheduleError> {
        let id = self.next_id;
        self.tasks
            .push(ScheduledTask {
                id,
                kind,
                repeat,
                next_fire,
                chore,
                enabled: true,
                last_fired_tick: None,
            })
            .map_err(|_| ScheduleError::RegistryFull)?;
        self.next_id = self.next_id.wrapping_add(1);
        Ok(id)
    }
}

impl<C, const CAPACITY: usize> Default for TickScheduler<C, CAPACITY>
where
    C: Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

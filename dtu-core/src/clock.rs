//! Epoch time keeping and the network time retry chain.

use crate::config::{NTP_REFRESH_SECS, NTP_RETRY_SECS};
use crate::scheduler::{ScheduleError, TickScheduler};

/// Wall-clock state shared by every time-gated component.
///
/// `timestamp == 0` means the time is unknown. `sunrise`/`sunset` are zero
/// until the first sun window has been computed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TimeState {
    pub timestamp: u32,
    pub sunrise: u32,
    pub sunset: u32,
    pub timezone_offset: i32,
}

/// Single writer of [`TimeState`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TimeKeeper {
    state: TimeState,
}

impl TimeKeeper {
    /// Starts with an unknown timestamp.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: TimeState {
                timestamp: 0,
                sunrise: 0,
                sunset: 0,
                timezone_offset: 0,
            },
        }
    }

    /// Starts at timestamp 1 so time-gated consumers proceed without a
    /// network clock.
    #[must_use]
    pub const fn timeless() -> Self {
        let mut keeper = Self::new();
        keeper.state.timestamp = 1;
        keeper
    }

    #[must_use]
    pub const fn timestamp(&self) -> u32 {
        self.state.timestamp
    }

    #[must_use]
    pub const fn is_known(&self) -> bool {
        self.state.timestamp != 0
    }

    #[must_use]
    pub const fn state(&self) -> TimeState {
        self.state
    }

    pub fn set_timestamp(&mut self, timestamp: u32) {
        self.state.timestamp = timestamp;
    }

    /// Advances a known timestamp by one second. Unknown time stays unknown.
    pub fn advance_second(&mut self) {
        if self.state.timestamp != 0 {
            self.state.timestamp = self.state.timestamp.wrapping_add(1);
        }
    }

    pub fn set_timezone_offset(&mut self, offset: i32) {
        self.state.timezone_offset = offset;
    }

    pub fn set_sun_window(&mut self, sunrise: u32, sunset: u32) {
        self.state.sunrise = sunrise;
        self.state.sunset = sunset;
    }

    /// Returns `true` when the timestamp lies inside `[sunrise, sunset]`.
    #[must_use]
    pub const fn is_daytime(&self) -> bool {
        let TimeState {
            timestamp,
            sunrise,
            sunset,
            ..
        } = self.state;
        sunrise <= timestamp && timestamp <= sunset
    }
}

/// Network time collaborator polled by the retry chain.
pub trait TimeSource {
    /// Returns the current epoch in seconds, or `None` when no time could be
    /// obtained. A zero epoch counts as a failure.
    fn fetch_epoch(&mut self) -> Option<u32>;
}

/// Result of one time-sync attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NtpAttempt {
    pub synced: Option<u32>,
    pub next_attempt_secs: u32,
}

/// Runs one attempt of the time-sync chain and re-arms `chore` exactly once:
/// [`NTP_REFRESH_SECS`] out after a success, [`NTP_RETRY_SECS`] after a failure.
pub fn run_ntp_update<C, S, const N: usize>(
    keeper: &mut TimeKeeper,
    source: &mut S,
    scheduler: &mut TickScheduler<C, N>,
    chore: C,
) -> Result<NtpAttempt, ScheduleError>
where
    C: Copy,
    S: TimeSource + ?Sized,
{
    let synced = source.fetch_epoch().filter(|epoch| *epoch != 0);
    if let Some(epoch) = synced {
        keeper.set_timestamp(epoch);
    }

    let next_attempt_secs = if synced.is_some() {
        NTP_REFRESH_SECS
    } else {
        NTP_RETRY_SECS
    };
    scheduler.register_once(next_attempt_secs, chore)?;

    Ok(NtpAttempt {
        synced,
        next_attempt_secs,
    })
}

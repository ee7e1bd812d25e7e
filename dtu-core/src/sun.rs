//! Daily sunrise/sunset window and its self re-arming recompute chore.
//!
//! The window is computed with the standard sunrise equation (mean anomaly,
//! equation of centre, ecliptic longitude, solar transit, declination and
//! hour angle) evaluated for the local calendar day that contains the
//! timestamp. Results are UTC epoch seconds so they compare directly with the
//! time keeper's timestamp.

use crate::clock::TimeKeeper;
use crate::config::{Location, MIDNIGHT_SAFETY_SECS, SUN_NOTIFY_DELAY_SECS, SUN_RETRY_SECS};
use crate::scheduler::{ScheduleError, TickScheduler};

pub const SECS_PER_DAY: u32 = 86_400;

/// Days between the Unix epoch and 2000-01-01.
const J2000_UNIX_DAYS: f64 = 10_957.0;
const J2000_LEAP_SECONDS_DAYS: f64 = 0.0008;
const EARTH_OBLIQUITY_DEG: f64 = 23.44;
/// Refraction plus solar disc radius.
const HORIZON_DEG: f64 = -0.83;

/// Sunrise and sunset of one day, in epoch seconds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SunWindow {
    pub sunrise: u32,
    pub sunset: u32,
}

/// Coarse timezone offset derived from longitude, bucketed to whole hours
/// with the +-7.5 degree boundary correction.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn timezone_offset_for(longitude: f32) -> i32 {
    let longitude = f64::from(longitude);
    let shifted = if longitude >= 0.0 {
        longitude + 7.5
    } else {
        longitude - 7.5
    };
    // Truncates toward zero; longitude is bounded so the zone fits easily.
    let zone = (shifted / 15.0) as i32;
    zone * 3_600
}

/// Computes today's sun window for `location`.
///
/// During polar night sunrise and sunset collapse onto solar noon; during
/// polar day the window spans the whole day around solar noon.
#[must_use]
pub fn calculate_sun_window(timestamp: u32, timezone_offset: i32, location: Location) -> SunWindow {
    let local = timestamp.saturating_add_signed(timezone_offset);
    let day = f64::from(local / SECS_PER_DAY);
    let latitude = f64::from(location.latitude).to_radians();
    let longitude = f64::from(location.longitude);

    let mean_solar_time = day - J2000_UNIX_DAYS + J2000_LEAP_SECONDS_DAYS - longitude / 360.0;
    let anomaly_deg = libm::fmod(357.529_1 + 0.985_600_28 * mean_solar_time, 360.0);
    let anomaly = anomaly_deg.to_radians();
    let centre = 1.914_8 * libm::sin(anomaly)
        + 0.02 * libm::sin(2.0 * anomaly)
        + 0.000_3 * libm::sin(3.0 * anomaly);
    let ecliptic =
        libm::fmod(anomaly_deg + centre + 180.0 + 102.937_2, 360.0).to_radians();
    let transit =
        mean_solar_time + 0.005_3 * libm::sin(anomaly) - 0.006_9 * libm::sin(2.0 * ecliptic);
    let declination =
        libm::asin(libm::sin(ecliptic) * libm::sin(EARTH_OBLIQUITY_DEG.to_radians()));

    let cos_hour_angle = (libm::sin(HORIZON_DEG.to_radians())
        - libm::sin(latitude) * libm::sin(declination))
        / (libm::cos(latitude) * libm::cos(declination));
    let half_day = if cos_hour_angle > 1.0 {
        0.0
    } else if cos_hour_angle < -1.0 {
        0.5
    } else {
        libm::acos(cos_hour_angle).to_degrees() / 360.0
    };

    SunWindow {
        sunrise: julian_offset_to_epoch(transit - half_day),
        sunset: julian_offset_to_epoch(transit + half_day),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn julian_offset_to_epoch(days_since_j2000: f64) -> u32 {
    let secs = (days_since_j2000 + J2000_UNIX_DAYS + 0.5) * f64::from(SECS_PER_DAY);
    if secs <= 0.0 {
        0
    } else if secs >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        libm::round(secs) as u32
    }
}

/// Epoch of the next recompute: the coming UTC midnight, with a small margin so
/// a timestamp landing exactly on the boundary is not re-fired into the same day.
#[must_use]
pub fn next_recompute_epoch(timestamp: u32) -> u32 {
    let into_day = timestamp.saturating_sub(MIDNIGHT_SAFETY_SECS) % SECS_PER_DAY;
    timestamp - into_day + SECS_PER_DAY
}

/// Chore tokens the recompute step registers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SunChores<C> {
    pub recompute: C,
    pub window_changed: C,
    pub sunrise: C,
    pub sunset: C,
}

/// What a recompute run did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SunRecompute {
    /// Time unknown; retried after [`SUN_RETRY_SECS`].
    Deferred,
    Computed {
        window: SunWindow,
        next_recompute: u32,
    },
}

/// Runs one step of the daily sun chain.
///
/// When `publish` is set the window-changed notification is queued, together
/// with absolute sunrise and sunset triggers for whichever of the two are
/// still ahead.
pub fn recompute<C, const N: usize>(
    keeper: &mut TimeKeeper,
    location: Location,
    publish: bool,
    scheduler: &mut TickScheduler<C, N>,
    chores: SunChores<C>,
) -> Result<SunRecompute, ScheduleError>
where
    C: Copy,
{
    let timestamp = keeper.timestamp();
    if timestamp == 0 {
        scheduler.register_once(SUN_RETRY_SECS, chores.recompute)?;
        return Ok(SunRecompute::Deferred);
    }

    let offset = timezone_offset_for(location.longitude);
    let window = calculate_sun_window(timestamp, offset, location);
    keeper.set_timezone_offset(offset);
    keeper.set_sun_window(window.sunrise, window.sunset);

    let next_recompute = next_recompute_epoch(timestamp);
    scheduler.register_once_at(next_recompute, chores.recompute)?;

    if publish {
        scheduler.register_once(SUN_NOTIFY_DELAY_SECS, chores.window_changed)?;
        if window.sunrise > timestamp {
            scheduler.register_once_at(window.sunrise, chores.sunrise)?;
        }
        if window.sunset > timestamp {
            scheduler.register_once_at(window.sunset, chores.sunset)?;
        }
    }

    Ok(SunRecompute::Computed {
        window,
        next_recompute,
    })
}

//! Runtime configuration and firmware-wide constants.
//!
//! Values arrive from persisted settings owned elsewhere; this module only
//! carries the shape the coordinator reads plus the defaults used when a
//! setting is absent.

/// Maximum number of inverter slots.
pub const MAX_NUM_INVERTERS: usize = 4;

/// Delay before the first time-sync attempt after boot.
pub const FIRST_NTP_DELAY_SECS: u32 = 2;
/// Delay before the next time-sync attempt after a failure.
pub const NTP_RETRY_SECS: u32 = 5;
/// Delay before re-verifying the clock after a successful sync (12 h).
pub const NTP_REFRESH_SECS: u32 = 43_200;

/// Delay before the first sunrise/sunset computation after boot.
pub const FIRST_SUN_DELAY_SECS: u32 = 5;
/// Delay before retrying the sunrise/sunset computation while time is unknown.
pub const SUN_RETRY_SECS: u32 = 5;
/// Delay of the "sun window changed" notification after a recompute.
pub const SUN_NOTIFY_DELAY_SECS: u32 = 1;
/// Margin applied when computing the next midnight re-arm epoch.
pub const MIDNIGHT_SAFETY_SECS: u32 = 10;

/// Default poll interval for the coordinator.
pub const DEFAULT_SEND_INTERVAL_SECS: u32 = 15;
/// Default retransmit budget per assembled payload.
pub const DEFAULT_MAX_RETRANSMITS: u8 = 5;
/// Default receive drain cadence.
pub const DEFAULT_RX_DRAIN_PERIOD_MS: u32 = 5;

/// Observer location used for the day/night window.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Location {
    pub latitude: f32,
    pub longitude: f32,
}

impl Location {
    #[must_use]
    pub const fn new(latitude: f32, longitude: f32) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Persisted description of one paired inverter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct InverterConfig {
    pub serial: u64,
}

impl InverterConfig {
    #[must_use]
    pub const fn new(serial: u64) -> Self {
        Self { serial }
    }
}

/// Settings consumed by the polling core.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DtuConfig {
    pub send_interval_secs: u32,
    pub max_retransmits_per_payload: u8,
    pub rx_drain_period_ms: u32,
    /// Verbose diagnostics (serial debug in the settings UI).
    pub serial_debug: bool,
    pub location: Option<Location>,
    /// Only talk to inverters between sunrise and sunset. Without a location
    /// the sun window stays at zero and every poll is gated.
    pub night_communication_disabled: bool,
    /// Schedule publisher-facing notifications (minute tick, sun events).
    pub publish_enabled: bool,
    /// Start with a nonzero timestamp and skip the time-sync chores.
    pub timeless: bool,
    pub status_led: bool,
}

impl DtuConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            send_interval_secs: DEFAULT_SEND_INTERVAL_SECS,
            max_retransmits_per_payload: DEFAULT_MAX_RETRANSMITS,
            rx_drain_period_ms: DEFAULT_RX_DRAIN_PERIOD_MS,
            serial_debug: false,
            location: None,
            night_communication_disabled: false,
            publish_enabled: false,
            timeless: false,
            status_led: true,
        }
    }

    #[must_use]
    pub const fn with_send_interval(mut self, secs: u32) -> Self {
        self.send_interval_secs = secs;
        self
    }

    #[must_use]
    pub const fn with_max_retransmits(mut self, retransmits: u8) -> Self {
        self.max_retransmits_per_payload = retransmits;
        self
    }

    #[must_use]
    pub const fn with_rx_drain_period(mut self, period_ms: u32) -> Self {
        self.rx_drain_period_ms = period_ms;
        self
    }

    #[must_use]
    pub const fn with_serial_debug(mut self, enabled: bool) -> Self {
        self.serial_debug = enabled;
        self
    }

    #[must_use]
    pub const fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    #[must_use]
    pub const fn with_night_communication_disabled(mut self, disabled: bool) -> Self {
        self.night_communication_disabled = disabled;
        self
    }

    #[must_use]
    pub const fn with_publish(mut self, enabled: bool) -> Self {
        self.publish_enabled = enabled;
        self
    }

    #[must_use]
    pub const fn with_timeless(mut self, timeless: bool) -> Self {
        self.timeless = timeless;
        self
    }

    #[must_use]
    pub const fn with_status_led(mut self, enabled: bool) -> Self {
        self.status_led = enabled;
        self
    }
}

impl Default for DtuConfig {
    fn default() -> Self {
        Self::new()
    }
}

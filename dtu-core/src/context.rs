//! Shared state handed by reference to every driving function.

use crate::clock::TimeKeeper;
use crate::config::DtuConfig;
use crate::stats::Statistics;
use crate::telemetry::{Stamp, TelemetryRecorder};

/// Process-wide state of the polling core.
///
/// Each field has a single writer: the time keeper owns the timestamp, the
/// statistics counters are only bumped by the coordinator, the drain and the
/// payload assembler.
pub struct DtuContext {
    pub config: DtuConfig,
    pub time: TimeKeeper,
    pub stats: Statistics,
    pub telemetry: TelemetryRecorder,
    uptime_ms: u64,
}

impl DtuContext {
    #[must_use]
    pub const fn new(config: DtuConfig) -> Self {
        let time = if config.timeless {
            TimeKeeper::timeless()
        } else {
            TimeKeeper::new()
        };
        Self {
            config,
            time,
            stats: Statistics::new(),
            telemetry: TelemetryRecorder::new(),
            uptime_ms: 0,
        }
    }

    #[must_use]
    pub const fn uptime_ms(&self) -> u64 {
        self.uptime_ms
    }

    pub fn set_uptime_ms(&mut self, uptime_ms: u64) {
        self.uptime_ms = uptime_ms;
    }

    /// Verbose diagnostics enabled.
    #[must_use]
    pub const fn verbose(&self) -> bool {
        self.config.serial_debug
    }

    #[must_use]
    pub const fn stamp(&self) -> Stamp {
        Stamp::new(self.uptime_ms, self.time.timestamp())
    }
}

//! Mirrors the core telemetry ring to defmt (target) or stdout (host).
//!
//! The core only records structured events; this module keeps a cursor into
//! the ring and emits every record it has not printed yet. Each record is
//! rendered once into a stack buffer so the defmt and host paths print the
//! same text.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt::Write as _;

use dtu_core::listener::DtuListener;
use dtu_core::telemetry::{EventId, TelemetryRecord, TelemetryRecorder};
use heapless::String;

/// Longest rendered record; longer lines are cut short.
pub const LOG_LINE_CAPACITY: usize = 128;

pub type LogLine = String<LOG_LINE_CAPACITY>;

/// Remembers which telemetry records were already mirrored.
#[derive(Clone, Copy, Debug, Default)]
pub struct TelemetryLog {
    last_seen: Option<EventId>,
}

impl TelemetryLog {
    #[must_use]
    pub const fn new() -> Self {
        Self { last_seen: None }
    }

    /// Emits every record newer than the last flush. Returns how many were emitted.
    pub fn flush<const CAPACITY: usize>(&mut self, recorder: &TelemetryRecorder<CAPACITY>) -> usize {
        let mut emitted = 0;
        for record in recorder.newer_than(self.last_seen) {
            emit_line(&render(record));
            self.last_seen = Some(record.id);
            emitted += 1;
        }
        emitted
    }
}

/// Renders one record, truncating at [`LOG_LINE_CAPACITY`].
#[must_use]
pub fn render(record: &TelemetryRecord) -> LogLine {
    let mut line = LogLine::new();
    // A full buffer only truncates the line.
    let _ = write!(line, "telemetry:{record}");
    line
}

/// Listener that logs the outward notifications.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogListener;

impl DtuListener for LogListener {
    fn payload_ready(&mut self, slot: usize) {
        emit_event("payload-ready", u32::try_from(slot).unwrap_or(u32::MAX));
    }

    fn sun_window_changed(&mut self, sunrise: u32, sunset: u32) {
        emit_window(sunrise, sunset);
    }

    fn sunrise(&mut self, timestamp: u32) {
        emit_event("sunrise", timestamp);
    }

    fn sunset(&mut self, timestamp: u32) {
        emit_event("sunset", timestamp);
    }
}

#[cfg(target_os = "none")]
fn emit_line(line: &str) {
    defmt::info!("{=str}", line);
}

#[cfg(not(target_os = "none"))]
fn emit_line(line: &str) {
    println!("{line}");
}

#[cfg(target_os = "none")]
fn emit_event(name: &'static str, value: u32) {
    defmt::info!("dtu: {} {}", name, value);
}

#[cfg(not(target_os = "none"))]
fn emit_event(name: &'static str, value: u32) {
    println!("dtu: {name} {value}");
}

#[cfg(target_os = "none")]
fn emit_window(sunrise: u32, sunset: u32) {
    defmt::info!("dtu: sun window {}..{}", sunrise, sunset);
}

#[cfg(not(target_os = "none"))]
fn emit_window(sunrise: u32, sunset: u32) {
    println!("dtu: sun window {sunrise}..{sunset}");
}

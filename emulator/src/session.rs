use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use dtu_core::app::{ConsoleReply, Dtu};
use dtu_core::config::{DtuConfig, InverterConfig, MAX_NUM_INVERTERS};
use dtu_core::coordinator::{PollOutcome, Resolution};
use dtu_core::inverter::RadioAddress;
use dtu_core::listener::DtuListener;
use dtu_core::radio::StatusLed;
use dtu_core::rx::PacketRing;
use dtu_core::status::StatusFormatter;
use dtu_core::telemetry::EventId;

use crate::sim::{Behaviour, SimClock, SimPayload, SimRadio};

/// Virtual time advanced per main-loop iteration.
const STEP_MS: u64 = 5;
/// Serial of slot 0; further slots count up from here.
const BASE_SERIAL: u64 = 0x1161_2345_6780;
const BASE_POWER_DW: u32 = 3_000;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "run",
        "run [seconds]                 - advance the virtual clock (default: one send interval)",
    ),
    (
        "send",
        "send                          - run one poll cycle now",
    ),
    (
        "time",
        "time [<epoch>|off]            - set or take down the network time source",
    ),
    (
        "link",
        "link <up|down>                - connect or drop the radio link",
    ),
    (
        "behave",
        "behave <slot> <healthy|silent|partial|corrupt> - change how an inverter answers",
    ),
    (
        "sim",
        "sim                           - show the simulated fleet",
    ),
    (
        "limit",
        "limit <slot> <value><w|%> [persist] - queue an active power limit",
    ),
    (
        "power",
        "power <slot> <on|off>         - turn an inverter on or off",
    ),
    (
        "restart",
        "restart <slot>                - restart an inverter",
    ),
    (
        "request",
        "request <slot> <realtime|config|alarms|firmware> - queue an info request",
    ),
    (
        "status",
        "status                        - display time, counters and slots",
    ),
    (
        "stats",
        "stats                         - display the receive counters",
    ),
    (
        "help",
        "help [topic]                  - show help for a command",
    ),
];

/// How to build a session.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub config: DtuConfig,
    pub inverters: usize,
    /// Epoch the simulated time source starts with; `None` keeps it offline.
    pub epoch: Option<u32>,
    pub transcript: PathBuf,
    pub header: String,
}

impl SessionOptions {
    pub fn new(transcript: impl Into<PathBuf>) -> Self {
        Self {
            config: DtuConfig::new(),
            inverters: 1,
            epoch: None,
            transcript: transcript.into(),
            header: "Hoymiles DTU emulator transcript".to_string(),
        }
    }
}

/// Notification sink that turns every hook into an output line.
#[derive(Debug, Default)]
struct NotificationLines {
    lines: Vec<String>,
}

impl DtuListener for NotificationLines {
    fn payload_ready(&mut self, slot: usize) {
        self.lines.push(format!("notify payload-ready inv{slot}"));
    }

    fn sun_window_changed(&mut self, sunrise: u32, sunset: u32) {
        self.lines
            .push(format!("notify sun-window {sunrise}..{sunset}"));
    }

    fn sunrise(&mut self, timestamp: u32) {
        self.lines.push(format!("notify sunrise {timestamp}"));
    }

    fn sunset(&mut self, timestamp: u32) {
        self.lines.push(format!("notify sunset {timestamp}"));
    }

    fn minute_tick(&mut self, timestamp: u32) {
        self.lines.push(format!("notify minute {timestamp}"));
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Indicator {
    on: Option<bool>,
}

impl StatusLed for Indicator {
    fn set(&mut self, on: bool) {
        self.on = Some(on);
    }
}

type SimDtu = Dtu<'static, SimRadio<'static>, SimPayload, SimClock, NotificationLines, Indicator>;

pub struct Session {
    dtu: SimDtu,
    transcript: TranscriptLogger,
    now_ms: u64,
    telemetry_cursor: Option<EventId>,
}

impl Session {
    pub fn new(options: &SessionOptions) -> io::Result<Self> {
        let transcript = TranscriptLogger::new(&options.transcript, &options.header)?;

        // One ring per session; it lives as long as the process.
        let ring: &'static PacketRing = Box::leak(Box::new(PacketRing::new()));
        let mut clock = SimClock::default();
        clock.set_epoch(options.epoch);

        let mut dtu = Dtu::new(
            options.config,
            ring,
            SimRadio::new(ring),
            SimPayload::new(),
            clock,
            NotificationLines::default(),
            Indicator::default(),
        );

        for offset in 0..options.inverters.min(MAX_NUM_INVERTERS) {
            let serial = BASE_SERIAL + u64::try_from(offset).unwrap_or_default();
            let slot = dtu
                .add_inverter(InverterConfig::new(serial))
                .map_err(|err| io::Error::other(err.to_string()))?;
            let power = BASE_POWER_DW + 250 * u32::try_from(slot).unwrap_or_default();
            dtu.radio_mut()
                .attach(slot, RadioAddress::from_serial(serial), power);
        }
        dtu.start()
            .map_err(|err| io::Error::other(err.to_string()))?;

        Ok(Self {
            dtu,
            transcript,
            now_ms: 0,
            telemetry_cursor: None,
        })
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        self.transcript
            .append_line(self.elapsed(), TranscriptRole::Host, trimmed)?;

        let mut words = trimmed.split_whitespace();
        let verb = words.next().unwrap_or_default().to_ascii_lowercase();
        let lines = match verb.as_str() {
            "help" => handle_help(words.next()),
            "run" => self.handle_run(words.next()),
            "send" => self.handle_send(),
            "time" => self.handle_time(words.next()),
            "link" => self.handle_link(words.next()),
            "behave" => self.handle_behave(words.next(), words.next()),
            "sim" => self.describe_fleet(),
            _ => self.handle_console(trimmed),
        };

        self.record_output(&lines)?;
        Ok(lines)
    }

    fn elapsed(&self) -> Duration {
        Duration::from_millis(self.now_ms)
    }

    fn handle_run(&mut self, seconds: Option<&str>) -> Vec<String> {
        let default = u64::from(self.dtu.context().config.send_interval_secs);
        let Ok(seconds) = seconds.map_or(Ok(default), str::parse::<u64>) else {
            return vec!["ERR usage: run [seconds]".to_string()];
        };

        let mut lines = self.advance(Duration::from_secs(seconds));
        lines.push(format!(
            "ran {seconds}s, uptime {}",
            format_duration_short(self.elapsed())
        ));
        lines
    }

    /// Steps the main loop until `span` of virtual time has passed.
    pub fn advance(&mut self, span: Duration) -> Vec<String> {
        let led_before = self.dtu.led().on;
        let target = self
            .now_ms
            .saturating_add(u64::try_from(span.as_millis()).unwrap_or(u64::MAX));
        while self.now_ms < target {
            self.now_ms += STEP_MS;
            self.dtu.time_source_mut().advance_to(self.now_ms);
            self.dtu.poll(self.now_ms);
        }

        let mut lines = self.collect_events();
        let led_after = self.dtu.led().on;
        if let Some(on) = led_after.filter(|_| led_after != led_before) {
            lines.push(format!("led {}", if on { "on" } else { "off" }));
        }
        lines
    }

    fn handle_send(&mut self) -> Vec<String> {
        let outcome = self.dtu.send();
        let mut lines = vec![describe_outcome(outcome)];
        lines.extend(self.collect_events());
        lines
    }

    fn handle_time(&mut self, argument: Option<&str>) -> Vec<String> {
        match argument {
            None => {
                let mut line = String::new();
                let _ = StatusFormatter::new(&self.dtu.status()).write_time_line(&mut line);
                vec![line]
            }
            Some(word) if word.eq_ignore_ascii_case("off") => {
                self.dtu.time_source_mut().set_epoch(None);
                vec!["OK time source offline".to_string()]
            }
            Some(word) => match word.parse::<u32>() {
                Ok(epoch) if epoch > 0 => {
                    self.dtu.time_source_mut().set_epoch(Some(epoch));
                    self.dtu.context_mut().time.set_timestamp(epoch);
                    vec![format!("OK time set to {epoch}")]
                }
                _ => vec!["ERR usage: time [<epoch>|off]".to_string()],
            },
        }
    }

    fn handle_link(&mut self, argument: Option<&str>) -> Vec<String> {
        let up = match argument {
            Some(word) if word.eq_ignore_ascii_case("up") => true,
            Some(word) if word.eq_ignore_ascii_case("down") => false,
            _ => return vec!["ERR usage: link <up|down>".to_string()],
        };
        self.dtu.radio_mut().set_link(up);
        vec![format!("OK link {}", if up { "up" } else { "down" })]
    }

    fn handle_behave(&mut self, slot: Option<&str>, mode: Option<&str>) -> Vec<String> {
        let slot = slot.and_then(|word| word.parse::<usize>().ok());
        let behaviour = mode.and_then(Behaviour::from_tag);
        let (Some(slot), Some(behaviour)) = (slot, behaviour) else {
            return vec!["ERR usage: behave <slot> <healthy|silent|partial|corrupt>".to_string()];
        };

        if self.dtu.radio_mut().set_behaviour(slot, behaviour) {
            vec![format!("OK inv{slot} now {behaviour}")]
        } else {
            vec![format!("ERR no simulated inverter in slot {slot}")]
        }
    }

    fn describe_fleet(&self) -> Vec<String> {
        let radio = self.dtu.radio();
        let mut lines = vec![format!(
            "sim transmissions={} ring-drops={}",
            radio.transmissions(),
            radio.dropped_frames()
        )];
        for (index, slot) in self.dtu.fleet().iter() {
            let behaviour = radio.behaviour(index).unwrap_or_default();
            lines.push(format!(
                "  inv{index} sn={:x} addr={} {behaviour}",
                slot.serial(),
                RadioAddress::from_serial(slot.serial())
            ));
        }
        lines
    }

    fn handle_console(&mut self, line: &str) -> Vec<String> {
        match self.dtu.execute(line) {
            Ok(ConsoleReply::Accepted { slot }) => vec![format!("OK queued for inv{slot}")],
            Ok(ConsoleReply::Status(status)) => {
                let mut text = String::new();
                let _ = StatusFormatter::new(&status).write_all(&mut text);
                text.lines().map(str::to_string).collect()
            }
            Ok(ConsoleReply::Stats(_)) => {
                let mut line = String::new();
                let _ = StatusFormatter::new(&self.dtu.status()).write_stats_line(&mut line);
                vec![line]
            }
            Err(err) => vec![format!("ERR {err}")],
        }
    }

    /// Telemetry recorded and notifications raised since the last call.
    fn collect_events(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        for record in self
            .dtu
            .context()
            .telemetry
            .newer_than(self.telemetry_cursor)
        {
            lines.push(format!("telemetry {record}"));
            self.telemetry_cursor = Some(record.id);
        }
        lines.append(&mut self.dtu.listener_mut().lines);
        lines
    }

    fn record_output(&mut self, lines: &[String]) -> io::Result<()> {
        let elapsed = self.elapsed();
        for line in lines {
            self.transcript
                .append_line(elapsed, TranscriptRole::Emulator, line)?;
        }
        Ok(())
    }
}

fn handle_help(topic: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    match topic {
        Some(target) => {
            if let Some((_, detail)) = HELP_TOPICS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(target))
            {
                lines.push((*detail).to_string());
            } else {
                lines.push(format!("No help available for `{target}`."));
                lines.push(format!("Available topics: {}", help_topic_list()));
            }
        }
        None => {
            lines.push("Available commands:".to_string());
            for (_, detail) in HELP_TOPICS {
                lines.push(format!("  {detail}"));
            }
            lines.push("Type `help <topic>` for a specific command.".to_string());
        }
    }
    lines
}

fn describe_outcome(outcome: PollOutcome) -> String {
    match outcome {
        PollOutcome::Skipped(reason) => format!("send skipped: {reason}"),
        PollOutcome::Dispatched {
            slot,
            resolution,
            sent,
        } => {
            let previous = match resolution {
                Resolution::Idle => "idle".to_string(),
                Resolution::Complete => "complete".to_string(),
                Resolution::Failed(failure) => failure.to_string(),
            };
            format!("send inv{slot} {sent} (previous {previous})")
        }
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path, header: &str) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(header)?;
        Ok(logger)
    }

    fn write_header(&mut self, header: &str) -> io::Result<()> {
        writeln!(self.writer, "# {header}")?;
        writeln!(
            self.writer,
            "# Timestamps are virtual milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>8} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

fn help_topic_list() -> String {
    let mut buffer = String::new();
    for (index, (name, _)) in HELP_TOPICS.iter().enumerate() {
        if index > 0 {
            buffer.push_str(", ");
        }
        buffer.push_str(name);
    }
    buffer
}

fn format_duration_short(duration: Duration) -> String {
    let mut text = String::new();
    if duration.as_secs() == 0 {
        let _ = write!(text, "{}ms", duration.as_millis());
    } else {
        let _ = write!(text, "{:.3}s", duration.as_secs_f64());
    }
    text
}

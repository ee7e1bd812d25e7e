use std::io;

use dtu_core::config::{DtuConfig, Location};

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;
#[allow(dead_code)]
#[path = "../sim.rs"]
mod sim;

use session::{Session, SessionOptions};

/// 2024-06-21 12:00:00 UTC.
const SOLSTICE_NOON: u32 = 1_718_971_200;
/// 2024-06-21 21:00:00 UTC, after sunset in Berlin. The script later
/// moves the clock to 16:00 UTC the same day.
const SOLSTICE_NIGHT: u32 = 1_719_003_600;
const BERLIN: Location = Location::new(52.52, 13.40);

#[derive(Clone, Copy, Debug)]
enum Scenario {
    Day,
    Faults,
    Night,
}

impl Scenario {
    fn log_path(self) -> &'static str {
        match self {
            Scenario::Day => "transcripts/emulator-day.log",
            Scenario::Faults => "transcripts/emulator-faults.log",
            Scenario::Night => "transcripts/emulator-night.log",
        }
    }

    fn header(self) -> &'static str {
        match self {
            Scenario::Day => "DTU emulator transcript: healthy fleet at noon",
            Scenario::Faults => "DTU emulator transcript: silent, partial and corrupt inverters",
            Scenario::Night => "DTU emulator transcript: night gating and sunrise",
        }
    }

    fn options(self) -> SessionOptions {
        let mut options = SessionOptions::new(self.log_path());
        options.header = self.header().to_string();
        match self {
            Scenario::Day => {
                options.inverters = 2;
                options.epoch = Some(SOLSTICE_NOON);
                options.config = DtuConfig::new()
                    .with_location(BERLIN)
                    .with_publish(true);
            }
            Scenario::Faults => {
                options.inverters = 3;
                options.epoch = Some(SOLSTICE_NOON);
                options.config = DtuConfig::new().with_serial_debug(true);
            }
            Scenario::Night => {
                options.epoch = Some(SOLSTICE_NIGHT);
                options.config = DtuConfig::new()
                    .with_location(BERLIN)
                    .with_night_communication_disabled(true)
                    .with_serial_debug(true);
            }
        }
        options
    }
}

fn main() -> io::Result<()> {
    record_scenario(Scenario::Day)?;
    record_scenario(Scenario::Faults)?;
    record_scenario(Scenario::Night)?;
    Ok(())
}

fn record_scenario(scenario: Scenario) -> io::Result<()> {
    let mut session = Session::new(&scenario.options())?;
    let script: &[&str] = match scenario {
        Scenario::Day => &[
            "sim",
            "run 20",
            "run 15",
            "request 1 firmware",
            "limit 0 400w persist",
            "run 60",
            "status",
        ],
        Scenario::Faults => &[
            "behave 0 silent",
            "behave 1 partial",
            "behave 2 corrupt",
            "run 60",
            "stats",
            "link down",
            "run 15",
            "link up",
            "time off",
            "run 15",
            "status",
        ],
        Scenario::Night => &["run 20", "status", "send", "time 1718985600", "send", "status"],
    };

    for line in script {
        session.handle_command(line)?;
    }
    Ok(())
}

mod session;
mod sim;

use std::env;
use std::io::{self, BufRead, Write};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

use dtu_core::config::{Location, MAX_NUM_INVERTERS};
use session::{Session, SessionOptions};

const USAGE: &str = "Usage: dtu-emulator [--inverters <1-4>] [--interval <secs>] \
[--location <lat>,<lon>] [--epoch <secs>|--no-time] [--verbose] [--publish] \
[--timeless] [--transcript <path>]";
const DEFAULT_TRANSCRIPT: &str = "transcripts/emulator.log";

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(&options)?;
    let mut line = String::new();

    writeln!(
        writer,
        "Hoymiles DTU emulator ready with {} inverter(s). Type `help` for commands or `exit` to quit.",
        options.inverters
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = session.handle_command(trimmed)?;
        for response in responses {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<SessionOptions, String> {
    let mut options = SessionOptions::new(DEFAULT_TRANSCRIPT);
    options.epoch = host_epoch();

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg.clone(), None),
        };
        let mut value = |name: &str| {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("Expected value after {name}"))
        };

        match flag.as_str() {
            "--inverters" => {
                let count = parse_number::<usize>("--inverters", &value("--inverters")?)?;
                if !(1..=MAX_NUM_INVERTERS).contains(&count) {
                    return Err(format!("--inverters must be between 1 and {MAX_NUM_INVERTERS}"));
                }
                options.inverters = count;
            }
            "--interval" => {
                let secs = parse_number::<u32>("--interval", &value("--interval")?)?;
                if secs == 0 {
                    return Err("--interval must be at least one second".to_string());
                }
                options.config = options.config.with_send_interval(secs);
            }
            "--location" => {
                let location = parse_location(&value("--location")?)?;
                options.config = options.config.with_location(location);
            }
            "--epoch" => options.epoch = Some(parse_number("--epoch", &value("--epoch")?)?),
            "--no-time" => options.epoch = None,
            "--verbose" => options.config = options.config.with_serial_debug(true),
            "--publish" => options.config = options.config.with_publish(true),
            "--timeless" => options.config = options.config.with_timeless(true),
            "--transcript" => options.transcript = value("--transcript")?.into(),
            other => return Err(format!("Unknown argument `{other}`")),
        }
    }

    Ok(options)
}

fn parse_number<T: std::str::FromStr>(flag: &str, text: &str) -> Result<T, String> {
    text.parse()
        .map_err(|_| format!("Invalid number `{text}` for {flag}"))
}

fn parse_location(text: &str) -> Result<Location, String> {
    let (lat, lon) = text
        .split_once(',')
        .ok_or_else(|| format!("Expected <lat>,<lon>, got `{text}`"))?;
    let latitude: f32 = parse_number("--location", lat.trim())?;
    let longitude: f32 = parse_number("--location", lon.trim())?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(format!("Location `{text}` is out of range"));
    }
    Ok(Location::new(latitude, longitude))
}

fn host_epoch() -> Option<u32> {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
    u32::try_from(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<SessionOptions, String> {
        parse_options(args.iter().map(|arg| (*arg).to_string()))
    }

    #[test]
    fn defaults_follow_host_clock() {
        let options = parse(&[]).unwrap();
        assert_eq!(options.inverters, 1);
        assert!(options.epoch.is_some());
        assert_eq!(options.config.send_interval_secs, 15);
    }

    #[test]
    fn flags_accept_inline_and_separate_values() {
        let options = parse(&[
            "--inverters=3",
            "--interval",
            "30",
            "--location",
            "52.52,13.40",
            "--epoch=1718971200",
            "--verbose",
        ])
        .unwrap();
        assert_eq!(options.inverters, 3);
        assert_eq!(options.config.send_interval_secs, 30);
        assert_eq!(options.config.location, Some(Location::new(52.52, 13.40)));
        assert_eq!(options.epoch, Some(1_718_971_200));
        assert!(options.config.serial_debug);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse(&["--inverters", "5"]).is_err());
        assert!(parse(&["--interval=0"]).is_err());
        assert!(parse(&["--location", "95,0"]).is_err());
        assert_eq!(
            parse(&["--epoch"]).err().as_deref(),
            Some("Expected value after --epoch")
        );
        assert_eq!(
            parse(&["--loud"]).err().as_deref(),
            Some("Unknown argument `--loud`")
        );
        assert_eq!(parse(&["--no-time"]).unwrap().epoch, None);
    }
}

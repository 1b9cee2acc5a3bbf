//! Publish a simulated sensor reading for a running controller.
//!
//! Writes `6 <high> <low>` to `<dir>/wiringPiSPI_<channel>` so that the next
//! sample decodes to the requested temperature, or removes the source with
//! `--remove` to simulate a disconnected sensor.

use std::path::PathBuf;
use std::process::ExitCode;
use thermo_core::Calibration;
use thermo_io::{remove_channel_source, write_channel_source, DEFAULT_SPI_DIR};
use tracing::{error, info};

/// Status byte the sensor reports in front of every conversion.
const STATUS_BYTE: u8 = 6;

struct FeedArgs {
    channel: u8,
    temperature_c: f64,
    dir: PathBuf,
    calibration: Calibration,
    remove: bool,
}

fn parse_args(args: &[String]) -> Result<FeedArgs, String> {
    let mut feed = FeedArgs {
        channel: 0,
        temperature_c: 20.0,
        dir: PathBuf::from(DEFAULT_SPI_DIR),
        calibration: Calibration::default(),
        remove: false,
    };

    let mut iter = args.iter().skip(1);
    while let Some(flag) = iter.next() {
        if flag == "--remove" {
            feed.remove = true;
            continue;
        }
        let value = iter
            .next()
            .ok_or_else(|| format!("{flag} requires a value"))?;
        let invalid = || format!("invalid value '{value}' for {flag}");
        match flag.as_str() {
            "--channel" => feed.channel = value.parse().map_err(|_| invalid())?,
            "--temp" => feed.temperature_c = value.parse().map_err(|_| invalid())?,
            "--dir" => feed.dir = PathBuf::from(value),
            "--full-scale" => {
                feed.calibration.full_scale_code = value.parse().map_err(|_| invalid())?
            }
            "--range" => feed.calibration.range_c = value.parse().map_err(|_| invalid())?,
            other => return Err(format!("unknown option '{other}'")),
        }
    }
    if !feed.calibration.is_valid() {
        return Err(format!(
            "unusable calibration: full scale {} over {} C",
            feed.calibration.full_scale_code, feed.calibration.range_c
        ));
    }
    Ok(feed)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let feed = match parse_args(&args) {
        Ok(feed) => feed,
        Err(e) => {
            eprintln!("{e}");
            eprintln!(
                "usage: sensor-feed [--channel N] [--temp C] [--dir DIR] [--full-scale CODE] [--range C] [--remove]"
            );
            return ExitCode::from(2);
        }
    };

    if feed.remove {
        return match remove_channel_source(&feed.dir, feed.channel) {
            Ok(()) => {
                info!(channel = feed.channel, "Sensor source removed");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(channel = feed.channel, error = %e, "Failed to remove sensor source");
                ExitCode::FAILURE
            }
        };
    }

    let code = feed.calibration.code_for(feed.temperature_c);
    let frame = [STATUS_BYTE, (code >> 8) as u8, (code & 0xFF) as u8];
    match write_channel_source(&feed.dir, feed.channel, &frame) {
        Ok(path) => {
            info!(
                path = %path.display(),
                code,
                temperature_c = feed.calibration.temperature(code),
                "Sensor source updated"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(channel = feed.channel, error = %e, "Failed to write sensor source");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("sensor-feed")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parses_feed_flags() {
        let feed = parse_args(&args(&["--channel", "1", "--temp", "22.5", "--remove"])).unwrap();
        assert_eq!(feed.channel, 1);
        assert_eq!(feed.temperature_c, 22.5);
        assert!(feed.remove);
    }

    #[test]
    fn rejects_unusable_calibration() {
        for range in ["nan", "0", "-1", "inf"] {
            assert!(parse_args(&args(&["--range", range])).is_err(), "{range}");
        }
        assert!(parse_args(&args(&["--full-scale", "0"])).is_err());
    }
}

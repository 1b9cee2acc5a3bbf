use serde::Serialize;
use thiserror::Error;

/// Operator command accepted by the console.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    SetInterval { seconds: u32 },
    SetTarget { celsius: f64 },
    ToggleEcho,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("input line is not valid UTF-8")]
    NotText,

    #[error("'{0}' requires an argument")]
    MissingArgument(&'static str),

    #[error("interval must be a positive whole number of seconds, got '{0}'")]
    InvalidInterval(String),

    #[error("temperature must be a finite number, got '{0}'")]
    InvalidTemperature(String),
}

pub fn parse_interval(arg: &str) -> Result<u32, CommandError> {
    match arg.trim().parse::<u32>() {
        Ok(seconds) if seconds > 0 => Ok(seconds),
        _ => Err(CommandError::InvalidInterval(arg.trim().to_string())),
    }
}

pub fn parse_temperature(arg: &str) -> Result<f64, CommandError> {
    match arg.trim().parse::<f64>() {
        Ok(celsius) if celsius.is_finite() => Ok(celsius),
        _ => Err(CommandError::InvalidTemperature(arg.trim().to_string())),
    }
}

impl Command {
    /// Parse one console line. Blank lines yield `Ok(None)`; tokens after the
    /// first argument are ignored.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let mut tokens = line.split_whitespace();
        let Some(word) = tokens.next() else {
            return Ok(None);
        };
        let arg = tokens.next();

        let cmd = match word {
            "time" => Command::SetInterval {
                seconds: parse_interval(arg.ok_or(CommandError::MissingArgument("time"))?)?,
            },
            "temp" => Command::SetTarget {
                celsius: parse_temperature(arg.ok_or(CommandError::MissingArgument("temp"))?)?,
            },
            "tout" => Command::ToggleEcho,
            "stop" => Command::Stop,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(cmd))
    }
}

/// Operator-tunable loop parameters. Owned by the control loop and changed
/// only through [`ControlParameters::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlParameters {
    pub target_temp_c: f64,
    pub interval_s: u32,
    pub console_echo: bool,
    pub running: bool,
}

impl ControlParameters {
    pub fn new(target_temp_c: f64, interval_s: u32) -> Self {
        Self {
            target_temp_c,
            interval_s,
            console_echo: false,
            running: true,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        u64::from(self.interval_s) * 1000
    }

    pub fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::SetInterval { seconds } => self.interval_s = seconds,
            Command::SetTarget { celsius } => self.target_temp_c = celsius,
            Command::ToggleEcho => self.console_echo = !self.console_echo,
            Command::Stop => self.running = false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands() {
        assert_eq!(
            Command::parse("time 5\n"),
            Ok(Some(Command::SetInterval { seconds: 5 }))
        );
        assert_eq!(
            Command::parse("  temp   21.5 extra"),
            Ok(Some(Command::SetTarget { celsius: 21.5 }))
        );
        assert_eq!(Command::parse("tout"), Ok(Some(Command::ToggleEcho)));
        assert_eq!(Command::parse("stop\r\n"), Ok(Some(Command::Stop)));
        assert_eq!(Command::parse("   \n"), Ok(None));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert_eq!(
            Command::parse("time 0"),
            Err(CommandError::InvalidInterval("0".into()))
        );
        assert_eq!(
            Command::parse("time -3"),
            Err(CommandError::InvalidInterval("-3".into()))
        );
        assert_eq!(
            Command::parse("temp warm"),
            Err(CommandError::InvalidTemperature("warm".into()))
        );
        assert!(Command::parse("temp NaN").is_err());
        assert_eq!(
            Command::parse("time"),
            Err(CommandError::MissingArgument("time"))
        );
    }

    #[test]
    fn long_words_are_not_truncated_into_commands() {
        assert_eq!(
            Command::parse("stopping"),
            Err(CommandError::Unknown("stopping".into()))
        );
        let long = "x".repeat(4096);
        assert_eq!(Command::parse(&long), Err(CommandError::Unknown(long)));
    }

    #[test]
    fn apply_mutates_parameters() {
        let mut params = ControlParameters::new(20.0, 10);
        params.apply(Command::SetInterval { seconds: 5 });
        params.apply(Command::SetTarget { celsius: 21.5 });
        params.apply(Command::ToggleEcho);
        assert_eq!(params.interval_ms(), 5_000);
        assert_eq!(params.target_temp_c, 21.5);
        assert!(params.console_echo);
        assert!(params.running);

        params.apply(Command::Stop);
        assert!(!params.running);
    }
}

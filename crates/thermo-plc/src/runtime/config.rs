use std::path::PathBuf;
use thermo_core::{Calibration, ControlConfig};
use thermo_io::{DEFAULT_IMAGE_PATH, DEFAULT_SPI_DIR};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid value '{value}' for {flag}")]
    InvalidValue { flag: String, value: String },

    #[error("unknown option '{0}'")]
    UnknownOption(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Lock-guarded register and channel files shared with other processes.
    File,
    /// In-process registers; the sensor reports a fixed temperature.
    Memory,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub run_seconds: Option<u64>,
    pub target_temp_c: Option<f64>,
    pub interval_s: Option<u32>,
    pub output_path: PathBuf,
    pub echo: bool,
    pub channel: u8,
    pub speed_hz: u32,
    pub heater_pin: Option<u8>,
    pub gpio_image: PathBuf,
    pub spi_dir: PathBuf,
    pub backend: Backend,
    pub sim_temp_c: f64,
    pub full_scale_code: u16,
    pub range_c: f64,
    pub json_logs: bool,
    pub log_file: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    pub audit_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let control = ControlConfig::default();
        Self {
            show_help: false,
            run_seconds: None,
            target_temp_c: None,
            interval_s: None,
            output_path: PathBuf::from("./out.txt"),
            echo: false,
            channel: control.channel,
            speed_hz: control.speed_hz,
            heater_pin: control.heater_pin,
            gpio_image: PathBuf::from(DEFAULT_IMAGE_PATH),
            spi_dir: PathBuf::from(DEFAULT_SPI_DIR),
            backend: Backend::File,
            sim_temp_c: 20.0,
            full_scale_code: control.calibration.full_scale_code,
            range_c: control.calibration.range_c,
            json_logs: false,
            log_file: None,
            metrics_addr: None,
            audit_path: None,
        }
    }
}

fn value<'a>(args: &'a [String], i: usize) -> Result<&'a str, ConfigError> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingValue(args[i].clone()))
}

fn parsed<T: std::str::FromStr>(args: &[String], i: usize) -> Result<T, ConfigError> {
    let raw = value(args, i)?;
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        flag: args[i].clone(),
        value: raw.to_string(),
    })
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            let takes_value = match args[i].as_str() {
                "--run-seconds" => {
                    cfg.run_seconds = Some(parsed(args, i)?);
                    true
                }
                "--target" => {
                    let raw = value(args, i)?;
                    let target = thermo_core::command::parse_temperature(raw).map_err(|_| {
                        ConfigError::InvalidValue {
                            flag: args[i].clone(),
                            value: raw.to_string(),
                        }
                    })?;
                    cfg.target_temp_c = Some(target);
                    true
                }
                "--interval" => {
                    let raw = value(args, i)?;
                    let interval = thermo_core::command::parse_interval(raw).map_err(|_| {
                        ConfigError::InvalidValue {
                            flag: args[i].clone(),
                            value: raw.to_string(),
                        }
                    })?;
                    cfg.interval_s = Some(interval);
                    true
                }
                "--output" => {
                    cfg.output_path = PathBuf::from(value(args, i)?);
                    true
                }
                "--echo" => {
                    cfg.echo = true;
                    false
                }
                "--channel" => {
                    cfg.channel = parsed(args, i)?;
                    true
                }
                "--speed" => {
                    cfg.speed_hz = parsed(args, i)?;
                    true
                }
                "--heater-pin" => {
                    cfg.heater_pin = Some(parsed(args, i)?);
                    true
                }
                "--no-heater" => {
                    cfg.heater_pin = None;
                    false
                }
                "--gpio-image" => {
                    cfg.gpio_image = PathBuf::from(value(args, i)?);
                    true
                }
                "--spi-dir" => {
                    cfg.spi_dir = PathBuf::from(value(args, i)?);
                    true
                }
                "--backend" => {
                    cfg.backend = match value(args, i)? {
                        "file" => Backend::File,
                        "memory" => Backend::Memory,
                        other => {
                            return Err(ConfigError::InvalidValue {
                                flag: args[i].clone(),
                                value: other.to_string(),
                            })
                        }
                    };
                    true
                }
                "--sim-temp" => {
                    cfg.sim_temp_c = parsed(args, i)?;
                    true
                }
                "--full-scale" => {
                    cfg.full_scale_code = parsed(args, i)?;
                    true
                }
                "--range" => {
                    cfg.range_c = parsed(args, i)?;
                    true
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                    false
                }
                "--log-file" => {
                    cfg.log_file = Some(PathBuf::from(value(args, i)?));
                    true
                }
                "--metrics-addr" => {
                    cfg.metrics_addr = Some(value(args, i)?.to_string());
                    true
                }
                "--audit-log" => {
                    cfg.audit_path = Some(PathBuf::from(value(args, i)?));
                    true
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                other => return Err(ConfigError::UnknownOption(other.to_string())),
            };
            i += if takes_value { 2 } else { 1 };
        }

        if !cfg.calibration().is_valid() {
            let (flag, value) = if cfg.full_scale_code == 0 {
                ("--full-scale", cfg.full_scale_code.to_string())
            } else {
                ("--range", cfg.range_c.to_string())
            };
            return Err(ConfigError::InvalidValue {
                flag: flag.to_string(),
                value,
            });
        }
        Ok(cfg)
    }

    pub fn calibration(&self) -> Calibration {
        Calibration {
            full_scale_code: self.full_scale_code,
            range_c: self.range_c,
        }
    }

    pub fn control_config(&self) -> ControlConfig {
        ControlConfig {
            channel: self.channel,
            speed_hz: self.speed_hz,
            heater_pin: self.heater_pin,
            calibration: self.calibration(),
            ..ControlConfig::default()
        }
    }

    pub fn print_help() {
        println!(
            r#"thermo-plc - Simulated temperature regulation loop

USAGE:
    thermo-plc [OPTIONS]

OPTIONS:
    --target <C>            Initial target temperature (skips the prompt)
    --interval <SECS>       Initial sampling interval (skips the prompt)
    --output <PATH>         Reading log, truncated at start [default: ./out.txt]
    --echo                  Start with console echo of readings enabled
    --channel <N>           SPI sensor channel [default: 0]
    --speed <HZ>            SPI clock speed [default: 1000000]
    --heater-pin <N>        GPIO pin driven with the heater decision [default: 0]
    --no-heater             Do not drive a heater pin
    --gpio-image <PATH>     Device image file [default: /tmp/wiringPi_gpio]
    --spi-dir <DIR>         Directory holding wiringPiSPI_<N> sources [default: /tmp]
    --backend <NAME>        Hardware backend (file|memory) [default: file]
    --sim-temp <C>          Temperature reported by the memory backend [default: 20]
    --full-scale <CODE>     ADC code at full scale [default: 4095]
    --range <C>             Temperature at full scale [default: 330]
    --run-seconds <SECS>    Run for a fixed duration then exit
    --json-logs             Output logs in JSON format
    --log-file <PATH>       Also write diagnostics to a file
    --metrics-addr <ADDR>   Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --audit-log <PATH>      Enable audit logging to specified JSONL file
    -h, --help              Print this help message

COMMANDS (stdin, while running):
    time <seconds>  temp <celsius>  tout  stop

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,thermo_io=trace)
"#
        );
    }
}

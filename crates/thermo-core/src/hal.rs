use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Number of emulated GPIO pins in a device image.
pub const NUMBER_OF_PINS: usize = 41;

/// Number of emulated SPI channels.
pub const MAX_CHANNELS: u8 = 2;

pub const MIN_SPI_SPEED_HZ: u32 = 500_000;
pub const MAX_SPI_SPEED_HZ: u32 = 32_000_000;

/// Largest transfer a single SPI read serves; longer requests are capped.
pub const MAX_SPI_TRANSFER: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PinMode {
    #[default]
    Input = 0,
    Output = 1,
    PwmOutput = 2,
    GpioClock = 3,
    SoftPwmOutput = 4,
    SoftToneOutput = 5,
    PwmToneOutput = 6,
}

impl TryFrom<i64> for PinMode {
    type Error = i64;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Ok(match raw {
            0 => Self::Input,
            1 => Self::Output,
            2 => Self::PwmOutput,
            3 => Self::GpioClock,
            4 => Self::SoftPwmOutput,
            5 => Self::SoftToneOutput,
            6 => Self::PwmToneOutput,
            other => return Err(other),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Pull {
    #[default]
    Off = 0,
    Down = 1,
    Up = 2,
}

impl TryFrom<i64> for Pull {
    type Error = i64;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Ok(match raw {
            0 => Self::Off,
            1 => Self::Down,
            2 => Self::Up,
            other => return Err(other),
        })
    }
}

/// One emulated pin register.
///
/// `value` only changes through a write while `mode` is [`PinMode::Output`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinState {
    pub mode: PinMode,
    pub pull: Pull,
    pub value: u8,
}

impl PinState {
    /// Parse one device image line: `mode pull value`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace().map(|f| f.parse::<i64>().ok());
        let mode = PinMode::try_from(fields.next()??).ok()?;
        let pull = Pull::try_from(fields.next()??).ok()?;
        let value = u8::try_from(fields.next()??).ok()?;
        Some(Self { mode, pull, value })
    }
}

impl fmt::Display for PinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.mode as u8, self.pull as u8, self.value)
    }
}

#[derive(Debug, Error)]
pub enum GpioError {
    #[error("pin {0} is out of range (0..{NUMBER_OF_PINS})")]
    PinOutOfRange(u8),

    #[error("pin {0} is not configured as OUTPUT")]
    NotOutput(u8),

    #[error("device image {path} is malformed at line {line}")]
    Image { path: PathBuf, line: usize },

    #[error("device image I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SpiError {
    #[error("unsupported SPI channel {0}")]
    InvalidChannel(u8),

    #[error("SPI speed {0} Hz outside {MIN_SPI_SPEED_HZ}..={MAX_SPI_SPEED_HZ}")]
    InvalidSpeed(u32),

    #[error("SPI channel {0} has not been set up")]
    NotConfigured(u8),

    #[error("SPI sensor on channel {channel} is not ready ({reason})")]
    SourceUnavailable { channel: u8, reason: String },

    #[error("channel {channel} delivered {got} of {wanted} values")]
    ShortRead {
        channel: u8,
        wanted: usize,
        got: usize,
    },

    #[error("SPI source I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-channel SPI setup state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub channel: u8,
    pub configured: bool,
    pub speed_hz: u32,
}

impl ChannelConfig {
    pub fn unconfigured(channel: u8) -> Self {
        Self {
            channel,
            configured: false,
            speed_hz: 0,
        }
    }

    /// Validate a channel/speed pair and return the configured entry.
    pub fn validate(channel: u8, speed_hz: u32) -> Result<Self, SpiError> {
        if channel >= MAX_CHANNELS {
            return Err(SpiError::InvalidChannel(channel));
        }
        if !(MIN_SPI_SPEED_HZ..=MAX_SPI_SPEED_HZ).contains(&speed_hz) {
            return Err(SpiError::InvalidSpeed(speed_hz));
        }
        Ok(Self {
            channel,
            configured: true,
            speed_hz,
        })
    }
}

pub fn check_pin(pin: u8) -> Result<usize, GpioError> {
    let idx = usize::from(pin);
    if idx < NUMBER_OF_PINS {
        Ok(idx)
    } else {
        Err(GpioError::PinOutOfRange(pin))
    }
}

/// Pin register access. Out-of-range pins never mutate state.
pub trait GpioPort: Send {
    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<(), GpioError>;
    fn set_pull(&mut self, pin: u8, pull: Pull) -> Result<(), GpioError>;
    fn digital_write(&mut self, pin: u8, value: u8) -> Result<(), GpioError>;
    fn digital_read(&mut self, pin: u8) -> Result<u8, GpioError>;

    /// Register values are already byte-wide.
    fn digital_read8(&mut self, pin: u8) -> Result<u8, GpioError> {
        self.digital_read(pin)
    }

    fn digital_write8(&mut self, pin: u8, value: u8) -> Result<(), GpioError> {
        self.digital_write(pin, value)
    }
}

/// Sensor channel access.
pub trait SpiBus: Send {
    fn setup(&mut self, channel: u8, speed_hz: u32) -> Result<(), SpiError>;

    /// Compatibility variant; `mode` is accepted and ignored.
    fn setup_mode(&mut self, channel: u8, speed_hz: u32, _mode: u8) -> Result<(), SpiError> {
        self.setup(channel, speed_hz)
    }

    /// Fill `buf` (capped to [`MAX_SPI_TRANSFER`]) from `channel`.
    ///
    /// On error `buf` is left untouched.
    fn transfer(&mut self, channel: u8, buf: &mut [u8]) -> Result<usize, SpiError>;
}

/// Cap a requested transfer length, logging when it is truncated.
pub fn cap_transfer_len(requested: usize) -> usize {
    if requested > MAX_SPI_TRANSFER {
        log::warn!(
            "SPI transfer of {} bytes requested, only {} supported",
            requested,
            MAX_SPI_TRANSFER
        );
        MAX_SPI_TRANSFER
    } else {
        requested
    }
}

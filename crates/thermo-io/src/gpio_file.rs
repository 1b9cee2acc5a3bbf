//! File-backed GPIO register emulation.
//!
//! The device image holds one `mode pull value` line per pin in pin order.
//! Mutations rewrite the whole image under an exclusive lock; reads re-read
//! the whole image under a shared lock so writes from other processes are
//! visible.

use crate::lock::{open_exclusive, open_shared};
use std::path::{Path, PathBuf};
use thermo_core::hal::check_pin;
use thermo_core::{GpioError, GpioPort, PinMode, PinState, Pull, TimeBase, NUMBER_OF_PINS};
use tracing::{debug, error, warn};

pub const DEFAULT_IMAGE_PATH: &str = "/tmp/wiringPi_gpio";

pub type DeviceImage = [PinState; NUMBER_OF_PINS];

pub fn render_image(pins: &DeviceImage) -> String {
    pins.iter().map(|pin| format!("{pin}\n")).collect()
}

/// Parse a full device image; a missing or malformed line is an error.
pub fn parse_image(path: &Path, text: &str) -> Result<DeviceImage, GpioError> {
    let mut pins = [PinState::default(); NUMBER_OF_PINS];
    let mut lines = text.lines();
    for (idx, slot) in pins.iter_mut().enumerate() {
        *slot = lines
            .next()
            .and_then(PinState::parse_line)
            .ok_or_else(|| GpioError::Image {
                path: path.to_path_buf(),
                line: idx + 1,
            })?;
    }
    Ok(pins)
}

#[derive(Debug)]
pub struct FileGpio {
    path: PathBuf,
    pins: DeviceImage,
    timebase: TimeBase,
}

impl FileGpio {
    /// Start the clock epoch and persist an all-zero device image.
    pub fn setup(path: impl Into<PathBuf>) -> Result<Self, GpioError> {
        let gpio = Self {
            path: path.into(),
            pins: [PinState::default(); NUMBER_OF_PINS],
            timebase: TimeBase::new(),
        };
        let mut image = open_exclusive(&gpio.path).map_err(|e| {
            error!(path = %gpio.path.display(), error = %e, "Cannot create device image");
            e
        })?;
        image.rewrite(&render_image(&gpio.pins))?;
        Ok(gpio)
    }

    /// Attach to an existing device image without resetting it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, GpioError> {
        let mut gpio = Self {
            path: path.into(),
            pins: [PinState::default(); NUMBER_OF_PINS],
            timebase: TimeBase::new(),
        };
        gpio.refresh()?;
        Ok(gpio)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clock started when this simulator was set up.
    pub fn timebase(&self) -> TimeBase {
        self.timebase
    }

    /// Pin table as of the last file access.
    pub fn pins(&self) -> &DeviceImage {
        &self.pins
    }

    /// Re-read the whole image under a shared lock.
    pub fn refresh(&mut self) -> Result<&DeviceImage, GpioError> {
        let text = open_shared(&self.path)
            .and_then(|mut image| image.read_all())
            .map_err(|e| {
                warn!(path = %self.path.display(), error = %e, "Cannot read device image");
                e
            })?;
        self.pins = parse_image(&self.path, &text).map_err(|e| {
            warn!(error = %e, "Problem reading device image");
            e
        })?;
        Ok(&self.pins)
    }

    /// Read-modify-write of one pin with the exclusive lock held throughout.
    /// If `update` fails nothing is written.
    fn modify(
        &mut self,
        pin: u8,
        update: impl FnOnce(&mut PinState) -> Result<(), GpioError>,
    ) -> Result<(), GpioError> {
        let idx = check_pin(pin)?;
        let mut image = open_exclusive(&self.path).map_err(|e| {
            error!(path = %self.path.display(), error = %e, "Cannot open device image for writing");
            e
        })?;

        let current = image.read_all()?;
        match parse_image(&self.path, &current) {
            Ok(pins) => self.pins = pins,
            Err(e) => debug!(error = %e, "Device image unreadable, rewriting from memory"),
        }

        update(&mut self.pins[idx])?;
        image.rewrite(&render_image(&self.pins))?;
        Ok(())
    }
}

impl GpioPort for FileGpio {
    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<(), GpioError> {
        self.modify(pin, |state| {
            state.mode = mode;
            Ok(())
        })
    }

    fn set_pull(&mut self, pin: u8, pull: Pull) -> Result<(), GpioError> {
        self.modify(pin, |state| {
            state.pull = pull;
            Ok(())
        })
    }

    fn digital_write(&mut self, pin: u8, value: u8) -> Result<(), GpioError> {
        self.modify(pin, |state| {
            if state.mode != PinMode::Output {
                warn!(pin, "Port is not OUTPUT");
                return Err(GpioError::NotOutput(pin));
            }
            state.value = value;
            Ok(())
        })
    }

    fn digital_read(&mut self, pin: u8) -> Result<u8, GpioError> {
        let idx = check_pin(pin)?;
        Ok(self.refresh()?[idx].value)
    }
}

use crate::hal::{
    cap_transfer_len, check_pin, ChannelConfig, GpioError, GpioPort, PinMode, PinState, Pull,
    SpiBus, SpiError, MAX_CHANNELS, NUMBER_OF_PINS,
};
use std::sync::{Arc, Mutex, MutexGuard};

/// In-process pin registers. Clones share the same register table.
#[derive(Debug, Clone)]
pub struct MemoryGpio {
    pins: Arc<Mutex<[PinState; NUMBER_OF_PINS]>>,
}

impl MemoryGpio {
    pub fn new() -> Self {
        Self {
            pins: Arc::new(Mutex::new([PinState::default(); NUMBER_OF_PINS])),
        }
    }

    fn pins(&self) -> MutexGuard<'_, [PinState; NUMBER_OF_PINS]> {
        self.pins.lock().unwrap()
    }

    pub fn state(&self, pin: u8) -> Option<PinState> {
        check_pin(pin).ok().map(|idx| self.pins()[idx])
    }
}

impl Default for MemoryGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioPort for MemoryGpio {
    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<(), GpioError> {
        let idx = check_pin(pin)?;
        self.pins()[idx].mode = mode;
        Ok(())
    }

    fn set_pull(&mut self, pin: u8, pull: Pull) -> Result<(), GpioError> {
        let idx = check_pin(pin)?;
        self.pins()[idx].pull = pull;
        Ok(())
    }

    fn digital_write(&mut self, pin: u8, value: u8) -> Result<(), GpioError> {
        let idx = check_pin(pin)?;
        let mut pins = self.pins();
        if pins[idx].mode != PinMode::Output {
            log::warn!("Port {} is not OUTPUT", pin);
            return Err(GpioError::NotOutput(pin));
        }
        pins[idx].value = value;
        Ok(())
    }

    fn digital_read(&mut self, pin: u8) -> Result<u8, GpioError> {
        let idx = check_pin(pin)?;
        Ok(self.pins()[idx].value)
    }
}

#[derive(Debug)]
struct SpiState {
    channels: Vec<ChannelConfig>,
    sources: Vec<Option<Vec<u8>>>,
    transfers: u64,
}

/// In-process sensor channels. Clones share sources and counters, so a test
/// can retune the sensor while a poller owns the bus.
#[derive(Debug, Clone)]
pub struct MemorySpi {
    state: Arc<Mutex<SpiState>>,
}

impl MemorySpi {
    pub fn new() -> Self {
        let state = SpiState {
            channels: (0..MAX_CHANNELS).map(ChannelConfig::unconfigured).collect(),
            sources: vec![None; usize::from(MAX_CHANNELS)],
            transfers: 0,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Replace the sample line of `channel`; each value is masked to 8 bits.
    pub fn set_source(&self, channel: u8, values: &[i64]) {
        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state.sources.get_mut(usize::from(channel)) {
            *slot = Some(values.iter().map(|v| (v & 0xFF) as u8).collect());
        }
    }

    pub fn clear_source(&self, channel: u8) {
        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state.sources.get_mut(usize::from(channel)) {
            *slot = None;
        }
    }

    /// Number of transfers attempted on any channel.
    pub fn transfers(&self) -> u64 {
        self.state.lock().unwrap().transfers
    }
}

impl Default for MemorySpi {
    fn default() -> Self {
        Self::new()
    }
}

impl SpiBus for MemorySpi {
    fn setup(&mut self, channel: u8, speed_hz: u32) -> Result<(), SpiError> {
        let config = ChannelConfig::validate(channel, speed_hz)?;
        self.state.lock().unwrap().channels[usize::from(channel)] = config;
        Ok(())
    }

    fn transfer(&mut self, channel: u8, buf: &mut [u8]) -> Result<usize, SpiError> {
        let len = cap_transfer_len(buf.len());
        let mut state = self.state.lock().unwrap();
        state.transfers += 1;

        let idx = usize::from(channel);
        if channel >= MAX_CHANNELS {
            return Err(SpiError::InvalidChannel(channel));
        }
        if !state.channels[idx].configured {
            return Err(SpiError::NotConfigured(channel));
        }
        let source = state.sources[idx]
            .as_ref()
            .ok_or_else(|| SpiError::SourceUnavailable {
                channel,
                reason: "no sample source".to_string(),
            })?;
        if source.len() < len {
            return Err(SpiError::ShortRead {
                channel,
                wanted: len,
                got: source.len(),
            });
        }
        buf[..len].copy_from_slice(&source[..len]);
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_requires_output_mode() {
        let mut gpio = MemoryGpio::new();
        assert!(matches!(
            gpio.digital_write(4, 1),
            Err(GpioError::NotOutput(4))
        ));
        assert_eq!(gpio.digital_read(4).unwrap(), 0);

        gpio.set_mode(4, PinMode::Output).unwrap();
        gpio.digital_write(4, 1).unwrap();
        assert_eq!(gpio.digital_read(4).unwrap(), 1);
    }

    #[test]
    fn out_of_range_pin_is_rejected() {
        let mut gpio = MemoryGpio::new();
        assert!(matches!(
            gpio.digital_read(NUMBER_OF_PINS as u8),
            Err(GpioError::PinOutOfRange(_))
        ));
        assert!(gpio.set_mode(200, PinMode::Output).is_err());
    }

    #[test]
    fn spi_requires_setup_and_enough_values() {
        let mut spi = MemorySpi::new();
        spi.set_source(0, &[6, 1, 300]);
        let mut buf = [0u8; 3];

        assert!(matches!(
            spi.transfer(0, &mut buf),
            Err(SpiError::NotConfigured(0))
        ));
        spi.setup(0, 1_000_000).unwrap();
        assert_eq!(spi.transfer(0, &mut buf).unwrap(), 3);
        assert_eq!(buf, [6, 1, 44]);

        spi.set_source(0, &[6, 1]);
        let mut fresh = [9u8; 3];
        assert!(matches!(
            spi.transfer(0, &mut fresh),
            Err(SpiError::ShortRead { wanted: 3, got: 2, .. })
        ));
        assert_eq!(fresh, [9, 9, 9]);
    }
}

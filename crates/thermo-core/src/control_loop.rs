use crate::command::{Command, ControlParameters};
use crate::hal::{GpioError, GpioPort, PinMode, SpiBus, SpiError};
use crate::sampler::{Calibration, ReadingSink, SensorPoller, SensorReading, TickOutcome};
use crate::sync::{LoopSnapshot, StateExchange};
use crate::timebase::TimeBase;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct ControlConfig {
    pub channel: u8,
    pub speed_hz: u32,
    /// Pin driven with the heater decision, if any.
    pub heater_pin: Option<u8>,
    pub calibration: Calibration,
    /// Upper bound on a single idle sleep, so commands are picked up promptly.
    pub idle_sleep: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            channel: 0,
            speed_hz: 1_000_000,
            heater_pin: Some(0),
            calibration: Calibration::default(),
            idle_sleep: Duration::from_millis(10),
        }
    }
}

#[derive(Clone, Default, Debug, Serialize)]
pub struct ExecutionStats {
    pub ticks: u64,
    pub samples: u64,
    pub read_failures: u64,
    pub commands_applied: u64,
    pub heater_write_failures: u64,
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("sensor channel setup failed: {0}")]
    Spi(#[from] SpiError),

    #[error("heater pin setup failed: {0}")]
    Gpio(#[from] GpioError),
}

/// Drives the sensor poller, applies operator commands and actuates the heater.
pub struct ControlLoop<G: GpioPort, S: SpiBus> {
    gpio: G,
    poller: SensorPoller<S>,
    sink: Box<dyn ReadingSink>,
    params: ControlParameters,
    commands: Receiver<Command>,
    config: ControlConfig,
    exchange: Option<Arc<StateExchange>>,
    stats: ExecutionStats,
    timebase: TimeBase,
}

impl<G: GpioPort, S: SpiBus> ControlLoop<G, S> {
    /// Validate the sensor channel and prepare the heater pin.
    pub fn setup(
        mut gpio: G,
        spi: S,
        sink: Box<dyn ReadingSink>,
        params: ControlParameters,
        commands: Receiver<Command>,
        config: ControlConfig,
        timebase: TimeBase,
    ) -> Result<Self, SetupError> {
        let mut poller = SensorPoller::new(spi, config.channel, config.calibration);
        poller.setup(config.speed_hz)?;

        if let Some(pin) = config.heater_pin {
            gpio.set_mode(pin, PinMode::Output)?;
            gpio.digital_write(pin, 0)?;
        }

        Ok(Self {
            gpio,
            poller,
            sink,
            params,
            commands,
            config,
            exchange: None,
            stats: ExecutionStats::default(),
            timebase,
        })
    }

    pub fn with_exchange(mut self, exchange: Arc<StateExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn params(&self) -> &ControlParameters {
        &self.params
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.params.running
    }

    /// Run until `stop` is commanded, the console goes away, or `stop` is raised.
    pub fn run(&mut self, stop: &AtomicBool) -> ExecutionStats {
        while self.params.running && !stop.load(Ordering::Relaxed) {
            let now_ms = self.timebase.millis();
            self.tick(now_ms);
            if !self.params.running {
                break;
            }
            let due_ms = self.poller.due_in_ms(self.timebase.millis(), &self.params);
            thread::sleep(self.config.idle_sleep.min(Duration::from_millis(due_ms)));
        }
        self.shutdown();
        self.stats.clone()
    }

    /// One cycle: drain pending commands, then let the poller sample if due.
    /// Observers see applied commands even when no sample is taken.
    pub fn tick(&mut self, now_ms: u64) -> TickOutcome {
        self.stats.ticks += 1;
        let applied = self.drain_commands();
        if !self.params.running {
            return TickOutcome::Idle;
        }

        let outcome = self.poller.tick(now_ms, &self.params, self.sink.as_mut());
        match outcome {
            TickOutcome::Sampled(reading) => {
                self.stats.samples += 1;
                self.actuate(&reading);
            }
            TickOutcome::Dropped => self.stats.read_failures += 1,
            TickOutcome::Idle if applied == 0 => return outcome,
            TickOutcome::Idle => {}
        }
        self.publish(now_ms, outcome);
        outcome
    }

    /// Apply every pending command; returns how many were applied.
    fn drain_commands(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.commands.try_recv() {
                Ok(cmd) => {
                    self.apply(cmd);
                    applied += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.params.running {
                        log::info!("Command console closed, stopping control loop");
                        self.params.running = false;
                    }
                    break;
                }
            }
        }
        applied
    }

    fn apply(&mut self, cmd: Command) {
        self.params.apply(cmd);
        self.stats.commands_applied += 1;
        match cmd {
            Command::SetInterval { seconds } => {
                log::info!("Changed interval to {} seconds", seconds)
            }
            Command::SetTarget { celsius } => {
                log::info!("Changed target temperature to {:.2} C", celsius)
            }
            Command::ToggleEcho => log::info!(
                "Console output {}",
                if self.params.console_echo {
                    "enabled"
                } else {
                    "disabled"
                }
            ),
            Command::Stop => log::info!("Stop requested"),
        }
    }

    fn actuate(&mut self, reading: &SensorReading) {
        if let Some(pin) = self.config.heater_pin {
            if let Err(e) = self.gpio.digital_write(pin, u8::from(reading.heater_on)) {
                self.stats.heater_write_failures += 1;
                log::warn!("Failed to drive heater pin {}: {}", pin, e);
            }
        }
    }

    fn publish(&self, now_ms: u64, outcome: TickOutcome) {
        let Some(exchange) = &self.exchange else {
            return;
        };
        let last_reading = match outcome {
            TickOutcome::Sampled(reading) => Some(reading),
            _ => exchange.read().last_reading,
        };
        exchange.publish(LoopSnapshot {
            timestamp_ms: now_ms,
            last_reading,
            target_temp_c: self.params.target_temp_c,
            interval_s: self.params.interval_s,
            samples: self.stats.samples,
            read_failures: self.stats.read_failures,
        });
    }

    fn shutdown(&mut self) {
        if let Some(pin) = self.config.heater_pin {
            if let Err(e) = self.gpio.digital_write(pin, 0) {
                log::warn!("Failed to switch heater off: {}", e);
            }
        }
    }
}

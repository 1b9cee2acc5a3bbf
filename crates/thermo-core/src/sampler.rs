use crate::command::ControlParameters;
use crate::hal::{SpiBus, SpiError};
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};

/// Bytes requested from the sensor per sample.
pub const FRAME_LEN: usize = 3;

/// Linear ADC calibration: `full_scale_code` maps to `range_c` degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub full_scale_code: u16,
    pub range_c: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            full_scale_code: 4095,
            range_c: 330.0,
        }
    }
}

impl Calibration {
    /// Codes above full scale extrapolate linearly past `range_c`.
    pub fn temperature(&self, code: u16) -> f64 {
        f64::from(code) * 1000.0 / f64::from(self.full_scale_code) * self.range_c / 1000.0
    }

    /// Inverse of [`Calibration::temperature`], clamped to what a frame can carry.
    pub fn code_for(&self, temperature_c: f64) -> u16 {
        let code = temperature_c * f64::from(self.full_scale_code) / self.range_c;
        code.round().clamp(0.0, f64::from(u16::MAX)) as u16
    }

    /// A zero full scale or a non-positive or non-finite range yields no
    /// usable temperatures.
    pub fn is_valid(&self) -> bool {
        self.full_scale_code > 0 && self.range_c.is_finite() && self.range_c > 0.0
    }
}

/// ADC code of a `[status, high, low]` frame. The status byte is ignored.
pub fn decode_frame(frame: &[u8; FRAME_LEN]) -> u16 {
    (u16::from(frame[1]) << 8) | u16::from(frame[2])
}

/// One completed sample. Rendered as `[millis;temp;heater]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorReading {
    pub timestamp_ms: u64,
    pub temperature_c: f64,
    pub heater_on: bool,
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{};{:.2};{}]",
            self.timestamp_ms,
            self.temperature_c,
            u8::from(self.heater_on)
        )
    }
}

/// Destination for completed samples.
pub trait ReadingSink: Send {
    fn record(&mut self, reading: &SensorReading, echo: bool) -> io::Result<()>;
}

/// Append-only reading log, optionally mirrored to a console stream.
pub struct ReadingLog<W: Write, E: Write> {
    log: W,
    console: E,
}

impl<W: Write, E: Write> ReadingLog<W, E> {
    pub fn new(log: W, console: E) -> Self {
        Self { log, console }
    }

    pub fn into_parts(self) -> (W, E) {
        (self.log, self.console)
    }
}

impl<W: Write + Send, E: Write + Send> ReadingSink for ReadingLog<W, E> {
    fn record(&mut self, reading: &SensorReading, echo: bool) -> io::Result<()> {
        writeln!(self.log, "{reading}")?;
        self.log.flush()?;
        if echo {
            writeln!(self.console, "{reading}")?;
            self.console.flush()?;
        }
        Ok(())
    }
}

/// Phase of the poller at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Sampling,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Interval not yet elapsed; no I/O happened.
    Idle,
    Sampled(SensorReading),
    /// The channel read failed; the cycle was dropped.
    Dropped,
}

/// Interval-gated sampler turning channel frames into heater decisions.
pub struct SensorPoller<S: SpiBus> {
    spi: S,
    channel: u8,
    calibration: Calibration,
    last_sample_ms: Option<u64>,
}

impl<S: SpiBus> SensorPoller<S> {
    pub fn new(spi: S, channel: u8, calibration: Calibration) -> Self {
        Self {
            spi,
            channel,
            calibration,
            last_sample_ms: None,
        }
    }

    /// Validate and configure the sensor channel.
    pub fn setup(&mut self, speed_hz: u32) -> Result<(), SpiError> {
        self.spi.setup(self.channel, speed_hz)
    }

    /// `Sampling` once the interval has elapsed, so the next tick reads the
    /// channel; `Idle` while the tick would do no I/O.
    pub fn state(&self, now_ms: u64, params: &ControlParameters) -> PollerState {
        if self.due_in_ms(now_ms, params) == 0 {
            PollerState::Sampling
        } else {
            PollerState::Idle
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Milliseconds until the next sample is due (0 when due now).
    pub fn due_in_ms(&self, now_ms: u64, params: &ControlParameters) -> u64 {
        match self.last_sample_ms {
            Some(last) => params
                .interval_ms()
                .saturating_sub(now_ms.saturating_sub(last)),
            None => 0,
        }
    }

    /// Run one cycle. Samples when the interval has elapsed since the last
    /// sample (or immediately on the first tick); otherwise does nothing.
    pub fn tick(
        &mut self,
        now_ms: u64,
        params: &ControlParameters,
        sink: &mut dyn ReadingSink,
    ) -> TickOutcome {
        if self.state(now_ms, params) == PollerState::Idle {
            return TickOutcome::Idle;
        }

        let outcome = self.sample(now_ms, params, sink);
        self.last_sample_ms = Some(now_ms);
        outcome
    }

    fn sample(
        &mut self,
        now_ms: u64,
        params: &ControlParameters,
        sink: &mut dyn ReadingSink,
    ) -> TickOutcome {
        let mut frame = [0u8; FRAME_LEN];
        if let Err(e) = self.spi.transfer(self.channel, &mut frame) {
            log::warn!("Dropping sample on channel {}: {}", self.channel, e);
            return TickOutcome::Dropped;
        }

        let temperature_c = self.calibration.temperature(decode_frame(&frame));
        let reading = SensorReading {
            timestamp_ms: now_ms,
            temperature_c,
            heater_on: temperature_c < params.target_temp_c,
        };

        if let Err(e) = sink.record(&reading, params.console_echo) {
            log::warn!("Failed to record reading: {}", e);
        }
        TickOutcome::Sampled(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal_sim::MemorySpi;

    fn params(target: f64, interval_s: u32) -> ControlParameters {
        ControlParameters::new(target, interval_s)
    }

    fn poller(spi: &MemorySpi) -> SensorPoller<MemorySpi> {
        let mut poller = SensorPoller::new(spi.clone(), 0, Calibration::default());
        poller.setup(1_000_000).unwrap();
        poller
    }

    fn log_lines(log: ReadingLog<Vec<u8>, Vec<u8>>) -> (String, String) {
        let (log, console) = log.into_parts();
        (
            String::from_utf8(log).unwrap(),
            String::from_utf8(console).unwrap(),
        )
    }

    #[test]
    fn full_scale_maps_to_range() {
        let cal = Calibration::default();
        assert!((cal.temperature(4095) - 330.0).abs() < 1e-9);
        assert_eq!(cal.temperature(0), 0.0);
    }

    #[test]
    fn decodes_frame_code() {
        assert_eq!(decode_frame(&[6, 0x0F, 0xFF]), 4095);
        assert_eq!(decode_frame(&[0, 0xF1, 0x02]), 0xF102);
    }

    #[test]
    fn over_range_frame_reads_hot_not_cold() {
        let spi = MemorySpi::new();
        spi.set_source(0, &[6, 0x10, 0x00]);
        let mut poller = poller(&spi);
        let mut log = ReadingLog::new(Vec::new(), Vec::new());

        match poller.tick(0, &params(21.5, 1), &mut log) {
            TickOutcome::Sampled(r) => {
                assert!((r.temperature_c - 330.08).abs() < 0.01);
                assert!(!r.heater_on);
            }
            other => panic!("expected sample, got {:?}", other),
        }
        let (lines, _) = log_lines(log);
        assert_eq!(lines, "[0;330.08;0]\n");
    }

    #[test]
    fn calibration_validity() {
        assert!(Calibration::default().is_valid());
        for range_c in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let cal = Calibration {
                range_c,
                ..Calibration::default()
            };
            assert!(!cal.is_valid(), "range {range_c} accepted");
        }
        let cal = Calibration {
            full_scale_code: 0,
            ..Calibration::default()
        };
        assert!(!cal.is_valid());
    }

    #[test]
    fn reading_renders_log_line() {
        let reading = SensorReading {
            timestamp_ms: 1234,
            temperature_c: 20.0,
            heater_on: true,
        };
        assert_eq!(reading.to_string(), "[1234;20.00;1]");
    }

    #[test]
    fn idle_tick_does_no_io() {
        let spi = MemorySpi::new();
        let cal = Calibration::default();
        let code = cal.code_for(20.0);
        spi.set_source(0, &[6, i64::from(code >> 8), i64::from(code & 0xFF)]);
        let mut poller = poller(&spi);
        let mut log = ReadingLog::new(Vec::new(), Vec::new());
        let p = params(21.5, 5);

        assert!(matches!(
            poller.tick(0, &p, &mut log),
            TickOutcome::Sampled(_)
        ));
        assert_eq!(spi.transfers(), 1);

        assert_eq!(poller.state(4_999, &p), PollerState::Idle);
        assert_eq!(poller.tick(4_999, &p, &mut log), TickOutcome::Idle);
        assert_eq!(spi.transfers(), 1);

        assert_eq!(poller.state(5_000, &p), PollerState::Sampling);
        assert!(matches!(
            poller.tick(5_000, &p, &mut log),
            TickOutcome::Sampled(_)
        ));
        assert_eq!(spi.transfers(), 2);
        assert_eq!(poller.state(5_000, &p), PollerState::Idle);

        let (lines, console) = log_lines(log);
        assert_eq!(lines.lines().count(), 2);
        assert!(console.is_empty());
    }

    #[test]
    fn heater_follows_target() {
        let spi = MemorySpi::new();
        let cal = Calibration::default();
        let mut poller = poller(&spi);
        let mut log = ReadingLog::new(Vec::new(), Vec::new());
        let mut p = params(21.5, 1);
        p.console_echo = true;

        for (now, temp, expected) in [(0, 20.0, true), (1_000, 22.0, false)] {
            let code = cal.code_for(temp);
            spi.set_source(0, &[6, i64::from(code >> 8), i64::from(code & 0xFF)]);
            let outcome = poller.tick(now, &p, &mut log);
            match outcome {
                TickOutcome::Sampled(r) => assert_eq!(r.heater_on, expected),
                other => panic!("expected sample, got {:?}", other),
            }
        }

        let (lines, console) = log_lines(log);
        let flags: Vec<&str> = lines
            .lines()
            .map(|l| l.trim_end_matches(']').rsplit(';').next().unwrap())
            .collect();
        assert_eq!(flags, vec!["1", "0"]);
        assert_eq!(lines, console);
    }

    #[test]
    fn failed_read_drops_cycle_and_waits_for_next_interval() {
        let spi = MemorySpi::new();
        let mut poller = poller(&spi);
        let mut log = ReadingLog::new(Vec::new(), Vec::new());
        let p = params(21.5, 2);

        assert_eq!(poller.tick(0, &p, &mut log), TickOutcome::Dropped);
        assert_eq!(poller.tick(1_000, &p, &mut log), TickOutcome::Idle);
        assert_eq!(spi.transfers(), 1);

        let (lines, _) = log_lines(log);
        assert!(lines.is_empty());
    }
}

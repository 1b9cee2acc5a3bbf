//! File-backed SPI sensor channels.
//!
//! Each channel reads the first line of `<dir>/wiringPiSPI_<channel>`: decimal
//! integers separated by spaces or commas, each masked to 8 bits.

use crate::lock::{open_exclusive, open_shared};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thermo_core::hal::{cap_transfer_len, MAX_SPI_TRANSFER};
use thermo_core::{ChannelConfig, SpiBus, SpiError, MAX_CHANNELS};
use tracing::warn;

pub const DEFAULT_SPI_DIR: &str = "/tmp";

pub fn channel_path(dir: &Path, channel: u8) -> PathBuf {
    dir.join(format!("wiringPiSPI_{channel}"))
}

/// Leading integer tokens of the first line, masked to bytes.
pub fn parse_sample_line(text: &str) -> Vec<u8> {
    text.lines()
        .next()
        .unwrap_or_default()
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map_while(|token| token.parse::<i64>().ok())
        .map(|value| (value & 0xFF) as u8)
        .collect()
}

/// Publish a sample line for `channel` under an exclusive lock.
pub fn write_channel_source(dir: &Path, channel: u8, values: &[u8]) -> io::Result<PathBuf> {
    let path = channel_path(dir, channel);
    let line = values
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    open_exclusive(&path)?.rewrite(&line)?;
    Ok(path)
}

/// Remove the sample source for `channel`, taking the lock first so no reader
/// is mid-parse.
pub fn remove_channel_source(dir: &Path, channel: u8) -> io::Result<()> {
    let path = channel_path(dir, channel);
    let _guard = open_exclusive(&path)?;
    fs::remove_file(&path)
}

#[derive(Debug)]
pub struct FileSpi {
    dir: PathBuf,
    channels: Vec<ChannelConfig>,
}

impl FileSpi {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            channels: (0..MAX_CHANNELS).map(ChannelConfig::unconfigured).collect(),
        }
    }

    pub fn channel_path(&self, channel: u8) -> PathBuf {
        channel_path(&self.dir, channel)
    }

    pub fn channel(&self, channel: u8) -> Option<&ChannelConfig> {
        self.channels.get(usize::from(channel))
    }

    fn read_source(&self, channel: u8, len: usize) -> Result<[u8; MAX_SPI_TRANSFER], SpiError> {
        if channel >= MAX_CHANNELS {
            return Err(SpiError::InvalidChannel(channel));
        }
        if !self.channels[usize::from(channel)].configured {
            return Err(SpiError::NotConfigured(channel));
        }

        let path = self.channel_path(channel);
        let text = open_shared(&path)
            .and_then(|mut source| source.read_all())
            .map_err(|e| SpiError::SourceUnavailable {
                channel,
                reason: format!("cannot open {}: {}", path.display(), e),
            })?;

        let values = parse_sample_line(&text);
        if values.len() < len {
            return Err(SpiError::ShortRead {
                channel,
                wanted: len,
                got: values.len(),
            });
        }
        let mut frame = [0u8; MAX_SPI_TRANSFER];
        frame[..len].copy_from_slice(&values[..len]);
        Ok(frame)
    }
}

impl Default for FileSpi {
    fn default() -> Self {
        Self::new(DEFAULT_SPI_DIR)
    }
}

impl SpiBus for FileSpi {
    fn setup(&mut self, channel: u8, speed_hz: u32) -> Result<(), SpiError> {
        let config = ChannelConfig::validate(channel, speed_hz).map_err(|e| {
            warn!(channel, speed_hz, error = %e, "SPI setup rejected");
            e
        })?;
        self.channels[usize::from(channel)] = config;
        Ok(())
    }

    fn transfer(&mut self, channel: u8, buf: &mut [u8]) -> Result<usize, SpiError> {
        let len = cap_transfer_len(buf.len());
        match self.read_source(channel, len) {
            Ok(frame) => {
                buf[..len].copy_from_slice(&frame[..len]);
                Ok(len)
            }
            Err(e) => {
                warn!(channel, error = %e, "Problem getting values from SPI channel");
                Err(e)
            }
        }
    }
}

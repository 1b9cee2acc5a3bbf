//! Operator and lifecycle audit trail.
//!
//! One JSON object per line, appended as a single write so concurrent
//! callers (control thread, console thread) never interleave records:
//!
//! ```text
//! {"timestamp_us":1200,"unix_us":...,"event":"config_change","command":{"command":"set_target","celsius":21.5}}
//! ```

use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use thermo_core::{Command, CommandError, ControlParameters, ExecutionStats, TimeBase};

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum AuditEvent<'a> {
    SystemStart {
        version: &'static str,
        parameters: &'a ControlParameters,
        channel: u8,
        heater_pin: Option<u8>,
    },
    ConfigChange {
        command: &'a Command,
    },
    CommandRejected {
        error: String,
    },
    SystemShutdown {
        stats: &'a ExecutionStats,
    },
}

#[derive(Debug, Serialize)]
struct AuditRecord<'a> {
    timestamp_us: u64,
    unix_us: u64,
    #[serde(flatten)]
    event: AuditEvent<'a>,
}

/// Append-only JSONL audit log stamped with the controller's clock.
pub struct AuditLogger {
    file: Mutex<File>,
    timebase: TimeBase,
}

impl AuditLogger {
    /// Open `path` for appending, creating parent directories.
    pub fn open(path: &Path, timebase: TimeBase) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            timebase,
        })
    }

    pub fn log_start(
        &self,
        parameters: &ControlParameters,
        channel: u8,
        heater_pin: Option<u8>,
    ) -> io::Result<()> {
        self.append(AuditEvent::SystemStart {
            version: env!("CARGO_PKG_VERSION"),
            parameters,
            channel,
            heater_pin,
        })
    }

    pub fn log_command(&self, command: &Command) -> io::Result<()> {
        self.append(AuditEvent::ConfigChange { command })
    }

    pub fn log_rejection(&self, error: &CommandError) -> io::Result<()> {
        self.append(AuditEvent::CommandRejected {
            error: error.to_string(),
        })
    }

    pub fn log_shutdown(&self, stats: &ExecutionStats) -> io::Result<()> {
        self.append(AuditEvent::SystemShutdown { stats })
    }

    fn append(&self, event: AuditEvent<'_>) -> io::Result<()> {
        let record = AuditRecord {
            timestamp_us: self.timebase.micros(),
            unix_us: self.timebase.unix_us(),
            event,
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        self.file.lock().unwrap().write_all(&line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::tempdir;

    fn records(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn records_session_as_jsonl() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit").join("audit.jsonl");
        let logger = AuditLogger::open(&path, TimeBase::new()).unwrap();

        logger
            .log_start(&ControlParameters::new(21.5, 5), 0, Some(0))
            .unwrap();
        logger
            .log_command(&Command::SetInterval { seconds: 9 })
            .unwrap();
        logger
            .log_rejection(&CommandError::Unknown("heat".into()))
            .unwrap();
        logger
            .log_shutdown(&ExecutionStats {
                samples: 4,
                read_failures: 1,
                ..ExecutionStats::default()
            })
            .unwrap();

        let records = records(&path);
        let events: Vec<&str> = records
            .iter()
            .map(|r| r["event"].as_str().unwrap())
            .collect();
        assert_eq!(
            events,
            [
                "system_start",
                "config_change",
                "command_rejected",
                "system_shutdown"
            ]
        );

        assert_eq!(records[0]["parameters"]["target_temp_c"], 21.5);
        assert_eq!(records[0]["heater_pin"], 0);
        assert_eq!(records[1]["command"]["command"], "set_interval");
        assert_eq!(records[1]["command"]["seconds"], 9);
        assert_eq!(records[2]["error"], "unknown command 'heat'");
        assert_eq!(records[3]["stats"]["samples"], 4);
        let first = records[0]["timestamp_us"].as_u64().unwrap();
        let last = records[3]["timestamp_us"].as_u64().unwrap();
        assert!(last >= first);
    }

    #[test]
    fn reopening_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        for _ in 0..2 {
            let logger = AuditLogger::open(&path, TimeBase::new()).unwrap();
            logger.log_command(&Command::Stop).unwrap();
        }

        let records = records(&path);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r["command"]["command"] == "stop"));
    }
}

/// Name of a process value across logs and metrics.
#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub key: &'static str,
    pub metric: &'static str,
}

pub const TEMPERATURE_C: Tag = Tag {
    key: "temperature_c",
    metric: "thermo_temperature_celsius",
};

pub const TARGET_TEMP_C: Tag = Tag {
    key: "target_temp_c",
    metric: "thermo_target_temperature_celsius",
};

pub const HEATER_ON: Tag = Tag {
    key: "heater_on",
    metric: "thermo_heater_on",
};

pub const SAMPLE_INTERVAL_S: Tag = Tag {
    key: "interval_s",
    metric: "thermo_sample_interval_seconds",
};

pub const SAMPLES: Tag = Tag {
    key: "samples",
    metric: "thermo_samples_total",
};

pub const READ_FAILURES: Tag = Tag {
    key: "read_failures",
    metric: "thermo_sensor_read_failures_total",
};

use crate::infra::audit::AuditLogger;
use crate::runtime::config::{Backend, RuntimeConfig};
use crate::runtime::logging::init_tracing;
use crate::runtime::prompt::ask;
use crate::runtime::telemetry;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use thermo_core::command::{parse_interval, parse_temperature};
use thermo_core::console::HELP;
use thermo_core::{
    ChannelConfig, CommandConsole, ControlLoop, ControlParameters, ExecutionStats, GpioError,
    GpioPort, MemoryGpio, MemorySpi, ReadingLog, SetupError, SpiBus, SpiError, StateExchange,
    TimeBase,
};
use thermo_io::{FileGpio, FileSpi};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("sensor channel rejected: {0}")]
    Channel(#[from] SpiError),

    #[error("device image unavailable: {0}")]
    Gpio(#[from] GpioError),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("cannot open reading log {path}: {source}")]
    Output { path: PathBuf, source: io::Error },

    #[error("cannot open audit log {path}: {source}")]
    Audit { path: PathBuf, source: io::Error },

    #[error("startup prompt failed: {0}")]
    Prompt(io::Error),

    #[error("cannot start command console: {0}")]
    Spawn(io::Error),
}

pub fn run_from_args() -> ExitCode {
    let config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Run with --help for usage.");
            return ExitCode::from(2);
        }
    };
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }

    let _log_guard = init_tracing(config.json_logs, config.log_file.as_deref());

    match run(config) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Startup failed");
            ExitCode::FAILURE
        }
    }
}

pub fn run(config: RuntimeConfig) -> Result<ExecutionStats, StartupError> {
    // Configuration errors abort before the operator is asked anything.
    ChannelConfig::validate(config.channel, config.speed_hz)?;

    telemetry::init();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    match config.backend {
        Backend::File => {
            let gpio = FileGpio::setup(&config.gpio_image)?;
            info!(path = %gpio.path().display(), "Device image initialized");
            let timebase = gpio.timebase();
            let spi = FileSpi::new(&config.spi_dir);
            drive(gpio, spi, timebase, &config)
        }
        Backend::Memory => {
            let spi = MemorySpi::new();
            let code = config.calibration().code_for(config.sim_temp_c);
            spi.set_source(
                config.channel,
                &[6, i64::from(code >> 8), i64::from(code & 0xFF)],
            );
            info!(temperature_c = config.sim_temp_c, "Using in-memory hardware");
            drive(MemoryGpio::new(), spi, TimeBase::new(), &config)
        }
    }
}

fn startup_parameters(config: &RuntimeConfig) -> Result<ControlParameters, StartupError> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut prompt_out = io::stderr();

    let target = match config.target_temp_c {
        Some(target) => target,
        None => ask(
            &mut input,
            &mut prompt_out,
            "Target temperature (C)",
            parse_temperature,
        )
        .map_err(StartupError::Prompt)?,
    };
    let interval = match config.interval_s {
        Some(interval) => interval,
        None => ask(
            &mut input,
            &mut prompt_out,
            "Sampling interval (s)",
            parse_interval,
        )
        .map_err(StartupError::Prompt)?,
    };

    let mut params = ControlParameters::new(target, interval);
    params.console_echo = config.echo;
    Ok(params)
}

fn drive<G, S>(
    gpio: G,
    spi: S,
    timebase: TimeBase,
    config: &RuntimeConfig,
) -> Result<ExecutionStats, StartupError>
where
    G: GpioPort + 'static,
    S: SpiBus + 'static,
{
    let audit_logger = open_audit_log(config.audit_path.as_deref(), timebase)?;
    let output = File::create(&config.output_path).map_err(|source| StartupError::Output {
        path: config.output_path.clone(),
        source,
    })?;
    let sink = ReadingLog::new(BufWriter::new(output), io::stdout());

    let params = startup_parameters(config)?;
    let (tx, rx) = mpsc::channel();
    let exchange = Arc::new(StateExchange::new());
    let mut control = ControlLoop::setup(
        gpio,
        spi,
        Box::new(sink),
        params,
        rx,
        config.control_config(),
        timebase,
    )?
    .with_exchange(Arc::clone(&exchange));

    info!(
        target_temp_c = params.target_temp_c,
        interval_s = params.interval_s,
        console_echo = params.console_echo,
        channel = config.channel,
        output = %config.output_path.display(),
        "Starting control loop"
    );
    audit(&audit_logger, |log| {
        log.log_start(&params, config.channel, config.heater_pin)
    });

    eprint!("{HELP}");
    let console_logger = audit_logger.clone();
    let console_handle = thread::Builder::new()
        .name("command-console".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            CommandConsole::new(stdin.lock(), tx).run(|result| {
                audit(&console_logger, |log| match result {
                    Ok(cmd) => log.log_command(cmd),
                    Err(e) => log.log_rejection(e),
                })
            })
        })
        .map_err(StartupError::Spawn)?;

    let stop = Arc::new(AtomicBool::new(false));
    let metrics_updater = config
        .metrics_addr
        .as_ref()
        .map(|_| telemetry::start_metrics_updater(Arc::clone(&exchange), Arc::clone(&stop)));

    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
        let stop_timer = Arc::clone(&stop);
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(seconds));
            stop_timer.store(true, Ordering::Relaxed);
        });
    }

    let stats = control.run(&stop);
    stop.store(true, Ordering::Relaxed);

    if let Some(handle) = metrics_updater {
        let _ = handle.join();
    }
    // A console blocked on stdin cannot be cancelled; only join one that is done.
    if console_handle.is_finished() {
        match console_handle.join() {
            Ok(exit) => info!(?exit, "Command console finished"),
            Err(_) => warn!("Command console panicked"),
        }
    } else {
        info!("Command console still waiting for input, not joining");
    }

    info!(
        samples = stats.samples,
        read_failures = stats.read_failures,
        commands_applied = stats.commands_applied,
        heater_write_failures = stats.heater_write_failures,
        "Loop stopped"
    );
    audit(&audit_logger, |log| log.log_shutdown(&stats));
    Ok(stats)
}

fn open_audit_log(
    path: Option<&Path>,
    timebase: TimeBase,
) -> Result<Option<Arc<AuditLogger>>, StartupError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let logger = AuditLogger::open(path, timebase).map_err(|source| StartupError::Audit {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "Audit logging enabled");
    Ok(Some(Arc::new(logger)))
}

/// Audit failures are reported but never stop the controller.
fn audit(
    logger: &Option<Arc<AuditLogger>>,
    write: impl FnOnce(&AuditLogger) -> io::Result<()>,
) {
    if let Some(logger) = logger {
        if let Err(e) = write(logger) {
            warn!(error = %e, "Failed to write audit entry");
        }
    }
}

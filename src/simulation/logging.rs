use std::fs;
use std::io;
use tracing::dispatcher::DefaultGuard;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;
use tracing_subscriber::{fmt, registry};

use crate::simulation::config::{Config, Logging};

// This is a helper struct to store the logger guards. When they are dropped, logging can be reset.
#[allow(dead_code)]
pub struct LogGuards {
    log_guard: Option<WorkerGuard>,
    default: DefaultGuard,
}

pub fn init_std_out_logging_thread_local() -> DefaultGuard {
    let collector = registry().with(
        fmt::Layer::new()
            .with_writer(io::stdout)
            .with_filter(LevelFilter::INFO),
    );
    tracing::subscriber::set_default(collector)
}

/// Installs console logging and, if configured, a json log file in the output directory.
pub fn init_logging(config: &Config) -> io::Result<LogGuards> {
    let output = config.output();

    let (log_layer, log_guard) = if Logging::Info == output.logging {
        fs::create_dir_all(&output.output_dir)?;
        let log_file_appender = rolling::never(&output.output_dir, "log.txt");
        let (log_file, log_guard) = non_blocking(log_file_appender);
        let layer = fmt::Layer::new()
            .with_writer(log_file)
            .json()
            .with_ansi(false)
            .with_filter(LevelFilter::INFO);
        (Some(layer), Some(log_guard))
    } else {
        (None, None)
    };

    let console_layer = fmt::layer()
        .with_writer(io::stdout)
        .with_filter(LevelFilter::INFO);

    // Add `Optional`s. If None, then the corresponding layer is not added.
    let collector = registry().with(log_layer).with(console_layer);
    let default = tracing::subscriber::set_default(collector);

    Ok(LogGuards { log_guard, default })
}

/// Warnings which may occur once per link and would flood the log on large networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    StorageCapacityEnlarged,
    CongestedDensityTooHigh,
    CongestedDensityTooLow,
}

impl WarningKind {
    fn limit(&self) -> u32 {
        match self {
            WarningKind::StorageCapacityEnlarged => 10,
            WarningKind::CongestedDensityTooHigh => 1,
            WarningKind::CongestedDensityTooLow => 1,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Counts warnings per kind and forwards only the first few of each kind to tracing.
#[derive(Debug, Default, Clone)]
pub struct WarnLimiter {
    counts: [u32; 3],
}

impl WarnLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs the message produced by `message` unless the limit for `kind` is reached. The message
    /// is only built if it is logged.
    pub fn warn<F>(&mut self, kind: WarningKind, message: F)
    where
        F: FnOnce() -> String,
    {
        let count = &mut self.counts[kind.index()];
        if *count < kind.limit() {
            warn!(kind = ?kind, "{}", message());
            if *count + 1 == kind.limit() {
                warn!(kind = ?kind, "Additional warnings of this type are suppressed.");
            }
        }
        *count = count.saturating_add(1);
    }

    /// Number of times `kind` was reported, including suppressed reports.
    pub fn count(&self, kind: WarningKind) -> u32 {
        self.counts[kind.index()]
    }
}

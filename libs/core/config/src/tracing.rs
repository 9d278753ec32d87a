use crate::{ConfigError, Environment, FromEnv};
use std::fmt::Display;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::dispatcher::DefaultGuard;
use tracing::{debug, info, Dispatch};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

/// Install color-eyre with a project-standard configuration.
///
/// Call this early in the main() before any fallible operations to ensure
/// colored error output. Safe to call multiple times.
pub fn install_color_eyre() {
    let _ = color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install();
}

/// Logger settings.
///
/// - `mode`: development adds a human-readable console layer at `debug`
///   (overridable with `RUST_LOG`); production does not.
/// - `file`: when set, `info`-level JSON lines are appended to this file.
///   Without a file, production writes the JSON lines to stdout instead.
#[derive(Clone, Debug, Default)]
pub struct LoggerConfig {
    pub mode: Environment,
    pub file: Option<PathBuf>,
}

impl LoggerConfig {
    pub fn new(mode: Environment) -> Self {
        Self { mode, file: None }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }
}

impl FromEnv for LoggerConfig {
    /// - APP_ENV: "production" for JSON-only output (default: development)
    /// - LOG_FILE: optional path for JSON log lines
    fn from_env() -> Result<Self, ConfigError> {
        let file = std::env::var("LOG_FILE")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            mode: Environment::from_env(),
            file,
        })
    }
}

/// An explicitly constructed logger.
///
/// Building a `Logger` never touches global state. The binary calls
/// [`Logger::install`] once at startup; tests use [`Logger::scoped`] so
/// every test gets its own sinks.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
    mode: Environment,
}

impl Logger {
    pub fn new(config: &LoggerConfig) -> Result<Self, ConfigError> {
        let console = config.mode.is_development().then(|| {
            let filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
            fmt::layer()
                .with_target(false)
                .with_file(false)
                .with_line_number(false)
                .pretty()
                .with_filter(filter)
        });

        let file = match &config.file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| ConfigError::LogFile {
                        path: path.display().to_string(),
                        source,
                    })?;
                Some(
                    fmt::layer()
                        .json()
                        .with_target(false)
                        .flatten_event(true)
                        .with_writer(Mutex::new(file))
                        .with_filter(LevelFilter::INFO),
                )
            }
            None => None,
        };

        let stdout_json = (config.file.is_none() && config.mode.is_production()).then(|| {
            fmt::layer()
                .json()
                .with_target(false)
                .flatten_event(true)
                .with_filter(LevelFilter::INFO)
        });

        let subscriber = tracing_subscriber::registry()
            .with(console)
            .with(file)
            .with(stdout_json)
            .with(tracing_error::ErrorLayer::default());

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
            mode: config.mode.clone(),
        })
    }

    pub fn mode(&self) -> &Environment {
        &self.mode
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Make this logger the process-wide default. Only the first call succeeds.
    pub fn install(&self) -> Result<(), ConfigError> {
        tracing::dispatcher::set_global_default(self.dispatch.clone())
            .map_err(|_| ConfigError::LoggerAlreadyInstalled)?;
        info!(mode = ?self.mode, "Logger installed");
        Ok(())
    }

    /// Route events from the current thread to this logger until the guard drops.
    pub fn scoped(&self) -> DefaultGuard {
        tracing::dispatcher::set_default(&self.dispatch)
    }
}

/// Build a logger from `config` and install it globally.
///
/// Safe to call multiple times: if a global logger is already installed the
/// new one is returned without being installed (common in tests).
pub fn init_tracing(config: &LoggerConfig) -> Result<Logger, ConfigError> {
    let logger = Logger::new(config)?;
    match logger.install() {
        Ok(()) => {}
        Err(ConfigError::LoggerAlreadyInstalled) => {
            debug!("Tracing already initialized, skipping re-initialization");
        }
        Err(e) => return Err(e),
    }
    Ok(logger)
}

/// Log an unrecoverable startup failure and terminate the process.
///
/// Reserved for startup; runtime failures go through regular error values.
pub fn fatal(message: &str, error: impl Display) -> ! {
    tracing::error!(error = %format!("{error:#}"), "{message}");
    std::process::exit(1)
}

use std::{fmt::Write, path::PathBuf, sync::Arc};

use colorful::Colorful;
use indenter::indented;
use tracing::{subscriber::DefaultGuard, Level};
use tracing_subscriber::{layer::SubscriberExt, Layer};

/// Log files kept by the hourly rotation.
const MAX_LOG_FILES: usize = 6;

/// Stdout logging plus an optional rotating log file.
///
/// Nothing is installed until [`LoggingConfig::load_logger`] runs; the
/// subscriber is scoped to the thread and removed when the config drops.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: Level,
    pub logging_enabled: bool,
    pub logger_name: String,
    /// When set, an hourly rotating log file is written here in addition to stdout.
    pub log_dir: Option<PathBuf>,
    guard: Option<Arc<DefaultGuard>>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            logging_enabled: true,
            logger_name: "fitcheck".to_string(),
            log_dir: None,
            guard: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.guard.is_some()
    }

    pub fn load_logger(&mut self) -> crate::Result<()> {
        if !self.logging_enabled {
            self.guard = None;
            return Ok(());
        }
        self.guard = Some(Arc::new(self.install()?));
        println!(
            "{}",
            format!("Starting {} Logger", self.logger_name)
                .color(colorful::RGB::new(0, 139, 248))
                .bold()
        );
        Ok(())
    }

    fn install(&self) -> crate::Result<DefaultGuard> {
        let filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(self.level.into())
            .parse_lossy("");

        let file_layer = match &self.log_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| {
                    crate::anyhow!("Failed to create log directory {}: {e}", dir.display())
                })?;
                let appender = tracing_appender::rolling::RollingFileAppender::builder()
                    .rotation(tracing_appender::rolling::Rotation::HOURLY)
                    .max_log_files(MAX_LOG_FILES)
                    .filename_prefix(&self.logger_name)
                    .filename_suffix("log")
                    .build(dir)?;
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(appender)
                        .boxed(),
                )
            }
            None => None,
        };

        let stdout_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(false)
            .with_writer(std::io::stdout);

        Ok(tracing::subscriber::set_default(
            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .with(stdout_layer),
        ))
    }
}

/// Logging setters for anything that owns a [`LoggingConfig`].
pub trait LoggingConfigTrait: Sized {
    fn logging_config_mut(&mut self) -> &mut LoggingConfig;

    fn logging_enabled(mut self, enabled: bool) -> Self {
        self.logging_config_mut().logging_enabled = enabled;
        self
    }

    fn logger_name<S: Into<String>>(mut self, logger_name: S) -> Self {
        self.logging_config_mut().logger_name = logger_name.into();
        self
    }

    fn log_dir<P: Into<PathBuf>>(mut self, log_dir: P) -> Self {
        self.logging_config_mut().log_dir = Some(log_dir.into());
        self
    }

    fn log_level(mut self, level: Level) -> Self {
        self.logging_config_mut().level = level;
        self
    }

    /// Which table entry a GPU alias resolved to, which family matched.
    fn log_level_trace(self) -> Self {
        self.log_level(Level::TRACE)
    }

    /// Per-component byte counts and the dtype each one used.
    fn log_level_debug(self) -> Self {
        self.log_level(Level::DEBUG)
    }

    /// Only estimates built on an unrecognized architecture or a defaulted
    /// profile field.
    fn log_level_warn(self) -> Self {
        self.log_level(Level::WARN)
    }
}

impl LoggingConfigTrait for LoggingConfig {
    fn logging_config_mut(&mut self) -> &mut LoggingConfig {
        self
    }
}

/// Writes each line indented by one level, newline terminated.
pub fn i_nlns(
    f: &mut std::fmt::Formatter<'_>,
    args: &[std::fmt::Arguments<'_>],
) -> std::fmt::Result {
    for arg in args {
        writeln!(indented(f), "{arg}")?;
    }
    Ok(())
}

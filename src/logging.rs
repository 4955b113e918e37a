use std::io::Write;

use log::LevelFilter;

use crate::config::LogConfig;

/// Owns the process logger. Dropping it flushes pending output.
pub struct Logging {
    level: LevelFilter,
}

impl Logging {
    /// Installs the logger. `RUST_LOG` directives still apply on top of the
    /// configured level.
    pub fn init(config: &LogConfig) -> Result<Self, log::SetLoggerError> {
        let logger = builder(config.level).build();
        let level = logger.filter();
        log::set_boxed_logger(Box::new(logger))?;
        log::set_max_level(level);
        Ok(Self { level })
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }
}

impl Drop for Logging {
    fn drop(&mut self) {
        log::logger().flush();
    }
}

fn builder(level: LevelFilter) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            let style = buf.default_level_style(record.level());
            writeln!(
                buf,
                "[{}] [{style}{}{style:#}] {}",
                chrono::Local::now().format("%d-%m-%Y %H:%M:%S"),
                record.level(),
                record.args()
            )
        });
    builder
}

/// Parses a level name, case-insensitively. `warning` and `critical` are
/// accepted for compatibility with existing deployments.
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.trim().to_lowercase().as_str() {
        "warning" => Some(LevelFilter::Warn),
        "critical" | "fatal" => Some(LevelFilter::Error),
        other => other.parse().ok(),
    }
}

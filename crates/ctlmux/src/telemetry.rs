//! Telemetry set-up for hosts embedding the dispatcher.
//!
//! Every event the dispatcher emits carries one of the [`ctlmux_config::LogArea`] targets
//! (`ctlmux::dispatch`, `ctlmux::table`, `ctlmux::registry`,
//! `ctlmux::namespace`). [`dispatch_filter`] starts from the configured base
//! filter and raises the areas listed in [`Config::trace_areas`] to `trace`,
//! so one area can be inspected without drowning in the others.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, info, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt;

use ctlmux_config::{Config, LogFormat};

use crate::dispatch::DISPATCH_TARGET;

static INSTALLED: OnceCell<LogFormat> = OnceCell::new();

/// Proof that the global subscriber is installed, with the format it uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Returns the format chosen when the subscriber was installed.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The base filter or an area directive did not parse.
    #[error("invalid log filter '{directive}': {source}")]
    Filter {
        /// Directive text that failed.
        directive: String,
        /// Parser failure.
        #[source]
        source: ParseError,
    },
    /// Another global subscriber was installed first.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Builds the `EnvFilter` for a dispatcher host.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] when the base filter does not parse.
pub fn dispatch_filter(config: &Config) -> Result<EnvFilter, TelemetryError> {
    let mut filter =
        EnvFilter::try_new(config.log_filter()).map_err(|source| TelemetryError::Filter {
            directive: config.log_filter().to_owned(),
            source,
        })?;
    for area in config.trace_areas().areas() {
        let directive = area.trace_directive();
        let parsed = directive
            .parse()
            .map_err(|source| TelemetryError::Filter {
                directive: directive.clone(),
                source,
            })?;
        filter = filter.add_directive(parsed);
    }
    Ok(filter)
}

/// Installs the global subscriber on first use.
///
/// Later calls return the handle from the first installation, even when
/// `config` asks for a different format.
///
/// # Examples
///
/// ```rust
/// use ctlmux::telemetry;
/// use ctlmux_config::Config;
///
/// # fn main() -> Result<(), ctlmux::telemetry::TelemetryError> {
/// let config = Config::default();
/// let first = telemetry::initialise(&config)?;
/// let second = telemetry::initialise(&config)?;
/// assert_eq!(first, second);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter does not parse or another
/// subscriber is already installed.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| install(config))
        .map(|format| TelemetryHandle { format: *format })
}

fn install(config: &Config) -> Result<LogFormat, TelemetryError> {
    let filter = dispatch_filter(config)?;
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };
    tracing::subscriber::set_global_default(subscriber)?;

    info!(
        target: DISPATCH_TARGET,
        format = %config.log_format(),
        traced = %config.trace_areas(),
        handle_capacity = config.handle_capacity(),
        "telemetry installed"
    );
    Ok(config.log_format())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tracing::level_filters::LevelFilter;

    use super::*;

    fn config(filter: &str, areas: &str) -> Config {
        Config {
            log_filter: filter.to_owned(),
            trace_areas: areas.parse().expect("area list parses"),
            ..Config::default()
        }
    }

    #[test]
    fn malformed_filter_is_reported() {
        let error = dispatch_filter(&config("ctlmux=notalevel", ""))
            .expect_err("filter should not parse");
        match error {
            TelemetryError::Filter { directive, .. } => assert_eq!(directive, "ctlmux=notalevel"),
            TelemetryError::Subscriber(other) => panic!("unexpected error: {other}"),
        }
    }

    #[rstest]
    #[case::base_only("warn", "", LevelFilter::WARN)]
    #[case::one_area("warn", "table", LevelFilter::TRACE)]
    #[case::every_area("error", "all", LevelFilter::TRACE)]
    fn traced_areas_raise_the_ceiling(
        #[case] base: &str,
        #[case] areas: &str,
        #[case] expected: LevelFilter,
    ) {
        let filter = dispatch_filter(&config(base, areas)).expect("filter builds");
        assert_eq!(filter.max_level_hint(), Some(expected));
    }
}

//! Shared configuration for hosts embedding the `ctlmux` dispatcher.
//!
//! [`Config`] is layered by `ortho_config`: built-in defaults, then an optional
//! configuration file, then `CTLMUX_*` environment variables, then command
//! line flags. A host that has its own configuration story can deserialize a
//! [`Config`] directly instead.
//!
//! | Field | Flag | Environment |
//! |---|---|---|
//! | `log_filter` | `--log-filter` | `CTLMUX_LOG_FILTER` |
//! | `log_format` | `--log-format` | `CTLMUX_LOG_FORMAT` |
//! | `trace_areas` | `--trace-areas` | `CTLMUX_TRACE_AREAS` |
//! | `handle_capacity` | `--handle-capacity` | `CTLMUX_HANDLE_CAPACITY` |

mod defaults;
mod logging;

use std::num::NonZeroU32;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_HANDLE_CAPACITY, DEFAULT_LOG_FILTER, default_handle_capacity, default_log_filter,
    default_log_format, default_trace_areas,
};
pub use logging::{LogArea, LogAreas, LogFormat, LogParseError};

/// Runtime configuration for a dispatcher host.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, OrthoConfig)]
#[ortho_config(prefix = "CTLMUX")]
pub struct Config {
    /// `tracing` filter expression, in `EnvFilter` syntax.
    #[serde(default = "default_log_filter")]
    #[ortho_config(default = default_log_filter())]
    pub log_filter: String,
    /// Output format of the telemetry subscriber.
    #[serde(default = "default_log_format")]
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Dispatcher areas traced at full verbosity on top of `log_filter`.
    #[serde(default = "default_trace_areas")]
    #[ortho_config(default = default_trace_areas())]
    pub trace_areas: LogAreas,
    /// Handle capacity given to namespaces that do not choose their own.
    #[serde(default = "default_handle_capacity")]
    #[ortho_config(default = default_handle_capacity())]
    pub handle_capacity: NonZeroU32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            log_format: default_log_format(),
            trace_areas: default_trace_areas(),
            handle_capacity: default_handle_capacity(),
        }
    }
}

impl Config {
    /// Returns the configured log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Returns the configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the dispatcher areas traced beyond the base filter.
    #[must_use]
    pub const fn trace_areas(&self) -> &LogAreas {
        &self.trace_areas
    }

    /// Returns the default per-namespace handle capacity.
    #[must_use]
    pub const fn handle_capacity(&self) -> u32 {
        self.handle_capacity.get()
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use rstest::rstest;

    use super::*;

    fn args(flags: &[&str]) -> Vec<OsString> {
        std::iter::once("ctlmux")
            .chain(flags.iter().copied())
            .map(OsString::from)
            .collect()
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
        assert_eq!(config.log_format(), LogFormat::Json);
        assert!(config.trace_areas().is_empty());
        assert_eq!(config.handle_capacity(), DEFAULT_HANDLE_CAPACITY);
    }

    #[test]
    fn command_line_flags_override_defaults() {
        let config = Config::load_from_iter(args(&[
            "--log-filter",
            "ctlmux=debug",
            "--log-format",
            "compact",
            "--trace-areas",
            "table,registry",
            "--handle-capacity",
            "16",
        ]))
        .expect("flags load");
        assert_eq!(config.log_filter(), "ctlmux=debug");
        assert_eq!(config.log_format(), LogFormat::Compact);
        assert!(config.trace_areas().contains(LogArea::Table));
        assert!(config.trace_areas().contains(LogArea::Registry));
        assert_eq!(config.handle_capacity(), 16);
    }

    #[rstest]
    #[case::unknown_format(&["--log-format", "yaml"])]
    #[case::unknown_area(&["--trace-areas", "dispatch,socket"])]
    #[case::non_numeric_capacity(&["--handle-capacity", "lots"])]
    #[case::negative_capacity(&["--handle-capacity", "-1"])]
    #[case::zero_capacity(&["--handle-capacity", "0"])]
    fn rejects_malformed_flags(#[case] flags: &[&str]) {
        let error = Config::load_from_iter(args(flags)).expect_err("flags must be rejected");
        assert!(!error.to_string().is_empty());
    }

    #[test]
    fn deserializes_partial_documents() {
        let config: Config = serde_json::from_str(r#"{"log_format":"compact","trace_areas":"all"}"#)
            .expect("partial config parses");
        assert_eq!(config.log_format(), LogFormat::Compact);
        assert_eq!(config.trace_areas(), &LogAreas::all());
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
        assert_eq!(config.handle_capacity(), DEFAULT_HANDLE_CAPACITY);
    }

    #[test]
    fn zero_capacity_documents_are_rejected() {
        let result = serde_json::from_str::<Config>(r#"{"handle_capacity":0}"#);
        assert!(result.is_err());
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Output format of the dispatcher's telemetry subscriber.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, fields flattened.
    #[default]
    Json,
    /// Single-line human-readable events.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] or [`LogArea`] from text.
pub type LogParseError = strum::ParseError;

/// Areas of the dispatcher that emit events under their own `tracing` target.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString, EnumIter, Display,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogArea {
    /// Request validation, handler invocation, and session release.
    Dispatch,
    /// Handle allocation, destruction, and draining.
    Table,
    /// Namespace registration and removal.
    Registry,
    /// Namespace teardown.
    Namespace,
}

impl LogArea {
    /// Returns the `tracing` target the area logs under.
    #[must_use]
    pub const fn target(self) -> &'static str {
        match self {
            Self::Dispatch => "ctlmux::dispatch",
            Self::Table => "ctlmux::table",
            Self::Registry => "ctlmux::registry",
            Self::Namespace => "ctlmux::namespace",
        }
    }

    /// Returns an `EnvFilter` directive enabling every event of the area.
    #[must_use]
    pub fn trace_directive(self) -> String {
        format!("{}=trace", self.target())
    }
}

/// Set of dispatcher areas traced at full verbosity regardless of the base
/// log filter.
///
/// Written as a comma-separated list such as `dispatch,table`; `all` selects
/// every area and an empty string selects none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogAreas(Vec<LogArea>);

impl LogAreas {
    /// Returns the set containing every area.
    #[must_use]
    pub fn all() -> Self {
        Self(LogArea::iter().collect())
    }

    /// Returns the selected areas in ascending order.
    #[must_use]
    pub fn areas(&self) -> &[LogArea] {
        &self.0
    }

    /// Returns `true` when no area is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` when `area` is selected.
    #[must_use]
    pub fn contains(&self, area: LogArea) -> bool {
        self.0.binary_search(&area).is_ok()
    }
}

impl FromIterator<LogArea> for LogAreas {
    fn from_iter<I: IntoIterator<Item = LogArea>>(iter: I) -> Self {
        let mut areas: Vec<LogArea> = iter.into_iter().collect();
        areas.sort_unstable();
        areas.dedup();
        Self(areas)
    }
}

impl FromStr for LogAreas {
    type Err = LogParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut selected = Vec::new();
        for item in text.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            if item.eq_ignore_ascii_case("all") {
                return Ok(Self::all());
            }
            selected.push(item.parse::<LogArea>()?);
        }
        Ok(selected.into_iter().collect())
    }
}

impl fmt::Display for LogAreas {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for area in &self.0 {
            if !first {
                formatter.write_str(",")?;
            }
            first = false;
            write!(formatter, "{area}")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for LogAreas {
    type Error = LogParseError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl From<LogAreas> for String {
    fn from(areas: LogAreas) -> Self {
        areas.to_string()
    }
}

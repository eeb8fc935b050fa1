use std::num::NonZeroU32;

use crate::logging::{LogAreas, LogFormat};

/// Default log filter expression used by dispatcher hosts.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default number of live handles a single namespace table may hold.
pub const DEFAULT_HANDLE_CAPACITY: u32 = 1 << 20;

const DEFAULT_HANDLE_CAPACITY_NON_ZERO: NonZeroU32 = match NonZeroU32::new(DEFAULT_HANDLE_CAPACITY)
{
    Some(capacity) => capacity,
    None => NonZeroU32::MIN,
};

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default per-namespace handle capacity.
#[must_use]
pub const fn default_handle_capacity() -> NonZeroU32 {
    DEFAULT_HANDLE_CAPACITY_NON_ZERO
}

/// Areas traced beyond the base filter by default: none.
#[must_use]
pub fn default_trace_areas() -> LogAreas {
    LogAreas::default()
}

//! Foundational low-level utilities shared across hubcast crates.
//!
//! Provides the time helpers used for event timestamps, notification cursor
//! comparisons, and synthesized identifiers.

pub mod time_utils;

pub use time_utils::{
    current_rfc3339, current_unix_timestamp, current_unix_timestamp_ms, parse_rfc3339_to_unix_ms,
};

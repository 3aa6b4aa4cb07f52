//! Shared CLI presentation utilities.
//!
//! Keep this module format-only: no gateway calls.

pub mod tables;

pub use tables::{print_separator, truncate_string};

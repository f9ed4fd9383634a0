//! Trace utilities

/// Trace category for stream capture transitions.
pub const CAPTURE: &str = "capture";
/// Trace category for capture fixtures.
pub const FIXTURES: &str = "fixtures";
/// Trace category for phase wrapping.
pub const PHASES: &str = "phases";

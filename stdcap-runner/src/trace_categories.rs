//! Trace utilities

/// Trace category for test discovery and command execution.
pub const RUNNER: &str = "runner";

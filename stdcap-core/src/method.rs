//! Selection of the per-test capture method.

use std::str::FromStr;

use crate::capture::CaptureStrategy;
use crate::error;
use crate::multi::MultiCaptureOptions;

/// Per-test capturing method.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    serde::Deserialize,
    serde::Serialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CaptureMethod {
    /// Capture writes to file descriptors 0, 1, and 2.
    Fd,
    /// Capture writes made through the process-stream table.
    Sys,
    /// Do not capture.
    No,
}

impl Default for CaptureMethod {
    fn default() -> Self {
        if cfg!(unix) { Self::Fd } else { Self::Sys }
    }
}

impl CaptureMethod {
    /// Parses a method name, reporting unknown names as a usage error.
    pub fn parse(name: &str) -> Result<Self, error::Error> {
        Self::from_str(name).map_err(|_| error::Error::UnknownCaptureMethod(name.to_owned()))
    }

    /// Returns the capture configuration used for the session-wide capture.
    pub const fn session_options(self) -> MultiCaptureOptions {
        match self {
            Self::Fd => MultiCaptureOptions::all(CaptureStrategy::Fd),
            Self::Sys => MultiCaptureOptions::all(CaptureStrategy::Sys),
            Self::No => MultiCaptureOptions::none(),
        }
    }
}

//! Per-test capture of the standard streams. Implements descriptor-level and
//! stream-level capture, their composition over stdin/stdout/stderr, the session-wide
//! capture manager, and capture fixtures for individual tests.

pub mod capture;
mod error;
mod fixture;
mod manager;
mod method;
mod multi;
mod report;
mod stream;
mod streams;
mod sys;
mod trace_categories;

pub use capture::{Availability, Capture, CaptureStrategy, StreamCapture};
pub use error::Error;
pub use fixture::{CaptureFixture, FixtureKind, resolve_fixtures};
pub use manager::{CaptureManager, DisabledGuard};
pub use method::CaptureMethod;
pub use multi::{CaptureResult, MultiCapture, MultiCaptureOptions};
pub use report::{CollectReport, ItemReport, Outcome, Phase, ReportSink, Section};
pub use stream::{RawFd, StreamId};
pub use streams::{MemoryBuffer, StdStream, StdStreams, StreamHandle};

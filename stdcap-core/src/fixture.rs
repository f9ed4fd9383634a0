//! Capture fixtures: captures requested by an individual test so it can assert on its
//! own output.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::capture::CaptureStrategy;
use crate::error;
use crate::manager::{CaptureManager, DisabledGuard};
use crate::multi::{CaptureResult, MultiCapture, MultiCaptureOptions};
use crate::report::ReportSink;
use crate::streams::StdStreams;
use crate::trace_categories;

/// The kinds of capture a test may request.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    serde::Deserialize,
    strum_macros::Display,
)]
pub enum FixtureKind {
    /// Capture through the process-stream table.
    #[serde(rename = "capsys")]
    #[strum(serialize = "capsys")]
    Sys,
    /// Capture at the descriptor level.
    #[serde(rename = "capfd")]
    #[strum(serialize = "capfd")]
    Fd,
}

impl FixtureKind {
    /// Returns the strategy the fixture captures with.
    pub const fn strategy(self) -> CaptureStrategy {
        match self {
            Self::Sys => CaptureStrategy::Sys,
            Self::Fd => CaptureStrategy::Fd,
        }
    }
}

/// Validates the capture fixtures requested by one test, returning the one to provide.
///
/// The two kinds are mutually exclusive; requesting both is a usage error.
pub fn resolve_fixtures(requested: &[FixtureKind]) -> Result<Option<FixtureKind>, error::Error> {
    let wants_sys = requested.contains(&FixtureKind::Sys);
    let wants_fd = requested.contains(&FixtureKind::Fd);

    match (wants_sys, wants_fd) {
        (true, true) => Err(error::Error::IncompatibleFixtures),
        (true, false) => Ok(Some(FixtureKind::Sys)),
        (false, true) => Ok(Some(FixtureKind::Fd)),
        (false, false) => Ok(None),
    }
}

#[derive(Default)]
struct FixtureState {
    capture: Option<MultiCapture>,
    last: CaptureResult,
}

/// Capture handed to a single test.
///
/// The fixture's own capture is started when the test's call phase begins and closed
/// when it ends; after that, the last snapshot remains readable. Clones share state, so
/// the test and the capture manager can each hold one.
#[derive(Clone)]
pub struct CaptureFixture {
    kind: FixtureKind,
    streams: StdStreams,
    state: Arc<Mutex<FixtureState>>,
}

impl CaptureFixture {
    /// Creates a fixture of the given kind over the given stream table.
    pub fn new(kind: FixtureKind, streams: StdStreams) -> Self {
        Self {
            kind,
            streams,
            state: Arc::default(),
        }
    }

    /// Returns the fixture's kind.
    pub const fn kind(&self) -> FixtureKind {
        self.kind
    }

    /// Returns whether the fixture is currently capturing.
    pub fn is_active(&self) -> bool {
        self.state.lock().capture.is_some()
    }

    /// Returns the output captured since the last call, or the final snapshot if the
    /// fixture has been closed.
    pub fn readouterr(&self) -> CaptureResult {
        let mut state = self.state.lock();
        match &mut state.capture {
            Some(capture) => capture.readouterr(),
            None => state.last.clone(),
        }
    }

    /// Suspends the surrounding capture (and this fixture's) so the caller can use the
    /// real terminal, including standard input, until the returned guard is dropped.
    ///
    /// Arguments:
    ///
    /// * `manager`: The capture manager running the current test.
    /// * `sink`: Where output captured so far in the call phase is attached.
    pub fn disabled<'a, S: ReportSink + ?Sized>(
        &self,
        manager: &'a mut CaptureManager,
        sink: &mut S,
    ) -> Result<DisabledGuard<'a>, error::Error> {
        manager.disabled(sink)
    }

    pub(crate) fn start(&self) -> Result<(), error::Error> {
        let mut state = self.state.lock();
        if state.capture.is_some() {
            return Ok(());
        }

        let mut capture = MultiCapture::new(
            MultiCaptureOptions::output_only(self.kind.strategy()),
            &self.streams,
        )?;
        capture.start_capturing()?;
        state.capture = Some(capture);

        tracing::debug!(target: trace_categories::FIXTURES, "started {} fixture", self.kind);

        Ok(())
    }

    /// Stops the fixture's capture, forwarding anything not yet read to the surrounding
    /// streams and keeping it as the final snapshot.
    pub fn close(&self) -> Result<(), error::Error> {
        let mut state = self.state.lock();
        if let Some(mut capture) = state.capture.take() {
            let popped = capture.pop_outerr_to_orig();
            let stopped = capture.stop_capturing();
            state.last = popped?;
            stopped?;

            tracing::debug!(target: trace_categories::FIXTURES, "closed {} fixture", self.kind);
        }

        Ok(())
    }

    pub(crate) fn suspend(&self) -> Result<(), error::Error> {
        match &mut self.state.lock().capture {
            Some(capture) => capture.suspend_capturing(false),
            None => Ok(()),
        }
    }

    pub(crate) fn resume(&self) -> Result<(), error::Error> {
        match &mut self.state.lock().capture {
            Some(capture) => capture.resume_capturing(),
            None => Ok(()),
        }
    }
}

//! Session-wide capture management.

use std::io::Write;
use std::panic::{self, AssertUnwindSafe};

use crate::error;
use crate::fixture::CaptureFixture;
use crate::method::CaptureMethod;
use crate::multi::{CaptureResult, MultiCapture};
use crate::report::{CollectReport, Phase, ReportSink};
use crate::streams::StdStreams;
use crate::trace_categories;

/// Owns the session-wide capture and drives it around each phase of each test.
///
/// At most one fixture capture is active at a time, and only during a test's call phase.
/// Dropping the manager restores the real streams.
pub struct CaptureManager {
    method: CaptureMethod,
    streams: StdStreams,
    capturing: Option<MultiCapture>,
    fixture: Option<CaptureFixture>,
}

impl CaptureManager {
    /// Creates a manager for the given method. Nothing is captured until
    /// [`CaptureManager::init_capturings`] is called.
    ///
    /// Arguments:
    ///
    /// * `method`: The capture method selected for the session.
    /// * `streams`: The stream table test code writes through.
    pub const fn new(method: CaptureMethod, streams: StdStreams) -> Self {
        Self {
            method,
            streams,
            capturing: None,
            fixture: None,
        }
    }

    /// Returns the session's capture method.
    pub const fn method(&self) -> CaptureMethod {
        self.method
    }

    /// Returns the stream table managed by this manager.
    pub const fn streams(&self) -> &StdStreams {
        &self.streams
    }

    /// Creates and starts the session-wide capture.
    pub fn init_capturings(&mut self) -> Result<(), error::Error> {
        if self.capturing.is_some() {
            return Err(error::Error::AlreadyInitialized);
        }

        let mut capture = MultiCapture::new(self.method.session_options(), &self.streams)?;
        capture.start_capturing()?;
        self.capturing = Some(capture);

        tracing::debug!(target: trace_categories::CAPTURE, "started {} session capture", self.method);

        Ok(())
    }

    /// Tears down the session-wide capture, forwarding anything still captured to the
    /// real streams. Does nothing if there is no capture to tear down.
    pub fn reset_capturings(&mut self) -> Result<(), error::Error> {
        let fixture_result = self.deactivate_fixture();

        if let Some(mut capture) = self.capturing.take() {
            let popped = capture.pop_outerr_to_orig();
            let stopped = capture.stop_capturing();

            tracing::debug!(target: trace_categories::CAPTURE, "reset session capture");

            popped?;
            stopped?;
        }

        fixture_result
    }

    /// Resumes the session-wide capture after a suspension.
    pub fn resume_capture(&mut self) -> Result<(), error::Error> {
        let capture = self
            .capturing
            .as_mut()
            .ok_or(error::Error::NotInitialized)?;
        capture.resume_capturing()
    }

    /// Closes any active fixture, then suspends the session-wide capture and returns what
    /// it had captured.
    ///
    /// Arguments:
    ///
    /// * `stdin`: Also release standard input.
    pub fn suspend_capture(&mut self, stdin: bool) -> Result<CaptureResult, error::Error> {
        let fixture_result = self.deactivate_fixture();
        let result = self.suspend_session(stdin)?;
        fixture_result?;
        Ok(result)
    }

    /// Makes `fixture` the active fixture and starts its capture.
    pub fn activate_fixture(&mut self, fixture: CaptureFixture) -> Result<(), error::Error> {
        fixture.start()?;

        tracing::debug!(target: trace_categories::FIXTURES, "activated {} fixture", fixture.kind());
        self.fixture = Some(fixture);

        Ok(())
    }

    /// Closes the active fixture, if any. Its final snapshot stays readable.
    pub fn deactivate_fixture(&mut self) -> Result<(), error::Error> {
        match self.fixture.take() {
            Some(fixture) => {
                tracing::debug!(target: trace_categories::FIXTURES, "deactivating {} fixture", fixture.kind());
                fixture.close()
            }
            None => Ok(()),
        }
    }

    /// Suspends capture and attaches what was captured to `sink` under `phase`.
    pub fn suspend_capture_item<S: ReportSink + ?Sized>(
        &mut self,
        sink: &mut S,
        phase: Phase,
        stdin: bool,
    ) -> Result<(), error::Error> {
        let result = self.suspend_capture(stdin)?;
        sink.add_report_section(phase, "stdout", &result.out);
        sink.add_report_section(phase, "stderr", &result.err);
        Ok(())
    }

    /// Runs one phase of a test under capture.
    ///
    /// Capture is resumed before `body` runs and, for the call phase, `fixture` is
    /// activated. Afterwards capture is suspended and the output attached to `sink`, even
    /// if `body` panics; the panic is then propagated.
    ///
    /// Arguments:
    ///
    /// * `phase`: The phase being run.
    /// * `fixture`: The fixture requested by the test; ignored outside the call phase.
    /// * `sink`: The report to attach captured output to.
    /// * `body`: The phase's work.
    pub fn run_phase<S, R, F>(
        &mut self,
        phase: Phase,
        fixture: Option<&CaptureFixture>,
        sink: &mut S,
        body: F,
    ) -> Result<R, error::Error>
    where
        S: ReportSink + ?Sized,
        F: FnOnce(&mut Self, &mut S) -> R,
    {
        tracing::debug!(target: trace_categories::PHASES, "entering {phase}");

        self.resume_capture()?;
        if phase == Phase::Call {
            if let Some(fixture) = fixture {
                if let Err(e) = self.activate_fixture(fixture.clone()) {
                    self.suspend_capture_item(sink, phase, false)?;
                    return Err(e);
                }
            }
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(self, sink)));

        let suspended = self.suspend_capture_item(sink, phase, false);

        tracing::debug!(target: trace_categories::PHASES, "leaving {phase}");

        match outcome {
            Ok(value) => suspended.map(|()| value),
            Err(payload) => {
                if let Err(e) = suspended {
                    tracing::error!(target: trace_categories::PHASES, "failed to suspend capture after panic: {e}");
                }
                panic::resume_unwind(payload)
            }
        }
    }

    /// Runs collection of one source under capture, attaching any output produced to
    /// `report`.
    pub fn run_collect<R>(
        &mut self,
        report: &mut CollectReport,
        body: impl FnOnce() -> R,
    ) -> Result<R, error::Error> {
        self.resume_capture()?;

        let outcome = panic::catch_unwind(AssertUnwindSafe(body));

        let suspended = self.suspend_capture(false);
        match (outcome, suspended) {
            (Ok(value), Ok(result)) => {
                report.add_captured("stdout", &result.out);
                report.add_captured("stderr", &result.err);
                Ok(value)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(payload), suspended) => {
                if let Ok(result) = suspended {
                    report.add_captured("stdout", &result.out);
                    report.add_captured("stderr", &result.err);
                }
                panic::resume_unwind(payload)
            }
        }
    }

    /// Initializes capture and runs startup work under it.
    ///
    /// If `body` fails, everything captured is forwarded to the real streams so the
    /// failure can be diagnosed, and capture is torn down. On success capture is left
    /// suspended, ready for the first test.
    pub fn capture_startup<T, E>(
        &mut self,
        body: impl FnOnce() -> Result<T, E>,
    ) -> Result<Result<T, E>, error::Error> {
        self.init_capturings()?;

        let result = body();
        if result.is_err() {
            tracing::debug!(target: trace_categories::CAPTURE, "startup failed; releasing captured output");
            self.reset_capturings()?;
        } else {
            self.suspend_capture(false)?;
        }

        Ok(result)
    }

    /// Suspends all capture, including standard input, for an interactive session.
    ///
    /// Output captured so far is echoed to the real streams first, so the user sees it.
    /// Capture is resumed when `body` returns or panics.
    pub fn interact<R>(&mut self, body: impl FnOnce(&StdStreams) -> R) -> Result<R, error::Error> {
        let result = self.suspend_capture(true)?;

        let mut out = self.streams.stdout();
        out.write_all(result.out.as_bytes())?;
        out.flush()?;
        let mut err = self.streams.stderr();
        err.write_all(result.err.as_bytes())?;
        err.flush()?;

        let guard = DisabledGuard {
            manager: self,
            fixture: None,
        };
        Ok(body(&guard.manager.streams))
    }

    /// Writes `text` to the real standard output while capture is suspended, then
    /// re-emits anything captured meanwhile so it still lands in the current capture.
    pub fn write_through(&mut self, text: &str) -> Result<(), error::Error> {
        let result = self.suspend_session(false)?;

        let written = {
            let mut out = self.streams.stdout();
            out.write_all(text.as_bytes()).and_then(|()| out.flush())
        };

        self.resume_capture()?;
        written?;

        write!(self.streams.stdout(), "{}", result.out)?;
        write!(self.streams.stderr(), "{}", result.err)?;

        Ok(())
    }

    /// Suspends the session capture (and the active fixture's) so test code can use the
    /// real terminal, including standard input, until the returned guard is dropped.
    /// Output captured so far is attached to `sink` as call-phase output.
    pub fn disabled<S: ReportSink + ?Sized>(
        &mut self,
        sink: &mut S,
    ) -> Result<DisabledGuard<'_>, error::Error> {
        let fixture = self.fixture.clone();
        if let Some(fixture) = &fixture {
            fixture.suspend()?;
        }

        let result = match self.suspend_session(true) {
            Ok(result) => result,
            Err(e) => {
                if let Some(fixture) = &fixture {
                    if let Err(resume_error) = fixture.resume() {
                        tracing::error!(target: trace_categories::FIXTURES, "failed to resume fixture: {resume_error}");
                    }
                }
                return Err(e);
            }
        };
        sink.add_report_section(Phase::Call, "stdout", &result.out);
        sink.add_report_section(Phase::Call, "stderr", &result.err);

        tracing::debug!(target: trace_categories::FIXTURES, "capture disabled");

        Ok(DisabledGuard {
            manager: self,
            fixture,
        })
    }

    /// Releases the terminal after an interrupt.
    pub fn on_keyboard_interrupt(&mut self) -> Result<(), error::Error> {
        tracing::debug!(target: trace_categories::CAPTURE, "interrupted; resetting capture");
        self.reset_capturings()
    }

    /// Releases the terminal after an internal error so it can be reported.
    pub fn on_internal_error(&mut self) -> Result<(), error::Error> {
        tracing::debug!(target: trace_categories::CAPTURE, "internal error; resetting capture");
        self.reset_capturings()
    }

    fn suspend_session(&mut self, stdin: bool) -> Result<CaptureResult, error::Error> {
        match &mut self.capturing {
            Some(capture) => {
                let result = capture.readouterr();
                capture.suspend_capturing(stdin)?;
                Ok(result)
            }
            None => Ok(CaptureResult::default()),
        }
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        if let Err(e) = self.reset_capturings() {
            tracing::error!(target: trace_categories::CAPTURE, "failed to reset capture: {e}");
        }
    }
}

/// Keeps capture suspended while alive; resumes the session capture and then the
/// fixture's capture when dropped.
pub struct DisabledGuard<'a> {
    manager: &'a mut CaptureManager,
    fixture: Option<CaptureFixture>,
}

impl DisabledGuard<'_> {
    /// Returns the stream table, which currently reaches the real streams.
    pub fn streams(&self) -> &StdStreams {
        &self.manager.streams
    }
}

impl Drop for DisabledGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.manager.resume_capture() {
            tracing::error!(target: trace_categories::CAPTURE, "failed to resume capture: {e}");
        }
        if let Some(fixture) = &self.fixture {
            if let Err(e) = fixture.resume() {
                tracing::error!(target: trace_categories::FIXTURES, "failed to resume fixture: {e}");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic_in_result_fn)]
mod tests {
    use super::*;
    use crate::fixture::FixtureKind;
    use crate::report::ItemReport;
    use crate::stream::StreamId;
    use crate::streams::{MemoryBuffer, StdStream};
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    /// Builds a stream table whose "real" streams are in-memory buffers.
    fn memory_streams() -> (StdStreams, MemoryBuffer, MemoryBuffer) {
        let streams = StdStreams::new();
        let out = MemoryBuffer::new();
        let err = MemoryBuffer::new();
        streams.replace(StreamId::Stdout, StdStream::Memory(out.clone()));
        streams.replace(StreamId::Stderr, StdStream::Memory(err.clone()));
        (streams, out, err)
    }

    fn sys_manager() -> Result<(CaptureManager, MemoryBuffer, MemoryBuffer)> {
        let (streams, out, err) = memory_streams();
        let mut manager = CaptureManager::new(CaptureMethod::Sys, streams);
        manager.init_capturings()?;
        manager.suspend_capture(false)?;
        Ok((manager, out, err))
    }

    #[test]
    fn init_twice_is_an_error() -> Result<()> {
        let (mut manager, _, _) = sys_manager()?;
        assert!(matches!(
            manager.init_capturings(),
            Err(error::Error::AlreadyInitialized)
        ));
        Ok(())
    }

    #[test]
    fn resume_before_init_is_an_error() {
        let mut manager = CaptureManager::new(CaptureMethod::Sys, StdStreams::new());
        assert!(matches!(
            manager.resume_capture(),
            Err(error::Error::NotInitialized)
        ));
    }

    #[test]
    fn phase_output_goes_to_its_section() -> Result<()> {
        let (mut manager, real_out, _) = sys_manager()?;
        let mut report = ItemReport::new("t");

        manager.run_phase(Phase::Setup, None, &mut report, |m, _| {
            writeln!(m.streams().stdout(), "setting up")
        })??;
        manager.run_phase(Phase::Call, None, &mut report, |m, _| {
            writeln!(m.streams().stdout(), "hello")?;
            writeln!(m.streams().stderr(), "oops")
        })??;

        assert_eq!(report.captured(Phase::Setup, "stdout"), "setting up\n");
        assert_eq!(report.captured(Phase::Call, "stdout"), "hello\n");
        assert_eq!(report.captured(Phase::Call, "stderr"), "oops\n");
        assert!(real_out.is_empty());
        Ok(())
    }

    #[test]
    #[allow(clippy::panic)]
    fn panicking_phase_still_attaches_output() -> Result<()> {
        let (mut manager, _, _) = sys_manager()?;
        let mut report = ItemReport::new("t");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = manager.run_phase(Phase::Call, None, &mut report, |m, _| {
                let _ = write!(m.streams().stdout(), "before panic");
                panic!("boom");
            });
        }));

        assert!(outcome.is_err());
        assert_eq!(report.captured(Phase::Call, "stdout"), "before panic");
        Ok(())
    }

    #[test]
    fn fixture_sees_only_its_own_output() -> Result<()> {
        let (mut manager, _, _) = sys_manager()?;
        let mut report = ItemReport::new("t");
        let fixture = CaptureFixture::new(FixtureKind::Sys, manager.streams().clone());

        let seen = manager.run_phase(Phase::Call, Some(&fixture), &mut report, |m, _| {
            let _ = write!(m.streams().stdout(), "for the fixture");
            fixture.readouterr()
        })?;

        assert_eq!(seen.out, "for the fixture");
        assert!(!fixture.is_active());
        assert_eq!(report.captured(Phase::Call, "stdout"), "");
        Ok(())
    }

    #[test]
    fn unread_fixture_output_reaches_the_report() -> Result<()> {
        let (mut manager, _, _) = sys_manager()?;
        let mut report = ItemReport::new("t");
        let fixture = CaptureFixture::new(FixtureKind::Sys, manager.streams().clone());

        manager.run_phase(Phase::Call, Some(&fixture), &mut report, |m, _| {
            write!(m.streams().stdout(), "never read")
        })??;

        assert_eq!(report.captured(Phase::Call, "stdout"), "never read");
        assert_eq!(fixture.readouterr().out, "never read");
        Ok(())
    }

    #[test]
    fn fixture_is_not_activated_outside_call() -> Result<()> {
        let (mut manager, _, _) = sys_manager()?;
        let mut report = ItemReport::new("t");
        let fixture = CaptureFixture::new(FixtureKind::Sys, manager.streams().clone());

        let active = manager.run_phase(Phase::Setup, Some(&fixture), &mut report, |_, _| {
            fixture.is_active()
        })?;
        assert!(!active);
        Ok(())
    }

    #[test]
    fn disabled_reaches_real_streams() -> Result<()> {
        let (mut manager, real_out, _) = sys_manager()?;
        let mut report = ItemReport::new("t");
        let fixture = CaptureFixture::new(FixtureKind::Sys, manager.streams().clone());

        manager.run_phase(Phase::Call, Some(&fixture), &mut report, |m, report| {
            write!(m.streams().stdout(), "captured ")?;
            fixture
                .disabled(m, report)
                .map_err(std::io::Error::other)
                .and_then(|guard| write!(guard.streams().stdout(), "visible"))?;
            write!(m.streams().stdout(), "after")
        })??;

        assert_eq!(real_out.take(), b"visible");
        assert_eq!(fixture.readouterr().out, "captured after");
        Ok(())
    }

    #[test]
    fn failed_disable_resumes_fixture() -> Result<()> {
        let (mut manager, real_out, _) = sys_manager()?;
        let mut report = ItemReport::new("t");
        let fixture = CaptureFixture::new(FixtureKind::Sys, manager.streams().clone());
        manager.activate_fixture(fixture.clone())?;

        // A released session capture cannot be suspended.
        if let Some(capture) = &mut manager.capturing {
            capture.stop_capturing()?;
        }
        assert!(fixture.disabled(&mut manager, &mut report).is_err());

        write!(manager.streams().stdout(), "still captured")?;
        assert_eq!(fixture.readouterr().out, "still captured");
        assert!(real_out.take().is_empty());
        Ok(())
    }

    #[test]
    fn write_through_bypasses_capture() -> Result<()> {
        let (mut manager, real_out, _) = sys_manager()?;
        let mut report = ItemReport::new("t");

        manager.run_phase(Phase::Setup, None, &mut report, |m, _| {
            let _ = write!(m.streams().stdout(), "pending ");
            m.write_through("SETUP fixture\n")
        })??;

        assert_eq!(real_out.take(), b"SETUP fixture\n");
        assert_eq!(report.captured(Phase::Setup, "stdout"), "pending ");
        Ok(())
    }

    #[test]
    fn interact_echoes_captured_output() -> Result<()> {
        let (mut manager, real_out, _) = sys_manager()?;
        manager.resume_capture()?;
        writeln!(manager.streams().stdout(), "so far")?;

        let stdin_released = manager.interact(|streams| streams.is_original(StreamId::Stdin))?;

        assert!(stdin_released);
        assert_eq!(real_out.take(), b"so far\n");
        assert!(!manager.streams().is_original(StreamId::Stdin));
        Ok(())
    }

    #[test]
    fn reset_forwards_pending_output() -> Result<()> {
        let (mut manager, real_out, _) = sys_manager()?;
        manager.resume_capture()?;
        write!(manager.streams().stdout(), "pending")?;

        manager.on_keyboard_interrupt()?;
        assert!(manager.capturing.is_none());
        assert_eq!(real_out.take(), b"pending");

        // A second reset has nothing left to do.
        manager.reset_capturings()?;
        Ok(())
    }

    #[test]
    fn drop_restores_streams() -> Result<()> {
        let (manager, _, _) = sys_manager()?;
        let streams = manager.streams().clone();
        drop(manager);
        assert!(streams.is_original(StreamId::Stdin));
        assert!(matches!(streams.get(StreamId::Stdout)?, StdStream::Memory(_)));
        Ok(())
    }

    #[test]
    fn startup_failure_releases_output() -> Result<()> {
        let (streams, real_out, _) = memory_streams();
        let mut manager = CaptureManager::new(CaptureMethod::Sys, streams.clone());

        let result = manager.capture_startup(|| {
            let _ = write!(streams.stdout(), "diagnostics");
            Err::<(), _>("bad plugin")
        })?;

        assert!(result.is_err());
        assert!(manager.capturing.is_none());
        assert_eq!(real_out.take(), b"diagnostics");
        Ok(())
    }

    #[test]
    fn collection_output_is_recorded() -> Result<()> {
        let (mut manager, _, _) = sys_manager()?;
        let mut report = CollectReport::new("cases.yaml");
        let streams = manager.streams().clone();

        manager.run_collect(&mut report, || {
            let _ = write!(streams.stdout(), "collecting");
        })?;

        assert_eq!(report.sections.len(), 1);
        assert_eq!(report.sections[0].title, "Captured stdout");
        assert_eq!(report.sections[0].content, "collecting");
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    #[serial_test::serial]
    fn fd_capture_keeps_phases_apart() -> Result<()> {
        use crate::report::Section;
        use std::os::fd::AsFd;

        fn write_stdout_fd(data: &[u8]) -> std::io::Result<()> {
            nix::unistd::write(std::io::stdout().as_fd(), data)?;
            Ok(())
        }

        let mut manager = CaptureManager::new(CaptureMethod::Fd, StdStreams::new());
        manager.init_capturings()?;
        manager.suspend_capture(false)?;

        let mut report = ItemReport::new("t");
        manager.run_phase(Phase::Setup, None, &mut report, |_, _| Ok::<_, std::io::Error>(()))??;
        manager.run_phase(Phase::Call, None, &mut report, |_, _| write_stdout_fd(b"hello\n"))??;
        manager.run_phase(Phase::Teardown, None, &mut report, |_, _| Ok::<_, std::io::Error>(()))??;
        manager.reset_capturings()?;

        assert_eq!(
            report.sections,
            vec![Section {
                title: String::from("Captured stdout call"),
                content: String::from("hello\n"),
            }]
        );
        Ok(())
    }
}

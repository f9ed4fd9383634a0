//! Test runner implementation.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use stdcap_core::{
    CaptureFixture, CaptureManager, CaptureMethod, CaptureResult, CollectReport, ItemReport,
    Outcome, Phase, ReportSink, StdStreams, StreamId, resolve_fixtures,
};

use crate::config::Settings;
use crate::execution;
use crate::reporting;
use crate::testcase::{self, TestCase, TestFile};
use crate::trace_categories;

/// Results of a run.
#[derive(Debug, Default)]
pub struct RunResults {
    /// One report per collected test file.
    pub collect_reports: Vec<CollectReport>,
    /// One report per test case that was run.
    pub item_reports: Vec<ItemReport>,
    /// Whether the run was cut short by an interrupt.
    pub interrupted: bool,
}

impl RunResults {
    /// Returns the number of cases that passed. A case cut short by an interrupt has
    /// skipped phases and does not count.
    pub fn passed_count(&self) -> usize {
        self.item_reports
            .iter()
            .filter(|r| {
                !r.failed()
                    && !r
                        .outcomes
                        .iter()
                        .any(|(_, outcome)| matches!(outcome, Outcome::Skipped(_)))
            })
            .count()
    }

    /// Returns the number of cases that failed.
    pub fn failed_count(&self) -> usize {
        self.item_reports.iter().filter(|r| r.failed()).count()
    }

    /// Returns the number of files that could not be collected.
    pub fn error_count(&self) -> usize {
        self.collect_reports
            .iter()
            .filter(|r| r.failure.is_some())
            .count()
    }

    /// Returns whether every case passed and every file was collected.
    pub fn success(&self) -> bool {
        !self.interrupted && self.failed_count() == 0 && self.error_count() == 0
    }
}

/// Runs test files, capturing the output of each phase of each case.
pub struct TestRunner {
    settings: Settings,
    manager: CaptureManager,
    interrupted: Arc<AtomicBool>,
}

impl TestRunner {
    /// Creates a runner with the given settings.
    pub fn new(settings: Settings) -> Self {
        let manager = CaptureManager::new(settings.method, StdStreams::new());
        Self {
            settings,
            manager,
            interrupted: Arc::default(),
        }
    }

    /// Returns the flag that, once set, stops the run after the current phase.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    /// Releases the terminal after an internal error.
    pub fn abort(&mut self) {
        if let Err(e) = self.manager.on_internal_error() {
            tracing::error!(target: trace_categories::RUNNER, "failed to reset capture: {e}");
        }
    }

    /// Runs all test files found under `paths`.
    pub fn run(&mut self, paths: &[PathBuf]) -> anyhow::Result<RunResults> {
        let files = self
            .manager
            .capture_startup(|| testcase::discover(paths))??;

        tracing::debug!(target: trace_categories::RUNNER, "found {} test file(s)", files.len());

        let mut results = RunResults::default();

        'files: for path in files {
            let mut collect_report = CollectReport::new(path.display().to_string());
            let loaded = self
                .manager
                .run_collect(&mut collect_report, || TestFile::load(&path))?;

            let test_file = match loaded {
                Ok(test_file) => test_file,
                Err(e) => {
                    collect_report.failure = Some(format!("{e:#}"));
                    results.collect_reports.push(collect_report);
                    continue;
                }
            };
            results.collect_reports.push(collect_report);

            for case in &test_file.cases {
                if self.check_interrupted()? {
                    results.interrupted = true;
                    break 'files;
                }

                let report = self.run_case(&test_file, case)?;

                // The case in flight when the run is interrupted is kept for its failures
                // but gets no progress line.
                let interrupted = self.check_interrupted()?;
                if !interrupted {
                    reporting::report_progress(
                        &mut std::io::stdout(),
                        &report,
                        self.settings.format,
                    )?;
                }
                results.item_reports.push(report);

                if interrupted {
                    results.interrupted = true;
                    break 'files;
                }
            }
        }

        if !results.interrupted && self.check_interrupted()? {
            results.interrupted = true;
        }

        self.manager.reset_capturings()?;

        Ok(results)
    }

    fn interrupt_requested(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    fn check_interrupted(&mut self) -> anyhow::Result<bool> {
        if !self.interrupt_requested() {
            return Ok(false);
        }

        self.manager.on_keyboard_interrupt()?;
        Ok(true)
    }

    /// Runs the setup, call, and teardown phases of one case. An interrupt stops the case
    /// after the phase it arrives in; the phases that did not run are marked skipped.
    fn run_case(&mut self, test_file: &TestFile, case: &TestCase) -> anyhow::Result<ItemReport> {
        let mut report = ItemReport::new(format!("{}::{}", test_file.display_name(), case.name));

        let fixture = match resolve_fixtures(&case.fixtures) {
            Ok(kind) => kind.map(|kind| CaptureFixture::new(kind, self.manager.streams().clone())),
            Err(e) => {
                report.set_outcome(Phase::Setup, Outcome::Failed(e.to_string()));
                return Ok(report);
            }
        };

        let setup_show = self.settings.setup_show;
        let pause_on_failure = self.settings.pause_on_failure;
        let stdin = case.stdin.as_deref();
        let fixture_label = fixture
            .as_ref()
            .map_or_else(String::new, |f| format!(" [{}]", f.kind()));

        let setup = self
            .manager
            .run_phase(Phase::Setup, None, &mut report, |m, _| -> anyhow::Result<Outcome> {
                if setup_show {
                    m.write_through(&format!("SETUP    {}{fixture_label}\n", case.name))?;
                }
                run_step(case.setup.as_deref(), m.streams(), stdin)
            })
            .with_context(|| phase_context(Phase::Setup, &report.name))?
            .unwrap_or_else(|e| Outcome::Failed(format!("{e:#}")));
        let setup_passed = setup == Outcome::Passed;
        report.set_outcome(Phase::Setup, setup);

        if self.interrupt_requested() {
            skip_remaining(&mut report, &[Phase::Call, Phase::Teardown]);
            return Ok(report);
        }

        if setup_passed {
            let call = self
                .manager
                .run_phase(
                    Phase::Call,
                    fixture.as_ref(),
                    &mut report,
                    |m, report| -> anyhow::Result<(Outcome, Option<CaptureResult>)> {
                        let outcome = run_step(Some(&case.run), m.streams(), stdin)?;
                        if pause_on_failure && outcome.is_failure() {
                            m.interact(|streams| pause(streams, &case.name))??;
                        }

                        // Read the fixture while it is live: whatever is left unread when
                        // it closes is written back to the stream it captured from.
                        let snapshot = fixture.as_ref().map(CaptureFixture::readouterr);
                        if let Some(snapshot) = &snapshot {
                            if outcome.is_failure() {
                                report.add_report_section(Phase::Call, "stdout", &snapshot.out);
                                report.add_report_section(Phase::Call, "stderr", &snapshot.err);
                            }
                        }

                        Ok((outcome, snapshot))
                    },
                )
                .with_context(|| phase_context(Phase::Call, &report.name))?;

            let call = match call {
                Ok((Outcome::Passed, snapshot)) => {
                    self.check_expectations(case, snapshot, &report)
                }
                Ok((other, _)) => other,
                Err(e) => Outcome::Failed(format!("{e:#}")),
            };
            report.set_outcome(Phase::Call, call);
        } else {
            report.set_outcome(Phase::Call, Outcome::Skipped(String::from("setup failed")));
        }

        if self.interrupt_requested() {
            skip_remaining(&mut report, &[Phase::Teardown]);
            return Ok(report);
        }

        let teardown = self
            .manager
            .run_phase(Phase::Teardown, None, &mut report, |m, _| -> anyhow::Result<Outcome> {
                let outcome = run_step(case.teardown.as_deref(), m.streams(), stdin);
                if setup_show {
                    m.write_through(&format!("TEARDOWN {}{fixture_label}\n", case.name))?;
                }
                outcome
            })
            .with_context(|| phase_context(Phase::Teardown, &report.name))?
            .unwrap_or_else(|e| Outcome::Failed(format!("{e:#}")));
        report.set_outcome(Phase::Teardown, teardown);

        Ok(report)
    }

    /// Compares the case's call-phase output against its expectations. Output is taken
    /// from the fixture snapshot if the case requested a fixture, or from the captured
    /// call section.
    fn check_expectations(
        &self,
        case: &TestCase,
        snapshot: Option<CaptureResult>,
        report: &ItemReport,
    ) -> Outcome {
        if !case.has_expectations() {
            return Outcome::Passed;
        }

        let (out, err) = match snapshot {
            Some(snapshot) => snapshot.into(),
            None if self.settings.method == CaptureMethod::No => {
                tracing::warn!(target: trace_categories::RUNNER, "{}: output is not captured; expectations not checked", report.name);
                return Outcome::Passed;
            }
            None => (
                report.captured(Phase::Call, "stdout").to_owned(),
                report.captured(Phase::Call, "stderr").to_owned(),
            ),
        };

        let mismatches: Vec<String> = [
            ("stdout", case.expect_stdout.as_deref(), out),
            ("stderr", case.expect_stderr.as_deref(), err),
        ]
        .into_iter()
        .filter_map(|(key, expected, actual)| {
            expected
                .filter(|expected| *expected != actual)
                .map(|expected| format!("{key}: expected {expected:?}, got {actual:?}"))
        })
        .collect();

        if mismatches.is_empty() {
            Outcome::Passed
        } else {
            Outcome::Failed(mismatches.join("\n"))
        }
    }
}

fn phase_context(phase: Phase, name: &str) -> String {
    format!("{phase} phase of {name}")
}

fn skip_remaining(report: &mut ItemReport, phases: &[Phase]) {
    for phase in phases {
        report.set_outcome(*phase, Outcome::Skipped(String::from("interrupted")));
    }
}

/// Runs one optional step of a case, mapping its exit status to an outcome.
fn run_step(
    command: Option<&str>,
    streams: &StdStreams,
    stdin: Option<&str>,
) -> anyhow::Result<Outcome> {
    let Some(command) = command else {
        return Ok(Outcome::Passed);
    };

    let status = execution::run_command(command, streams, stdin)?;
    if status.success() {
        Ok(Outcome::Passed)
    } else {
        Ok(Outcome::Failed(format!("`{command}` {status}")))
    }
}

/// Waits for the user to press Enter on the real terminal. Does not wait when standard
/// input is not a terminal.
fn pause(streams: &StdStreams, name: &str) -> anyhow::Result<()> {
    if !streams.get(StreamId::Stdin)?.is_term() {
        tracing::warn!(target: trace_categories::RUNNER, "{name} failed; not pausing since stdin is not a terminal");
        return Ok(());
    }

    let mut stderr = streams.stderr();
    write!(stderr, ">>> {name} failed; press Enter to continue ")?;
    stderr.flush()?;

    let mut line = String::new();
    BufReader::new(streams.stdin()).read_line(&mut line)?;
    Ok(())
}

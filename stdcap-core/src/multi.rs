//! Capture of up to three standard streams as one unit.

use std::io::Write;

use crate::capture::{Availability, Capture, CaptureStrategy, StreamCapture};
use crate::error;
use crate::stream::StreamId;
use crate::streams::{StdStream, StdStreams};
use crate::trace_categories;

/// Snapshot of captured standard output and standard error.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CaptureResult {
    /// Text captured from standard output.
    pub out: String,
    /// Text captured from standard error.
    pub err: String,
}

impl CaptureResult {
    /// Returns whether nothing was captured on either stream.
    pub fn is_empty(&self) -> bool {
        self.out.is_empty() && self.err.is_empty()
    }
}

impl From<CaptureResult> for (String, String) {
    fn from(result: CaptureResult) -> Self {
        (result.out, result.err)
    }
}

/// Selects which streams a [`MultiCapture`] captures, and how.
#[derive(Clone, Copy, Debug)]
pub struct MultiCaptureOptions {
    /// Capture standard input.
    pub stdin: bool,
    /// Capture standard output.
    pub stdout: bool,
    /// Capture standard error.
    pub stderr: bool,
    /// The strategy used for every captured stream.
    pub strategy: CaptureStrategy,
}

impl MultiCaptureOptions {
    /// Captures all three streams with the given strategy.
    pub const fn all(strategy: CaptureStrategy) -> Self {
        Self {
            stdin: true,
            stdout: true,
            stderr: true,
            strategy,
        }
    }

    /// Captures standard output and standard error, but not standard input.
    pub const fn output_only(strategy: CaptureStrategy) -> Self {
        Self {
            stdin: false,
            stdout: true,
            stderr: true,
            strategy,
        }
    }

    /// Captures nothing.
    pub const fn none() -> Self {
        Self {
            stdin: false,
            stdout: false,
            stderr: false,
            strategy: CaptureStrategy::Sys,
        }
    }
}

/// One stream's place in a [`MultiCapture`].
enum Slot {
    Captured(StreamCapture),
    PassThrough { id: StreamId },
}

impl Slot {
    fn start(&mut self) -> Result<(), error::Error> {
        match self {
            Self::Captured(c) => c.start(),
            Self::PassThrough { .. } => Ok(()),
        }
    }

    fn snap(&mut self) -> String {
        match self {
            Self::Captured(c) => c.snap(),
            Self::PassThrough { .. } => String::new(),
        }
    }

    fn done(&mut self) -> Result<(), error::Error> {
        match self {
            Self::Captured(c) => c.done(),
            Self::PassThrough { .. } => Ok(()),
        }
    }

    fn suspend(&mut self) -> Result<(), error::Error> {
        match self {
            Self::Captured(c) => c.suspend(),
            Self::PassThrough { .. } => Ok(()),
        }
    }

    fn resume(&mut self) -> Result<(), error::Error> {
        match self {
            Self::Captured(c) => c.resume(),
            Self::PassThrough { .. } => Ok(()),
        }
    }

    fn writeorg(&mut self, data: &[u8]) -> Result<(), error::Error> {
        match self {
            Self::Captured(c) => c.writeorg(data),
            Self::PassThrough { id } => {
                let mut stream = StdStream::original(*id);
                stream.write_all(data)?;
                stream.flush()?;
                Ok(())
            }
        }
    }
}

/// Lifecycle of a [`MultiCapture`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum MultiState {
    Created,
    Capturing,
    Stopped,
}

/// Captures standard input, output, and error as one unit.
///
/// Lifecycle operations fan out to the owned captures in a fixed order: standard input
/// first, then standard output, then standard error.
pub struct MultiCapture {
    stdin: Option<Slot>,
    stdout: Option<Slot>,
    stderr: Option<Slot>,
    stdin_suspended: bool,
    state: MultiState,
}

impl MultiCapture {
    /// Prepares captures of the streams selected by `options`. Streams that cannot be
    /// captured are passed through.
    ///
    /// Arguments:
    ///
    /// * `options`: Which streams to capture, and how.
    /// * `streams`: The stream table the captures swap entries of.
    pub fn new(options: MultiCaptureOptions, streams: &StdStreams) -> Result<Self, error::Error> {
        let make_slot = |enabled: bool, id: StreamId| -> Result<Option<Slot>, error::Error> {
            if !enabled {
                return Ok(None);
            }

            let slot = match StreamCapture::new(options.strategy, id, streams)? {
                Availability::Captured(c) => Slot::Captured(c),
                Availability::PassThrough { reason } => {
                    tracing::warn!(target: trace_categories::CAPTURE, "not capturing {id}: {reason}");
                    Slot::PassThrough { id }
                }
            };

            Ok(Some(slot))
        };

        Ok(Self {
            stdin: make_slot(options.stdin, StreamId::Stdin)?,
            stdout: make_slot(options.stdout, StreamId::Stdout)?,
            stderr: make_slot(options.stderr, StreamId::Stderr)?,
            stdin_suspended: false,
            state: MultiState::Created,
        })
    }

    /// Starts capturing all selected streams.
    pub fn start_capturing(&mut self) -> Result<(), error::Error> {
        if self.state == MultiState::Stopped {
            return Err(error::Error::AlreadyStopped);
        }

        for slot in self.slots_mut() {
            slot.start()?;
        }
        self.state = MultiState::Capturing;

        Ok(())
    }

    /// Points standard output and error back at the real streams. Standard input is
    /// released as well if `stdin` is set.
    pub fn suspend_capturing(&mut self, stdin: bool) -> Result<(), error::Error> {
        if stdin {
            if let Some(slot) = &mut self.stdin {
                slot.suspend()?;
                self.stdin_suspended = true;
            }
        }
        if let Some(slot) = &mut self.stdout {
            slot.suspend()?;
        }
        if let Some(slot) = &mut self.stderr {
            slot.suspend()?;
        }

        Ok(())
    }

    /// Resumes capturing after [`MultiCapture::suspend_capturing`].
    pub fn resume_capturing(&mut self) -> Result<(), error::Error> {
        if self.stdin_suspended {
            if let Some(slot) = &mut self.stdin {
                slot.resume()?;
            }
            self.stdin_suspended = false;
        }
        if let Some(slot) = &mut self.stdout {
            slot.resume()?;
        }
        if let Some(slot) = &mut self.stderr {
            slot.resume()?;
        }

        Ok(())
    }

    /// Stops capturing and restores all streams. Stopping twice is an error.
    pub fn stop_capturing(&mut self) -> Result<(), error::Error> {
        if self.state == MultiState::Stopped {
            return Err(error::Error::AlreadyStopped);
        }
        self.state = MultiState::Stopped;

        // Attempt every stream even if one fails, so nothing is left redirected.
        let mut first_error = None;
        for slot in self.slots_mut() {
            if let Err(e) = slot.done() {
                tracing::error!(target: trace_categories::CAPTURE, "failed to stop capture: {e}");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Returns the text captured on standard output and error since the last call.
    pub fn readouterr(&mut self) -> CaptureResult {
        CaptureResult {
            out: self.stdout.as_mut().map_or_else(String::new, Slot::snap),
            err: self.stderr.as_mut().map_or_else(String::new, Slot::snap),
        }
    }

    /// Drains the captured text and immediately writes it to the real streams, returning
    /// what was drained.
    pub fn pop_outerr_to_orig(&mut self) -> Result<CaptureResult, error::Error> {
        let result = self.readouterr();

        if !result.out.is_empty() {
            if let Some(slot) = &mut self.stdout {
                slot.writeorg(result.out.as_bytes())?;
            }
        }
        if !result.err.is_empty() {
            if let Some(slot) = &mut self.stderr {
                slot.writeorg(result.err.as_bytes())?;
            }
        }

        Ok(result)
    }

    fn slots_mut(&mut self) -> impl Iterator<Item = &mut Slot> {
        [&mut self.stdin, &mut self.stdout, &mut self.stderr]
            .into_iter()
            .flatten()
    }
}

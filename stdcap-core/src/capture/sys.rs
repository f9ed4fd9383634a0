use std::io::Write;

use crate::capture::{Capture, CaptureState, decode};
use crate::error;
use crate::stream::StreamId;
use crate::streams::{MemoryBuffer, StdStream, StdStreams};
use crate::trace_categories;

/// Captures a stream by swapping its entry in a [`StdStreams`] table.
///
/// Descriptors are never touched, so writes that go around the table (through the
/// process streams or a raw descriptor) are not seen.
pub struct SysCapture {
    id: StreamId,
    streams: StdStreams,
    replacement: StdStream,
    buffer: Option<MemoryBuffer>,
    saved: Option<StdStream>,
    state: CaptureState,
}

impl SysCapture {
    /// Creates a capture of the given stream backed by an in-memory buffer. Standard input
    /// is replaced by a stand-in that refuses to be read.
    pub fn new(id: StreamId, streams: StdStreams) -> Self {
        if id == StreamId::Stdin {
            Self::with_replacement(id, streams, StdStream::Unreadable)
        } else {
            let buffer = MemoryBuffer::new();
            let mut capture =
                Self::with_replacement(id, streams, StdStream::Memory(buffer.clone()));
            capture.buffer = Some(buffer);
            capture
        }
    }

    /// Creates a capture that installs the given stream. Snapshots of such a capture are
    /// empty; whoever supplied `replacement` reads it back.
    pub(crate) fn with_replacement(
        id: StreamId,
        streams: StdStreams,
        replacement: StdStream,
    ) -> Self {
        Self {
            id,
            streams,
            replacement,
            buffer: None,
            saved: None,
            state: CaptureState::Created,
        }
    }

    fn check_active(&self) -> Result<(), error::Error> {
        match self.state {
            CaptureState::Created => Err(error::Error::NotStarted(self.to_string())),
            CaptureState::Done => Err(error::Error::AlreadyReleased(self.to_string())),
            CaptureState::Started | CaptureState::Suspended => Ok(()),
        }
    }

    fn install_replacement(&self) -> Result<StdStream, error::Error> {
        Ok(self.streams.replace(self.id, self.replacement.try_dup()?))
    }
}

impl Capture for SysCapture {
    fn start(&mut self) -> Result<(), error::Error> {
        match self.state {
            CaptureState::Created => (),
            CaptureState::Done => return Err(error::Error::AlreadyReleased(self.to_string())),
            CaptureState::Started | CaptureState::Suspended => return Ok(()),
        }

        self.saved = Some(self.install_replacement()?);
        self.state = CaptureState::Started;

        tracing::debug!(target: trace_categories::CAPTURE, "started {self}");

        Ok(())
    }

    fn snap(&mut self) -> String {
        self.buffer
            .as_ref()
            .map_or_else(String::new, |buffer| decode(&buffer.take()))
    }

    fn done(&mut self) -> Result<(), error::Error> {
        if self.state == CaptureState::Done {
            return Err(error::Error::AlreadyReleased(self.to_string()));
        }

        if let Some(saved) = self.saved.take() {
            self.streams.replace(self.id, saved);
        }
        self.buffer = None;
        self.state = CaptureState::Done;

        tracing::debug!(target: trace_categories::CAPTURE, "released {self}");

        Ok(())
    }

    fn suspend(&mut self) -> Result<(), error::Error> {
        self.check_active()?;

        if let Some(saved) = &self.saved {
            self.streams.replace(self.id, saved.try_dup()?);
        }
        self.state = CaptureState::Suspended;

        Ok(())
    }

    fn resume(&mut self) -> Result<(), error::Error> {
        self.check_active()?;

        self.install_replacement()?;
        self.state = CaptureState::Started;

        Ok(())
    }

    fn writeorg(&mut self, data: &[u8]) -> Result<(), error::Error> {
        let mut target = match &self.saved {
            Some(saved) => saved.try_dup()?,
            None => StdStream::original(self.id),
        };

        target.write_all(data)?;
        target.flush()?;

        Ok(())
    }
}

impl Drop for SysCapture {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            tracing::warn!(target: trace_categories::CAPTURE, "{self} dropped while active; restoring");
            self.streams.replace(self.id, saved);
        }
    }
}

impl std::fmt::Display for SysCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sys capture of {}", self.id)
    }
}

#[cfg(test)]
#[allow(clippy::panic_in_result_fn, clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use std::io::Read;

    #[test]
    fn snap_returns_and_clears() -> Result<()> {
        let streams = StdStreams::new();
        let mut cap = SysCapture::new(StreamId::Stdout, streams.clone());
        cap.start()?;

        write!(streams.stdout(), "hello ")?;
        writeln!(streams.stdout(), "world")?;
        assert_eq!(cap.snap(), "hello world\n");
        assert_eq!(cap.snap(), "");

        cap.done()?;
        Ok(())
    }

    #[test]
    fn done_restores_original_stream() -> Result<()> {
        let streams = StdStreams::new();
        let mut cap = SysCapture::new(StreamId::Stderr, streams.clone());
        cap.start()?;
        assert!(!streams.is_original(StreamId::Stderr));

        cap.done()?;
        assert!(streams.is_original(StreamId::Stderr));
        Ok(())
    }

    #[test]
    fn done_twice_is_an_error() -> Result<()> {
        let streams = StdStreams::new();
        let mut cap = SysCapture::new(StreamId::Stdout, streams);
        cap.start()?;
        cap.done()?;

        let err = cap.done().unwrap_err();
        assert!(matches!(err, error::Error::AlreadyReleased(_)));
        Ok(())
    }

    #[test]
    fn suspend_routes_to_saved_stream() -> Result<()> {
        let streams = StdStreams::new();
        let outer = MemoryBuffer::new();
        streams.replace(StreamId::Stdout, StdStream::Memory(outer.clone()));

        let mut cap = SysCapture::new(StreamId::Stdout, streams.clone());
        cap.start()?;
        write!(streams.stdout(), "captured")?;

        cap.suspend()?;
        write!(streams.stdout(), "passed")?;
        cap.resume()?;
        write!(streams.stdout(), "-again")?;

        assert_eq!(cap.snap(), "captured-again");
        assert_eq!(outer.take(), b"passed");

        cap.done()?;
        Ok(())
    }

    #[test]
    fn suspend_resume_keeps_buffer() -> Result<()> {
        let streams = StdStreams::new();
        let mut cap = SysCapture::new(StreamId::Stdout, streams.clone());
        cap.start()?;
        write!(streams.stdout(), "kept")?;

        cap.suspend()?;
        cap.resume()?;
        assert_eq!(cap.snap(), "kept");

        cap.done()?;
        Ok(())
    }

    #[test]
    fn suspend_before_start_is_an_error() {
        let mut cap = SysCapture::new(StreamId::Stdout, StdStreams::new());
        assert!(matches!(cap.suspend(), Err(error::Error::NotStarted(_))));
    }

    #[test]
    fn writeorg_bypasses_buffer() -> Result<()> {
        let streams = StdStreams::new();
        let outer = MemoryBuffer::new();
        streams.replace(StreamId::Stdout, StdStream::Memory(outer.clone()));

        let mut cap = SysCapture::new(StreamId::Stdout, streams);
        cap.start()?;
        cap.writeorg(b"direct")?;

        assert_eq!(cap.snap(), "");
        assert_eq!(outer.take(), b"direct");

        cap.done()?;
        Ok(())
    }

    #[test]
    fn captured_stdin_refuses_reads() -> Result<()> {
        let streams = StdStreams::new();
        let mut cap = SysCapture::new(StreamId::Stdin, streams.clone());
        cap.start()?;

        let mut buf = String::new();
        assert!(streams.stdin().read_to_string(&mut buf).is_err());
        assert_eq!(cap.snap(), "");

        cap.done()?;
        assert!(streams.is_original(StreamId::Stdin));
        Ok(())
    }

    #[test]
    fn drop_restores_active_capture() -> Result<()> {
        let streams = StdStreams::new();
        {
            let mut cap = SysCapture::new(StreamId::Stdout, streams.clone());
            cap.start()?;
        }
        assert!(streams.is_original(StreamId::Stdout));
        Ok(())
    }
}

//! Capture of a single stream, at the descriptor level or at the stream-table level.

#[cfg(unix)]
mod fd;
mod sys;

#[cfg(unix)]
pub use fd::FdCapture;
pub use sys::SysCapture;

#[cfg(unix)]
use std::os::fd::{AsFd, BorrowedFd};

use crate::error;
use crate::stream::StreamId;
use crate::streams::StdStreams;

/// The contract shared by both capture strategies.
///
/// Between [`Capture::start`] and [`Capture::done`] the captured stream refers to a
/// private buffer; the capture holds the only way back to the real stream.
pub trait Capture {
    /// Starts redirecting the stream into the capture's buffer.
    fn start(&mut self) -> Result<(), error::Error>;

    /// Returns everything written since the last snapshot and clears the buffer.
    ///
    /// Undecodable bytes are replaced rather than reported, and I/O trouble reading the
    /// buffer yields whatever could be read.
    fn snap(&mut self) -> String;

    /// Restores the real stream and releases the buffer. May only be called once.
    fn done(&mut self) -> Result<(), error::Error>;

    /// Temporarily points the stream back at the real stream, keeping the buffer.
    fn suspend(&mut self) -> Result<(), error::Error>;

    /// Points the stream back at the buffer after a [`Capture::suspend`].
    fn resume(&mut self) -> Result<(), error::Error>;

    /// Writes directly to the real stream, bypassing the buffer.
    fn writeorg(&mut self, data: &[u8]) -> Result<(), error::Error>;
}

/// Selects how a stream is captured.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum CaptureStrategy {
    /// Redirect the OS-level file descriptor.
    Fd,
    /// Swap the entry in the process-stream table.
    Sys,
}

/// Outcome of constructing a capture.
pub enum Availability<T> {
    /// The stream is captured.
    Captured(T),
    /// The stream could not be captured and is passed through untouched.
    PassThrough {
        /// Why capture was not possible.
        reason: String,
    },
}

impl<T> Availability<T> {
    fn map<U>(self, f: impl FnOnce(T) -> U) -> Availability<U> {
        match self {
            Self::Captured(c) => Availability::Captured(f(c)),
            Self::PassThrough { reason } => Availability::PassThrough { reason },
        }
    }
}

/// Lifecycle of a single stream capture.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum CaptureState {
    Created,
    Started,
    Suspended,
    Done,
}

/// A capture of one stream, using one of the two strategies.
pub enum StreamCapture {
    /// Descriptor-level capture.
    #[cfg(unix)]
    Fd(FdCapture),
    /// Stream-table-level capture.
    Sys(SysCapture),
}

impl StreamCapture {
    /// Creates a capture of the given standard stream.
    ///
    /// Arguments:
    ///
    /// * `strategy`: How to capture the stream.
    /// * `id`: The stream to capture.
    /// * `streams`: The stream table to keep in agreement with the capture.
    pub fn new(
        strategy: CaptureStrategy,
        id: StreamId,
        streams: &StdStreams,
    ) -> Result<Availability<Self>, error::Error> {
        match strategy {
            CaptureStrategy::Fd => Self::new_fd_for(id, streams),
            CaptureStrategy::Sys => Ok(Availability::Captured(Self::Sys(SysCapture::new(
                id,
                streams.clone(),
            )))),
        }
    }

    /// Creates a descriptor-level capture of an arbitrary descriptor. Only the standard
    /// descriptors are mirrored into `streams`.
    #[cfg(unix)]
    pub fn new_fd(
        target: BorrowedFd<'_>,
        streams: Option<&StdStreams>,
    ) -> Result<Availability<Self>, error::Error> {
        Ok(FdCapture::new(target, streams)?.map(Self::Fd))
    }

    #[cfg(unix)]
    fn new_fd_for(id: StreamId, streams: &StdStreams) -> Result<Availability<Self>, error::Error> {
        match id {
            StreamId::Stdin => Self::new_fd(std::io::stdin().as_fd(), Some(streams)),
            StreamId::Stdout => Self::new_fd(std::io::stdout().as_fd(), Some(streams)),
            StreamId::Stderr => Self::new_fd(std::io::stderr().as_fd(), Some(streams)),
        }
    }

    #[cfg(not(unix))]
    fn new_fd_for(
        _id: StreamId,
        _streams: &StdStreams,
    ) -> Result<Availability<Self>, error::Error> {
        Ok(Availability::PassThrough {
            reason: error::Error::NotSupportedOnThisPlatform("descriptor capture").to_string(),
        })
    }

    fn inner(&mut self) -> &mut dyn Capture {
        match self {
            #[cfg(unix)]
            Self::Fd(c) => c,
            Self::Sys(c) => c,
        }
    }
}

impl Capture for StreamCapture {
    fn start(&mut self) -> Result<(), error::Error> {
        self.inner().start()
    }

    fn snap(&mut self) -> String {
        self.inner().snap()
    }

    fn done(&mut self) -> Result<(), error::Error> {
        self.inner().done()
    }

    fn suspend(&mut self) -> Result<(), error::Error> {
        self.inner().suspend()
    }

    fn resume(&mut self) -> Result<(), error::Error> {
        self.inner().resume()
    }

    fn writeorg(&mut self, data: &[u8]) -> Result<(), error::Error> {
        self.inner().writeorg(data)
    }
}

impl std::fmt::Display for StreamCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(unix)]
            Self::Fd(c) => std::fmt::Display::fmt(c, f),
            Self::Sys(c) => std::fmt::Display::fmt(c, f),
        }
    }
}

/// Decodes captured bytes, replacing anything that is not valid UTF-8.
pub(crate) fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

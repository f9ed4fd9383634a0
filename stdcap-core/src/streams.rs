//! The process-stream table that stream-level capture swaps entries of.

use std::io::{IsTerminal, Read, Write};
use std::process::Stdio;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error;
use crate::stream::StreamId;

/// A shareable, growable in-memory byte buffer.
#[derive(Clone, Default)]
pub struct MemoryBuffer(Arc<Mutex<Vec<u8>>>);

impl MemoryBuffer {
    /// Creates a new, empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes to the buffer.
    pub fn append(&self, data: &[u8]) {
        self.0.lock().extend_from_slice(data);
    }

    /// Returns the buffered bytes and leaves the buffer empty.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.lock())
    }

    /// Returns whether nothing has been buffered.
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// Represents the object currently standing in for one of the standard streams.
pub enum StdStream {
    /// The original standard input this process was started with.
    Stdin(std::io::Stdin),
    /// The original standard output this process was started with.
    Stdout(std::io::Stdout),
    /// The original standard error this process was started with.
    Stderr(std::io::Stderr),
    /// A file open for reading or writing.
    File(std::fs::File),
    /// An in-memory buffer.
    Memory(MemoryBuffer),
    /// Captured standard input; reads fail immediately instead of blocking.
    Unreadable,
}

impl StdStream {
    /// Returns the real process stream for the given identifier.
    pub fn original(id: StreamId) -> Self {
        match id {
            StreamId::Stdin => Self::Stdin(std::io::stdin()),
            StreamId::Stdout => Self::Stdout(std::io::stdout()),
            StreamId::Stderr => Self::Stderr(std::io::stderr()),
        }
    }

    /// Tries to duplicate the stream. Buffers are shared, not copied.
    pub fn try_dup(&self) -> Result<Self, error::Error> {
        let result = match self {
            Self::Stdin(_) => Self::Stdin(std::io::stdin()),
            Self::Stdout(_) => Self::Stdout(std::io::stdout()),
            Self::Stderr(_) => Self::Stderr(std::io::stderr()),
            Self::File(f) => Self::File(f.try_clone()?),
            Self::Memory(m) => Self::Memory(m.clone()),
            Self::Unreadable => Self::Unreadable,
        };

        Ok(result)
    }

    /// Returns whether the stream is one of the real process streams.
    pub const fn is_original(&self) -> bool {
        matches!(self, Self::Stdin(_) | Self::Stdout(_) | Self::Stderr(_))
    }

    /// Returns whether the stream refers to a terminal.
    pub fn is_term(&self) -> bool {
        match self {
            Self::Stdin(f) => f.is_terminal(),
            Self::Stdout(f) => f.is_terminal(),
            Self::Stderr(f) => f.is_terminal(),
            Self::File(f) => f.is_terminal(),
            Self::Memory(_) | Self::Unreadable => false,
        }
    }

    /// Converts the stream into a form that can be handed to a child process. In-memory
    /// buffers cannot be inherited; `None` is returned for them and the caller must pipe
    /// and copy instead.
    pub fn try_into_stdio(self) -> Option<Stdio> {
        match self {
            Self::Stdin(_) | Self::Stdout(_) | Self::Stderr(_) => Some(Stdio::inherit()),
            Self::File(f) => Some(f.into()),
            Self::Unreadable => Some(Stdio::null()),
            Self::Memory(_) => None,
        }
    }
}

impl Read for StdStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Stdin(f) => f.read(buf),
            Self::Stdout(_) => Err(std::io::Error::other(error::Error::StreamNotReadable(
                "stdout",
            ))),
            Self::Stderr(_) => Err(std::io::Error::other(error::Error::StreamNotReadable(
                "stderr",
            ))),
            Self::File(f) => f.read(buf),
            Self::Memory(_) => Err(std::io::Error::other(error::Error::StreamNotReadable(
                "memory buffer",
            ))),
            Self::Unreadable => Err(std::io::Error::other(error::Error::ReadFromCapturedStdin)),
        }
    }
}

impl Write for StdStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Stdin(_) => Err(std::io::Error::other(error::Error::StreamNotWritable(
                "stdin",
            ))),
            Self::Stdout(f) => f.write(buf),
            Self::Stderr(f) => f.write(buf),
            Self::File(f) => f.write(buf),
            Self::Memory(m) => {
                m.append(buf);
                Ok(buf.len())
            }
            Self::Unreadable => Err(std::io::Error::other(error::Error::StreamNotWritable(
                "captured stdin",
            ))),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdin(_) | Self::Memory(_) | Self::Unreadable => Ok(()),
            Self::Stdout(f) => f.flush(),
            Self::Stderr(f) => f.flush(),
            Self::File(f) => f.flush(),
        }
    }
}

/// The table of objects standing in for the three standard streams.
///
/// Code that wants its writes to be visible to stream-level capture writes through the
/// handles returned by [`StdStreams::stdout`] and friends rather than through the
/// process streams directly. The table is cheap to clone; clones share the same slots.
#[derive(Clone)]
pub struct StdStreams {
    slots: Arc<Mutex<[StdStream; 3]>>,
}

impl Default for StdStreams {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new([
                StdStream::original(StreamId::Stdin),
                StdStream::original(StreamId::Stdout),
                StdStream::original(StreamId::Stderr),
            ])),
        }
    }
}

impl StdStreams {
    /// Creates a table whose slots refer to the real process streams.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a new stream in the given slot, returning the one it replaced.
    ///
    /// Arguments:
    ///
    /// * `id`: The slot to update.
    /// * `stream`: The stream to install.
    pub fn replace(&self, id: StreamId, stream: StdStream) -> StdStream {
        std::mem::replace(&mut self.slots.lock()[id.index()], stream)
    }

    /// Returns a duplicate of the stream currently installed in the given slot.
    pub fn get(&self, id: StreamId) -> Result<StdStream, error::Error> {
        self.slots.lock()[id.index()].try_dup()
    }

    /// Returns whether the given slot currently holds the real process stream.
    pub fn is_original(&self, id: StreamId) -> bool {
        self.slots.lock()[id.index()].is_original()
    }

    /// Returns a handle for reading from the current standard input.
    pub fn stdin(&self) -> StreamHandle {
        self.handle(StreamId::Stdin)
    }

    /// Returns a handle for writing to the current standard output.
    pub fn stdout(&self) -> StreamHandle {
        self.handle(StreamId::Stdout)
    }

    /// Returns a handle for writing to the current standard error.
    pub fn stderr(&self) -> StreamHandle {
        self.handle(StreamId::Stderr)
    }

    fn handle(&self, id: StreamId) -> StreamHandle {
        StreamHandle {
            id,
            streams: self.clone(),
        }
    }
}

/// A handle that performs I/O against whatever stream is installed in a slot at the
/// time of each call.
#[derive(Clone)]
pub struct StreamHandle {
    id: StreamId,
    streams: StdStreams,
}

impl Read for StreamHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.streams.slots.lock()[self.id.index()].read(buf)
    }
}

impl Write for StreamHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.streams.slots.lock()[self.id.index()].write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.streams.slots.lock()[self.id.index()].flush()
    }
}

/// Monolithic error type for output capture.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The saved duplicate of a captured descriptor is no longer valid; capturing it
    /// would silently lose output.
    #[error("saved file descriptor {0} not valid anymore")]
    CaptureSetup(i32),

    /// A multi-stream capture was stopped more than once.
    #[error("capture was already stopped")]
    AlreadyStopped,

    /// A single stream capture was released more than once.
    #[error("capture of {0} was already released")]
    AlreadyReleased(String),

    /// A capture operation was attempted before the capture was started.
    #[error("capture of {0} has not been started")]
    NotStarted(String),

    /// Both fixture kinds were requested by the same test.
    #[error("cannot use capsys and capfd at the same time")]
    IncompatibleFixtures,

    /// The capture manager was asked to capture before being initialized.
    #[error("capturing has not been initialized")]
    NotInitialized,

    /// The capture manager was initialized twice.
    #[error("capturing was already initialized")]
    AlreadyInitialized,

    /// The requested capture method is not known.
    #[error("unknown capturing method: {0:?}")]
    UnknownCaptureMethod(String),

    /// Standard input was read while it was being captured.
    #[error("reading from stdin while output is captured")]
    ReadFromCapturedStdin,

    /// The given stream cannot be read from.
    #[error("cannot read from {0}")]
    StreamNotReadable(&'static str),

    /// The given stream cannot be written to.
    #[error("cannot write to {0}")]
    StreamNotWritable(&'static str),

    /// The requested functionality is not available on this platform.
    #[error("not supported on this platform: {0}")]
    NotSupportedOnThisPlatform(&'static str),

    /// An I/O error occurred.
    #[error("i/o error: {0}")]
    IoError(#[from] std::io::Error),

    /// A system error occurred.
    #[cfg(unix)]
    #[error("system error: {0}")]
    ErrnoError(#[from] nix::errno::Errno),
}

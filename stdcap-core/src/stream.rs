//! Identifiers for the three standard streams.

/// Raw file descriptor number.
#[cfg(unix)]
pub type RawFd = std::os::fd::RawFd;
/// Raw file descriptor number.
#[cfg(not(unix))]
pub type RawFd = i32;

/// Identifies one of the standard streams of the process.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum_macros::Display, strum_macros::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum StreamId {
    /// Standard input.
    Stdin,
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl StreamId {
    /// Returns the stream bound to the given descriptor number, if any.
    pub const fn from_fd(fd: RawFd) -> Option<Self> {
        match fd {
            0 => Some(Self::Stdin),
            1 => Some(Self::Stdout),
            2 => Some(Self::Stderr),
            _ => None,
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Stdin => 0,
            Self::Stdout => 1,
            Self::Stderr => 2,
        }
    }
}

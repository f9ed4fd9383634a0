//! File descriptor utilities.

use std::io::Write;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use nix::fcntl::{FcntlArg, fcntl};

use crate::error;

/// Lowest descriptor number handed out for saved duplicates, so that a duplicate never
/// lands on one of the standard descriptors.
const MIN_SAVED_FD: RawFd = 3;

/// Duplicates the given descriptor, returning an owned, close-on-exec duplicate.
///
/// Fails if `fd` is not an open descriptor.
pub(crate) fn dup(fd: BorrowedFd<'_>) -> Result<OwnedFd, error::Error> {
    let new_fd = fcntl(fd, FcntlArg::F_DUPFD_CLOEXEC(MIN_SAVED_FD))?;

    // SAFETY: `new_fd` was just returned by a successful F_DUPFD_CLOEXEC call and is
    // therefore open and owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(new_fd) })
}

/// Points the descriptor number `target` at the open file referred to by `src`.
///
/// Whatever `target` previously referred to is closed by this call. `nix::unistd::dup2`
/// needs the target as an `OwnedFd`, which a captured descriptor is not.
pub(crate) fn redirect(src: BorrowedFd<'_>, target: RawFd) -> Result<(), error::Error> {
    loop {
        // SAFETY: dup2 does not touch memory; `src` is a live borrowed descriptor. The
        // caller owns the decision to replace `target`.
        match Errno::result(unsafe { libc::dup2(src.as_raw_fd(), target) }) {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => (),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Checks whether `fd` still refers to an open file. An owned descriptor can still be
/// closed behind its owner's back through its number.
pub(crate) fn is_valid(fd: BorrowedFd<'_>) -> bool {
    fcntl(fd, FcntlArg::F_GETFD).is_ok()
}

/// Writes all of `data` directly to the given descriptor, bypassing any buffering.
pub(crate) fn write_all(fd: BorrowedFd<'_>, mut data: &[u8]) -> Result<(), error::Error> {
    while !data.is_empty() {
        match nix::unistd::write(fd, data) {
            Ok(0) => return Err(std::io::Error::from(std::io::ErrorKind::WriteZero).into()),
            Ok(n) => data = &data[n..],
            Err(Errno::EINTR) => (),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

/// Opens the null device for reading, so reads return end-of-file.
pub(crate) fn open_null_for_reading() -> Result<std::fs::File, error::Error> {
    Ok(std::fs::File::open("/dev/null")?)
}

/// Flushes the process-level buffered writer (if any) that sits on top of `fd`, so that
/// bytes written before a descriptor transition land on the right side of it.
pub(crate) fn flush_std_writer(fd: RawFd) {
    let result = match fd {
        1 => std::io::stdout().flush(),
        2 => std::io::stderr().flush(),
        _ => Ok(()),
    };

    if let Err(e) = result {
        tracing::debug!(target: crate::trace_categories::CAPTURE, "failed to flush fd {fd}: {e}");
    }
}

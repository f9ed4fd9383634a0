use std::io::{Read, Seek, SeekFrom};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, OwnedFd, RawFd};

use crate::capture::{Availability, Capture, CaptureState, SysCapture, decode};
use crate::error;
use crate::stream::StreamId;
use crate::streams::{StdStream, StdStreams};
use crate::sys;
use crate::trace_categories;

/// Captures writes to an OS-level file descriptor.
///
/// The live descriptor is duplicated into a saved slot and the descriptor number is then
/// pointed at an anonymous temporary file. For standard input, the descriptor is pointed
/// at the null device instead, so reads see end-of-file rather than blocking. When the
/// target is one of the standard descriptors, the matching [`StdStreams`] entry is swapped
/// as well, so the descriptor and the stream table agree.
pub struct FdCapture {
    target: RawFd,
    saved: Option<OwnedFd>,
    tmpfile: Option<std::fs::File>,
    mirror: Option<SysCapture>,
    state: CaptureState,
}

impl FdCapture {
    /// Prepares a capture of `target`. If the descriptor cannot be duplicated (typically
    /// because it is not open), the capture is reported as unavailable.
    ///
    /// Arguments:
    ///
    /// * `target`: The descriptor to capture. Its number is redirected for the lifetime of
    ///   the capture.
    /// * `streams`: The stream table to mirror the capture into, if any.
    pub fn new(
        target: BorrowedFd<'_>,
        streams: Option<&StdStreams>,
    ) -> Result<Availability<Self>, error::Error> {
        let saved = match sys::fd::dup(target) {
            Ok(saved) => saved,
            Err(e) => {
                tracing::debug!(target: trace_categories::CAPTURE, "fd {} passed through: {e}", target.as_raw_fd());
                return Ok(Availability::PassThrough {
                    reason: e.to_string(),
                });
            }
        };

        let target = target.as_raw_fd();
        let stream_id = StreamId::from_fd(target);

        let (tmpfile, mirror) = if stream_id == Some(StreamId::Stdin) {
            let tmpfile = sys::fd::open_null_for_reading()?;
            let mirror = streams.map(|s| SysCapture::new(StreamId::Stdin, s.clone()));
            (tmpfile, mirror)
        } else {
            let tmpfile = tempfile::tempfile()?;
            let mirror = match (streams, stream_id) {
                (Some(s), Some(id)) => Some(SysCapture::with_replacement(
                    id,
                    s.clone(),
                    StdStream::File(tmpfile.try_clone()?),
                )),
                _ => None,
            };
            (tmpfile, mirror)
        };

        Ok(Availability::Captured(Self {
            target,
            saved: Some(saved),
            tmpfile: Some(tmpfile),
            mirror,
            state: CaptureState::Created,
        }))
    }

    fn check_active(&self) -> Result<(), error::Error> {
        match self.state {
            CaptureState::Created => Err(error::Error::NotStarted(self.to_string())),
            CaptureState::Done => Err(error::Error::AlreadyReleased(self.to_string())),
            CaptureState::Started | CaptureState::Suspended => Ok(()),
        }
    }

    fn check_saved_valid(&self) -> Result<(), error::Error> {
        match &self.saved {
            Some(saved) if sys::fd::is_valid(saved.as_fd()) => Ok(()),
            Some(saved) => Err(error::Error::CaptureSetup(saved.as_raw_fd())),
            None => Err(error::Error::AlreadyReleased(self.to_string())),
        }
    }

    fn redirect_to_tmpfile(&self) -> Result<(), error::Error> {
        if let Some(tmpfile) = &self.tmpfile {
            sys::fd::flush_std_writer(self.target);
            sys::fd::redirect(tmpfile.as_fd(), self.target)?;
        }
        Ok(())
    }

    fn redirect_to_saved(&self) -> Result<(), error::Error> {
        if let Some(saved) = &self.saved {
            sys::fd::flush_std_writer(self.target);
            sys::fd::redirect(saved.as_fd(), self.target)?;
        }
        Ok(())
    }

    fn read_and_truncate(&mut self) -> std::io::Result<Vec<u8>> {
        let mut contents = vec![];
        if let Some(tmpfile) = &mut self.tmpfile {
            tmpfile.seek(SeekFrom::Start(0))?;
            tmpfile.read_to_end(&mut contents)?;
            if !contents.is_empty() {
                tmpfile.set_len(0)?;
                tmpfile.seek(SeekFrom::Start(0))?;
            }
        }
        Ok(contents)
    }
}

impl Capture for FdCapture {
    fn start(&mut self) -> Result<(), error::Error> {
        match self.state {
            CaptureState::Created => (),
            CaptureState::Done => return Err(error::Error::AlreadyReleased(self.to_string())),
            CaptureState::Started | CaptureState::Suspended => return Ok(()),
        }

        self.check_saved_valid()?;
        self.redirect_to_tmpfile()?;
        if let Some(mirror) = &mut self.mirror {
            mirror.start()?;
        }
        self.state = CaptureState::Started;

        tracing::debug!(target: trace_categories::CAPTURE, "started {self}");

        Ok(())
    }

    fn snap(&mut self) -> String {
        if self.state == CaptureState::Started {
            sys::fd::flush_std_writer(self.target);
        }

        match self.read_and_truncate() {
            Ok(contents) => decode(&contents),
            Err(e) => {
                tracing::warn!(target: trace_categories::CAPTURE, "failed to read {self}: {e}");
                String::new()
            }
        }
    }

    fn done(&mut self) -> Result<(), error::Error> {
        if self.state == CaptureState::Done {
            return Err(error::Error::AlreadyReleased(self.to_string()));
        }

        let was_started = self.state != CaptureState::Created;
        self.state = CaptureState::Done;

        // Everything is released even when the descriptor cannot be restored, so the
        // stream table never keeps pointing at the buffer.
        let restored = if was_started {
            self.redirect_to_saved()
        } else {
            Ok(())
        };

        let mirror_released = match self.mirror.take() {
            Some(mut mirror) if was_started => mirror.done(),
            _ => Ok(()),
        };

        if let Some(saved) = self.saved.take() {
            if restored.is_err() || !sys::fd::is_valid(saved.as_fd()) {
                // The number was closed behind our back and may belong to someone else by
                // now; it must not be closed again.
                let _ = saved.into_raw_fd();
            }
        }
        self.tmpfile = None;

        tracing::debug!(target: trace_categories::CAPTURE, "released fd capture of fd {}", self.target);

        restored.and(mirror_released)
    }

    fn suspend(&mut self) -> Result<(), error::Error> {
        self.check_active()?;

        if let Some(mirror) = &mut self.mirror {
            mirror.suspend()?;
        }
        self.redirect_to_saved()?;
        self.state = CaptureState::Suspended;

        Ok(())
    }

    fn resume(&mut self) -> Result<(), error::Error> {
        self.check_active()?;
        self.check_saved_valid()?;

        if let Some(mirror) = &mut self.mirror {
            mirror.resume()?;
        }
        self.redirect_to_tmpfile()?;
        self.state = CaptureState::Started;

        Ok(())
    }

    fn writeorg(&mut self, data: &[u8]) -> Result<(), error::Error> {
        match &self.saved {
            Some(saved) => sys::fd::write_all(saved.as_fd(), data),
            None => Err(error::Error::AlreadyReleased(self.to_string())),
        }
    }
}

impl Drop for FdCapture {
    fn drop(&mut self) {
        if matches!(self.state, CaptureState::Started | CaptureState::Suspended) {
            tracing::warn!(target: trace_categories::CAPTURE, "{self} dropped while active; restoring");
            if let Err(e) = self.redirect_to_saved() {
                tracing::error!(target: trace_categories::CAPTURE, "failed to restore fd {}: {e}", self.target);
            }
        }
    }
}

impl std::fmt::Display for FdCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.saved {
            Some(saved) => write!(
                f,
                "fd capture of fd {} (saved as fd {})",
                self.target,
                saved.as_raw_fd()
            ),
            None => write!(f, "fd capture of fd {}", self.target),
        }
    }
}

//! Read stream that mirrors every byte it reads into a second stream.

use std::io::{self, Read, Seek, SeekFrom, Write};

use tiercache_storage::FileStream;
use tracing::{debug, warn};

use crate::error::OverlayError;

/// Completion callback, called once on close with whether the whole source
/// was mirrored.
pub type CompletionCallback = Box<dyn FnOnce(bool) + Send>;

/// Stream that copies what is read from `source` into `target`.
///
/// Mirroring stops for good (the copy is "aborted") when the reader skips
/// bytes it never read: a forward relative seek, an absolute seek past what
/// the target already holds, or a seek relative to the end. Backward seeks
/// reposition the target and keep mirroring.
///
/// On close the target is closed, then the callback receives
/// `true` only if nothing aborted the copy and the source is at its end.
pub struct TeeCopyStream {
    source: Box<dyn FileStream>,
    target: Box<dyn FileStream>,
    callback: Option<CompletionCallback>,
    aborted: bool,
    closed: bool,
}

impl TeeCopyStream {
    /// Wrap `source`, mirroring into `target`.
    ///
    /// # Arguments
    /// * `source` - Stream being read by the caller
    /// * `target` - Writable stream receiving the copy
    /// * `callback` - Called once on close with the success flag
    ///
    /// # Returns
    /// `OverlayError::InvalidStream` if either stream is not open.
    pub fn new(
        source: Box<dyn FileStream>,
        target: Box<dyn FileStream>,
        callback: impl FnOnce(bool) + Send + 'static,
    ) -> Result<Self, OverlayError> {
        if !source.is_open() {
            return Err(OverlayError::InvalidStream(
                "source stream is not open".to_string(),
            ));
        }
        if !target.is_open() {
            return Err(OverlayError::InvalidStream(
                "target stream is not open".to_string(),
            ));
        }
        let callback: CompletionCallback = Box::new(callback);
        Ok(Self {
            source,
            target,
            callback: Some(callback),
            aborted: false,
            closed: false,
        })
    }

    /// Whether mirroring has been abandoned.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    fn abort(&mut self, reason: &str) {
        if !self.aborted {
            debug!("Tee copy aborted: {}", reason);
            self.aborted = true;
        }
    }

    /// Reposition the target to follow a seek of the source, or abort.
    fn follow_seek(&mut self, pos: SeekFrom) -> io::Result<()> {
        if self.aborted {
            return Ok(());
        }
        match pos {
            SeekFrom::Current(offset) if offset > 0 => self.abort("forward seek"),
            SeekFrom::Current(offset) => {
                self.target.seek(SeekFrom::Current(offset))?;
            }
            SeekFrom::Start(offset) => {
                let written: u64 = self.target.stream_position()?;
                if offset > written {
                    self.abort("seek past mirrored data");
                } else {
                    self.target.seek(SeekFrom::Start(offset))?;
                }
            }
            SeekFrom::End(_) => self.abort("seek relative to end"),
        }
        Ok(())
    }
}

impl Read for TeeCopyStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count: usize = self.source.read(buf)?;
        if count > 0 && !self.aborted {
            if let Err(e) = self.target.write_all(&buf[..count]) {
                warn!("Tee copy target write failed: {}", e);
                self.aborted = true;
            }
        }
        Ok(count)
    }
}

impl Write for TeeCopyStream {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "tee copy stream is read-only",
        ))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for TeeCopyStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.follow_seek(pos)?;
        self.source.seek(pos)
    }
}

impl FileStream for TeeCopyStream {
    fn is_open(&self) -> bool {
        !self.closed
    }

    fn is_eof(&mut self) -> io::Result<bool> {
        self.source.is_eof()
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let target_result: io::Result<()> = self.target.close();
        let at_end: bool = self.source.is_eof().unwrap_or(false);
        let success: bool = !self.aborted && target_result.is_ok() && at_end;
        if let Some(callback) = self.callback.take() {
            callback(success);
        }

        let source_result: io::Result<()> = self.source.close();
        target_result.and(source_result)
    }
}

impl Drop for TeeCopyStream {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close tee copy stream: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tiercache_storage::MemoryStream;

    use super::*;

    struct Fixture {
        source: MemoryStream,
        target: MemoryStream,
        outcome: Arc<Mutex<Option<bool>>>,
    }

    impl Fixture {
        fn new(data: &[u8]) -> Self {
            Self {
                source: MemoryStream::with_data(data.to_vec()),
                target: MemoryStream::new(),
                outcome: Arc::new(Mutex::new(None)),
            }
        }

        fn tee(&self) -> TeeCopyStream {
            let outcome: Arc<Mutex<Option<bool>>> = self.outcome.clone();
            TeeCopyStream::new(
                Box::new(self.source.clone()),
                Box::new(self.target.clone()),
                move |success| *outcome.lock() = Some(success),
            )
            .unwrap()
        }

        fn outcome(&self) -> Option<bool> {
            *self.outcome.lock()
        }
    }

    #[test]
    fn test_full_read_copies_everything() {
        let fixture = Fixture::new(b"foobar");
        let mut tee: TeeCopyStream = fixture.tee();

        let mut buf = [0u8; 3];
        tee.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"foo");
        tee.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"bar");
        tee.close().unwrap();

        assert_eq!(fixture.outcome(), Some(true));
        assert_eq!(fixture.target.contents(), b"foobar".to_vec());
    }

    #[test]
    fn test_partial_read_is_unsuccessful() {
        let fixture = Fixture::new(b"foobar");
        let mut tee: TeeCopyStream = fixture.tee();

        let mut buf = [0u8; 3];
        tee.read_exact(&mut buf).unwrap();
        tee.close().unwrap();

        assert_eq!(fixture.outcome(), Some(false));
        assert_eq!(fixture.target.contents(), b"foo".to_vec());
    }

    #[test]
    fn test_absolute_seek_past_mirrored_data_aborts() {
        let fixture = Fixture::new(b"foobar");
        let mut tee: TeeCopyStream = fixture.tee();

        tee.seek(SeekFrom::Start(3)).unwrap();
        assert!(tee.is_aborted());

        let mut rest: Vec<u8> = Vec::new();
        tee.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"bar".to_vec());
        tee.close().unwrap();

        assert_eq!(fixture.outcome(), Some(false));
        assert!(fixture.target.contents().is_empty());
    }

    #[test]
    fn test_forward_relative_seek_aborts() {
        let fixture = Fixture::new(b"foobar");
        let mut tee: TeeCopyStream = fixture.tee();

        let mut buf = [0u8; 2];
        tee.read_exact(&mut buf).unwrap();
        tee.seek(SeekFrom::Current(1)).unwrap();
        let mut rest: Vec<u8> = Vec::new();
        tee.read_to_end(&mut rest).unwrap();
        tee.close().unwrap();

        assert_eq!(rest, b"bar".to_vec());
        assert_eq!(fixture.outcome(), Some(false));
        assert_eq!(fixture.target.contents(), b"fo".to_vec());
    }

    #[test]
    fn test_seeks_after_abort_are_inert() {
        let fixture = Fixture::new(b"foobar");
        let mut tee: TeeCopyStream = fixture.tee();

        let mut buf = [0u8; 2];
        tee.read_exact(&mut buf).unwrap();
        tee.seek(SeekFrom::Current(2)).unwrap();
        assert!(tee.is_aborted());

        tee.seek(SeekFrom::Start(0)).unwrap();
        assert!(tee.is_aborted());
        let mut rest: Vec<u8> = Vec::new();
        tee.read_to_end(&mut rest).unwrap();
        tee.close().unwrap();

        assert_eq!(rest, b"foobar".to_vec());
        assert_eq!(fixture.target.contents(), b"fo".to_vec());
        assert_eq!(fixture.outcome(), Some(false));
    }

    #[test]
    fn test_backward_seek_keeps_mirroring() {
        let fixture = Fixture::new(b"foobar");
        let mut tee: TeeCopyStream = fixture.tee();

        let mut buf = [0u8; 4];
        tee.read_exact(&mut buf).unwrap();
        tee.seek(SeekFrom::Current(-2)).unwrap();
        let mut rest: Vec<u8> = Vec::new();
        tee.read_to_end(&mut rest).unwrap();
        tee.close().unwrap();

        assert_eq!(rest, b"obar".to_vec());
        assert_eq!(fixture.outcome(), Some(true));
        assert_eq!(fixture.target.contents(), b"foobar".to_vec());
    }

    #[test]
    fn test_absolute_seek_within_mirrored_data() {
        let fixture = Fixture::new(b"foobar");
        let mut tee: TeeCopyStream = fixture.tee();

        let mut buf = [0u8; 3];
        tee.read_exact(&mut buf).unwrap();
        tee.seek(SeekFrom::Start(1)).unwrap();
        assert!(!tee.is_aborted());
        let mut rest: Vec<u8> = Vec::new();
        tee.read_to_end(&mut rest).unwrap();
        tee.close().unwrap();

        assert_eq!(fixture.outcome(), Some(true));
        assert_eq!(fixture.target.contents(), b"foobar".to_vec());
    }

    #[test]
    fn test_seek_from_end_aborts() {
        let fixture = Fixture::new(b"foobar");
        let mut tee: TeeCopyStream = fixture.tee();

        tee.seek(SeekFrom::End(-3)).unwrap();
        assert!(tee.is_aborted());
    }

    #[test]
    fn test_drop_runs_callback_once() {
        let fixture = Fixture::new(b"ab");
        {
            let mut tee: TeeCopyStream = fixture.tee();
            let mut rest: Vec<u8> = Vec::new();
            tee.read_to_end(&mut rest).unwrap();
        }
        assert_eq!(fixture.outcome(), Some(true));
    }

    #[test]
    fn test_closed_stream_is_rejected() {
        let mut source = MemoryStream::with_data(b"foo".to_vec());
        source.close().unwrap();

        let result = TeeCopyStream::new(Box::new(source), Box::new(MemoryStream::new()), |_| {});
        assert!(matches!(result, Err(OverlayError::InvalidStream(_))));
    }

    #[test]
    fn test_writes_are_rejected() {
        let fixture = Fixture::new(b"foo");
        let mut tee: TeeCopyStream = fixture.tee();

        assert!(tee.write(b"x").is_err());
    }
}

//! Stream implementations.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::traits::FileStream;

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "stream is closed")
}

/// Stream over a file on the local filesystem.
pub struct LocalFileStream {
    file: Option<File>,
}

impl LocalFileStream {
    /// Wrap an already opened file.
    ///
    /// # Arguments
    /// * `file` - Open file handle
    pub fn new(file: File) -> Self {
        Self { file: Some(file) }
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file.as_mut().ok_or_else(closed_error)
    }
}

impl Read for LocalFileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read(buf)
    }
}

impl Write for LocalFileStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl Seek for LocalFileStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file()?.seek(pos)
    }
}

impl FileStream for LocalFileStream {
    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn is_eof(&mut self) -> io::Result<bool> {
        let file: &mut File = self.file()?;
        let position: u64 = file.stream_position()?;
        let len: u64 = file.metadata()?.len();
        Ok(position >= len)
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

/// In-memory stream over a shared buffer.
///
/// Clones share the buffer but keep their own position and open state, so a
/// clone taken before handing a stream away can inspect what was written.
#[derive(Debug, Clone, Default)]
pub struct MemoryStream {
    data: Arc<Mutex<Vec<u8>>>,
    position: u64,
    closed: bool,
}

impl MemoryStream {
    /// Create an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stream positioned at the start of `data`.
    ///
    /// # Arguments
    /// * `data` - Initial content
    pub fn with_data(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Arc::new(Mutex::new(data.into())),
            position: 0,
            closed: false,
        }
    }

    /// Copy of the current content of the shared buffer.
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    /// Current position.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn check_open(&self) -> io::Result<()> {
        if self.closed {
            Err(closed_error())
        } else {
            Ok(())
        }
    }
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_open()?;
        let data = self.data.lock();
        let start: usize = (self.position as usize).min(data.len());
        let count: usize = buf.len().min(data.len() - start);
        buf[..count].copy_from_slice(&data[start..start + count]);
        drop(data);
        self.position += count as u64;
        Ok(count)
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_open()?;
        let mut data = self.data.lock();
        let start: usize = self.position as usize;
        if data.len() < start {
            data.resize(start, 0);
        }
        let overlap: usize = buf.len().min(data.len() - start);
        data[start..start + overlap].copy_from_slice(&buf[..overlap]);
        data.extend_from_slice(&buf[overlap..]);
        drop(data);
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_open()
    }
}

impl Seek for MemoryStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.check_open()?;
        let len: i64 = self.data.lock().len() as i64;
        let target: i64 = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.position as i64 + offset,
            SeekFrom::End(offset) => len + offset,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative position",
            ));
        }
        self.position = target as u64;
        Ok(self.position)
    }
}

impl FileStream for MemoryStream {
    fn is_open(&self) -> bool {
        !self.closed
    }

    fn is_eof(&mut self) -> io::Result<bool> {
        self.check_open()?;
        Ok(self.position >= self.data.lock().len() as u64)
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

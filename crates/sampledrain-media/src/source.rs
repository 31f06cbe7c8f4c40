//! Random-access readers over a finished container.

use bytes::{Bytes, BytesMut};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Seek-and-read primitive used while draining.
///
/// Reads past end-of-file are errors, never short reads.
pub trait SampleSource {
    /// Position the source at an absolute byte offset.
    fn seek(&mut self, offset: u64) -> io::Result<()>;

    /// Read exactly `len` bytes from the current position.
    fn read(&mut self, len: usize) -> io::Result<Bytes>;

    /// Release the underlying handle.
    fn close(&mut self) -> io::Result<()>;
}

/// [`SampleSource`] over any `Read + Seek`.
///
/// Payloads are split off a shared [`BytesMut`], so the allocation is
/// reclaimed once the previous sample's [`Bytes`] has been dropped.
pub struct ReaderSource<R> {
    reader: Option<R>,
    buf: BytesMut,
    // Stream length, measured on first read.
    stream_len: Option<u64>,
}

impl<R: Read + Seek> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            buf: BytesMut::new(),
            stream_len: None,
        }
    }

    fn reader(&mut self) -> io::Result<&mut R> {
        self.reader
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "source is closed"))
    }

    /// Fail with `UnexpectedEof` unless `len` bytes remain after the cursor.
    fn check_remaining(&mut self, len: usize) -> io::Result<()> {
        let cached = self.stream_len;
        let reader = self.reader()?;
        let pos = reader.stream_position()?;
        let stream_len = match cached {
            Some(stream_len) => stream_len,
            None => {
                let stream_len = reader.seek(SeekFrom::End(0))?;
                reader.seek(SeekFrom::Start(pos))?;
                self.stream_len = Some(stream_len);
                stream_len
            }
        };

        match pos.checked_add(len as u64) {
            Some(end) if end <= stream_len => Ok(()),
            _ => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "read of {} bytes at offset {} runs past end of stream ({} bytes)",
                    len, pos, stream_len
                ),
            )),
        }
    }
}

impl<R: Read + Seek> SampleSource for ReaderSource<R> {
    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.reader()?.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn read(&mut self, len: usize) -> io::Result<Bytes> {
        self.check_remaining(len)?;

        // Take the buffer out so the reader can be borrowed mutably.
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        buf.resize(len, 0);
        let result = self.reader()?.read_exact(&mut buf[..]);
        let payload = buf.split().freeze();
        self.buf = buf;
        result?;
        Ok(payload)
    }

    fn close(&mut self) -> io::Result<()> {
        self.reader = None;
        Ok(())
    }
}

/// [`SampleSource`] over a container file on disk.
pub struct FileSource {
    path: PathBuf,
    inner: ReaderSource<BufReader<File>>,
}

impl FileSource {
    /// Open the container at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            path,
            inner: ReaderSource::new(BufReader::new(file)),
        })
    }

    /// Path of the container.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the handle and delete the container file.
    pub fn remove(mut self) -> io::Result<()> {
        self.inner.close()?;
        std::fs::remove_file(&self.path)
    }
}

impl SampleSource for FileSource {
    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.inner.seek(offset)
    }

    fn read(&mut self, len: usize) -> io::Result<Bytes> {
        self.inner.read(len)
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner.close()
    }
}

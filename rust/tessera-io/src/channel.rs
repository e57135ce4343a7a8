//! Byte channels built over other sources.

use std::io::Read;

use crate::{
    ByteChannel, Closeable, ReadAt, SharedStream,
    utils::{borrow_mut, closed_error},
};

/// A non-seekable channel reading from a shared input stream.
///
/// The stream stays owned by whoever shared it: when that owner rewinds the stream,
/// it reports the new position through [`ByteChannel::source_rewound`]. Closing the
/// channel closes the stream.
pub struct StreamChannel {
    stream: SharedStream,
    pos: u64,
    closed: bool,
}

impl StreamChannel {
    pub fn new(stream: SharedStream) -> StreamChannel {
        StreamChannel {
            stream,
            pos: 0,
            closed: false,
        }
    }

    /// Returns the stream this channel reads from.
    pub fn stream(&self) -> &SharedStream {
        &self.stream
    }
}

impl Read for StreamChannel {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(closed_error("channel"));
        }
        let n = borrow_mut(&self.stream, "input stream")?.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl ByteChannel for StreamChannel {
    fn position(&self) -> u64 {
        self.pos
    }

    fn source_rewound(&mut self, pos: u64) {
        self.pos = pos;
    }
}

impl Closeable for StreamChannel {
    fn close(&mut self) -> std::io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        borrow_mut(&self.stream, "input stream")?.close()
    }
}

/// A seekable channel over any `ReadAt` implementation.
///
/// This adapter maintains an internal position and reads sequentially from the
/// underlying `ReadAt` source.
pub struct ReadAtChannel<R> {
    inner: R,
    pos: u64,
    /// Cached size of the inner `ReadAt`
    size: Option<u64>,
    closed: bool,
}

impl<R> ReadAtChannel<R> {
    /// Creates a new channel wrapping the given `ReadAt` implementation.
    ///
    /// The channel starts reading from position 0.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pos: 0,
            size: None,
            closed: false,
        }
    }

    /// Returns a reference to the underlying `ReadAt` implementation.
    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R: ReadAt> ReadAtChannel<R> {
    fn size(&mut self) -> std::io::Result<u64> {
        if let Some(size) = self.size {
            Ok(size)
        } else {
            let size = self.inner.size()?;
            self.size = Some(size);
            Ok(size)
        }
    }
}

impl<R: ReadAt> Read for ReadAtChannel<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(closed_error("channel"));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let size = self.size()?;
        if self.pos >= size {
            return Ok(0);
        }

        let to_read = (buf.len() as u64).min(size - self.pos);
        let bytes = self.inner.read_at(self.pos..self.pos + to_read)?;
        let bytes_read = bytes.len();
        buf[..bytes_read].copy_from_slice(&bytes);
        self.pos += bytes_read as u64;
        Ok(bytes_read)
    }
}

impl<R: ReadAt> ByteChannel for ReadAtChannel<R> {
    fn position(&self) -> u64 {
        self.pos
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn set_position(&mut self, pos: u64) -> std::io::Result<()> {
        if self.closed {
            return Err(closed_error("channel"));
        }
        // Positions past the end are allowed, reads there return EOF.
        self.pos = pos;
        Ok(())
    }
}

impl<R> Closeable for ReadAtChannel<R> {
    fn close(&mut self) -> std::io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

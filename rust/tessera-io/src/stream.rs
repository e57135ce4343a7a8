//! Input streams over arbitrary `std::io::Read` sources.

use std::io::Read;

use log::trace;

use crate::{Closeable, InputStream, utils::closed_error};

/// An input stream that adds mark/reset support to any `Read` source by retaining
/// the bytes read since the last mark.
///
/// As with any buffered stream, the mark is discarded once more than `read_limit`
/// bytes were read past it; a later [`InputStream::reset`] then fails.
pub struct MarkableStream<R> {
    inner: Option<R>,
    /// Bytes read from `inner` since the mark.
    retained: Vec<u8>,
    /// Position of the next byte to replay within `retained`.
    replay_pos: usize,
    read_limit: usize,
    marked: bool,
}

impl<R: Read> MarkableStream<R> {
    pub fn new(inner: R) -> MarkableStream<R> {
        MarkableStream {
            inner: Some(inner),
            retained: Vec::new(),
            replay_pos: 0,
            read_limit: 0,
            marked: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl<R: Read> Read for MarkableStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.replay_pos < self.retained.len() {
            let n = buf.len().min(self.retained.len() - self.replay_pos);
            buf[..n].copy_from_slice(&self.retained[self.replay_pos..self.replay_pos + n]);
            self.replay_pos += n;
            return Ok(n);
        }
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| closed_error("input stream"))?;
        let n = inner.read(buf)?;
        if self.marked {
            if self.retained.len() + n > self.read_limit {
                trace!("mark discarded after {} bytes", self.retained.len() + n);
                self.marked = false;
                self.retained.clear();
                self.replay_pos = 0;
            } else {
                self.retained.extend_from_slice(&buf[..n]);
                self.replay_pos = self.retained.len();
            }
        }
        Ok(n)
    }
}

impl<R: Read> InputStream for MarkableStream<R> {
    fn mark(&mut self, read_limit: usize) {
        self.retained.drain(..self.replay_pos);
        self.replay_pos = 0;
        self.read_limit = read_limit.max(self.retained.len());
        self.marked = true;
    }

    fn reset(&mut self) -> std::io::Result<()> {
        if !self.marked {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "resetting to invalid mark",
            ));
        }
        self.replay_pos = 0;
        Ok(())
    }

    fn mark_supported(&self) -> bool {
        true
    }
}

impl<R> Closeable for MarkableStream<R> {
    fn close(&mut self) -> std::io::Result<()> {
        self.inner.take();
        self.retained = Vec::new();
        self.replay_pos = 0;
        self.marked = false;
        Ok(())
    }
}

/// An input stream which can be read only once.
pub struct ForwardStream<R> {
    inner: Option<R>,
}

impl<R: Read> ForwardStream<R> {
    pub fn new(inner: R) -> ForwardStream<R> {
        ForwardStream { inner: Some(inner) }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl<R: Read> Read for ForwardStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner
            .as_mut()
            .ok_or_else(|| closed_error("input stream"))?
            .read(buf)
    }
}

impl<R: Read> InputStream for ForwardStream<R> {}

impl<R> Closeable for ForwardStream<R> {
    fn close(&mut self) -> std::io::Result<()> {
        self.inner.take();
        Ok(())
    }
}

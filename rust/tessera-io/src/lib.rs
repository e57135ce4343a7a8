//! I/O abstractions the storage views are built from:
//! - `ReadAt`: positional reader with the ability to fetch a specified byte range from a file/blob.
//! - `ByteChannel`: sequential byte source with a position, optionally seekable.
//! - `InputStream`: sequential byte source with optional mark/reset support.
//! - `CharReader`: sequential character source.
//!
//! Every stateful source is also `Closeable`. Closing is explicit, since the owner of a
//! group of views must decide which of them are released and in which order.
//!
//! Sources that several views read from are shared as `Rc<RefCell<dyn Trait>>`; all the
//! types here are meant for single-threaded use.

use std::{cell::RefCell, ops::Range, rc::Rc, sync::Arc};

pub mod adapter;
pub mod channel;
pub mod data_input;
pub mod file;
pub mod memory;
pub mod reader;
pub mod stream;
pub mod utils;
pub mod window;

pub use adapter::DataInputStream;
pub use channel::{ReadAtChannel, StreamChannel};
pub use data_input::{ChannelDataInput, Endianness};
pub use file::{FileChannel, FileReader};
pub use reader::{Encoding, StreamReader, StringReader};
pub use stream::{ForwardStream, MarkableStream};
pub use window::ByteWindow;

/// A channel shared between the views that read from it.
pub type SharedChannel = Rc<RefCell<dyn ByteChannel>>;

/// An input stream shared between the views that read from it.
pub type SharedStream = Rc<RefCell<dyn InputStream>>;

/// A character reader shared between the views that read from it.
pub type SharedReader = Rc<RefCell<dyn CharReader>>;

/// The buffered random-access binary reader, shared between the views that read from it.
pub type SharedDataInput = Rc<RefCell<ChannelDataInput>>;

/// Wraps a value for sharing between views.
pub fn shared<T>(value: T) -> Rc<RefCell<T>> {
    Rc::new(RefCell::new(value))
}

/// A resource that must be released explicitly.
///
/// **NOTE**: `close` is not required to be idempotent. Whoever owns a set of
/// resources that wrap each other is responsible for invoking `close` exactly once
/// on the right ones.
pub trait Closeable {
    /// Releases the resource, and whatever it owns.
    fn close(&mut self) -> std::io::Result<()>;
}

/// A trait representing a conceptual file or buffer that supports reading from arbitrary
/// positions.
pub trait ReadAt: Send + Sync + 'static {
    /// Returns the size of the underlying object.
    fn size(&self) -> std::io::Result<u64>;

    /// Reads a specified range of bytes from the object.
    ///
    /// **NOTE**: `read_at` should not return with a short read, unless end-of-file
    /// is encountered. The range may extend beyond the end of the object, in which
    /// case only the available bytes are returned.
    fn read_at(&self, range: Range<u64>) -> std::io::Result<Vec<u8>>;
}

/// A sequential source of bytes which knows its position.
///
/// The position counts the bytes delivered since the channel origin. Seekable channels
/// can be repositioned anywhere; other channels can only be told that the source they
/// read from was rewound by someone else (see [`ByteChannel::source_rewound`]).
pub trait ByteChannel: std::io::Read + Closeable {
    /// Returns the current position of the channel.
    fn position(&self) -> u64;

    /// Returns `true` if [`ByteChannel::set_position`] accepts arbitrary positions.
    fn is_seekable(&self) -> bool {
        false
    }

    /// Moves the channel to the given position.
    ///
    /// Non-seekable channels accept only their current position.
    fn set_position(&mut self, pos: u64) -> std::io::Result<()> {
        if pos == self.position() {
            Ok(())
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "channel is not seekable",
            ))
        }
    }

    /// Informs the channel that the source it is reading from has been repositioned
    /// by its owner, so that the next byte delivered is the one at `pos`.
    ///
    /// The default implementation does nothing: channels that own their source can't
    /// be rewound behind their back.
    fn source_rewound(&mut self, pos: u64) {
        let _ = pos;
    }
}

/// A sequential source of bytes with optional mark/reset support.
pub trait InputStream: std::io::Read + Closeable {
    /// Marks the current position. A later [`InputStream::reset`] returns to it,
    /// provided no more than `read_limit` bytes were read in between.
    ///
    /// Does nothing when mark is not supported.
    fn mark(&mut self, read_limit: usize) {
        let _ = read_limit;
    }

    /// Repositions the stream to the last mark.
    fn reset(&mut self) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "mark/reset not supported",
        ))
    }

    /// Returns `true` if this stream supports [`InputStream::mark`] and
    /// [`InputStream::reset`].
    fn mark_supported(&self) -> bool {
        false
    }
}

/// A sequential source of characters with optional mark/reset support.
pub trait CharReader: Closeable {
    /// Appends at most `max_chars` characters to `out`, returning how many were appended.
    /// Returns 0 at the end of the input.
    fn read_chars(&mut self, out: &mut String, max_chars: usize) -> std::io::Result<usize>;

    /// Marks the current position, see [`InputStream::mark`].
    fn mark(&mut self, read_limit: usize) {
        let _ = read_limit;
    }

    /// Repositions the reader to the last mark.
    fn reset(&mut self) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "mark/reset not supported",
        ))
    }

    /// Returns `true` if this reader supports mark/reset.
    fn mark_supported(&self) -> bool {
        false
    }

    /// Reads all remaining characters.
    fn read_to_string(&mut self) -> std::io::Result<String> {
        let mut text = String::new();
        while self.read_chars(&mut text, 4096)? != 0 {}
        Ok(text)
    }
}

impl<T> ReadAt for Arc<T>
where
    T: ReadAt + ?Sized,
{
    fn size(&self) -> std::io::Result<u64> {
        self.as_ref().size()
    }

    fn read_at(&self, range: Range<u64>) -> std::io::Result<Vec<u8>> {
        self.as_ref().read_at(range)
    }
}

//! Buffered random-access binary reader over a byte channel.

use std::{fmt, io::Read};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};

use crate::{
    ByteChannel, ByteWindow, Closeable, SharedChannel,
    utils::{borrow_mut, closed_error, skip_exact},
    verify,
};

/// Byte order of the multi-byte primitive reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endianness {
    #[default]
    BigEndian,
    LittleEndian,
}

/// A binary reader that buffers the bytes of a channel in windows of a fixed capacity.
///
/// The first window (the *head*) always starts at stream position 0 and is kept for the
/// lifetime of the reader, so it can be shared as a read-only view of the beginning of
/// the data. Later windows are detached from the head once it is full.
///
/// The stream position is relative to the channel position at construction
/// ([`ChannelDataInput::channel_offset`]). The channel is expected to sit at
/// `channel_offset + window_origin + window.len()`; whenever it does not (because
/// someone rewound it, or because the reader moved back to an earlier window), it is
/// brought back there lazily before the next read from it.
pub struct ChannelDataInput {
    name: String,
    channel: SharedChannel,
    head: ByteWindow,
    window: ByteWindow,
    window_origin: u64,
    cursor: usize,
    channel_offset: u64,
    capacity: usize,
    byte_order: Endianness,
    closed: bool,
}

impl ChannelDataInput {
    /// Creates a reader over `channel` and fills its first window.
    pub fn new(
        name: impl Into<String>,
        channel: SharedChannel,
        capacity: usize,
    ) -> std::io::Result<ChannelDataInput> {
        verify!(capacity > 0);
        let channel_offset = borrow_mut(&channel, "channel")?.position();
        let head = ByteWindow::with_capacity(capacity);
        let mut input = ChannelDataInput {
            name: name.into(),
            channel,
            head: head.clone(),
            window: head,
            window_origin: 0,
            cursor: 0,
            channel_offset,
            capacity,
            byte_order: Endianness::default(),
            closed: false,
        };
        input.append(capacity)?;
        Ok(input)
    }

    /// Name of the storage, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> &SharedChannel {
        &self.channel
    }

    /// The window holding the first bytes of the stream.
    pub fn head_window(&self) -> &ByteWindow {
        &self.head
    }

    /// Position of the channel when this reader was created.
    pub fn channel_offset(&self) -> u64 {
        self.channel_offset
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn byte_order(&self) -> Endianness {
        self.byte_order
    }

    pub fn set_byte_order(&mut self, byte_order: Endianness) {
        self.byte_order = byte_order;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Position of the next byte to read, relative to the channel offset.
    pub fn stream_position(&self) -> u64 {
        self.window_origin + self.cursor as u64
    }

    /// Moves to the given stream position.
    ///
    /// Positions inside the current window or the head window are always reachable.
    /// Other positions require a seekable channel, except forward moves which are
    /// performed by reading and discarding bytes.
    pub fn seek(&mut self, pos: u64) -> std::io::Result<()> {
        self.ensure_open()?;
        let end = self.window_end();
        if pos >= self.window_origin && pos <= end {
            self.cursor = (pos - self.window_origin) as usize;
            return Ok(());
        }
        if pos <= self.head.len() as u64 {
            self.window = self.head.clone();
            self.window_origin = 0;
            self.cursor = pos as usize;
            return Ok(());
        }

        let mut channel = borrow_mut(&self.channel, "channel")?;
        if !channel.is_seekable() {
            if pos < end {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    format!("cannot seek backward in {}", self.name),
                ));
            }
            sync_channel(&mut *channel, self.channel_pos(end)?)?;
            skip_exact(&mut *channel, pos - end)?;
        }
        drop(channel);
        self.window = ByteWindow::with_capacity(self.capacity);
        self.window_origin = pos;
        self.cursor = 0;
        Ok(())
    }

    /// Moves back to stream position 0, reusing the head window.
    ///
    /// Invoked after the underlying channel was rewound by its owner. The bytes already
    /// held in the head window are skipped on the channel when it is read next.
    pub fn reset_buffer(&mut self) {
        self.window = self.head.clone();
        self.window_origin = 0;
        self.cursor = 0;
    }

    /// Reads up to `capacity` more bytes at the end of the head window, without moving
    /// the stream position. Returns the number of bytes added, which is 0 at the end of
    /// the channel, or when a non-seekable channel already went past the head window.
    pub fn prefetch(&mut self) -> std::io::Result<usize> {
        self.ensure_open()?;
        if self.window_origin == 0 {
            return self.append(self.capacity);
        }
        let target = self.channel_pos(self.head.len() as u64)?;
        let mut channel = borrow_mut(&self.channel, "channel")?;
        if !channel.is_seekable() && channel.position() > target {
            return Ok(0);
        }
        sync_channel(&mut *channel, target)?;
        self.head.fill_from(&mut *channel, self.capacity)
    }

    /// Reads exactly `buf.len()` bytes.
    pub fn read_fully(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        self.read_exact(buf)
    }

    pub fn read_u8(&mut self) -> std::io::Result<u8> {
        ReadBytesExt::read_u8(self)
    }

    pub fn read_i8(&mut self) -> std::io::Result<i8> {
        ReadBytesExt::read_i8(self)
    }

    fn window_end(&self) -> u64 {
        self.window_origin + self.window.len() as u64
    }

    /// Channel position of the given stream position.
    fn channel_pos(&self, stream_pos: u64) -> std::io::Result<u64> {
        self.channel_offset.checked_add(stream_pos).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("position {stream_pos} of {} is out of range", self.name),
            )
        })
    }

    fn ensure_open(&self) -> std::io::Result<()> {
        if self.closed {
            Err(closed_error(&self.name))
        } else {
            Ok(())
        }
    }

    /// Appends up to `count` bytes from the channel to the current window.
    fn append(&mut self, count: usize) -> std::io::Result<usize> {
        let target = self.channel_pos(self.window_end())?;
        let mut channel = borrow_mut(&self.channel, "channel")?;
        sync_channel(&mut *channel, target)?;
        self.window.fill_from(&mut *channel, count)
    }

    /// Makes bytes available past the cursor, returning how many were read.
    fn fill(&mut self) -> std::io::Result<usize> {
        if self.window.len() >= self.capacity {
            self.window_origin = self.window_end();
            self.window = ByteWindow::with_capacity(self.capacity);
            self.cursor = 0;
        }
        let count = self.capacity - self.window.len();
        self.append(count)
    }
}

macro_rules! ordered_reads {
    ($($name:ident -> $ty:ty),* $(,)?) => {
        impl ChannelDataInput {
            $(
                pub fn $name(&mut self) -> std::io::Result<$ty> {
                    match self.byte_order {
                        Endianness::BigEndian => ReadBytesExt::$name::<BigEndian>(self),
                        Endianness::LittleEndian => ReadBytesExt::$name::<LittleEndian>(self),
                    }
                }
            )*
        }
    };
}

ordered_reads!(
    read_u16 -> u16,
    read_i16 -> i16,
    read_u32 -> u32,
    read_i32 -> i32,
    read_u64 -> u64,
    read_i64 -> i64,
    read_f32 -> f32,
    read_f64 -> f64,
);

/// Brings `channel` to `target`, by seeking if possible or else by skipping bytes.
fn sync_channel(channel: &mut dyn ByteChannel, target: u64) -> std::io::Result<()> {
    let pos = channel.position();
    if pos == target {
        Ok(())
    } else if channel.is_seekable() {
        channel.set_position(target)
    } else if pos < target {
        skip_exact(channel, target - pos)
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "cannot move a non-seekable channel backward",
        ))
    }
}

impl Read for ChannelDataInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(0);
        }
        if self.cursor >= self.window.len() && self.fill()? == 0 {
            return Ok(0);
        }
        let n = self.window.copy_to(self.cursor, buf);
        self.cursor += n;
        Ok(n)
    }
}

impl Closeable for ChannelDataInput {
    fn close(&mut self) -> std::io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        borrow_mut(&self.channel, "channel")?.close()
    }
}

impl fmt::Debug for ChannelDataInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelDataInput")
            .field("name", &self.name)
            .field("position", &self.stream_position())
            .field("window_origin", &self.window_origin)
            .field("window_len", &self.window.len())
            .field("channel_offset", &self.channel_offset)
            .field("closed", &self.closed)
            .finish()
    }
}

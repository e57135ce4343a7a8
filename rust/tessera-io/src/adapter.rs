//! Input stream reading through a shared `ChannelDataInput`.

use std::io::Read;

use crate::{Closeable, InputStream, SharedDataInput, utils::borrow_mut, utils::closed_error};

/// An input stream view of a [`ChannelDataInput`](crate::ChannelDataInput).
///
/// Reads advance the binary reader. Mark/reset are implemented by seeking the reader,
/// so they are as capable as the channel below it. The initial mark is the reader
/// position at construction.
///
/// **NOTE**: closing the adapter does not close the binary reader; the reader belongs
/// to whoever shared it.
pub struct DataInputStream {
    input: SharedDataInput,
    mark: u64,
    closed: bool,
}

impl DataInputStream {
    pub fn new(input: SharedDataInput) -> DataInputStream {
        let mark = input
            .try_borrow()
            .map_or(0, |input| input.stream_position());
        DataInputStream {
            input,
            mark,
            closed: false,
        }
    }

    pub fn input(&self) -> &SharedDataInput {
        &self.input
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Read for DataInputStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(closed_error("input stream"));
        }
        borrow_mut(&self.input, "binary reader")?.read(buf)
    }
}

impl InputStream for DataInputStream {
    fn mark(&mut self, _read_limit: usize) {
        if let Ok(input) = self.input.try_borrow() {
            self.mark = input.stream_position();
        }
    }

    fn reset(&mut self) -> std::io::Result<()> {
        if self.closed {
            return Err(closed_error("input stream"));
        }
        borrow_mut(&self.input, "binary reader")?.seek(self.mark)
    }

    fn mark_supported(&self) -> bool {
        true
    }
}

impl Closeable for DataInputStream {
    fn close(&mut self) -> std::io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

//! Character readers.

use std::{collections::VecDeque, fmt, io::Read};

use serde::{Deserialize, Serialize};

use crate::{CharReader, Closeable, SharedStream, utils::borrow_mut, utils::closed_error};

/// Character encodings understood by [`StreamReader`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    #[default]
    #[serde(rename = "UTF-8")]
    Utf8,
    #[serde(rename = "ISO-8859-1")]
    Iso8859_1,
    #[serde(rename = "US-ASCII")]
    UsAscii,
}

impl Encoding {
    /// Looks up an encoding by one of its usual labels, ignoring case.
    pub fn for_label(label: &str) -> Option<Encoding> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Encoding::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Some(Encoding::Iso8859_1),
            "us-ascii" | "ascii" => Some(Encoding::UsAscii),
            _ => None,
        }
    }

    /// The canonical name of the encoding.
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Iso8859_1 => "ISO-8859-1",
            Encoding::UsAscii => "US-ASCII",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const CHUNK_SIZE: usize = 1024;

/// A character reader decoding a shared input stream.
///
/// Malformed input is replaced by U+FFFD. The reader does not support mark/reset:
/// rewinding it would leave the stream it reads from at a different position.
/// Closing the reader closes the stream.
pub struct StreamReader {
    stream: SharedStream,
    encoding: Encoding,
    /// Bytes read from the stream and not decoded yet.
    pending: Vec<u8>,
    decoded: VecDeque<char>,
    eof: bool,
    closed: bool,
}

impl StreamReader {
    pub fn new(stream: SharedStream, encoding: Encoding) -> StreamReader {
        StreamReader {
            stream,
            encoding,
            pending: Vec::new(),
            decoded: VecDeque::new(),
            eof: false,
            closed: false,
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn stream(&self) -> &SharedStream {
        &self.stream
    }

    fn read_chunk(&mut self) -> std::io::Result<()> {
        let mut chunk = [0u8; CHUNK_SIZE];
        let n = borrow_mut(&self.stream, "input stream")?.read(&mut chunk)?;
        if n == 0 {
            self.eof = true;
        }
        self.pending.extend_from_slice(&chunk[..n]);
        self.decode();
        Ok(())
    }

    fn decode(&mut self) {
        match self.encoding {
            Encoding::Utf8 => self.decode_utf8(),
            Encoding::Iso8859_1 => {
                self.decoded.extend(self.pending.drain(..).map(char::from));
            }
            Encoding::UsAscii => {
                self.decoded.extend(self.pending.drain(..).map(|b| {
                    if b.is_ascii() {
                        char::from(b)
                    } else {
                        char::REPLACEMENT_CHARACTER
                    }
                }));
            }
        }
    }

    fn decode_utf8(&mut self) {
        let mut start = 0;
        while start < self.pending.len() {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    self.decoded.extend(text.chars());
                    start = self.pending.len();
                }
                Err(e) => {
                    let valid = start + e.valid_up_to();
                    let text = String::from_utf8_lossy(&self.pending[start..valid]);
                    self.decoded.extend(text.chars());
                    match e.error_len() {
                        Some(len) => {
                            self.decoded.push_back(char::REPLACEMENT_CHARACTER);
                            start = valid + len;
                        }
                        None if self.eof => {
                            self.decoded.push_back(char::REPLACEMENT_CHARACTER);
                            start = self.pending.len();
                        }
                        None => {
                            // Incomplete sequence, wait for more bytes.
                            start = valid;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..start);
    }
}

impl CharReader for StreamReader {
    fn read_chars(&mut self, out: &mut String, max_chars: usize) -> std::io::Result<usize> {
        if self.closed {
            return Err(closed_error("reader"));
        }
        while self.decoded.is_empty() && !self.eof {
            self.read_chunk()?;
        }
        let n = max_chars.min(self.decoded.len());
        out.extend(self.decoded.drain(..n));
        Ok(n)
    }
}

impl Closeable for StreamReader {
    fn close(&mut self) -> std::io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.decoded.clear();
        borrow_mut(&self.stream, "input stream")?.close()
    }
}

/// A character reader over an in-memory string, with mark/reset support.
pub struct StringReader {
    text: String,
    pos: usize,
    mark: usize,
    closed: bool,
}

impl StringReader {
    pub fn new(text: impl Into<String>) -> StringReader {
        StringReader {
            text: text.into(),
            pos: 0,
            mark: 0,
            closed: false,
        }
    }
}

impl CharReader for StringReader {
    fn read_chars(&mut self, out: &mut String, max_chars: usize) -> std::io::Result<usize> {
        if self.closed {
            return Err(closed_error("reader"));
        }
        let mut count = 0;
        for c in self.text[self.pos..].chars().take(max_chars) {
            out.push(c);
            self.pos += c.len_utf8();
            count += 1;
        }
        Ok(count)
    }

    fn mark(&mut self, _read_limit: usize) {
        self.mark = self.pos;
    }

    fn reset(&mut self) -> std::io::Result<()> {
        if self.closed {
            return Err(closed_error("reader"));
        }
        self.pos = self.mark;
        Ok(())
    }

    fn mark_supported(&self) -> bool {
        true
    }
}

impl Closeable for StringReader {
    fn close(&mut self) -> std::io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

//! A shared, growable window over the first bytes of a source.

use std::{cell::RefCell, fmt, ops::Range, rc::Rc};

/// A shared, append-only byte buffer.
///
/// The owner of the window (typically a [`ChannelDataInput`](crate::ChannelDataInput))
/// appends bytes as it reads them; every clone observes the same content. Consumers get
/// read-only access through [`ByteWindow::with_bytes`] or copies, so no borrow of the
/// content can outlive a call.
#[derive(Clone, Default)]
pub struct ByteWindow(Rc<RefCell<Vec<u8>>>);

impl ByteWindow {
    pub fn new() -> ByteWindow {
        Default::default()
    }

    pub fn with_capacity(capacity: usize) -> ByteWindow {
        ByteWindow(Rc::new(RefCell::new(Vec::with_capacity(capacity))))
    }

    pub fn from_vec(bytes: Vec<u8>) -> ByteWindow {
        ByteWindow(Rc::new(RefCell::new(bytes)))
    }

    /// Number of valid bytes in the window.
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` over the current content.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.0.borrow())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }

    /// Copies the given range, clamped to the valid bytes.
    pub fn copy_range(&self, range: Range<usize>) -> Vec<u8> {
        let bytes = self.0.borrow();
        let end = range.end.min(bytes.len());
        let start = range.start.min(end);
        bytes[start..end].to_vec()
    }

    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.0.borrow().starts_with(prefix)
    }

    /// Returns `true` if both handles refer to the same window.
    pub fn ptr_eq(&self, other: &ByteWindow) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Appends bytes at the end of the window. Reserved to the owner of the window.
    pub fn extend_from_slice(&self, bytes: &[u8]) {
        self.0.borrow_mut().extend_from_slice(bytes);
    }

    /// Copies `len` bytes starting at `start` into `buf`, returning the count copied.
    pub(crate) fn copy_to(&self, start: usize, buf: &mut [u8]) -> usize {
        let bytes = self.0.borrow();
        if start >= bytes.len() {
            return 0;
        }
        let n = buf.len().min(bytes.len() - start);
        buf[..n].copy_from_slice(&bytes[start..start + n]);
        n
    }

    /// Reads from `read` until `count` more bytes were appended or the input ended.
    /// Reserved to the owner of the window.
    pub fn fill_from<R: std::io::Read + ?Sized>(
        &self,
        read: &mut R,
        count: usize,
    ) -> std::io::Result<usize> {
        let mut chunk = vec![0u8; count];
        let n = crate::utils::read_fully(read, &mut chunk)?;
        self.extend_from_slice(&chunk[..n]);
        Ok(n)
    }
}

impl fmt::Debug for ByteWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteWindow").field("len", &self.len()).finish()
    }
}

use std::ops::Range;

use crate::{ReadAt, verify};

impl<T> ReadAt for T
where
    T: details::SliceBytes + Send + Sync + 'static,
{
    fn size(&self) -> std::io::Result<u64> {
        Ok(self.bytes().len() as u64)
    }

    fn read_at(&self, range: Range<u64>) -> std::io::Result<Vec<u8>> {
        verify!(range.end >= range.start);
        let content = self.bytes();
        if range.start >= content.len() as u64 {
            return Ok(Vec::new());
        }
        let pos = range.start as usize;
        let len = std::cmp::min(range.end - range.start, (content.len() - pos) as u64) as usize;
        Ok(content[pos..pos + len].to_vec())
    }
}

mod details {
    pub trait SliceBytes {
        fn bytes(&self) -> &[u8];
    }

    impl SliceBytes for Vec<u8> {
        fn bytes(&self) -> &[u8] {
            self
        }
    }

    impl SliceBytes for Box<[u8]> {
        fn bytes(&self) -> &[u8] {
            self
        }
    }

    impl SliceBytes for &'static [u8] {
        fn bytes(&self) -> &[u8] {
            self
        }
    }

    impl SliceBytes for String {
        fn bytes(&self) -> &[u8] {
            self.as_bytes()
        }
    }
}

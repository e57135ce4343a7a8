use std::cell::{RefCell, RefMut};

#[macro_export]
macro_rules! verify {
    ($expr:expr) => {{
        let result = $expr;
        $crate::utils::verify(result, stringify!($expr))?;
    }};
}

pub fn verify(predicate: bool, condition: &str) -> std::io::Result<()> {
    if predicate {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            condition,
        ))
    }
}

/// Reads until `buffer` is full or the end of input is reached, returning the number of
/// bytes read.
pub fn read_fully<R: std::io::Read + ?Sized>(
    read: &mut R,
    buffer: &mut [u8],
) -> std::io::Result<usize> {
    let mut pos: usize = 0;
    loop {
        if pos == buffer.len() {
            return Ok(pos);
        }
        let r = read.read(&mut buffer[pos..]);
        match r {
            Ok(0) => return Ok(pos),
            Ok(bytes) => pos += bytes,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

/// Reads and discards exactly `count` bytes.
pub fn skip_exact<R: std::io::Read + ?Sized>(read: &mut R, mut count: u64) -> std::io::Result<()> {
    let mut scratch = [0u8; 1024];
    while count > 0 {
        let len = count.min(scratch.len() as u64) as usize;
        let n = read_fully(read, &mut scratch[..len])?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        count -= n as u64;
    }
    Ok(())
}

/// Mutably borrows a shared source, reporting a conflicting borrow as an I/O error
/// instead of panicking.
pub fn borrow_mut<'a, T: ?Sized>(
    cell: &'a RefCell<T>,
    what: &str,
) -> std::io::Result<RefMut<'a, T>> {
    cell.try_borrow_mut().map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::WouldBlock,
            format!("{what} is in use by another borrower"),
        )
    })
}

pub(crate) fn closed_error(what: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotConnected, format!("{what} is closed"))
}

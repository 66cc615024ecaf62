use std::io;

use byteorder::{BigEndian, ByteOrder};

/// A bounds-checked, big-endian reader over a borrowed byte slice.
///
/// Every read either consumes exactly the requested number of bytes or fails
/// with [`io::ErrorKind::UnexpectedEof`] and leaves the position untouched.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

fn eof() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected end of buffer")
}

impl<'a> ByteCursor<'a> {
    /// Creates a cursor positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// The full underlying buffer.
    pub fn get_ref(&self) -> &'a [u8] {
        self.buf
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Moves the read position. Positions past the end are clamped.
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.buf.len());
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Returns `true` if at least `count` unread bytes remain.
    pub fn has_bytes(&self, count: usize) -> bool {
        count <= self.remaining()
    }

    /// The unread part of the buffer.
    pub fn remaining_slice(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Borrows the next `count` bytes and advances past them.
    pub fn read_slice(&mut self, count: usize) -> io::Result<&'a [u8]> {
        if !self.has_bytes(count) {
            return Err(eof());
        }
        let slice = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    /// Copies the next `count` bytes into a new vector.
    pub fn read_vec(&mut self, count: usize) -> io::Result<Vec<u8>> {
        self.read_slice(count).map(<[u8]>::to_vec)
    }

    /// Reads a fixed-size array.
    pub fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_slice(N)?);
        Ok(out)
    }

    /// Reads a four character code.
    pub fn read_fourcc(&mut self) -> io::Result<[u8; 4]> {
        self.read_array::<4>()
    }

    /// Advances by `count` bytes.
    pub fn skip(&mut self, count: usize) -> io::Result<()> {
        self.read_slice(count).map(|_| ())
    }

    /// Reads a `u8`.
    pub fn read_u8(&mut self) -> io::Result<u8> {
        Ok(self.read_slice(1)?[0])
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16(&mut self) -> io::Result<u16> {
        self.read_slice(2).map(BigEndian::read_u16)
    }

    /// Reads a big-endian 24-bit unsigned value.
    pub fn read_u24(&mut self) -> io::Result<u32> {
        self.read_slice(3).map(BigEndian::read_u24)
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32(&mut self) -> io::Result<u32> {
        self.read_slice(4).map(BigEndian::read_u32)
    }

    /// Reads a big-endian `u64`.
    pub fn read_u64(&mut self) -> io::Result<u64> {
        self.read_slice(8).map(BigEndian::read_u64)
    }

    /// Reads an `i8`.
    pub fn read_i8(&mut self) -> io::Result<i8> {
        self.read_u8().map(|v| v as i8)
    }

    /// Reads a big-endian `i16`.
    pub fn read_i16(&mut self) -> io::Result<i16> {
        self.read_slice(2).map(BigEndian::read_i16)
    }

    /// Reads a big-endian `i32`.
    pub fn read_i32(&mut self) -> io::Result<i32> {
        self.read_slice(4).map(BigEndian::read_i32)
    }

    /// Reads a big-endian `i64`.
    pub fn read_i64(&mut self) -> io::Result<i64> {
        self.read_slice(8).map(BigEndian::read_i64)
    }

    /// Reads an unsigned 32-bit value widened to 64 bits.
    pub fn read_u32_into_u64(&mut self) -> io::Result<u64> {
        self.read_u32().map(u64::from)
    }

    /// Reads a signed 32-bit value sign-extended to 64 bits.
    pub fn read_i32_into_i64(&mut self) -> io::Result<i64> {
        self.read_i32().map(i64::from)
    }
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_reads() {
        let data = [
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0xFF, 0xFF, 0xFF, 0xFE, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x2A,
        ];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_u8().unwrap(), 0x01);
        assert_eq!(cursor.read_u16().unwrap(), 0x0203);
        assert_eq!(cursor.read_u24().unwrap(), 0x040506);
        assert_eq!(cursor.read_i32_into_i64().unwrap(), -2);
        assert_eq!(cursor.read_u64().unwrap(), 42);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_short_read_fails_without_consuming() {
        let data = [0x00, 0x01, 0x02];
        let mut cursor = ByteCursor::new(&data);
        cursor.skip(1).unwrap();
        let err = cursor.read_u32().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(cursor.position(), 1);
        assert_eq!(cursor.read_u16().unwrap(), 0x0102);
    }

    #[test]
    fn test_has_bytes_never_overflows() {
        let data = [0u8; 4];
        let mut cursor = ByteCursor::new(&data);
        cursor.skip(2).unwrap();
        assert!(cursor.has_bytes(2));
        assert!(!cursor.has_bytes(3));
        assert!(!cursor.has_bytes(usize::MAX));
    }

    #[test]
    fn test_fourcc_and_vec() {
        let data = *b"moovabc";
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(&cursor.read_fourcc().unwrap(), b"moov");
        assert_eq!(cursor.read_vec(3).unwrap(), b"abc".to_vec());
        assert!(cursor.read_vec(1).is_err());
    }

    #[test]
    fn test_set_position_clamps() {
        let data = [1u8, 2, 3];
        let mut cursor = ByteCursor::new(&data);
        cursor.set_position(10);
        assert_eq!(cursor.remaining(), 0);
        cursor.set_position(2);
        assert_eq!(cursor.read_u8().unwrap(), 3);
    }
}

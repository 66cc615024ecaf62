use std::io;

/// Reads individual bits, most significant bit first.
#[derive(Debug)]
pub struct BitReader<R> {
    reader: R,
    current: u8,
    bit_pos: u8,
}

impl<R: io::Read> BitReader<R> {
    /// Wraps `reader`. The first bit read is the MSB of the next byte.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            current: 0,
            bit_pos: 8,
        }
    }

    /// Reads a single bit.
    pub fn read_bit(&mut self) -> io::Result<bool> {
        if self.bit_pos == 8 {
            let mut byte = [0u8; 1];
            self.reader.read_exact(&mut byte)?;
            self.current = byte[0];
            self.bit_pos = 0;
        }

        let bit = (self.current >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        Ok(bit == 1)
    }

    /// Reads `count` bits (at most 64) into the low bits of the result.
    pub fn read_bits(&mut self, count: u8) -> io::Result<u64> {
        if count > 64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot read more than 64 bits at once",
            ));
        }

        let mut value = 0u64;
        for _ in 0..count {
            value = (value << 1) | self.read_bit()? as u64;
        }
        Ok(value)
    }

    /// Returns `true` when the reader sits on a byte boundary.
    pub fn is_aligned(&self) -> bool {
        self.bit_pos == 8
    }

    /// Discards the remaining bits of the current byte.
    pub fn align(&mut self) {
        self.bit_pos = 8;
    }

    /// Mutable access to the wrapped reader, for byte-aligned reads.
    /// Bits of a partially read byte are not visible through it.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Returns the wrapped reader. Bits left in a partially read byte are lost.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

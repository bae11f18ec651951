use super::InflateError;

/// LSB-first bit cursor over a DEFLATE stream.
///
/// The accumulator is refilled a byte at a time up to 56 bits, so any
/// request up to 32 bits can be satisfied in one fill. Peeking past the true
/// end of input yields zero bits; only *consuming* past the end is an error.
/// That distinction matters for Huffman decoding, where the decoder peeks at
/// the table width but may consume fewer bits than it peeked.
pub(super) struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u64,
    acc_bits: u32,
}

impl<'a> BitReader<'a> {
    pub(super) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            acc: 0,
            acc_bits: 0,
        }
    }

    fn fill(&mut self) {
        while self.acc_bits <= 56 && self.pos < self.data.len() {
            self.acc |= u64::from(self.data[self.pos]) << self.acc_bits;
            self.pos += 1;
            self.acc_bits += 8;
        }
    }

    /// Returns the next `n` bits without consuming them, zero-padded past
    /// the end of input.
    pub(super) fn peek(&mut self, n: u32) -> u32 {
        debug_assert!(n <= 32);
        self.fill();
        #[expect(clippy::cast_possible_truncation)]
        let bits = (self.acc & ((1u64 << n) - 1)) as u32;
        bits
    }

    /// Discards `n` bits. Fails if that would step past the true end of the
    /// stream.
    pub(super) fn consume(&mut self, n: u32) -> Result<(), InflateError> {
        self.fill();
        if n > self.acc_bits {
            return Err(InflateError::TruncatedStream);
        }
        self.acc >>= n;
        self.acc_bits -= n;
        Ok(())
    }

    /// Reads and consumes `n` bits.
    pub(super) fn read(&mut self, n: u32) -> Result<u32, InflateError> {
        let bits = self.peek(n);
        if n > self.acc_bits {
            return Err(InflateError::TruncatedStream);
        }
        self.acc >>= n;
        self.acc_bits -= n;
        Ok(bits)
    }

    /// Drops bits up to the next byte boundary (used before stored blocks).
    pub(super) fn align(&mut self) {
        let discard = self.acc_bits % 8;
        self.acc >>= discard;
        self.acc_bits -= discard;
    }
}

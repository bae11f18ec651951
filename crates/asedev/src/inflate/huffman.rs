//! Canonical Huffman decoding per RFC 1951 section 3.2.2, plus the fixed
//! code tables from sections 3.2.5 and 3.2.6.

use super::InflateError;
use super::bits::BitReader;

/// Longest permitted Huffman code.
pub(super) const MAX_BITS: u32 = 15;

/// Fixed literal/length code lengths (RFC 1951 section 3.2.6).
pub(super) const FIXED_LIT_LENGTHS: [u8; 288] = {
    let mut lengths = [0u8; 288];
    let mut i = 0;
    while i < 144 {
        lengths[i] = 8;
        i += 1;
    }
    while i < 256 {
        lengths[i] = 9;
        i += 1;
    }
    while i < 280 {
        lengths[i] = 7;
        i += 1;
    }
    while i < 288 {
        lengths[i] = 8;
        i += 1;
    }
    lengths
};

/// Fixed distance code lengths.
pub(super) const FIXED_DIST_LENGTHS: [u8; 32] = [5; 32];

/// Transmission order of the code-length code lengths in a dynamic block
/// header.
pub(super) const CL_CODE_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Base match lengths for symbols 257-285.
pub(super) const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];

/// Extra bits following symbols 257-285.
pub(super) const LENGTH_EXTRA_BITS: [u32; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Base distances for distance symbols 0-29.
pub(super) const DISTANCE_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

/// Extra bits following distance symbols 0-29.
pub(super) const DISTANCE_EXTRA_BITS: [u32; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

fn reverse_bits(code: u32, len: u8) -> u32 {
    let mut reversed = 0;
    let mut code = code;
    for _ in 0..len {
        reversed = (reversed << 1) | (code & 1);
        code >>= 1;
    }
    reversed
}

/// Decode table for one canonical Huffman code.
///
/// The table is indexed by `peek_bits` bits of raw (already LSB-first)
/// stream; each slot packs `(symbol << 4) | code_length`, with zero marking
/// a bit pattern that no code produces.
pub(super) struct HuffmanDecoder {
    table: Vec<u16>,
    peek_bits: u32,
}

impl HuffmanDecoder {
    /// Builds the decode table from per-symbol code lengths (0 = unused).
    ///
    /// An over-subscribed set of lengths (violating Kraft's inequality) is
    /// rejected; an incomplete set is accepted, since DEFLATE streams with a
    /// single distance code are legal.
    pub(super) fn from_lengths(lengths: &[u8]) -> Result<Self, InflateError> {
        let mut bl_count = [0u32; MAX_BITS as usize + 1];
        let mut max_bits = 0u32;
        for &len in lengths {
            if len > 0 {
                if u32::from(len) > MAX_BITS {
                    return Err(InflateError::CorruptHuffmanStream);
                }
                bl_count[len as usize] += 1;
                max_bits = max_bits.max(u32::from(len));
            }
        }

        if max_bits == 0 {
            // No symbols at all. Legal for a distance table in a stream that
            // never emits a back-reference; any decode attempt fails.
            return Ok(Self {
                table: vec![0; 2],
                peek_bits: 1,
            });
        }

        let mut available = 1i64;
        for bits in 1..=MAX_BITS as usize {
            available = (available << 1) - i64::from(bl_count[bits]);
            if available < 0 {
                return Err(InflateError::CorruptHuffmanStream);
            }
        }

        let mut next_code = [0u32; MAX_BITS as usize + 1];
        let mut code = 0u32;
        for bits in 1..=max_bits as usize {
            code = (code + bl_count[bits - 1]) << 1;
            next_code[bits] = code;
        }

        let table_size = 1usize << max_bits;
        let mut table = vec![0u16; table_size];
        for (symbol, &len) in lengths.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let code = next_code[len as usize];
            next_code[len as usize] += 1;
            let reversed = reverse_bits(code, len) as usize;

            // Every index whose low `len` bits equal the reversed code maps
            // to this symbol.
            let entry = u16::try_from((symbol << 4) | len as usize)
                .map_err(|_| InflateError::CorruptHuffmanStream)?;
            let step = 1usize << len;
            let mut index = reversed;
            while index < table_size {
                table[index] = entry;
                index += step;
            }
        }

        Ok(Self {
            table,
            peek_bits: max_bits,
        })
    }

    /// Decodes one symbol from the reader.
    pub(super) fn decode(&self, reader: &mut BitReader<'_>) -> Result<u16, InflateError> {
        let peeked = reader.peek(self.peek_bits);
        let entry = self.table[peeked as usize];
        let len = u32::from(entry & 0xF);
        if len == 0 {
            return Err(InflateError::CorruptHuffmanStream);
        }
        reader.consume(len)?;
        Ok(entry >> 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_decodes_a_small_canonical_code() {
        // Symbols A=0, B=1, C=2, D=3 with lengths 2, 1, 3, 3 yield the
        // canonical codes B=0, A=10, C=110, D=111 (RFC 1951 worked example).
        let decoder = HuffmanDecoder::from_lengths(&[2, 1, 3, 3]).unwrap();

        // Stream spells B A C D; codes are written MSB-first, so the raw
        // LSB-first byte is assembled by hand: bits 0,01,011,111.
        let stream = [0b1101_1010, 0b0000_0001];
        let mut reader = BitReader::new(&stream);
        assert_eq!(decoder.decode(&mut reader).unwrap(), 1);
        assert_eq!(decoder.decode(&mut reader).unwrap(), 0);
        assert_eq!(decoder.decode(&mut reader).unwrap(), 2);
        assert_eq!(decoder.decode(&mut reader).unwrap(), 3);
    }

    #[test]
    fn rejects_oversubscribed_lengths() {
        // Three 1-bit codes cannot coexist.
        assert!(matches!(
            HuffmanDecoder::from_lengths(&[1, 1, 1]),
            Err(InflateError::CorruptHuffmanStream)
        ));
    }

    #[test]
    fn accepts_single_code_tables() {
        // A lone 1-bit code is incomplete but legal (typical for distance
        // tables of streams with one distinct distance).
        let decoder = HuffmanDecoder::from_lengths(&[1]).unwrap();
        let mut reader = BitReader::new(&[0b0000_0000]);
        assert_eq!(decoder.decode(&mut reader).unwrap(), 0);
        // The unassigned '1' pattern must not decode.
        let mut reader = BitReader::new(&[0b0000_0001]);
        assert!(decoder.decode(&mut reader).is_err());
    }

    #[test]
    fn decodes_fixed_literal_code_for_known_symbols() {
        let decoder = HuffmanDecoder::from_lengths(&FIXED_LIT_LENGTHS).unwrap();

        // Symbol 65 ('A') has the 8-bit code 0x30 + 65 = 0b0111_0001;
        // MSB-first in the stream means LSB-first value 0b1000_1110.
        let mut reader = BitReader::new(&[0b1000_1110]);
        assert_eq!(decoder.decode(&mut reader).unwrap(), 65);

        // End-of-block (256) is the 7-bit all-zero code.
        let mut reader = BitReader::new(&[0b0000_0000]);
        assert_eq!(decoder.decode(&mut reader).unwrap(), 256);
    }

    #[test]
    fn decode_near_end_of_stream_uses_short_code() {
        // A 7-bit end-of-block code in a 1-byte stream: the decoder peeks 9
        // bits (fixed table width) but must still succeed on the padding.
        let decoder = HuffmanDecoder::from_lengths(&FIXED_LIT_LENGTHS).unwrap();
        let mut reader = BitReader::new(&[0b0000_0000]);
        assert_eq!(decoder.decode(&mut reader).unwrap(), 256);
    }
}

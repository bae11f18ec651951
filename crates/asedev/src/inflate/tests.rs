use std::io::Write as _;

use proptest::prelude::*;

use super::{InflateError, inflate, zlib_decompress};

fn deflate_reference(data: &[u8], level: flate2::Compression) -> Vec<u8> {
    let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), level);
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn inflate_to_vec(input: &[u8], expected_len: usize) -> Result<Vec<u8>, InflateError> {
    let mut output = vec![0u8; expected_len];
    let written = inflate(input, &mut output)?;
    output.truncate(written);
    Ok(output)
}

/// Test-only LSB-first bit assembler, mirroring how DEFLATE encoders pack
/// bits: plain fields enter low-bit first, Huffman codes enter high-bit
/// first.
struct BitAssembler {
    bytes: Vec<u8>,
    acc: u32,
    acc_bits: u32,
}

impl BitAssembler {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            acc: 0,
            acc_bits: 0,
        }
    }

    fn push_bits(&mut self, value: u32, count: u32) {
        self.acc |= value << self.acc_bits;
        self.acc_bits += count;
        while self.acc_bits >= 8 {
            self.bytes.push((self.acc & 0xFF) as u8);
            self.acc >>= 8;
            self.acc_bits -= 8;
        }
    }

    fn push_code(&mut self, code: u32, count: u32) {
        let mut reversed = 0u32;
        for i in 0..count {
            reversed |= ((code >> i) & 1) << (count - 1 - i);
        }
        self.push_bits(reversed, count);
    }

    fn finish(mut self) -> Vec<u8> {
        if self.acc_bits > 0 {
            self.bytes.push((self.acc & 0xFF) as u8);
        }
        self.bytes
    }
}

fn fixed_literal_code(byte: u8) -> (u32, u32) {
    // RFC 1951 section 3.2.6, rows for literals 0-143 and 144-255.
    if byte < 144 {
        (0x30 + u32::from(byte), 8)
    } else {
        (0x190 + u32::from(byte) - 144, 9)
    }
}

#[test]
fn stored_block_roundtrip() {
    // BFINAL=1 BTYPE=00, then LEN/NLEN and the raw payload.
    let mut input = vec![0b0000_0001, 5, 0, 0xFA, 0xFF];
    input.extend_from_slice(b"hello");
    assert_eq!(inflate_to_vec(&input, 5).unwrap(), b"hello");
}

#[test]
fn stored_block_length_complement_mismatch() {
    let input = [0b0000_0001, 5, 0, 0x00, 0x00, b'h', b'e', b'l', b'l', b'o'];
    assert!(matches!(
        inflate_to_vec(&input, 5),
        Err(InflateError::LengthMismatch { len: 5, .. })
    ));
}

#[test]
fn stored_block_truncated_payload() {
    let input = [0b0000_0001, 5, 0, 0xFA, 0xFF, b'h', b'e'];
    assert!(matches!(
        inflate_to_vec(&input, 5),
        Err(InflateError::TruncatedStream)
    ));
}

#[test]
fn reserved_block_type_is_rejected() {
    // BFINAL=1, BTYPE=11.
    let input = [0b0000_0111];
    assert!(matches!(
        inflate_to_vec(&input, 16),
        Err(InflateError::UnknownBlockType)
    ));
}

#[test]
fn fixed_block_single_literal() {
    let mut stream = BitAssembler::new();
    stream.push_bits(1, 1); // BFINAL
    stream.push_bits(1, 2); // BTYPE=01
    let (code, len) = fixed_literal_code(b'A');
    stream.push_code(code, len);
    stream.push_code(0, 7); // end of block
    assert_eq!(inflate_to_vec(&stream.finish(), 1).unwrap(), b"A");
}

#[test]
fn overlapping_backreference_repeats_one_byte() {
    // One literal followed by a length-100/distance-1 match: the overlap
    // must behave like a forward byte-by-byte copy, i.e. a 101-byte run.
    let mut stream = BitAssembler::new();
    stream.push_bits(1, 1);
    stream.push_bits(1, 2);
    let (code, len) = fixed_literal_code(0x42);
    stream.push_code(code, len);
    // Length 100 = base 99 (symbol 279) + 1 extra bit of value 1.
    stream.push_code(0b001_0111, 7);
    stream.push_bits(1, 4);
    // Distance 1 = symbol 0, five-bit code, no extra bits.
    stream.push_code(0, 5);
    stream.push_code(0, 7);

    let output = inflate_to_vec(&stream.finish(), 101).unwrap();
    assert_eq!(output, vec![0x42u8; 101]);
}

#[test]
fn backreference_before_start_of_output() {
    // A match at the very start of the stream has no history to copy from.
    let mut stream = BitAssembler::new();
    stream.push_bits(1, 1);
    stream.push_bits(1, 2);
    stream.push_code(0b000_0001, 7); // symbol 257: length 3
    stream.push_code(0, 5); // distance 1
    stream.push_code(0, 7);
    assert!(matches!(
        inflate_to_vec(&stream.finish(), 16),
        Err(InflateError::InvalidBackReference {
            distance: 1,
            available: 0
        })
    ));
}

#[test]
fn literal_overflowing_output_buffer() {
    let mut stream = BitAssembler::new();
    stream.push_bits(1, 1);
    stream.push_bits(1, 2);
    for byte in b"toolong" {
        let (code, len) = fixed_literal_code(*byte);
        stream.push_code(code, len);
    }
    stream.push_code(0, 7);
    let mut output = [0u8; 4];
    assert!(matches!(
        inflate(&stream.finish(), &mut output),
        Err(InflateError::OutputOverflow)
    ));
}

#[test]
fn empty_stream_is_truncated() {
    assert!(matches!(
        inflate_to_vec(&[], 4),
        Err(InflateError::TruncatedStream)
    ));
}

#[test]
fn dynamic_block_from_reference_encoder() {
    // Repetitive data at max compression reliably produces dynamic
    // Huffman blocks with back-references.
    let data: Vec<u8> = (0u32..400).map(|i| (i % 7) as u8).collect();
    let compressed = deflate_reference(&data, flate2::Compression::best());
    assert_eq!(inflate_to_vec(&compressed, data.len()).unwrap(), data);
}

#[test]
fn multi_block_stored_stream() {
    // flate2 level 0 emits stored blocks; 200 KiB forces several, since a
    // stored block body caps at 65535 bytes.
    let data: Vec<u8> = (0u32..200_000).map(|i| (i % 251) as u8).collect();
    let compressed = deflate_reference(&data, flate2::Compression::none());
    assert_eq!(inflate_to_vec(&compressed, data.len()).unwrap(), data);
}

#[test]
fn zlib_wrapper_accepts_standard_header() {
    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(b"wrapped").unwrap();
    let compressed = encoder.finish().unwrap();
    let mut output = [0u8; 7];
    let written = zlib_decompress(&compressed, &mut output).unwrap();
    assert_eq!(&output[..written], b"wrapped");
}

#[test]
fn zlib_wrapper_rejects_bad_method() {
    // Method nibble 7 is not deflate.
    assert!(matches!(
        zlib_decompress(&[0x77, 0x01, 0x03, 0x00], &mut [0u8; 4]),
        Err(InflateError::BadZlibHeader)
    ));
}

#[test]
fn zlib_wrapper_rejects_preset_dictionary() {
    assert!(matches!(
        zlib_decompress(&[0x78, 0x20, 0x03, 0x00], &mut [0u8; 4]),
        Err(InflateError::BadZlibHeader)
    ));
}

proptest! {
    #[test]
    fn reference_encoder_roundtrip_default(data in prop::collection::vec(any::<u8>(), 0..4096)) {
        let compressed = deflate_reference(&data, flate2::Compression::default());
        prop_assert_eq!(inflate_to_vec(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn reference_encoder_roundtrip_stored(data in prop::collection::vec(any::<u8>(), 0..4096)) {
        let compressed = deflate_reference(&data, flate2::Compression::none());
        prop_assert_eq!(inflate_to_vec(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn reference_encoder_roundtrip_compressible(
        runs in prop::collection::vec((any::<u8>(), 1usize..64), 0..128),
    ) {
        // Runs of repeated bytes exercise the LZ77 match paths and, at the
        // default level, dynamic Huffman tables.
        let data: Vec<u8> = runs
            .into_iter()
            .flat_map(|(byte, count)| std::iter::repeat_n(byte, count))
            .collect();
        let compressed = deflate_reference(&data, flate2::Compression::default());
        prop_assert_eq!(inflate_to_vec(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn garbage_input_never_panics(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut output = [0u8; 1024];
        let _ = inflate(&data, &mut output);
    }
}

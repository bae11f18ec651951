//! Raw DEFLATE (RFC 1951) decompression into a caller-sized buffer.
//!
//! The container stores each compressed cel as a two-byte zlib header
//! followed by a raw DEFLATE stream, and the decompressed size is always
//! known up front (`width * height * bytes_per_pixel`), so the engine
//! writes into a fixed output slice and never grows it. Overruns in either
//! direction are structured errors, not panics.

mod bits;
mod huffman;

#[cfg(test)]
mod tests;

use bits::BitReader;
use huffman::{
    CL_CODE_ORDER, DISTANCE_BASE, DISTANCE_EXTRA_BITS, FIXED_DIST_LENGTHS, FIXED_LIT_LENGTHS,
    HuffmanDecoder, LENGTH_BASE, LENGTH_EXTRA_BITS,
};

#[derive(Debug, thiserror::Error)]
pub enum InflateError {
    #[error("stored block length check failed: LEN {len:#06x} vs NLEN {nlen:#06x}")]
    LengthMismatch { len: u16, nlen: u16 },
    #[error("compressed stream ended mid-read")]
    TruncatedStream,
    #[error("reserved block type 3 encountered")]
    UnknownBlockType,
    #[error("decompressed data does not fit the output buffer")]
    OutputOverflow,
    #[error("back-reference distance {distance} reaches before start of output ({available} bytes written)")]
    InvalidBackReference { distance: usize, available: usize },
    #[error("no Huffman code matches the compressed stream")]
    CorruptHuffmanStream,
    #[error("bad zlib header: method must be deflate with no preset dictionary")]
    BadZlibHeader,
}

/// Decompresses one raw DEFLATE stream into `output`.
///
/// Returns the number of bytes written. Trailing input past the final block
/// is ignored.
pub fn inflate(input: &[u8], output: &mut [u8]) -> Result<usize, InflateError> {
    let mut reader = BitReader::new(input);
    let mut out_pos = 0usize;

    loop {
        let bfinal = reader.read(1)? == 1;
        let btype = reader.read(2)?;
        match btype {
            0 => inflate_stored(&mut reader, output, &mut out_pos)?,
            1 => {
                let lit = HuffmanDecoder::from_lengths(&FIXED_LIT_LENGTHS)?;
                let dist = HuffmanDecoder::from_lengths(&FIXED_DIST_LENGTHS)?;
                inflate_block(&mut reader, output, &mut out_pos, &lit, &dist)?;
            }
            2 => {
                let (lit, dist) = read_dynamic_tables(&mut reader)?;
                inflate_block(&mut reader, output, &mut out_pos, &lit, &dist)?;
            }
            _ => return Err(InflateError::UnknownBlockType),
        }
        if bfinal {
            break;
        }
    }

    Ok(out_pos)
}

/// Checks the two zlib wrapper bytes, then inflates the rest.
///
/// Only the structural guarantees the format relies on are validated:
/// compression method 8 (deflate), a legal window size, no preset
/// dictionary. The Adler-32 trailer is not checked.
pub fn zlib_decompress(input: &[u8], output: &mut [u8]) -> Result<usize, InflateError> {
    let [cmf, flg, rest @ ..] = input else {
        return Err(InflateError::TruncatedStream);
    };
    if cmf & 0x0F != 8 || cmf & 0xF0 > 0x70 || flg & 0x20 != 0 {
        return Err(InflateError::BadZlibHeader);
    }
    inflate(rest, output)
}

fn inflate_stored(
    reader: &mut BitReader<'_>,
    output: &mut [u8],
    out_pos: &mut usize,
) -> Result<(), InflateError> {
    reader.align();
    #[expect(clippy::cast_possible_truncation)]
    let len = reader.read(16)? as u16;
    #[expect(clippy::cast_possible_truncation)]
    let nlen = reader.read(16)? as u16;
    if nlen != !len {
        return Err(InflateError::LengthMismatch { len, nlen });
    }
    if output.len() - *out_pos < usize::from(len) {
        return Err(InflateError::OutputOverflow);
    }
    for _ in 0..len {
        #[expect(clippy::cast_possible_truncation)]
        let byte = reader.read(8)? as u8;
        output[*out_pos] = byte;
        *out_pos += 1;
    }
    Ok(())
}

fn read_dynamic_tables(
    reader: &mut BitReader<'_>,
) -> Result<(HuffmanDecoder, HuffmanDecoder), InflateError> {
    let hlit = reader.read(5)? as usize + 257;
    let hdist = reader.read(5)? as usize + 1;
    let hclen = reader.read(4)? as usize + 4;
    if hlit > 286 || hdist > 30 {
        return Err(InflateError::CorruptHuffmanStream);
    }

    let mut cl_lengths = [0u8; 19];
    for &slot in CL_CODE_ORDER.iter().take(hclen) {
        #[expect(clippy::cast_possible_truncation)]
        let len = reader.read(3)? as u8;
        cl_lengths[slot] = len;
    }
    let cl_decoder = HuffmanDecoder::from_lengths(&cl_lengths)?;

    // The literal/length and distance code lengths are one run-length-coded
    // sequence spanning both alphabets.
    let mut lengths = vec![0u8; hlit + hdist];
    let mut filled = 0usize;
    while filled < lengths.len() {
        let symbol = cl_decoder.decode(reader)?;
        match symbol {
            0..=15 => {
                #[expect(clippy::cast_possible_truncation)]
                let len = symbol as u8;
                lengths[filled] = len;
                filled += 1;
            }
            16 => {
                if filled == 0 {
                    return Err(InflateError::CorruptHuffmanStream);
                }
                let count = reader.read(2)? as usize + 3;
                let previous = lengths[filled - 1];
                fill_run(&mut lengths, &mut filled, previous, count)?;
            }
            17 => {
                let count = reader.read(3)? as usize + 3;
                fill_run(&mut lengths, &mut filled, 0, count)?;
            }
            18 => {
                let count = reader.read(7)? as usize + 11;
                fill_run(&mut lengths, &mut filled, 0, count)?;
            }
            _ => return Err(InflateError::CorruptHuffmanStream),
        }
    }

    let lit = HuffmanDecoder::from_lengths(&lengths[..hlit])?;
    let dist = HuffmanDecoder::from_lengths(&lengths[hlit..])?;
    Ok((lit, dist))
}

fn fill_run(
    lengths: &mut [u8],
    filled: &mut usize,
    value: u8,
    count: usize,
) -> Result<(), InflateError> {
    if lengths.len() - *filled < count {
        return Err(InflateError::CorruptHuffmanStream);
    }
    lengths[*filled..*filled + count].fill(value);
    *filled += count;
    Ok(())
}

fn inflate_block(
    reader: &mut BitReader<'_>,
    output: &mut [u8],
    out_pos: &mut usize,
    lit: &HuffmanDecoder,
    dist: &HuffmanDecoder,
) -> Result<(), InflateError> {
    loop {
        let symbol = lit.decode(reader)?;
        if symbol < 256 {
            if *out_pos == output.len() {
                return Err(InflateError::OutputOverflow);
            }
            #[expect(clippy::cast_possible_truncation)]
            let byte = symbol as u8;
            output[*out_pos] = byte;
            *out_pos += 1;
        } else if symbol == 256 {
            return Ok(());
        } else {
            let index = usize::from(symbol) - 257;
            if index >= LENGTH_BASE.len() {
                return Err(InflateError::CorruptHuffmanStream);
            }
            let length = usize::from(LENGTH_BASE[index])
                + reader.read(LENGTH_EXTRA_BITS[index])? as usize;

            let dist_symbol = usize::from(dist.decode(reader)?);
            if dist_symbol >= DISTANCE_BASE.len() {
                return Err(InflateError::CorruptHuffmanStream);
            }
            let distance = usize::from(DISTANCE_BASE[dist_symbol])
                + reader.read(DISTANCE_EXTRA_BITS[dist_symbol])? as usize;

            if distance > *out_pos {
                return Err(InflateError::InvalidBackReference {
                    distance,
                    available: *out_pos,
                });
            }
            if output.len() - *out_pos < length {
                return Err(InflateError::OutputOverflow);
            }

            if distance == 1 {
                // Run of one byte; the common memset-style match.
                let byte = output[*out_pos - 1];
                output[*out_pos..*out_pos + length].fill(byte);
            } else {
                // The source may overlap the destination, so this must copy
                // forward a byte at a time.
                for i in 0..length {
                    output[*out_pos + i] = output[*out_pos - distance + i];
                }
            }
            *out_pos += length;
        }
    }
}

//! Fixed-width bit packing for one block of up to [`super::BLOCK_SIZE`]
//! values. Grounded on `mem/flush.rs::flush_postings`'s per-128-value block
//! loop (encode a full block, record how many bytes it took, move on) but
//! replacing its byte-oriented `stream_vbyte` call with true bit packing: a
//! block is stored as a one-byte bit width followed by `ceil(width *
//! count / 8)` bytes, every value occupying exactly `width` bits.
use crate::io_helper::{DataInputStream, InputStream};
use crate::Error;
use std::io::{self, Write};

/// Smallest `width` in `0..=32` such that every value in `block` fits in
/// `width` bits. `0` means every value is `0` (an empty block still costs
/// one byte: the width).
pub fn bits_required(block: &[u32]) -> u32 {
    block.iter().fold(0u32, |acc, &v| acc.max(32 - v.leading_zeros()))
}

/// Packs `block` (at most [`super::BLOCK_SIZE`] values) at its narrowest
/// width and writes `[width_byte, packed_bytes...]`.
pub fn pack_block<W: Write>(out: &mut W, block: &[u32]) -> io::Result<()> {
    let width = bits_required(block);
    out.write_all(&[width as u8])?;
    if width == 0 {
        return Ok(());
    }
    let total_bits = width as usize * block.len();
    let mut packed = vec![0u8; (total_bits + 7) / 8];
    let mut bit_pos = 0usize;
    for &value in block {
        write_bits(&mut packed, bit_pos, width, value);
        bit_pos += width as usize;
    }
    out.write_all(&packed)
}

fn write_bits(packed: &mut [u8], bit_pos: usize, width: u32, value: u32) {
    for i in 0..width {
        if value & (1 << i) != 0 {
            let bit = bit_pos + i as usize;
            packed[bit / 8] |= 1 << (bit % 8);
        }
    }
}

fn read_bits(packed: &[u8], bit_pos: usize, width: u32) -> u32 {
    let mut value = 0u32;
    for i in 0..width {
        let bit = bit_pos + i as usize;
        if packed[bit / 8] & (1 << (bit % 8)) != 0 {
            value |= 1 << i;
        }
    }
    value
}

/// Reads a block written by [`pack_block`]; `count` must match the number
/// of values the writer packed (carried separately, e.g. in the skip list
/// or as `BLOCK_SIZE` for a full interior block).
pub fn unpack_block<S: InputStream>(src: &mut S, count: usize) -> Result<Vec<u32>, Error> {
    let width = src.read_u8()? as u32;
    if width == 0 {
        return Ok(vec![0u32; count]);
    }
    let total_bits = width as usize * count;
    let packed = src.read_bytes((total_bits + 7) / 8)?;
    let mut out = Vec::with_capacity(count);
    let mut bit_pos = 0usize;
    for _ in 0..count {
        out.push(read_bits(packed, bit_pos, width));
        bit_pos += width as usize;
    }
    Ok(out)
}

//! Block compression wrapper used by stored fields and the columnstore.
//! Grounded on `mem/encoders.rs`'s `LZ4StringEncoder`, generalized from a
//! single-string encoder into a `compress`/`decompress` pair that works on
//! arbitrary byte blocks and frames its output with a signed-vint length so
//! a reader never needs to guess whether a block was worth compressing.
use crate::io_helper::{DataInputStream, DataOutputStream, InputStream};
use crate::Error;
use std::io::{self, Write};

/// Frames a block as `zvint(n)` followed by `|n|` bytes: `n < 0` means the
/// payload is `-n` bytes of uncompressed data; `n > 0` means it is `n` bytes
/// of lz4-compressed data expanding to `raw_len` bytes (written first).
pub fn compress_block<W: Write>(out: &mut W, raw: &[u8]) -> io::Result<()> {
    if raw.is_empty() {
        return out.write_zigzag_vlong(0);
    }
    let compressed = lz4_flex::compress(raw);
    if compressed.len() >= raw.len() {
        out.write_zigzag_vlong(-(raw.len() as i64))?;
        out.write_all(raw)
    } else {
        out.write_zigzag_vlong(compressed.len() as i64)?;
        out.write_vint(raw.len() as u32)?;
        out.write_all(&compressed)
    }
}

/// Inverse of [`compress_block`]. Reads exactly the bytes that call wrote,
/// nothing more, so callers can pack several blocks back to back.
pub fn decompress_block<S: InputStream>(src: &mut S) -> Result<Vec<u8>, Error> {
    let n = src.read_zigzag_vlong()?;
    if n == 0 {
        return Ok(Vec::new());
    }
    if n < 0 {
        let len = (-n) as usize;
        Ok(src.read_bytes(len)?.to_vec())
    } else {
        let raw_len = src.read_vint()? as usize;
        let compressed = src.read_bytes(n as usize)?;
        lz4_flex::decompress(compressed, raw_len)
            .map_err(|_| Error::NotSupported("corrupt lz4 block".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_helper::SliceInputStream;

    #[test]
    fn round_trips_compressible_block() {
        let raw = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".repeat(4);
        let mut buf = Vec::new();
        compress_block(&mut buf, &raw).unwrap();
        let mut rdr = SliceInputStream::new(&buf);
        assert_eq!(decompress_block(&mut rdr).unwrap(), raw);
        assert!(rdr.eof());
    }

    #[test]
    fn falls_back_to_uncompressed_for_incompressible_block() {
        // Short, high-entropy-looking input: lz4 framing overhead means the
        // "compressed" form is longer than the input, so the writer should
        // take the raw path.
        let raw: Vec<u8> = (0u8..16).collect();
        let mut buf = Vec::new();
        compress_block(&mut buf, &raw).unwrap();
        let mut rdr = SliceInputStream::new(&buf);
        assert_eq!(decompress_block(&mut rdr).unwrap(), raw);
    }

    #[test]
    fn empty_block_round_trips() {
        let mut buf = Vec::new();
        compress_block(&mut buf, &[]).unwrap();
        assert_eq!(buf, vec![0]);
        let mut rdr = SliceInputStream::new(&buf);
        assert_eq!(decompress_block(&mut rdr).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn two_blocks_back_to_back() {
        let mut buf = Vec::new();
        compress_block(&mut buf, b"hello").unwrap();
        compress_block(&mut buf, b"world").unwrap();
        let mut rdr = SliceInputStream::new(&buf);
        assert_eq!(decompress_block(&mut rdr).unwrap(), b"hello");
        assert_eq!(decompress_block(&mut rdr).unwrap(), b"world");
        assert!(rdr.eof());
    }
}

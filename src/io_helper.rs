//! Byte-stream primitives shared by every file format in `codec`: vint/vlong
//! encoding, zig-zag for signed values, and the zero-copy input cursors that
//! the postings/columnstore/stored-fields readers clone to get private
//! positions into the same backing buffer.
use crate::Error;
use memmap::{Mmap, MmapOptions};
use std::convert::TryInto;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

pub fn open_mmap_file(path: &Path) -> Result<Arc<Mmap>, Error> {
    let file = fs::File::open(path)?;
    let opts = MmapOptions::new();
    let mmap: Mmap = unsafe { opts.map(&file)? };
    Ok(Arc::new(mmap))
}

/// A cursor over bytes: implemented by both the zero-copy slice cursor used
/// while writing/testing and the mmap-backed cursor readers clone per
/// iterator.
pub trait InputStream {
    fn tell(&self) -> usize;
    fn len(&self) -> usize;
    fn eof(&self) -> bool {
        self.tell() >= self.len()
    }
    fn seek(&mut self, pos: usize) -> Result<(), Error>;
    fn advance(&mut self, n: usize) -> Result<&[u8], Error>;
    fn get(&mut self) -> Result<u8, Error> {
        Ok(self.advance(1)?[0])
    }
}

/// vint/vlong/zigzag/fixed-width readers, blanket-implemented over any
/// [`InputStream`]. The continuation convention (high bit set means "more
/// bytes follow") matches Lucene's vint, not the opposite-sense vbyte some
/// Galago-family formats use.
pub trait DataInputStream: InputStream {
    fn read_vint(&mut self) -> Result<u32, Error> {
        Ok(self.read_vlong()? as u32)
    }

    fn read_vlong(&mut self) -> Result<u64, Error> {
        let mut result: u64 = 0;
        let mut shift: u32 = 0;
        loop {
            let byte = self.get()? as u64;
            result |= (byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift >= 64 {
                return Err(Error::CorruptVarint);
            }
        }
    }

    fn read_zigzag_vlong(&mut self) -> Result<i64, Error> {
        let raw = self.read_vlong()?;
        Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
    }

    fn read_u8(&mut self) -> Result<u8, Error> {
        self.get()
    }

    fn read_u16(&mut self) -> Result<u16, Error> {
        let exact = self.advance(2)?;
        Ok(u16::from_be_bytes(exact.try_into().unwrap()))
    }

    fn read_u32(&mut self) -> Result<u32, Error> {
        let exact = self.advance(4)?;
        Ok(u32::from_be_bytes(exact.try_into().unwrap()))
    }

    fn read_u64(&mut self) -> Result<u64, Error> {
        let exact = self.advance(8)?;
        Ok(u64::from_be_bytes(exact.try_into().unwrap()))
    }

    fn read_i64(&mut self) -> Result<i64, Error> {
        Ok(self.read_u64()? as i64)
    }

    fn read_bytes(&mut self, n: usize) -> Result<&[u8], Error> {
        self.advance(n)
    }

    /// Length-prefixed (vint) UTF-8 string, as used by file headers.
    fn read_string(&mut self) -> Result<String, Error> {
        let len = self.read_vint()? as usize;
        let bytes = self.advance(len)?;
        Ok(std::str::from_utf8(bytes)?.to_owned())
    }
}
impl<I: InputStream + ?Sized> DataInputStream for I {}

/// Zero-copy cursor over a borrowed byte slice.
#[derive(Clone)]
pub struct SliceInputStream<'src> {
    data: &'src [u8],
    position: usize,
}

impl fmt::Debug for SliceInputStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SliceInputStream[@{}..{}]",
            self.position,
            self.data.len()
        )
    }
}

impl<'src> SliceInputStream<'src> {
    pub fn new(data: &'src [u8]) -> Self {
        Self { data, position: 0 }
    }
    pub fn remaining(&self) -> &'src [u8] {
        &self.data[self.position..]
    }
}

impl<'src> InputStream for SliceInputStream<'src> {
    fn tell(&self) -> usize {
        self.position
    }
    fn len(&self) -> usize {
        self.data.len()
    }
    fn seek(&mut self, pos: usize) -> Result<(), Error> {
        if pos > self.data.len() {
            return Err(Error::CorruptOffset);
        }
        self.position = pos;
        Ok(())
    }
    fn advance(&mut self, n: usize) -> Result<&[u8], Error> {
        let end = self.position + n;
        if end > self.data.len() {
            return Err(Error::CorruptOffset);
        }
        let found = &self.data[self.position..end];
        self.position = end;
        Ok(found)
    }
}

/// Cursor over a shared mmap, bounded to `[start, end)`. Cheap to clone: a
/// reader hands one of these to every iterator it spawns so iterators never
/// contend over a single cursor.
#[derive(Debug, Clone)]
pub struct ArcInputStream {
    source: Arc<Mmap>,
    start: usize,
    end: usize,
    offset: usize,
}

impl ArcInputStream {
    pub fn from_mmap(source: Arc<Mmap>) -> Self {
        let end = source.len();
        Self {
            source,
            start: 0,
            end,
            offset: 0,
        }
    }
    pub fn new(source: Arc<Mmap>, start: usize, end: usize) -> Self {
        Self {
            source,
            start,
            end,
            offset: 0,
        }
    }
    pub fn file_pointer(&self) -> usize {
        self.start + self.offset
    }
}

impl InputStream for ArcInputStream {
    fn tell(&self) -> usize {
        self.offset
    }
    fn len(&self) -> usize {
        self.end - self.start
    }
    fn seek(&mut self, pos: usize) -> Result<(), Error> {
        if pos > self.len() {
            return Err(Error::CorruptOffset);
        }
        self.offset = pos;
        Ok(())
    }
    fn advance(&mut self, n: usize) -> Result<&[u8], Error> {
        let lhs = self.start + self.offset;
        let rhs = lhs + n;
        if rhs > self.end {
            return Err(Error::CorruptOffset);
        }
        self.offset += n;
        Ok(&self.source[lhs..rhs])
    }
}

/// Any `io::Write` gets vint/vlong/zigzag/fixed-width writers for free —
/// mirrors [`DataInputStream`] on the output side.
pub trait DataOutputStream: io::Write {
    fn write_vlong(&mut self, mut value: u64) -> io::Result<()> {
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
                self.write_all(&[byte])?;
            } else {
                self.write_all(&[byte])?;
                return Ok(());
            }
        }
    }

    fn write_vint(&mut self, value: u32) -> io::Result<()> {
        self.write_vlong(value as u64)
    }

    fn write_zigzag_vlong(&mut self, value: i64) -> io::Result<()> {
        let zigzagged = ((value << 1) ^ (value >> 63)) as u64;
        self.write_vlong(zigzagged)
    }

    fn write_u16(&mut self, value: u16) -> io::Result<()> {
        self.write_all(&value.to_be_bytes())
    }
    fn write_u32(&mut self, value: u32) -> io::Result<()> {
        self.write_all(&value.to_be_bytes())
    }
    fn write_u64(&mut self, value: u64) -> io::Result<()> {
        self.write_all(&value.to_be_bytes())
    }
    fn write_i64(&mut self, value: i64) -> io::Result<()> {
        self.write_u64(value as u64)
    }
    fn write_string(&mut self, value: &str) -> io::Result<()> {
        self.write_vint(value.len() as u32)?;
        self.write_all(value.as_bytes())
    }
}
impl<W: io::Write + ?Sized> DataOutputStream for W {}

/// Wraps any `Write` and tracks the absolute byte offset written so far —
/// writers use this to record term-meta offsets without a separate `seek`.
pub struct CountingWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }
    pub fn tell(&self) -> u64 {
        self.position
    }
    pub fn into_inner(self) -> W {
        self.inner
    }
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}

impl CountingWriter<fs::File> {
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self::new(fs::File::create(path)?))
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Wraps a `Write` and accumulates a running CRC32 over every byte written,
/// for the footer checksum every file in `codec` ends with.
pub struct Crc32Writer<W> {
    inner: W,
    hasher: crc32fast::Hasher,
}

impl<W: Write> Crc32Writer<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
        }
    }
    pub fn finish(self) -> u32 {
        self.hasher.finalize()
    }
    /// Checksum of everything written so far, without consuming the
    /// writer — for writers that need to keep appending after recording a
    /// footer CRC (e.g. alongside a `CountingWriter` that still needs to
    /// report `tell()`).
    pub fn current(&self) -> u32 {
        self.hasher.clone().finalize()
    }
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for Crc32Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Computes the CRC32 of a byte slice the same way [`Crc32Writer`] does, for
/// verifying a footer against the bytes that preceded it.
pub fn crc32_of(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vint_round_trip() {
        let values: &[u32] = &[0, 1, 127, 128, 16384, 0xdeadbeef, u32::MAX];
        let mut buf = Vec::new();
        for v in values {
            buf.write_vint(*v).unwrap();
        }
        let mut rdr = SliceInputStream::new(&buf);
        for v in values {
            assert_eq!(*v, rdr.read_vint().unwrap());
        }
        assert!(rdr.eof());
    }

    #[test]
    fn vlong_round_trip() {
        let values: &[u64] = &[0, 1, 1 << 40, u64::MAX];
        let mut buf = Vec::new();
        for v in values {
            buf.write_vlong(*v).unwrap();
        }
        let mut rdr = SliceInputStream::new(&buf);
        for v in values {
            assert_eq!(*v, rdr.read_vlong().unwrap());
        }
    }

    #[test]
    fn zigzag_round_trip() {
        let values: &[i64] = &[0, -1, 1, -1000, 1000, i64::MIN, i64::MAX];
        let mut buf = Vec::new();
        for v in values {
            buf.write_zigzag_vlong(*v).unwrap();
        }
        let mut rdr = SliceInputStream::new(&buf);
        for v in values {
            assert_eq!(*v, rdr.read_zigzag_vlong().unwrap());
        }
    }

    #[test]
    fn fixed_width_round_trip() {
        let mut buf = Vec::new();
        buf.write_u16(0x1234).unwrap();
        buf.write_u32(0xdeadbeef).unwrap();
        buf.write_u64(0x0123456789abcdef).unwrap();
        let mut rdr = SliceInputStream::new(&buf);
        assert_eq!(0x1234, rdr.read_u16().unwrap());
        assert_eq!(0xdeadbeef, rdr.read_u32().unwrap());
        assert_eq!(0x0123456789abcdef, rdr.read_u64().unwrap());
    }

    #[test]
    fn crc_matches_hasher() {
        let mut w = Crc32Writer::new(Vec::new());
        w.write_all(b"hello world").unwrap();
        let crc = w.finish();
        assert_eq!(crc, crc32_of(b"hello world"));
    }
}

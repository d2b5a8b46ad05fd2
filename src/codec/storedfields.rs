//! Block-compressed per-document blobs with a sparse doc→offset index.
//! Grounded on `mem/readers.rs`'s `SkippedTreeReader` (footer holding
//! absolute section offsets, `lower_bound`-style block lookup) combined
//! with `mem/key_val_files.rs`'s block-buffering `PagePacker`, generalized
//! from a single packed key/value tree into two parallel length arrays
//! (header, body) plus one compressed blob per block.
use crate::codec::meta::{read_header, verify_footer, write_header};
use crate::codec::packed::{pack_block, unpack_block};
use crate::codec::{compression, BLOCK_SIZE};
use crate::directory::Directory;
use crate::io_helper::{
    crc32_of, ArcInputStream, CountingWriter, Crc32Writer, DataInputStream, DataOutputStream,
    InputStream, SliceInputStream,
};
use crate::Error;
use std::io::Write;
use std::sync::Mutex;

pub const STORED_FIELDS_DATA_FORMAT: &str = "loam_stored_fields_data";
pub const STORED_FIELDS_INDEX_FORMAT: &str = "loam_stored_fields_index";

/// A block is flushed once it holds `BLOCK_SIZE` documents or its raw
/// buffer exceeds this many bytes, whichever comes first.
pub const DEFAULT_BUF_SIZE: usize = 16 * 1024;

pub struct StoredFieldsWriter<W: Write> {
    out: CountingWriter<Crc32Writer<W>>,
    buf_size: usize,
    next_doc: u32,
    block_start_doc: u32,
    header_lens: Vec<u32>,
    body_lens: Vec<u32>,
    raw: Vec<u8>,
    index_entries: Vec<(u32, u64)>,
    total_blocks: u32,
    incomplete_blocks: u32,
    max_block_size: u32,
}

impl<W: Write> StoredFieldsWriter<W> {
    pub fn prepare(out: W, first_doc: u32) -> std::io::Result<Self> {
        let mut out = CountingWriter::new(Crc32Writer::new(out));
        write_header(&mut out, STORED_FIELDS_DATA_FORMAT, crate::codec::FORMAT_VERSION)?;
        Ok(Self {
            out,
            buf_size: DEFAULT_BUF_SIZE,
            next_doc: first_doc,
            block_start_doc: first_doc,
            header_lens: Vec::new(),
            body_lens: Vec::new(),
            raw: Vec::new(),
            index_entries: Vec::new(),
            total_blocks: 0,
            incomplete_blocks: 0,
            max_block_size: 0,
        })
    }

    pub fn add_document(&mut self, header: &[u8], body: &[u8]) -> std::io::Result<()> {
        if self.header_lens.is_empty() {
            self.block_start_doc = self.next_doc;
        }
        self.header_lens.push(header.len() as u32);
        self.body_lens.push(body.len() as u32);
        self.raw.extend_from_slice(header);
        self.raw.extend_from_slice(body);
        self.next_doc += 1;

        if self.header_lens.len() >= BLOCK_SIZE || self.raw.len() >= self.buf_size {
            self.flush_block()?;
        }
        Ok(())
    }

    fn flush_block(&mut self) -> std::io::Result<()> {
        if self.header_lens.is_empty() {
            return Ok(());
        }
        let file_offset = self.out.tell();
        self.index_entries.push((self.block_start_doc, file_offset));
        let count = self.header_lens.len() as u32;
        if count < BLOCK_SIZE as u32 {
            self.incomplete_blocks += 1;
        }
        self.max_block_size = self.max_block_size.max(self.raw.len() as u32);
        self.total_blocks += 1;

        self.out.write_vint(self.block_start_doc)?;
        self.out.write_vint(count)?;
        pack_block(&mut self.out, &self.header_lens)?;
        pack_block(&mut self.out, &self.body_lens)?;
        compression::compress_block(&mut self.out, &self.raw)?;

        self.header_lens.clear();
        self.body_lens.clear();
        self.raw.clear();
        Ok(())
    }

    /// Flushes any partial block, writes the data file's footer, and
    /// returns the index entries the caller writes to the `.fx` file via
    /// [`write_stored_fields_index`].
    pub fn finish(mut self) -> std::io::Result<StoredFieldsIndex> {
        self.flush_block()?;
        let crc = self.out.get_mut().current();
        self.out.write_u32(crc)?;
        Ok(StoredFieldsIndex {
            entries: self.index_entries,
            total_blocks: self.total_blocks,
            incomplete_blocks: self.incomplete_blocks,
            max_block_size: self.max_block_size,
        })
    }
}

/// What the writer hands back for the caller to persist as the `.fx` file.
pub struct StoredFieldsIndex {
    entries: Vec<(u32, u64)>,
    total_blocks: u32,
    incomplete_blocks: u32,
    max_block_size: u32,
}

pub fn write_stored_fields_index<D: Directory>(
    dir: &D,
    file_name: &str,
    index: &StoredFieldsIndex,
) -> Result<(), Error> {
    let mut buf = Vec::new();
    write_header(&mut buf, STORED_FIELDS_INDEX_FORMAT, crate::codec::FORMAT_VERSION)?;
    buf.write_vint(index.entries.len() as u32)?;
    let mut prev_doc = 0u32;
    let mut prev_offset = 0u64;
    for &(doc_base, offset) in &index.entries {
        buf.write_vint(doc_base - prev_doc)?;
        buf.write_vlong(offset - prev_offset)?;
        prev_doc = doc_base;
        prev_offset = offset;
    }
    buf.write_vint(index.total_blocks)?;
    buf.write_vint(index.incomplete_blocks)?;
    buf.write_vint(index.max_block_size)?;
    let crc = crc32_of(&buf);
    buf.write_u32(crc)?;
    let mut out = dir.create(file_name)?;
    out.write_all(&buf)?;
    Ok(())
}

struct CachedBlock {
    doc_base: u32,
    count: u32,
    header_lens: Vec<u32>,
    body_lens: Vec<u32>,
    raw: Vec<u8>,
}

pub struct StoredFieldsReader {
    index: Vec<(u32, u64)>,
    data: ArcInputStream,
    cache: Mutex<Option<CachedBlock>>,
}

impl StoredFieldsReader {
    pub fn prepare<D: Directory>(
        dir: &D,
        data_file: &str,
        index_file: &str,
    ) -> Result<Self, Error> {
        let mut data = dir.open(data_file)?;
        read_header(&mut data, STORED_FIELDS_DATA_FORMAT)?;

        let all = dir.read_all(index_file)?;
        if all.len() < 4 {
            return Err(Error::CorruptOffset);
        }
        let split = all.len() - 4;
        let (body, footer) = all.split_at(split);
        let footer_crc = u32::from_be_bytes(footer.try_into().unwrap());
        verify_footer(body, footer_crc)?;

        let mut cursor = SliceInputStream::new(body);
        read_header(&mut cursor, STORED_FIELDS_INDEX_FORMAT)?;
        let n = cursor.read_vint()? as usize;
        let mut entries = Vec::with_capacity(n);
        let mut prev_doc = 0u32;
        let mut prev_offset = 0u64;
        for _ in 0..n {
            prev_doc += cursor.read_vint()?;
            prev_offset += cursor.read_vlong()?;
            entries.push((prev_doc, prev_offset));
        }
        let _total_blocks = cursor.read_vint()?;
        let _incomplete_blocks = cursor.read_vint()?;
        let _max_block_size = cursor.read_vint()?;

        Ok(Self {
            index: entries,
            data,
            cache: Mutex::new(None),
        })
    }

    /// Largest index `i` such that `index[i].0 <= doc`, or `None` if `doc`
    /// precedes every block.
    fn lower_bound(&self, doc: u32) -> Option<usize> {
        match self.index.binary_search_by_key(&doc, |&(base, _)| base) {
            Ok(i) => Some(i),
            Err(0) => None,
            Err(i) => Some(i - 1),
        }
    }

    fn load_block(&self, file_offset: u64) -> Result<CachedBlock, Error> {
        let mut cursor = self.data.clone();
        cursor.seek(file_offset as usize)?;
        let doc_base = cursor.read_vint()?;
        let count = cursor.read_vint()?;
        let header_lens = unpack_block(&mut cursor, count as usize)?;
        let body_lens = unpack_block(&mut cursor, count as usize)?;
        let raw = compression::decompress_block(&mut cursor)?;
        Ok(CachedBlock {
            doc_base,
            count,
            header_lens,
            body_lens,
            raw,
        })
    }

    /// Full footer CRC check, run only when a structural check already
    /// failed — per spec.md §7's policy, large data files aren't hashed on
    /// every open.
    pub fn verify_footer_on_demand<D: Directory>(
        &self,
        dir: &D,
        data_file: &str,
    ) -> Result<(), Error> {
        let all = dir.read_all(data_file)?;
        if all.len() < 4 {
            return Err(Error::CorruptOffset);
        }
        let split = all.len() - 4;
        let (body, footer) = all.split_at(split);
        let footer_crc = u32::from_be_bytes(footer.try_into().unwrap());
        verify_footer(body, footer_crc)
    }

    /// Calls `visitor(header, body)` for `doc`; returns `Ok(false)` if
    /// `doc` has no stored fields (outside the index range or past the
    /// end of its block).
    pub fn visit(
        &self,
        doc: u32,
        visitor: impl FnOnce(&[u8], &[u8]),
    ) -> Result<bool, Error> {
        let block_idx = match self.lower_bound(doc) {
            Some(i) => i,
            None => return Ok(false),
        };
        let (doc_base, file_offset) = self.index[block_idx];

        let mut guard = self.cache.lock().unwrap();
        let needs_load = match &*guard {
            Some(cached) => cached.doc_base != doc_base,
            None => true,
        };
        if needs_load {
            *guard = Some(self.load_block(file_offset)?);
        }
        let cached = guard.as_ref().unwrap();

        let local = doc - cached.doc_base;
        if local >= cached.count {
            return Ok(false);
        }
        let local = local as usize;
        let mut offset = 0usize;
        for i in 0..local {
            offset += cached.header_lens[i] as usize + cached.body_lens[i] as usize;
        }
        let header_len = cached.header_lens[local] as usize;
        let body_len = cached.body_lens[local] as usize;
        let header = &cached.raw[offset..offset + header_len];
        let body = &cached.raw[offset + header_len..offset + header_len + body_len];
        visitor(header, body);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::FsDirectory;

    #[test]
    fn visits_exact_bytes_submitted_at_write_time() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path());
        let docs: Vec<(Vec<u8>, Vec<u8>)> = vec![
            (b"h0".to_vec(), b"body-zero".to_vec()),
            (b"h1".to_vec(), b"body-one!!".to_vec()),
            (b"h2".to_vec(), b"b2".to_vec()),
        ];

        let data_out = dir.create("_0.fd").unwrap().into_inner();
        let mut writer = StoredFieldsWriter::prepare(data_out, 0).unwrap();
        for (h, b) in &docs {
            writer.add_document(h, b).unwrap();
        }
        let index = writer.finish().unwrap();
        write_stored_fields_index(&dir, "_0.fx", &index).unwrap();

        let reader = StoredFieldsReader::prepare(&dir, "_0.fd", "_0.fx").unwrap();
        for (i, (h, b)) in docs.iter().enumerate() {
            let mut seen = None;
            let found = reader
                .visit(i as u32, |header, body| {
                    seen = Some((header.to_vec(), body.to_vec()));
                })
                .unwrap();
            assert!(found);
            assert_eq!(seen.unwrap(), (h.clone(), b.clone()));
        }
    }

    #[test]
    fn doc_past_last_block_is_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path());
        let data_out = dir.create("_0.fd").unwrap().into_inner();
        let mut writer = StoredFieldsWriter::prepare(data_out, 0).unwrap();
        writer.add_document(b"h", b"b").unwrap();
        let index = writer.finish().unwrap();
        write_stored_fields_index(&dir, "_0.fx", &index).unwrap();

        let reader = StoredFieldsReader::prepare(&dir, "_0.fd", "_0.fx").unwrap();
        assert!(!reader.visit(5, |_, _| {}).unwrap());
    }

    #[test]
    fn spans_multiple_blocks() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path());
        let data_out = dir.create("_0.fd").unwrap().into_inner();
        let mut writer = StoredFieldsWriter::prepare(data_out, 0).unwrap();
        let n = BLOCK_SIZE * 2 + 5;
        for i in 0..n {
            let body = format!("doc-{}", i).into_bytes();
            writer.add_document(b"h", &body).unwrap();
        }
        let index = writer.finish().unwrap();
        assert_eq!(index.total_blocks, 3);
        write_stored_fields_index(&dir, "_0.fx", &index).unwrap();

        let reader = StoredFieldsReader::prepare(&dir, "_0.fd", "_0.fx").unwrap();
        for doc in [0usize, BLOCK_SIZE - 1, BLOCK_SIZE, n - 1] {
            let expected = format!("doc-{}", doc).into_bytes();
            let mut seen = None;
            reader
                .visit(doc as u32, |_, body| seen = Some(body.to_vec()))
                .unwrap();
            assert_eq!(seen.unwrap(), expected);
        }
    }
}

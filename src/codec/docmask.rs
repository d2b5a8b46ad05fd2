//! Persisted tombstone set: the doc ids deleted from a segment after it was
//! written. Grounded on `mem/int_set.rs`'s `CompressedSortedIntSet`
//! (sorted ids, stored as successive deltas) with the header/footer framing
//! from [`crate::codec::meta`] wrapped around the delta stream instead of
//! `mem/int_set.rs`'s bare `stream_vbyte` blob.
use crate::codec::meta::{read_header, verify_footer, write_header};
use crate::codec::DocId;
use crate::directory::Directory;
use crate::io_helper::{crc32_of, DataInputStream, DataOutputStream, SliceInputStream};
use crate::Error;
use fnv::FnvHashSet;
use std::io::Write;

pub const DOC_MASK_FORMAT: &str = "loam_doc_mask";

/// A deleted-doc set, queryable by membership. Built once from a sorted
/// list of ids (either freshly collected deletes or the ids decoded back
/// off disk).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMask {
    deleted: FnvHashSet<u32>,
}

impl DocumentMask {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_sorted_ids(ids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            deleted: ids.into_iter().collect(),
        }
    }

    pub fn contains(&self, doc: DocId) -> bool {
        self.deleted.contains(&doc.0)
    }

    pub fn len(&self) -> usize {
        self.deleted.len()
    }
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty()
    }

    fn sorted_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.deleted.iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

pub fn write_doc_mask<D: Directory>(
    dir: &D,
    file_name: &str,
    mask: &DocumentMask,
) -> Result<(), Error> {
    let ids = mask.sorted_ids();
    let mut buf = Vec::new();
    write_header(&mut buf, DOC_MASK_FORMAT, crate::codec::FORMAT_VERSION)?;
    buf.write_vint(ids.len() as u32)?;
    let mut prev = 0u32;
    for &id in &ids {
        buf.write_vint(id - prev)?;
        prev = id;
    }
    let crc = crc32_of(&buf);
    buf.write_u32(crc)?;
    let mut out = dir.create(file_name)?;
    out.write_all(&buf)?;
    Ok(())
}

pub fn read_doc_mask<D: Directory>(dir: &D, file_name: &str) -> Result<DocumentMask, Error> {
    let all = dir.read_all(file_name)?;
    if all.len() < 4 {
        return Err(Error::CorruptOffset);
    }
    let split = all.len() - 4;
    let (body_and_header, footer) = all.split_at(split);
    let footer_crc = u32::from_be_bytes(footer.try_into().unwrap());
    verify_footer(body_and_header, footer_crc)?;

    let mut cursor = SliceInputStream::new(body_and_header);
    read_header(&mut cursor, DOC_MASK_FORMAT)?;
    let count = cursor.read_vint()? as usize;
    let mut ids = Vec::with_capacity(count);
    let mut prev = 0u32;
    for _ in 0..count {
        prev += cursor.read_vint()?;
        ids.push(prev);
    }
    Ok(DocumentMask::from_sorted_ids(ids))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::FsDirectory;

    #[test]
    fn masked_set_matches_input() {
        let mask = DocumentMask::from_sorted_ids(vec![1, 3, 5]);
        assert!(mask.contains(DocId(3)));
        assert!(!mask.contains(DocId(4)));
        assert_eq!(mask.len(), 3);
    }

    #[test]
    fn round_trips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path());
        let mask = DocumentMask::from_sorted_ids(vec![2, 4, 4000, 4001]);
        write_doc_mask(&dir, "_0.doc_mask", &mask).unwrap();
        let back = read_doc_mask(&dir, "_0.doc_mask").unwrap();
        assert_eq!(back, mask);
    }

    #[test]
    fn empty_mask_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path());
        write_doc_mask(&dir, "_0.doc_mask", &DocumentMask::empty()).unwrap();
        let back = read_doc_mask(&dir, "_0.doc_mask").unwrap();
        assert!(back.is_empty());
    }
}

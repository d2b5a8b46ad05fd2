//! Small self-describing files: `[header | body | footer(crc32)]`. Grounded
//! on `galago_btree.rs`'s footer reader (`MAGIC_NUMBER` check followed by a
//! `serde_json`-decoded manifest slice), generalized into a shared
//! header/footer framing used by every meta file plus the segment/field/
//! index meta records themselves.
use crate::codec::{Features, FORMAT_VERSION, PENDING_SEGMENTS_PREFIX, SEGMENTS_PREFIX};
use crate::directory::Directory;
use crate::io_helper::{crc32_of, DataInputStream, DataOutputStream, InputStream, SliceInputStream};
use crate::Error;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::Write;

/// Every header starts with this magic value, matching the teacher's
/// single `u64` magic-number check generalized to a `u32` plus a format
/// name (the codec has more than one file kind sharing this framing, so a
/// bare magic number isn't enough to tell them apart).
pub const HEADER_MAGIC: u32 = 0x3fd7_6c17;

pub fn write_header<W: Write>(out: &mut W, format_name: &str, version: i32) -> std::io::Result<()> {
    out.write_u32(HEADER_MAGIC)?;
    out.write_string(format_name)?;
    out.write_u32(version as u32)
}

/// Verifies magic + format name + supported version; returns the version
/// found so callers may special-case older-but-readable versions later.
/// Generic over any [`InputStream`] so both the slice-backed meta-file
/// reader and the mmap-backed data-file readers share this one check.
pub fn read_header<S: InputStream + ?Sized>(src: &mut S, expected_name: &str) -> Result<i32, Error> {
    let magic = src.read_u32()?;
    if magic != HEADER_MAGIC {
        return Err(Error::BadMagic {
            expected: HEADER_MAGIC,
            found: magic,
        });
    }
    let name = src.read_string()?;
    if name != expected_name {
        return Err(Error::FormatNameMismatch {
            expected: expected_name.to_owned(),
            found: name,
        });
    }
    let version = src.read_u32()? as i32;
    if version != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion {
            found: version,
            supported: FORMAT_VERSION,
        });
    }
    Ok(version)
}

/// Checks a footer CRC32 against the bytes that preceded it.
pub fn verify_footer(bytes_before_footer: &[u8], footer_crc: u32) -> Result<(), Error> {
    let computed = crc32_of(bytes_before_footer);
    if computed != footer_crc {
        return Err(Error::ChecksumMismatch {
            expected: footer_crc,
            computed,
        });
    }
    Ok(())
}

fn write_meta_file<D: Directory, T: Serialize>(
    dir: &D,
    name: &str,
    format_name: &str,
    value: &T,
) -> Result<(), Error> {
    let body = serde_json::to_vec(value).map_err(|e| Error::NotSupported(e.to_string()))?;
    let mut buf = Vec::new();
    write_header(&mut buf, format_name, FORMAT_VERSION)?;
    buf.write_vint(body.len() as u32)?;
    buf.write_all(&body)?;
    let crc = crc32_of(&buf);
    buf.write_u32(crc)?;
    let mut out = dir.create(name)?;
    out.write_all(&buf)?;
    Ok(())
}

fn read_meta_file<D: Directory, T: DeserializeOwned>(
    dir: &D,
    name: &str,
    format_name: &str,
) -> Result<T, Error> {
    let all = dir.read_all(name)?;
    if all.len() < 4 {
        return Err(Error::CorruptOffset);
    }
    let split = all.len() - 4;
    let (body_and_header, footer) = all.split_at(split);
    let footer_crc = u32::from_be_bytes(footer.try_into().unwrap());
    verify_footer(body_and_header, footer_crc)?;

    let mut cursor = SliceInputStream::new(body_and_header);
    read_header(&mut cursor, format_name)?;
    let body_len = cursor.read_vint()? as usize;
    let body = cursor.read_bytes(body_len)?;
    serde_json::from_slice(body).map_err(|e| Error::NotSupported(e.to_string()))
}

/// `(name, version, docs_count, file_set)` as spec.md §3 describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub name: String,
    pub version: i32,
    pub docs_count: u32,
    pub files: Vec<String>,
}

pub const SEGMENT_META_FORMAT: &str = "loam_segment_meta";

pub fn write_segment_meta<D: Directory>(
    dir: &D,
    file_name: &str,
    meta: &SegmentMeta,
) -> Result<(), Error> {
    write_meta_file(dir, file_name, SEGMENT_META_FORMAT, meta)
}

pub fn read_segment_meta<D: Directory>(dir: &D, file_name: &str) -> Result<SegmentMeta, Error> {
    read_meta_file(dir, file_name, SEGMENT_META_FORMAT)
}

/// One field's schema entry: id, name, feature set, and the column id
/// (if any) that carries its norm values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub id: u32,
    pub name: String,
    pub features: Features,
    pub norm_column: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub fields: Vec<FieldInfo>,
}

impl FieldMeta {
    pub fn by_name(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
    pub fn by_id(&self, id: u32) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.id == id)
    }
}

pub const FIELD_META_FORMAT: &str = "loam_field_meta";

pub fn write_field_meta<D: Directory>(
    dir: &D,
    file_name: &str,
    meta: &FieldMeta,
) -> Result<(), Error> {
    for field in &meta.fields {
        if !field.features.is_valid() {
            return Err(Error::NotSupported(format!(
                "field `{}` has an invalid feature combination",
                field.name
            )));
        }
    }
    write_meta_file(dir, file_name, FIELD_META_FORMAT, meta)
}

pub fn read_field_meta<D: Directory>(dir: &D, file_name: &str) -> Result<FieldMeta, Error> {
    read_meta_file(dir, file_name, FIELD_META_FORMAT)
}

/// One committed segment as index meta records it: its file-name stem and
/// the codec that wrote it (segments written by different codec versions
/// may coexist across generations).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentCommit {
    pub segment_name: String,
    pub codec: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub generation: u64,
    pub counter: u64,
    pub segments: Vec<SegmentCommit>,
}

pub const INDEX_META_FORMAT: &str = "loam_index_meta";

fn segments_file_name(generation: u64) -> String {
    format!("{}{}", SEGMENTS_PREFIX, generation)
}
fn pending_segments_file_name(generation: u64) -> String {
    format!("{}{}", PENDING_SEGMENTS_PREFIX, generation)
}

/// Scans the directory for the highest-generation `segments_<gen>` file,
/// ignoring any `pending_segments_<gen>` files left behind by a crashed
/// writer.
pub fn find_latest_generation<D: Directory>(dir: &D) -> Result<Option<u64>, Error> {
    let mut latest: Option<u64> = None;
    dir.visit(&mut |name| {
        if let Some(suffix) = name.strip_prefix(SEGMENTS_PREFIX) {
            if let Ok(gen) = suffix.parse::<u64>() {
                latest = Some(latest.map_or(gen, |cur| cur.max(gen)));
            }
        }
    })?;
    Ok(latest)
}

pub fn read_latest_index_meta<D: Directory>(dir: &D) -> Result<Option<IndexMeta>, Error> {
    match find_latest_generation(dir)? {
        None => Ok(None),
        Some(gen) => Ok(Some(read_meta_file(
            dir,
            &segments_file_name(gen),
            INDEX_META_FORMAT,
        )?)),
    }
}

/// Two-phase commit, stage one: write `pending_segments_<generation>`.
pub fn prepare_index_meta<D: Directory>(dir: &D, meta: &IndexMeta) -> Result<(), Error> {
    write_meta_file(
        dir,
        &pending_segments_file_name(meta.generation),
        INDEX_META_FORMAT,
        meta,
    )
}

/// Stage two: atomically rename the pending file to its canonical name.
/// After this call `find_latest_generation` observes the new generation.
pub fn commit_index_meta<D: Directory>(dir: &D, generation: u64) -> Result<(), Error> {
    dir.rename(
        &pending_segments_file_name(generation),
        &segments_file_name(generation),
    )
}

/// Abandons a prepared-but-uncommitted generation.
pub fn rollback_index_meta<D: Directory>(dir: &D, generation: u64) -> Result<(), Error> {
    dir.remove(&pending_segments_file_name(generation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Features;
    use crate::directory::FsDirectory;

    #[test]
    fn segment_meta_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path());
        let meta = SegmentMeta {
            name: "_0".to_owned(),
            version: FORMAT_VERSION,
            docs_count: 42,
            files: vec!["_0.doc".to_owned(), "_0.fm".to_owned()],
        };
        write_segment_meta(&dir, "_0.sm", &meta).unwrap();
        let back = read_segment_meta(&dir, "_0.sm").unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn field_meta_rejects_invalid_features() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path());
        let meta = FieldMeta {
            fields: vec![FieldInfo {
                id: 0,
                name: "body".to_owned(),
                features: Features {
                    payload: true,
                    ..Features::NONE
                },
                norm_column: None,
            }],
        };
        assert!(write_field_meta(&dir, "_0.fm", &meta).is_err());
    }

    #[test]
    fn corrupt_footer_fails_to_read() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path());
        let meta = SegmentMeta {
            name: "_0".to_owned(),
            version: FORMAT_VERSION,
            docs_count: 1,
            files: vec![],
        };
        write_segment_meta(&dir, "_0.sm", &meta).unwrap();

        let mut bytes = dir.read_all("_0.sm").unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(tmp.path().join("_0.sm"), &bytes).unwrap();

        assert!(read_segment_meta(&dir, "_0.sm").is_err());
    }

    #[test]
    fn two_phase_commit_publishes_latest_generation() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path());
        let meta = IndexMeta {
            generation: 1,
            counter: 0,
            segments: vec![SegmentCommit {
                segment_name: "_0".to_owned(),
                codec: "loam_1_0".to_owned(),
            }],
        };
        prepare_index_meta(&dir, &meta).unwrap();
        assert!(dir.exists("pending_segments_1"));
        assert!(find_latest_generation(&dir).unwrap().is_none());

        commit_index_meta(&dir, 1).unwrap();
        assert!(!dir.exists("pending_segments_1"));
        assert_eq!(find_latest_generation(&dir).unwrap(), Some(1));
        let back = read_latest_index_meta(&dir).unwrap().unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn rollback_removes_pending_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path());
        let meta = IndexMeta {
            generation: 7,
            counter: 0,
            segments: vec![],
        };
        prepare_index_meta(&dir, &meta).unwrap();
        rollback_index_meta(&dir, 7).unwrap();
        assert!(!dir.exists("pending_segments_7"));
        assert!(find_latest_generation(&dir).unwrap().is_none());
    }
}

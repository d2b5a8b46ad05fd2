//! The thin boundary the codec is built against: file creation/lookup/
//! rename/removal, independent of any particular storage backend. Grounded
//! on the teacher's `io_helper::open_mmap_file` plus `galago_btree.rs`'s
//! direct `fs`/`PathBuf` usage, generalized into a trait so the codec never
//! names `std::fs` directly outside this file.
use crate::io_helper::{open_mmap_file, ArcInputStream, CountingWriter};
use crate::Error;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Everything the codec needs from a storage backend. One segment's files
/// all live under one `Directory`; a writer's `Box<dyn Write>` output and a
/// reader's mmap-backed input are obtained from the same directory so tests
/// can swap in an in-memory backend without touching codec logic.
pub trait Directory: Send + Sync {
    /// Opens `name` for append-only writing, creating it if absent and
    /// truncating if present (matching the write-once segment file
    /// lifecycle: `prepare` creates, nothing else ever recreates it).
    fn create(&self, name: &str) -> Result<CountingWriter<Box<dyn Write>>, Error>;

    /// Opens `name` for zero-copy mmap-backed reading.
    fn open(&self, name: &str) -> Result<ArcInputStream, Error>;

    /// Reads `name` fully into memory; used for the small self-describing
    /// meta files, never for postings/columnstore data.
    fn read_all(&self, name: &str) -> Result<Vec<u8>, Error>;

    fn exists(&self, name: &str) -> bool;
    fn rename(&self, from: &str, to: &str) -> Result<(), Error>;
    fn remove(&self, name: &str) -> Result<(), Error>;
    fn sync(&self, name: &str) -> Result<(), Error>;

    /// Calls `cb` once per file name currently in the directory.
    fn visit(&self, cb: &mut dyn FnMut(&str)) -> Result<(), Error>;

    fn length(&self, name: &str) -> Result<u64, Error>;
}

/// Plain-filesystem `Directory`, one segment's (or one index's) files under
/// a single root path.
pub struct FsDirectory {
    root: PathBuf,
}

impl FsDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl Directory for FsDirectory {
    fn create(&self, name: &str) -> Result<CountingWriter<Box<dyn Write>>, Error> {
        let file = fs::File::create(self.path(name))?;
        Ok(CountingWriter::new(Box::new(file)))
    }

    fn open(&self, name: &str) -> Result<ArcInputStream, Error> {
        let mmap = open_mmap_file(&self.path(name))?;
        Ok(ArcInputStream::from_mmap(mmap))
    }

    fn read_all(&self, name: &str) -> Result<Vec<u8>, Error> {
        Ok(fs::read(self.path(name))?)
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), Error> {
        fs::rename(self.path(from), self.path(to))?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), Error> {
        fs::remove_file(self.path(name))?;
        Ok(())
    }

    fn sync(&self, name: &str) -> Result<(), Error> {
        let file = fs::File::open(self.path(name))?;
        file.sync_all()?;
        Ok(())
    }

    fn visit(&self, cb: &mut dyn FnMut(&str)) -> Result<(), Error> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                cb(name);
            }
        }
        Ok(())
    }

    fn length(&self, name: &str) -> Result<u64, Error> {
        Ok(fs::metadata(self.path(name))?.len())
    }
}

/// Helper for callers that already have a concrete root path and want a
/// `Directory` without spelling out `FsDirectory::new`.
pub fn open_fs_directory(root: impl AsRef<Path>) -> FsDirectory {
    FsDirectory::new(root.as_ref().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn create_open_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path());
        {
            let mut out = dir.create("hello.txt").unwrap();
            out.write_all(b"hi there").unwrap();
        }
        assert!(dir.exists("hello.txt"));
        assert_eq!(dir.length("hello.txt").unwrap(), 8);
        let bytes = dir.read_all("hello.txt").unwrap();
        assert_eq!(bytes, b"hi there");
    }

    #[test]
    fn rename_and_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path());
        dir.create("a").unwrap().write_all(b"x").unwrap();
        dir.rename("a", "b").unwrap();
        assert!(!dir.exists("a"));
        assert!(dir.exists("b"));
        dir.remove("b").unwrap();
        assert!(!dir.exists("b"));
    }

    #[test]
    fn visit_lists_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path());
        dir.create("one").unwrap();
        dir.create("two").unwrap();
        let mut seen = Vec::new();
        dir.visit(&mut |name| seen.push(name.to_owned())).unwrap();
        seen.sort();
        assert_eq!(seen, vec!["one".to_owned(), "two".to_owned()]);
    }
}

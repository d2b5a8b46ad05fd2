//! Crate-wide error type. Every variant belongs to one of the three buckets
//! spec.md §7 calls for: on-disk structure violations (`index_error`), I/O
//! failures (`io_error`), and representability failures (`not_supported`).
use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    /// io_error: directory/stream I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid utf-8 in stream: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// index_error: truncated read or out-of-range seek.
    #[error("read past end of buffer")]
    CorruptOffset,

    /// index_error: a vint/vlong never terminated within 64 bits.
    #[error("corrupt varint (too many continuation bytes)")]
    CorruptVarint,

    /// index_error: wrong magic number at the head of a file.
    #[error("bad magic number: expected {expected:#x}, found {found:#x}")]
    BadMagic { expected: u32, found: u32 },

    /// index_error: format name string doesn't match what the reader expects.
    #[error("format name mismatch: expected `{expected}`, found `{found}`")]
    FormatNameMismatch { expected: String, found: String },

    /// index_error: unsupported on-disk version.
    #[error("unsupported format version {found} (supported: {supported})")]
    UnsupportedVersion { found: i32, supported: i32 },

    /// index_error: footer CRC32 doesn't match the bytes that precede it.
    #[error("footer checksum mismatch: expected {expected:#x}, computed {computed:#x}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    /// index_error: a segment file declares a block size other than the
    /// codec's compiled-in `BLOCK_SIZE`.
    #[error("block size mismatch: codec uses {expected}, file declares {found}")]
    BlockSizeMismatch { expected: u32, found: u32 },

    /// index_error: doc ids written out of order.
    #[error("doc ids must strictly increase (prev={prev}, next={next})")]
    NonMonotoneDocId { prev: u32, next: u32 },

    /// index_error: negative/zero doc count where one or more was required.
    #[error("invalid document count: {0}")]
    InvalidDocCount(i64),

    /// index_error: field id referenced that isn't in field-meta.
    #[error("invalid field id: {0}")]
    InvalidFieldId(u32),

    /// index_error: no registered codec under this name.
    #[error("unknown codec: {0}")]
    UnknownCodec(String),

    /// not_supported: feature combination the format can't represent, e.g.
    /// offsets without positions.
    #[error("feature combination not representable: {0}")]
    NotSupported(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn with_context<S: Into<String>>(self, context: S) -> Error {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

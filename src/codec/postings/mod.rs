//! Postings: per-term doc/freq/position/payload/offset streams plus the
//! skip-accelerated cursors that read them back. See [`writer`] for the
//! encode side and [`reader`] for decode/iteration; [`term_meta`] is the
//! small record the term dictionary stores per term to make either side
//! possible without a full scan.
pub mod reader;
pub mod term_meta;
pub mod writer;

pub use reader::{
    Bare, DocCursor, MaskedDocCursor, OffsetPayloadPositionCursor, OffsetPositionCursor,
    PayloadPositionCursor, PlainPositionCursor, PositionCursor, PositionFeatures, PositionValue,
    WithOffsets, WithOffsetsAndPayloads, WithPayloads,
};
pub use term_meta::TermMeta;
pub use writer::{PositionEntry, PostingEntry, PostingsWriter};

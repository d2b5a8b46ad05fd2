//! The "1_0" segment codec: postings, positions, payloads, offsets, skip
//! lists, stored fields, columnstore, and the small self-describing meta
//! files that describe a segment. This module is the deep part of the
//! crate; everything else is a thin trait boundary the codec is built
//! against (see [`crate::directory`]).
pub mod columnstore;
pub mod compression;
pub mod docmask;
pub mod meta;
pub mod numeric;
pub mod packed;
pub mod postings;
pub mod registry;
pub mod skiplist;
pub mod storedfields;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of one postings/skip block. Every fixed-size buffer in the writer
/// and reader is sized to this constant.
pub const BLOCK_SIZE: usize = 128;
/// One skip entry is recorded per `SKIP_N` blocks at level 0, geometric
/// growth at higher levels.
pub const SKIP_N: usize = 8;
/// Upper bound on skip-list height; `SKIP_N.pow(MAX_SKIP_LEVELS)` blocks is
/// far beyond any realistic term.
pub const MAX_SKIP_LEVELS: usize = 10;

/// On-disk format identifiers, bit-exact — readers use these to validate
/// the header of every file they open.
pub const POSTINGS_TERMS_FORMAT: &str = "iresearch_10_postings_terms";
pub const POSTINGS_DOCUMENTS_FORMAT: &str = "iresearch_10_postings_documents";
pub const POSTINGS_POSITIONS_FORMAT: &str = "iresearch_10_postings_positions";
pub const POSTINGS_PAYLOADS_FORMAT: &str = "iresearch_10_postings_payloads";

pub const EXT_DOC: &str = "doc";
pub const EXT_POS: &str = "pos";
pub const EXT_PAY: &str = "pay";
pub const EXT_FIELD_META: &str = "fm";
pub const EXT_SEGMENT_META: &str = "sm";
pub const EXT_STORED_FIELDS: &str = "fd";
pub const EXT_STORED_FIELDS_INDEX: &str = "fx";
pub const EXT_COLUMN_META: &str = "cm";
pub const EXT_COLUMN_STORE: &str = "cs";
pub const EXT_DOC_MASK: &str = "doc_mask";

pub const SEGMENTS_PREFIX: &str = "segments_";
pub const PENDING_SEGMENTS_PREFIX: &str = "pending_segments_";

pub const FORMAT_VERSION: i32 = 1;

/// Dense per-segment document identifier. `0` is reserved as
/// [`DocId::INVALID`]; segments assign real ids starting at some `min >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct DocId(pub u32);

impl DocId {
    pub const INVALID: DocId = DocId(0);
    pub const EOF: DocId = DocId(u32::MAX);

    pub fn is_eof(self) -> bool {
        self == DocId::EOF
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opt-in per-field capability, with the invariants `payload => position`,
/// `offset => position`, `position => freq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Features {
    pub freq: bool,
    pub position: bool,
    pub payload: bool,
    pub offset: bool,
}

impl Features {
    pub const NONE: Features = Features {
        freq: false,
        position: false,
        payload: false,
        offset: false,
    };

    pub fn docs_only() -> Features {
        Features::NONE
    }
    pub fn with_freq() -> Features {
        Features {
            freq: true,
            ..Features::NONE
        }
    }
    pub fn with_positions() -> Features {
        Features {
            freq: true,
            position: true,
            ..Features::NONE
        }
    }
    pub fn with_offsets() -> Features {
        Features {
            freq: true,
            position: true,
            offset: true,
            ..Features::NONE
        }
    }
    pub fn with_payloads() -> Features {
        Features {
            freq: true,
            position: true,
            payload: true,
            ..Features::NONE
        }
    }
    pub fn with_offsets_and_payloads() -> Features {
        Features {
            freq: true,
            position: true,
            offset: true,
            payload: true,
        }
    }

    /// Checks the invariants from spec.md §3; used at field-meta write time
    /// so a malformed schema never reaches disk.
    pub fn is_valid(&self) -> bool {
        if self.payload && !self.position {
            return false;
        }
        if self.offset && !self.position {
            return false;
        }
        if self.position && !self.freq {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn features_invariants() {
        assert!(Features::NONE.is_valid());
        assert!(Features::with_freq().is_valid());
        assert!(Features::with_positions().is_valid());
        assert!(Features::with_offsets().is_valid());
        assert!(Features::with_payloads().is_valid());
        assert!(Features::with_offsets_and_payloads().is_valid());

        let bad_payload = Features {
            payload: true,
            ..Features::NONE
        };
        assert!(!bad_payload.is_valid());

        let bad_offset = Features {
            offset: true,
            ..Features::NONE
        };
        assert!(!bad_offset.is_valid());

        let bad_position = Features {
            position: true,
            ..Features::NONE
        };
        assert!(!bad_position.is_valid());
    }

    #[test]
    fn doc_id_eof_sentinel() {
        assert!(DocId::EOF.is_eof());
        assert!(!DocId(1).is_eof());
        assert_eq!(DocId::INVALID.0, 0);
    }
}

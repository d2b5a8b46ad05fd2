//! Consumes a term's postings and emits them across the four parallel
//! streams, flushing the doc/freq stream in fixed-size bit-packed blocks
//! and the position/payload/offset data as a single continuous per-term
//! log. Grounded on `mem/flush.rs::flush_postings`'s per-128-doc block
//! loop, replaced here with true block packing via [`crate::codec::packed`]
//! instead of `stream_vbyte`, plus the skip-entry recording spec.md §4.2
//! describes.
//!
//! Simplification (recorded in DESIGN.md): positions/payloads/offsets are
//! not independently block-flushed the way the doc stream is — they are
//! written eagerly as each doc is consumed, so a skip entry's `pos_ptr`/
//! `pay_ptr` already point exactly at the next unwritten position/payload;
//! `pos_pending`/`pay_buf_pos` are therefore always `0` in this writer
//! rather than tracking a separate unflushed buffer.
use crate::codec::meta::write_header;
use crate::codec::packed::pack_block;
use crate::codec::postings::term_meta::TermMeta;
use crate::codec::skiplist::{SkipEntry, SkipWriter};
use crate::codec::{
    Features, BLOCK_SIZE, FORMAT_VERSION, POSTINGS_DOCUMENTS_FORMAT, POSTINGS_PAYLOADS_FORMAT,
    POSTINGS_POSITIONS_FORMAT,
};
use crate::io_helper::{CountingWriter, DataOutputStream};
use crate::Error;
use std::io::Write;

/// One position within a posting, only the fields its feature set uses.
#[derive(Debug, Clone, Default)]
pub struct PositionEntry {
    pub position: u32,
    pub payload: Option<Vec<u8>>,
    pub start_offset: u32,
    pub end_offset: u32,
}

/// One term's full posting list, doc-ascending, handed to the writer in
/// one call (spec.md's streaming `doc_iter` collapsed to a slice — the
/// in-memory indexer upstream already holds the whole list per term).
#[derive(Debug, Clone)]
pub struct PostingEntry {
    pub doc: u32,
    pub freq: u32,
    pub positions: Vec<PositionEntry>,
}

pub struct PostingsWriter<W: Write> {
    features: Features,
    doc_out: CountingWriter<W>,
    pos_out: CountingWriter<W>,
    pay_out: CountingWriter<W>,
}

impl<W: Write> PostingsWriter<W> {
    /// Opens all three streams, writing each one's format header up front
    /// (mirroring `columnstore.rs`/`storedfields.rs`'s `prepare`). The doc
    /// stream's header also carries the codec's `BLOCK_SIZE`, since its
    /// fixed-width blocks only decode correctly if writer and reader agree
    /// on that constant.
    pub fn prepare(features: Features, doc_out: W, pos_out: W, pay_out: W) -> std::io::Result<Self> {
        let mut doc_out = CountingWriter::new(doc_out);
        write_header(&mut doc_out, POSTINGS_DOCUMENTS_FORMAT, FORMAT_VERSION)?;
        doc_out.write_u32(BLOCK_SIZE as u32)?;

        let mut pos_out = CountingWriter::new(pos_out);
        write_header(&mut pos_out, POSTINGS_POSITIONS_FORMAT, FORMAT_VERSION)?;

        let mut pay_out = CountingWriter::new(pay_out);
        write_header(&mut pay_out, POSTINGS_PAYLOADS_FORMAT, FORMAT_VERSION)?;

        Ok(Self {
            features,
            doc_out,
            pos_out,
            pay_out,
        })
    }

    /// Writes one term's postings; `postings` must be non-empty and
    /// strictly doc-ascending.
    pub fn write_term(&mut self, postings: &[PostingEntry]) -> Result<TermMeta, Error> {
        let docs_count = postings.len() as u32;
        let mut meta = TermMeta {
            docs_count,
            total_term_freq: postings.iter().map(|p| p.freq as u64).sum(),
            ..TermMeta::default()
        };

        if self.features.position {
            meta.pos_start = self.pos_out.tell();
        }
        if self.features.payload {
            meta.pay_start = self.pay_out.tell();
        }

        if docs_count == 1 {
            meta.e_single_doc = postings[0].doc;
            self.write_positions(&postings[0].positions)?;
            if self.features.position {
                meta.pos_end = self.pos_out.tell();
            }
            return Ok(meta);
        }

        meta.doc_start = self.doc_out.tell();

        let mut doc_deltas = Vec::with_capacity(BLOCK_SIZE);
        let mut freqs = Vec::with_capacity(BLOCK_SIZE);
        let mut skip = SkipWriter::new(self.features);
        let mut prev_doc = 0u32;

        for (i, p) in postings.iter().enumerate() {
            if i > 0 && p.doc <= prev_doc {
                return Err(Error::NonMonotoneDocId {
                    prev: prev_doc,
                    next: p.doc,
                });
            }
            doc_deltas.push(p.doc - prev_doc);
            if self.features.freq {
                freqs.push(p.freq);
            }
            prev_doc = p.doc;

            self.write_positions(&p.positions)?;

            if doc_deltas.len() == BLOCK_SIZE {
                pack_block(&mut self.doc_out, &doc_deltas)?;
                if self.features.freq {
                    pack_block(&mut self.doc_out, &freqs)?;
                }
                skip.record(SkipEntry {
                    doc: p.doc,
                    doc_ptr: self.doc_out.tell(),
                    pos_pending: 0,
                    pos_ptr: self.pos_out.tell(),
                    pay_buf_pos: 0,
                    pay_ptr: self.pay_out.tell(),
                });
                doc_deltas.clear();
                freqs.clear();
            }
        }

        for i in 0..doc_deltas.len() {
            let delta = doc_deltas[i];
            if self.features.freq {
                let freq = freqs[i];
                self.doc_out
                    .write_vint((delta << 1) | u32::from(freq == 1))?;
                if freq != 1 {
                    self.doc_out.write_vint(freq)?;
                }
            } else {
                self.doc_out.write_vint(delta)?;
            }
        }

        if docs_count as usize > BLOCK_SIZE && !skip.is_empty() {
            meta.e_skip_start = self.doc_out.tell();
            skip.flush(&mut self.doc_out)?;
        }

        if self.features.position {
            meta.pos_end = self.pos_out.tell();
        }
        Ok(meta)
    }

    fn write_positions(&mut self, positions: &[PositionEntry]) -> std::io::Result<()> {
        if !self.features.position {
            return Ok(());
        }
        let mut prev_position = 0u32;
        let mut prev_end_offset = 0u32;
        for pos in positions {
            self.pos_out.write_vint(pos.position - prev_position)?;
            prev_position = pos.position;
            if self.features.payload {
                let bytes = pos.payload.as_deref().unwrap_or(&[]);
                self.pos_out.write_vint(bytes.len() as u32)?;
                self.pay_out.write_all(bytes)?;
            }
            if self.features.offset {
                self.pos_out
                    .write_vint(pos.start_offset - prev_end_offset)?;
                self.pos_out.write_vint(pos.end_offset - pos.start_offset)?;
                prev_end_offset = pos.end_offset;
            }
        }
        Ok(())
    }

    pub fn into_inner(self) -> (W, W, W) {
        (
            self.doc_out.into_inner(),
            self.pos_out.into_inner(),
            self.pay_out.into_inner(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs_only(ids: &[u32]) -> Vec<PostingEntry> {
        ids.iter()
            .map(|&d| PostingEntry {
                doc: d,
                freq: 1,
                positions: Vec::new(),
            })
            .collect()
    }

    #[test]
    fn single_doc_term() {
        let mut w = PostingsWriter::prepare(
            Features::with_positions(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        )
        .unwrap();
        let postings = vec![PostingEntry {
            doc: 7,
            freq: 3,
            positions: vec![0, 5, 9]
                .into_iter()
                .map(|position| PositionEntry {
                    position,
                    ..PositionEntry::default()
                })
                .collect(),
        }];
        let meta = w.write_term(&postings).unwrap();
        assert_eq!(meta.docs_count, 1);
        assert_eq!(meta.e_single_doc, 7);
        assert_eq!(meta.total_term_freq, 3);
    }

    #[test]
    fn block_boundary_129_docs_has_skip_list() {
        let mut w =
            PostingsWriter::prepare(Features::docs_only(), Vec::new(), Vec::new(), Vec::new())
                .unwrap();
        let ids: Vec<u32> = (1..=129).collect();
        let meta = w.write_term(&docs_only(&ids)).unwrap();
        assert_eq!(meta.docs_count, 129);
        assert!(meta.e_skip_start > 0);
    }

    #[test]
    fn rejects_non_monotone_doc_ids() {
        let mut w =
            PostingsWriter::prepare(Features::docs_only(), Vec::new(), Vec::new(), Vec::new())
                .unwrap();
        let postings = docs_only(&[5, 3]);
        assert!(w.write_term(&postings).is_err());
    }

    #[test]
    fn small_term_has_no_skip_list() {
        let mut w =
            PostingsWriter::prepare(Features::docs_only(), Vec::new(), Vec::new(), Vec::new())
                .unwrap();
        let ids: Vec<u32> = (1..=50).collect();
        let meta = w.write_term(&docs_only(&ids)).unwrap();
        assert_eq!(meta.e_skip_start, 0);
    }
}

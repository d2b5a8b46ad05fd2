//! Per-term metadata, the small record the term dictionary stores to let
//! postings-stream seeks resume without scanning. Grounded on
//! `original_source/core/formats/formats_10.cpp`'s per-term attribute
//! struct, flattened here into one plain struct (spec.md §9: attribute
//! bags become typed fields) and encoded as deltas against the previously
//! written term the way the teacher's `galago_btree.rs` writes deltas
//! between consecutive dictionary keys.
use crate::io_helper::{DataInputStream, DataOutputStream, InputStream};
use crate::Error;
use std::io::Write;

/// One term's postings-stream bookkeeping. `pos_start`/`pay_start` and
/// `pos_end` are only meaningful when the field carries positions;
/// `e_skip_start` only when `docs_count > BLOCK_SIZE`; `e_single_doc` only
/// when `docs_count == 1` (in which case no doc stream is used at all).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermMeta {
    pub docs_count: u32,
    pub total_term_freq: u64,
    pub doc_start: u64,
    pub pos_start: u64,
    pub pay_start: u64,
    pub pos_end: u64,
    pub e_skip_start: u64,
    pub e_single_doc: u32,
}

/// Encodes `meta` as deltas against `last`, matching
/// `encode`'s contract: the writer resets `last` to default at the start
/// of every new term-dictionary block.
pub fn encode<W: Write>(out: &mut W, meta: &TermMeta, last: &TermMeta) -> std::io::Result<()> {
    out.write_vint(meta.docs_count)?;
    out.write_vlong(meta.total_term_freq)?;
    if meta.docs_count == 1 {
        out.write_vint(meta.e_single_doc)?;
        return Ok(());
    }
    out.write_zigzag_vlong(meta.doc_start as i64 - last.doc_start as i64)?;
    if meta.pos_start != 0 || last.pos_start != 0 {
        out.write_zigzag_vlong(meta.pos_start as i64 - last.pos_start as i64)?;
        out.write_zigzag_vlong(meta.pos_end as i64 - last.pos_end as i64)?;
    }
    if meta.pay_start != 0 || last.pay_start != 0 {
        out.write_zigzag_vlong(meta.pay_start as i64 - last.pay_start as i64)?;
    }
    if meta.docs_count as usize > crate::codec::BLOCK_SIZE {
        out.write_vlong(meta.e_skip_start)?;
    }
    Ok(())
}

/// Inverse of [`encode`]; `features` tells the decoder which optional
/// fields were written (the same `Features` the field-meta recorded).
pub fn decode<S: InputStream>(
    src: &mut S,
    last: &TermMeta,
    features: crate::codec::Features,
) -> Result<TermMeta, Error> {
    let docs_count = src.read_vint()?;
    let total_term_freq = src.read_vlong()?;
    if docs_count == 1 {
        let e_single_doc = src.read_vint()?;
        return Ok(TermMeta {
            docs_count,
            total_term_freq,
            e_single_doc,
            ..TermMeta::default()
        });
    }
    let doc_start = (last.doc_start as i64 + src.read_zigzag_vlong()?) as u64;
    let (pos_start, pos_end) = if features.position {
        (
            (last.pos_start as i64 + src.read_zigzag_vlong()?) as u64,
            (last.pos_end as i64 + src.read_zigzag_vlong()?) as u64,
        )
    } else {
        (0, 0)
    };
    let pay_start = if features.payload {
        (last.pay_start as i64 + src.read_zigzag_vlong()?) as u64
    } else {
        0
    };
    let e_skip_start = if docs_count as usize > crate::codec::BLOCK_SIZE {
        src.read_vlong()?
    } else {
        0
    };
    Ok(TermMeta {
        docs_count,
        total_term_freq,
        doc_start,
        pos_start,
        pay_start,
        pos_end,
        e_skip_start,
        e_single_doc: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Features;
    use crate::io_helper::SliceInputStream;

    #[test]
    fn single_doc_term_round_trips() {
        let meta = TermMeta {
            docs_count: 1,
            total_term_freq: 3,
            e_single_doc: 7,
            ..TermMeta::default()
        };
        let mut buf = Vec::new();
        encode(&mut buf, &meta, &TermMeta::default()).unwrap();
        let mut rdr = SliceInputStream::new(&buf);
        let back = decode(&mut rdr, &TermMeta::default(), Features::with_positions()).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn deltas_chain_across_consecutive_terms() {
        let first = TermMeta {
            docs_count: 300,
            total_term_freq: 300,
            doc_start: 1000,
            pos_start: 2000,
            pos_end: 2100,
            e_skip_start: 1500,
            ..TermMeta::default()
        };
        let second = TermMeta {
            docs_count: 5,
            total_term_freq: 5,
            doc_start: 1200,
            pos_start: 2300,
            pos_end: 2310,
            ..TermMeta::default()
        };
        let mut buf = Vec::new();
        encode(&mut buf, &first, &TermMeta::default()).unwrap();
        encode(&mut buf, &second, &first).unwrap();

        let mut rdr = SliceInputStream::new(&buf);
        let back_first = decode(&mut rdr, &TermMeta::default(), Features::with_positions()).unwrap();
        assert_eq!(back_first, first);
        let back_second = decode(&mut rdr, &back_first, Features::with_positions()).unwrap();
        assert_eq!(back_second, second);
    }
}

//! Multi-level skip index over a term's doc stream. Grounded on
//! `original_source/core/formats/formats_10.cpp`'s `skip_state` (the set of
//! stream pointers one skip entry carries) and generalized into an
//! explicit writer/reader pair instead of the inheritance-based
//! `skip_writer`/`skip_reader` the original builds on top of a generic
//! multi-level skip base class (see spec.md §9's redesign guidance).
use crate::codec::{Features, MAX_SKIP_LEVELS, SKIP_N};
use crate::io_helper::{DataInputStream, DataOutputStream, InputStream};
use std::io::Write;

/// One skip point. Fields gated by `position`/`payload` in the writer's
/// feature set are always present here (zeroed when absent) so the reader
/// doesn't need a separate struct per feature combination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipEntry {
    pub doc: u32,
    pub doc_ptr: u64,
    pub pos_pending: u32,
    pub pos_ptr: u64,
    pub pay_buf_pos: u32,
    pub pay_ptr: u64,
}

/// Accumulates skip entries as the postings writer flushes blocks, one
/// `record` call per flushed block. Level 0 gets one entry per block;
/// level `L` gets one entry per `SKIP_N^L` blocks.
pub struct SkipWriter {
    features: Features,
    levels: Vec<Vec<SkipEntry>>,
    level0_count: u64,
}

impl SkipWriter {
    pub fn new(features: Features) -> Self {
        Self {
            features,
            levels: vec![Vec::new()],
            level0_count: 0,
        }
    }

    pub fn record(&mut self, entry: SkipEntry) {
        self.levels[0].push(entry);
        self.level0_count += 1;

        let mut n = self.level0_count;
        let mut level = 0;
        while level + 1 < MAX_SKIP_LEVELS && n % SKIP_N as u64 == 0 {
            n /= SKIP_N as u64;
            level += 1;
            if self.levels.len() == level {
                self.levels.push(Vec::new());
            }
            self.levels[level].push(entry);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.level0_count == 0
    }

    /// Writes the highest level first, each level delta-encoded against
    /// its own previous entry. Returns nothing — the caller already
    /// recorded the start offset before calling this.
    pub fn flush<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_vint(self.levels.len() as u32)?;
        for level in self.levels.iter().rev() {
            out.write_vint(level.len() as u32)?;
            let mut prev = SkipEntry::default();
            for e in level {
                out.write_vint(e.doc - prev.doc)?;
                out.write_vlong(e.doc_ptr - prev.doc_ptr)?;
                if self.features.position {
                    out.write_vint(e.pos_pending)?;
                    out.write_vlong(e.pos_ptr - prev.pos_ptr)?;
                }
                if self.features.payload {
                    out.write_vint(e.pay_buf_pos)?;
                    out.write_vlong(e.pay_ptr - prev.pay_ptr)?;
                }
                prev = *e;
            }
        }
        Ok(())
    }
}

/// A skip list loaded back into memory; small enough per term that
/// reading it eagerly (rather than streaming level-by-level) keeps
/// `skip_to` simple.
pub struct SkipReader {
    /// `levels[0]` is the finest level, matching [`SkipWriter`]'s indexing.
    levels: Vec<Vec<SkipEntry>>,
}

impl SkipReader {
    pub fn load<S: InputStream>(src: &mut S, features: Features) -> Result<Self, crate::Error> {
        let level_count = src.read_vint()? as usize;
        let mut top_down = Vec::with_capacity(level_count);
        for _ in 0..level_count {
            let n = src.read_vint()? as usize;
            let mut level = Vec::with_capacity(n);
            let mut prev = SkipEntry::default();
            for _ in 0..n {
                let doc = prev.doc + src.read_vint()?;
                let doc_ptr = prev.doc_ptr + src.read_vlong()?;
                let (pos_pending, pos_ptr) = if features.position {
                    (src.read_vint()?, prev.pos_ptr + src.read_vlong()?)
                } else {
                    (0, 0)
                };
                let (pay_buf_pos, pay_ptr) = if features.payload {
                    (src.read_vint()?, prev.pay_ptr + src.read_vlong()?)
                } else {
                    (0, 0)
                };
                let entry = SkipEntry {
                    doc,
                    doc_ptr,
                    pos_pending,
                    pos_ptr,
                    pay_buf_pos,
                    pay_ptr,
                };
                level.push(entry);
                prev = entry;
            }
            top_down.push(level);
        }
        top_down.reverse();
        Ok(Self { levels: top_down })
    }

    /// Descends from the coarsest level to the finest, at each step
    /// advancing as far as possible without passing `target`. Returns the
    /// furthest entry at or before `target` together with the count of
    /// `BLOCK_SIZE`-sized blocks it represents (the new `cur_pos_` for the
    /// doc iterator), or `None` if even the first level-0 entry exceeds
    /// `target`.
    pub fn skip_to(&self, target: u32) -> Option<(SkipEntry, u64)> {
        let mut best: Option<SkipEntry> = None;
        let mut covered: u64 = 0;
        for level in (0..self.levels.len()).rev() {
            let step = (SKIP_N as u64).pow(level as u32);
            let entries = &self.levels[level];
            let mut idx = (covered / step) as usize;
            while idx < entries.len() && entries[idx].doc <= target {
                idx += 1;
            }
            if idx > 0 {
                best = Some(entries[idx - 1]);
                covered = idx as u64 * step;
            }
        }
        best.map(|entry| (entry, covered * crate::codec::BLOCK_SIZE as u64))
    }
}

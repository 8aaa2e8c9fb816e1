//! The read-one-write-one GCNO -> GCDA pass, mirroring `gcov_process_file`
//! and `gcov_process_func` in the original tool: stream the notes file
//! record by record, copy most records through unchanged, and replace each
//! function's trailing counters with ones derived from the matching
//! symbol's `cov_ent` array.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

use tracing::{info, warn};

use etrace_elf::SymbolStore;

use crate::error::{CovError, Result};
use crate::gcov::ir::{self, RecordIr};
use crate::gcov::wire::{
    FileHeader, RecordHeader, Summary, GCOV_ARC_ON_TREE, GCOV_DATA_MAGIC, GCOV_NOTE_MAGIC,
    GCOV_TAG_ARCS, GCOV_TAG_BLOCKS, GCOV_TAG_COUNTER_BASE, GCOV_TAG_EOF, GCOV_TAG_FUNCTION,
    GCOV_TAG_LINES, GCOV_TAG_OBJECT_SUMMARY, GCOV_TAG_PROGRAM_SUMMARY, GCOV_VERSION_CFG_CSUM,
    GCOV_VERSION_FUNC_EXTRA_WORD,
};
use crate::pathmap::map_source_filename;

/// Tracks which `.gcda` files this run has already produced. The original
/// deliberately overwrites rather than merges counters across runs (§1
/// Non-goals); once a source file's data has been written, later symbols
/// that happen to map into the same file are not reprocessed.
#[derive(Debug, Default)]
pub struct GcovSession {
    produced: HashSet<PathBuf>,
}

impl GcovSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walks every distinct source file any symbol in `store` attributes to,
    /// and reproduces that file's `.gcda` from its paired `.gcno`, applying
    /// `strip`/`prefix` the same way `--gcov-strip`/`--gcov-prefix` do for
    /// the QCOV emitter's source lookup.
    pub fn emit_all(&mut self, store: &SymbolStore, strip: Option<&str>, prefix: Option<&str>) -> Result<()> {
        let mut seen = HashSet::new();
        for sym in store.iter() {
            let Some(src) = &sym.src_filename else { continue };
            if !seen.insert(src.to_string()) {
                continue;
            }
            self.emit_one(src, store, strip, prefix)?;
        }
        Ok(())
    }

    fn emit_one(&mut self, src_filename: &str, store: &SymbolStore, strip: Option<&str>, prefix: Option<&str>) -> Result<()> {
        let Some(notes_path) = map_source_filename(src_filename, strip, prefix, true, ".gcno") else {
            warn!(file = src_filename, "gcno path could not be derived (strip prefix doesn't match)");
            return Ok(());
        };
        let Some(data_path) = map_source_filename(src_filename, strip, prefix, true, ".gcda") else {
            return Ok(());
        };
        let data_path = PathBuf::from(data_path);
        if self.produced.contains(&data_path) {
            return Ok(());
        }

        let notes_path = PathBuf::from(notes_path);
        let Ok(notes) = fs::read(&notes_path) else {
            warn!(file = %notes_path.display(), "no .gcno notes found, skipping gcov output for this file");
            return Ok(());
        };

        info!(notes = %notes_path.display(), data = %data_path.display(), "reproducing gcda");
        let bytes = transform_bytes(&notes, store)?;
        fs::write(&data_path, bytes)?;
        self.produced.insert(data_path);
        Ok(())
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_record_header(&mut self) -> Option<RecordHeader> {
        let h = RecordHeader::from_bytes(&self.data[self.pos..])?;
        self.pos += RecordHeader::SIZE;
        Some(h)
    }

    fn read_words(&mut self, n_words: usize) -> Result<Vec<u32>> {
        let nbytes = n_words * 4;
        if self.remaining() < nbytes {
            return Err(CovError::MalformedRecord("truncated record body".into()));
        }
        let words = self.data[self.pos..self.pos + nbytes]
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        self.pos += nbytes;
        Ok(words)
    }
}

fn write_record_words(tag: u32, words: &[u32], out: &mut Vec<u8>) {
    out.extend_from_slice(&RecordHeader { tag, length: words.len() as u32 }.to_bytes());
    for w in words {
        out.extend_from_slice(&w.to_ne_bytes());
    }
}

fn write_record_bytes(tag: u32, bytes: &[u8], out: &mut Vec<u8>) {
    debug_assert_eq!(bytes.len() % 4, 0);
    out.extend_from_slice(&RecordHeader { tag, length: (bytes.len() / 4) as u32 }.to_bytes());
    out.extend_from_slice(bytes);
}

/// Transforms one `.gcno` byte stream into its `.gcda` counterpart.
fn transform_bytes(notes: &[u8], store: &SymbolStore) -> Result<Vec<u8>> {
    let hdr = FileHeader::from_bytes(notes)
        .ok_or_else(|| CovError::MalformedRecord("truncated gcno header".into()))?;
    if hdr.magic != GCOV_NOTE_MAGIC {
        return Err(CovError::MalformedRecord(format!("bad gcno magic {:#x}", hdr.magic)));
    }

    let mut out = Vec::new();
    out.extend_from_slice(
        &FileHeader {
            magic: GCOV_DATA_MAGIC,
            version: hdr.version,
            stamp: hdr.stamp,
        }
        .to_bytes(),
    );

    let mut r = Reader { data: notes, pos: FileHeader::SIZE };
    let mut cur: Option<RecordIr> = None;

    while let Some(rh) = r.read_record_header() {
        if rh.tag == GCOV_TAG_EOF && rh.length == 0 {
            break;
        }
        let words = r.read_words(rh.length as usize)?;

        match rh.tag {
            GCOV_TAG_FUNCTION => {
                if let Some(prev) = cur.take() {
                    flush_function(&prev, store, &mut out);
                }
                let func = ir::parse_func_record(&words, hdr.version)?;
                write_function_record(&func, hdr.version, &mut out);
                cur = Some(RecordIr { func, ..Default::default() });
            }
            GCOV_TAG_BLOCKS => {
                if let Some(ir) = cur.as_mut() {
                    ir.blocks = ir::parse_block_record(&words);
                }
                write_record_words(rh.tag, &words, &mut out);
            }
            GCOV_TAG_ARCS => {
                let arcs = ir::parse_arcs_record(&words)?;
                if let Some(ir) = cur.as_mut() {
                    ir.arcs.push(arcs);
                }
                write_record_words(rh.tag, &words, &mut out);
            }
            GCOV_TAG_LINES => {
                let lines = ir::parse_lines_record(&words)?;
                if let Some(ir) = cur.as_mut() {
                    ir.lines.push(lines);
                }
                write_record_words(rh.tag, &words, &mut out);
            }
            GCOV_TAG_OBJECT_SUMMARY | GCOV_TAG_PROGRAM_SUMMARY => {
                // Parsed so a malformed summary record still surfaces as an
                // error, then discarded: the data file gets the fabricated
                // single-run summaries below instead of these passed through.
                let _ = ir::parse_summary(&words);
            }
            other => write_record_words(other, &words, &mut out),
        }
    }

    if let Some(prev) = cur.take() {
        flush_function(&prev, store, &mut out);
    }

    write_record_bytes(GCOV_TAG_OBJECT_SUMMARY, &Summary::single_run().to_bytes(), &mut out);
    write_record_bytes(GCOV_TAG_PROGRAM_SUMMARY, &Summary::single_run().to_bytes(), &mut out);
    write_record_words(GCOV_TAG_EOF, &[], &mut out);

    Ok(out)
}

fn write_function_record(func: &ir::Function, version: u32, out: &mut Vec<u8>) {
    let mut words = vec![func.ident, func.csum];
    if version >= GCOV_VERSION_CFG_CSUM {
        words.push(func.cfg_csum);
    }
    if version >= GCOV_VERSION_FUNC_EXTRA_WORD {
        // Newer gcc versions carry one more word here (a line-checksum);
        // nothing in the notes stream lets this rewrite derive it, so the
        // slot is kept present but zero.
        words.push(0);
    }
    write_record_words(GCOV_TAG_FUNCTION, &words, out);
}

/// Emits this function's `COUNTER_BASE` record: one 64-bit counter per
/// non-tree arc, populated from the matching symbol's `cov_ent` by walking
/// every instruction word's source location and matching it against the
/// `LINES` records' `(filename, lineno)` pairs.
fn flush_function(rec: &RecordIr, store: &SymbolStore, out: &mut Vec<u8>) {
    // Every non-tree arc gets its own counter slot (`nr_counts` is the total
    // arc count, not the number of distinct blocks); a block's slot is the
    // first such arc recorded against it, since this reconstruction has no
    // real per-arc execution data to disambiguate further.
    let mut counter_idx_for_block: HashMap<u32, usize> = HashMap::new();
    let mut nr_counts = 0usize;
    for arcs in &rec.arcs {
        for arc in &arcs.arcs {
            if arc.flags & GCOV_ARC_ON_TREE == 0 {
                counter_idx_for_block.entry(arcs.block_no).or_insert(nr_counts);
                nr_counts += 1;
            }
        }
    }
    let mut counts = vec![0u64; nr_counts];

    if let Some(sym_ref) = store.lookup_by_name(&rec.func.name) {
        let sym = store.get(sym_ref);
        if let (Some(linemap), Some(cov_ent)) = (sym.linemap.as_ref(), sym.cov_ent.as_ref()) {
            let mut assigned: HashSet<usize> = HashSet::new();
            for (off, locs) in linemap.iter().enumerate() {
                let Some(loc) = locs.iter().find(|l| !l.inlined).or_else(|| locs.first()) else {
                    continue;
                };
                let Some(block_no) = find_block(&rec.lines, &loc.filename, loc.linenr, off == 0) else {
                    continue;
                };
                let Some(&idx) = counter_idx_for_block.get(&block_no) else {
                    continue;
                };
                if assigned.insert(idx) {
                    counts[idx] = cov_ent.get(off).copied().unwrap_or(0);
                }
            }

            // GCC's prologue convention: block 1's counter is the function's
            // entry count, i.e. word 0's `cov_ent`. Force it unconditionally
            // even if block matching assigned slot 0 to something else —
            // this mirrors `gcov_process_func`'s trailing `counts[0] = v`
            // (see REDESIGN FLAGS), not a bug.
            if nr_counts > 0 {
                counts[0] = cov_ent.first().copied().unwrap_or(0);
            }
        }
    }

    let mut payload = Vec::with_capacity(counts.len() * 8);
    for c in &counts {
        payload.extend_from_slice(&(*c as u32).to_ne_bytes());
        payload.extend_from_slice(&((*c >> 32) as u32).to_ne_bytes());
    }
    write_record_bytes(GCOV_TAG_COUNTER_BASE, &payload, out);
}

/// Finds the block whose `LINES` record claims `(filename, lineno)`,
/// tolerating a stripped (basename-only) filename and, for word 0 only, a
/// block-1 entry at `lineno + 1` (the prologue sits one line before the
/// first real statement in GCC's block numbering).
fn find_block(lines: &[ir::Lines], filename: &str, lineno: u32, is_word_zero: bool) -> Option<u32> {
    let stripped = filename.rsplit('/').next().unwrap_or(filename);
    for rec in lines {
        for entry in &rec.lines {
            let Some(ef) = entry.filename.as_deref() else { continue };
            let ef_stripped = ef.rsplit('/').next().unwrap_or(ef);
            if ef != filename && ef_stripped != stripped {
                continue;
            }
            if entry.lineno == lineno {
                return Some(rec.block_no);
            }
            if is_word_zero && rec.block_no == 1 && entry.lineno == lineno + 1 {
                return Some(rec.block_no);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use etrace_elf::SrcLoc;
    use std::path::PathBuf as Pb;
    use std::rc::Rc;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_ne_bytes()).collect()
    }

    fn string_words(s: &str) -> Vec<u32> {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
        let nwords = (bytes.len() / 4) as u32;
        let mut out = vec![nwords];
        out.extend(bytes.chunks_exact(4).map(|c| u32::from_ne_bytes(c.try_into().unwrap())));
        out
    }

    /// Builds a minimal single-function GCNO stream: one FUNCTION record (no
    /// cfg_csum, version below the gate), one BLOCKS record (2 blocks), one
    /// ARCS record for block 0 with 3 non-tree arcs, and one LINES record
    /// mapping block 1 to `a.c:42`.
    fn sample_gcno() -> Vec<u8> {
        let version = 0x3430_3000; // below both version gates
        let mut out = Vec::new();
        out.extend_from_slice(
            &FileHeader { magic: GCOV_NOTE_MAGIC, version, stamp: 7 }.to_bytes(),
        );

        let mut func_words = vec![1u32, 0xaaaa_u32];
        func_words.extend(string_words("bar"));
        func_words.extend(string_words("a.c"));
        func_words.push(40);
        write_record_words(GCOV_TAG_FUNCTION, &func_words, &mut out);

        write_record_words(GCOV_TAG_BLOCKS, &[0, 0], &mut out);

        // ARCS for block 0: three arcs, none ON_TREE.
        write_record_words(GCOV_TAG_ARCS, &[0, 1, 0, 2, 0, 3, 0], &mut out);

        // LINES for block 1: one entry at a.c:42.
        let mut lines_words = vec![1u32];
        lines_words.push(0); // lineno=0 marks a filename-change marker
        lines_words.extend(string_words("a.c"));
        lines_words.push(42);
        lines_words.push(0);
        lines_words.push(0); // empty-name terminator
        write_record_words(GCOV_TAG_LINES, &lines_words, &mut out);

        write_record_words(GCOV_TAG_EOF, &[], &mut out);
        out
    }

    fn store_with_bar() -> SymbolStore {
        let nm = b"0000000000002000 0000000000000004 T bar\n";
        let mut store = SymbolStore::from_nm_output(nm, &Pb::from("t.elf")).unwrap();
        let r = store.lookup_by_addr(0x2000).unwrap();
        {
            let sym = store.get_mut(r);
            sym.src_filename = Some(Rc::from("a.c"));
            sym.linemap_mut()[0].push(SrcLoc { filename: Rc::from("a.c"), linenr: 42, inlined: false });
        }
        store.get_mut(r).update_cov(0x2000, 0x2004, 7);
        store
    }

    #[test]
    fn header_magic_is_replaced_and_version_preserved() {
        let notes = sample_gcno();
        let store = store_with_bar();
        let out = transform_bytes(&notes, &store).unwrap();
        let hdr = FileHeader::from_bytes(&out).unwrap();
        assert_eq!(hdr.magic, GCOV_DATA_MAGIC);
        let notes_hdr = FileHeader::from_bytes(&notes).unwrap();
        assert_eq!(hdr.version, notes_hdr.version);
        assert_eq!(hdr.stamp, notes_hdr.stamp);
    }

    #[test]
    fn counter_record_has_three_counts_with_block_one_assigned() {
        let notes = sample_gcno();
        let store = store_with_bar();
        let out = transform_bytes(&notes, &store).unwrap();

        // Walk records looking for COUNTER_BASE.
        let mut r = Reader { data: &out, pos: FileHeader::SIZE };
        let mut found = None;
        while let Some(rh) = r.read_record_header() {
            if rh.tag == GCOV_TAG_EOF && rh.length == 0 {
                break;
            }
            let words = r.read_words(rh.length as usize).unwrap();
            if rh.tag == GCOV_TAG_COUNTER_BASE {
                found = Some(words);
                break;
            }
        }
        let words = found.expect("counter record present");
        assert_eq!(words.len(), 6); // 3 counts * 2 words each
        let count0 = u64::from(words[0]) | (u64::from(words[1]) << 32);
        assert_eq!(count0, 7);
    }

    #[test]
    fn trailing_summaries_and_eof_are_well_formed() {
        let notes = sample_gcno();
        let store = store_with_bar();
        let out = transform_bytes(&notes, &store).unwrap();
        assert_eq!(&out[out.len() - RecordHeader::SIZE..], &[0u8; RecordHeader::SIZE]);
    }

    #[test]
    fn write_record_bytes_roundtrips_with_words() {
        let mut out = Vec::new();
        write_record_bytes(GCOV_TAG_COUNTER_BASE, &words_to_bytes(&[1, 0, 2, 0]), &mut out);
        let rh = RecordHeader::from_bytes(&out).unwrap();
        assert_eq!(rh.length, 4);
    }
}

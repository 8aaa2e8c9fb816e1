//! Per-source-file line/function accumulator shared by the QCOV and LCOV
//! emitters, mirroring `gcov_process_sym`'s walk over every symbol's
//! linemap.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use etrace_elf::{Sym, SymbolStore};

/// One function's declaration line and entry count, for LCOV's `FN`/`FNDA`
/// records. `decl_line` mirrors `gcov_find_decl_line`: the lowest
/// non-inlined line this symbol maps to within this file.
#[derive(Debug, Clone)]
pub struct FuncEntry {
    pub name: String,
    pub decl_line: u32,
    pub count: u64,
}

/// Accumulated per-line coverage for a single source file, built from
/// however many symbols (or inlined fragments of symbols) map into it.
#[derive(Debug, Clone, Default)]
pub struct FileEntry {
    pub filename: Option<Rc<str>>,
    /// `lines[l-1]` is the accumulated time attributed to source line `l`.
    pub lines: Vec<u64>,
    /// `instr[l-1]` is set once any instruction word maps to source line `l`,
    /// regardless of whether it was ever hit.
    pub instr: Vec<bool>,
    pub funcs: Vec<FuncEntry>,
}

impl FileEntry {
    fn ensure_len(&mut self, l: usize) {
        if l > self.lines.len() {
            self.lines.resize(l, 0);
            self.instr.resize(l, false);
        }
    }

    pub fn nr_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn lines_hit(&self) -> usize {
        self.lines.iter().filter(|&&v| v > 0).count()
    }

    pub fn lines_instrumented(&self) -> usize {
        self.instr.iter().filter(|&&b| b).count()
    }
}

/// Maps distinct source filenames to their accumulated [`FileEntry`].
#[derive(Debug, Default)]
pub struct FileTable {
    files: Vec<FileEntry>,
    index: HashMap<Rc<str>, usize>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walks every symbol in `store`, attributing covered instruction words
    /// to the source line(s) they map to. Mirrors `gcov_process_sym`
    /// walking the symbol table and building one `gcov_file` per distinct
    /// filename.
    pub fn build(store: &SymbolStore) -> Self {
        let mut table = Self::new();
        for sym in store.iter() {
            table.process_sym(sym);
        }
        table
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.iter()
    }

    pub fn get(&self, filename: &str) -> Option<&FileEntry> {
        self.index.get(filename).map(|&i| &self.files[i])
    }

    fn file_mut(&mut self, filename: &Rc<str>) -> &mut FileEntry {
        if let Some(&i) = self.index.get(filename) {
            return &mut self.files[i];
        }
        let i = self.files.len();
        self.files.push(FileEntry {
            filename: Some(Rc::clone(filename)),
            ..Default::default()
        });
        self.index.insert(Rc::clone(filename), i);
        &mut self.files[i]
    }

    fn process_sym(&mut self, sym: &Sym) {
        let Some(linemap) = sym.linemap.as_ref() else {
            return;
        };
        let cov_ent = sym.cov_ent.as_ref();

        // A word can carry more than one location (direct + inlined-from
        // chain); the original attributes the word's count/entry to every
        // file in that chain, not just the direct one.
        let mut decl_lines: HashMap<Rc<str>, u32> = HashMap::new();
        for locs in linemap {
            for loc in locs {
                if loc.inlined {
                    continue;
                }
                decl_lines
                    .entry(Rc::clone(&loc.filename))
                    .and_modify(|l| {
                        if loc.linenr < *l {
                            *l = loc.linenr;
                        }
                    })
                    .or_insert(loc.linenr);
            }
        }

        let call_count = cov_ent.map_or(0, |e| e[0]);
        let mut seen_files: HashSet<Rc<str>> = HashSet::new();

        for (i, locs) in linemap.iter().enumerate() {
            if locs.is_empty() {
                continue;
            }
            // `gcov_process_sym` feeds the entry counter here, not the
            // time-weighted `cov` counter: QCOV/LCOV lines carry execution
            // counts, matching LCOV's `DA:<line>,<count>` definition.
            let v = cov_ent.map_or(0, |e| e[i]);
            let entered = cov_ent.is_some_and(|e| e[i] != 0);

            for loc in locs {
                let l = loc.linenr as usize;
                if l == 0 {
                    continue;
                }

                let file = self.file_mut(&loc.filename);
                file.ensure_len(l);
                if entered {
                    file.instr[l - 1] = true;
                }
                // Faithful to `gcov_process_sym`'s odd accumulation: only
                // add when the new value exceeds what's already on the
                // line, not a plain running sum.
                if v > file.lines[l - 1] {
                    file.lines[l - 1] += v;
                }

                if seen_files.insert(Rc::clone(&loc.filename)) {
                    if let Some(&decl) = decl_lines.get(&loc.filename) {
                        file.funcs.push(FuncEntry {
                            name: sym.name.clone(),
                            decl_line: decl,
                            count: call_count,
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etrace_elf::SrcLoc;
    use std::path::PathBuf;

    #[test]
    fn attributes_covered_words_to_source_lines() {
        let nm = b"0000000000001000 0000000000000010 T main\n";
        let mut store = SymbolStore::from_nm_output(nm, &PathBuf::from("t.elf")).unwrap();
        let r = store.lookup_by_addr(0x1000).unwrap();
        {
            let sym = store.get_mut(r);
            sym.src_filename = Some(Rc::from("main.c"));
            let lm = sym.linemap_mut();
            lm[0].push(SrcLoc {
                filename: Rc::from("main.c"),
                linenr: 10,
                inlined: false,
            });
            lm[1].push(SrcLoc {
                filename: Rc::from("main.c"),
                linenr: 11,
                inlined: false,
            });
        }
        store.get_mut(r).update_cov(0x1000, 0x1008, 20);

        let table = FileTable::build(&store);
        let file = table.get("main.c").unwrap();
        assert_eq!(file.nr_lines(), 11);
        assert!(file.instr[9]);
        assert!(file.instr[10]);
        assert_eq!(file.lines_hit(), 2);
        assert_eq!(file.funcs.len(), 1);
        assert_eq!(file.funcs[0].name, "main");
        assert_eq!(file.funcs[0].decl_line, 10);
    }

    #[test]
    fn inlined_word_attributes_to_both_files() {
        let nm = b"0000000000001000 0000000000000008 T main\n";
        let mut store = SymbolStore::from_nm_output(nm, &PathBuf::from("t.elf")).unwrap();
        let r = store.lookup_by_addr(0x1000).unwrap();
        {
            let sym = store.get_mut(r);
            sym.src_filename = Some(Rc::from("main.c"));
            let lm = sym.linemap_mut();
            lm[0].push(SrcLoc { filename: Rc::from("main.c"), linenr: 5, inlined: false });
            lm[0].push(SrcLoc { filename: Rc::from("helper.h"), linenr: 20, inlined: true });
        }
        store.get_mut(r).update_cov(0x1000, 0x1004, 8);

        let table = FileTable::build(&store);
        assert_eq!(table.get("main.c").unwrap().lines[4], 1);
        assert_eq!(table.get("helper.h").unwrap().lines[19], 1);
    }

    #[test]
    fn symbols_without_linemap_are_skipped() {
        let nm = b"0000000000001000 0000000000000010 T main\n";
        let store = SymbolStore::from_nm_output(nm, &PathBuf::from("t.elf")).unwrap();
        let table = FileTable::build(&store);
        assert_eq!(table.iter().count(), 0);
    }
}

//! LCOV `.info` tracefile emission: `TN`/`SF`/`FN`/`FNDA`/`DA`/`LF`/`LH`/
//! `end_of_record` records, one block per source file. Mirrors
//! `lcov_emit_info`.
//!
//! The original guards each block with
//! `if (!filename_is_likely_header(f->filename) || 1)`, which is always
//! true because of the trailing `|| 1` — headers are never actually
//! excluded. This emitter simply omits that check rather than port a
//! condition that can never be false.

use std::io::Write;

use crate::error::Result;
use crate::exclude::ExcludeFilter;
use crate::file_table::FileTable;

pub fn emit<W: Write>(table: &FileTable, exclude: &ExcludeFilter, out: &mut W) -> Result<()> {
    writeln!(out, "TN:")?;

    for file in table.iter() {
        let Some(filename) = &file.filename else {
            continue;
        };
        if filename.as_ref() == "??" {
            continue;
        }
        if exclude.excludes_file(filename) {
            continue;
        }

        writeln!(out, "SF:{filename}")?;

        for func in &file.funcs {
            writeln!(out, "FN:{},{}", func.decl_line, func.name)?;
            writeln!(out, "FNDA:{},{}", func.count, func.name)?;
        }

        // `LH` mirrors the original literally: it counts instrumented
        // lines, the same condition as `LF`, not lines that were actually
        // hit (`f->lines[i] > 0`). Both counters increment together.
        let mut lines_found = 0u64;
        let mut lines_hit = 0u64;
        for (i, &instrumented) in file.instr.iter().enumerate() {
            if exclude.matches(filename, (i + 1) as i64) {
                continue;
            }
            if instrumented {
                lines_found += 1;
                lines_hit += 1;
                writeln!(out, "DA:{},{}", i + 1, file.lines[i])?;
            }
        }

        writeln!(out, "LF:{lines_found}")?;
        writeln!(out, "LH:{lines_hit}")?;
        writeln!(out, "end_of_record")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use etrace_elf::{SrcLoc, SymbolStore};
    use std::path::PathBuf;
    use std::rc::Rc;

    fn sample_table() -> FileTable {
        let nm = b"0000000000001000 0000000000000008 T main\n";
        let mut store = SymbolStore::from_nm_output(nm, &PathBuf::from("t.elf")).unwrap();
        let r = store.lookup_by_addr(0x1000).unwrap();
        {
            let sym = store.get_mut(r);
            let fname: Rc<str> = Rc::from("main.c");
            let lm = sym.linemap_mut();
            lm[0].push(SrcLoc { filename: Rc::clone(&fname), linenr: 1, inlined: false });
            lm[1].push(SrcLoc { filename: fname, linenr: 2, inlined: false });
        }
        store.get_mut(r).update_cov(0x1000, 0x1004, 3);
        FileTable::build(&store)
    }

    #[test]
    fn emits_one_block_per_file() {
        let table = sample_table();
        let mut buf = Vec::new();
        emit(&table, &ExcludeFilter::empty(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.starts_with("TN:\n"));
        assert!(text.contains("SF:main.c\n"));
        assert!(text.contains("FN:1,main\n"));
        assert!(text.contains("DA:1,1\n"));
        assert!(text.contains("DA:2,0\n"));
        assert!(text.contains("LF:2\n"));
        assert!(text.contains("LH:2\n"));
        assert!(text.contains("end_of_record\n"));
    }

    #[test]
    fn excluded_file_is_skipped_entirely() {
        let table = sample_table();
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "main.c:-1").unwrap();
        let filter = ExcludeFilter::load(f.path()).unwrap();
        let mut buf = Vec::new();
        emit(&table, &filter, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(!text.contains("SF:main.c"));
    }
}

//! QCOV: an annotated-source listing per source file, one line prefixed by
//! its hit count (or a marker for uninstrumented/never-hit lines). Mirrors
//! `gcov_emit_qcov_file`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;
use crate::file_table::{FileEntry, FileTable};
use crate::pathmap::map_source_filename;

const NOT_INSTRUMENTED: &str = "       -";
const NEVER_EXECUTED: &str = "   #####";

/// Writes one `<mapped-name>.qcov` file per source file under `out_dir`.
/// Files whose source can't be opened, or whose name can't be mapped, are
/// skipped with a warning (matching the original's `unable to open`/`goto
/// done` behavior) rather than failing the whole run.
pub fn emit(table: &FileTable, out_dir: &Path, strip: Option<&str>, prefix: Option<&str>) -> Result<()> {
    for file in table.iter() {
        let Some(filename) = &file.filename else {
            continue;
        };

        let Ok(source) = fs::read_to_string(filename.as_ref()) else {
            if filename.as_ref() != "??" {
                warn!(file = %filename, "unable to open source file for qcov annotation");
            }
            continue;
        };

        let Some(mapped) = map_source_filename(filename, strip, prefix, false, ".qcov") else {
            warn!(file = %filename, "qcov output name could not be derived (strip prefix doesn't match)");
            continue;
        };
        let out_path = out_path_for(out_dir, &mapped);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = fs::File::create(&out_path)?;
        annotate(file, &source, &mut out)?;
    }
    Ok(())
}

fn out_path_for(out_dir: &Path, mapped: &str) -> PathBuf {
    out_dir.join(mapped.trim_start_matches('/'))
}

fn annotate(file: &FileEntry, source: &str, out: &mut impl Write) -> Result<()> {
    let nr_lines = file.nr_lines();

    for (i, text) in source.lines().enumerate() {
        let l = i + 1;
        // The original asserts `l < nr_lines`; a source file's last line is
        // legitimately at `l == nr_lines` (REDESIGN FLAG), so this is `<=`.
        let marker = if l <= nr_lines && file.instr[l - 1] {
            if file.lines[l - 1] > 0 {
                format!("{:>8}", file.lines[l - 1])
            } else {
                NEVER_EXECUTED.to_string()
            }
        } else {
            NOT_INSTRUMENTED.to_string()
        };
        writeln!(out, "{marker}:{l:5}:{text}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use etrace_elf::{SrcLoc, SymbolStore};
    use std::path::PathBuf;
    use std::rc::Rc;

    #[test]
    fn annotates_hit_and_uninstrumented_lines() {
        let dir = tempfile::tempdir().unwrap();
        let src_path = dir.path().join("main.c");
        fs::write(&src_path, "int main() {\n    return 0;\n}\n").unwrap();

        let nm = "0000000000001000 0000000000000008 T main\n";
        let mut store = SymbolStore::from_nm_output(nm.as_bytes(), &PathBuf::from("t.elf")).unwrap();
        let r = store.lookup_by_addr(0x1000).unwrap();
        {
            let sym = store.get_mut(r);
            let fname: Rc<str> = Rc::from(src_path.to_str().unwrap());
            let lm = sym.linemap_mut();
            lm[0].push(SrcLoc { filename: Rc::clone(&fname), linenr: 2, inlined: false });
        }
        store.get_mut(r).update_cov(0x1000, 0x1004, 5);

        let table = FileTable::build(&store);
        let out_dir = dir.path().join("out");
        emit(&table, &out_dir, None, None).unwrap();

        let mapped = map_source_filename(src_path.to_str().unwrap(), None, None, false, ".qcov").unwrap();
        let qcov_path = out_path_for(&out_dir, &mapped);
        let text = fs::read_to_string(qcov_path).unwrap();
        assert!(text.contains("       1:    2:    return 0;"));
        assert!(text.contains(&format!("{NOT_INSTRUMENTED}:    1:int main() {{")));
    }

    #[test]
    fn missing_source_file_is_skipped_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let nm = "0000000000001000 0000000000000008 T main\n";
        let mut store = SymbolStore::from_nm_output(nm.as_bytes(), &PathBuf::from("t.elf")).unwrap();
        let r = store.lookup_by_addr(0x1000).unwrap();
        {
            let sym = store.get_mut(r);
            let fname: Rc<str> = Rc::from("/does/not/exist.c");
            sym.linemap_mut()[0].push(SrcLoc { filename: fname, linenr: 1, inlined: false });
        }
        let table = FileTable::build(&store);
        emit(&table, &dir.path().join("out"), None, None).unwrap();
    }
}

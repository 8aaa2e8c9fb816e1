//! The "etrace" raw coverage dump: one line per covered instruction word,
//! plus the unknown-symbol trailer. Mirrors `coverage_dump_sym`/`coverage_dump`.

use std::io::Write;

use etrace_elf::{SymbolStore, SymRef};

use crate::error::Result;

/// Writes `addr count name file:line` for every instruction word that has a
/// nonzero entry count in any known symbol, followed by a trailer line
/// summing up time attributed to the unknown symbol.
pub fn dump<W: Write>(store: &SymbolStore, out: &mut W) -> Result<()> {
    for sym in store.iter() {
        dump_sym(sym, out)?;
    }

    let unknown = store.get(SymRef::Unknown);
    writeln!(out, "{} x unknown", unknown.total_time)?;
    Ok(())
}

fn dump_sym<W: Write>(sym: &etrace_elf::Sym, out: &mut W) -> Result<()> {
    let Some(cov_ent) = sym.cov_ent.as_ref() else {
        return Ok(());
    };
    let cov = sym.cov.as_ref().expect("cov_ent implies cov");
    let linemap = sym.linemap.as_ref();

    for (i, &ent) in cov_ent.iter().enumerate() {
        if ent == 0 {
            continue;
        }
        let addr = sym.addr + (i as u64) * 4;
        let count = cov[i];

        match linemap.and_then(|lm| lm.get(i)).and_then(|locs| locs.first()) {
            Some(loc) => {
                writeln!(out, "{addr:x} {count} {} {}:{}", sym.name, loc.filename, loc.linenr)?;
            }
            None => {
                writeln!(out, "{addr:x} {count} {}", sym.name)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn store_with_one_hit() -> SymbolStore {
        let nm = b"0000000000001000 0000000000000010 T main\n";
        let mut store = SymbolStore::from_nm_output(nm, &PathBuf::from("t.elf")).unwrap();
        let r = store.lookup_by_addr(0x1000).unwrap();
        store.get_mut(r).update_cov(0x1000, 0x1004, 10);
        store
    }

    #[test]
    fn dumps_covered_word_and_unknown_trailer() {
        let store = store_with_one_hit();
        let mut buf = Vec::new();
        dump(&store, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("1000 10 main"));
        assert!(text.ends_with("0 x unknown\n"));
    }
}

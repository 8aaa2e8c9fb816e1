//! Cachegrind-style per-function summary, mirroring `cachegrind_coverage_dump`.
//! Much coarser than QCOV/LCOV: one `time-ns` event total per function, no
//! per-line breakdown.

use std::io::Write;

use etrace_elf::{SymbolStore, SymRef};

use crate::error::Result;

pub fn dump<W: Write>(store: &SymbolStore, out: &mut W) -> Result<()> {
    writeln!(out, "cmd: qemu")?;
    writeln!(out, "events: time-ns")?;
    writeln!(out, "fl=???")?;

    for sym in store.iter() {
        if sym.total_time == 0 {
            continue;
        }
        writeln!(out, "fn={}", sym.name)?;
        writeln!(out, "0 {}", sym.total_time)?;
    }

    let unknown = store.get(SymRef::Unknown);
    if unknown.total_time != 0 {
        writeln!(out, "fn=unknown")?;
        writeln!(out, "0 {}", unknown.total_time)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn emits_header_and_per_function_total() {
        let nm = b"0000000000001000 0000000000000010 T main\n";
        let mut store = SymbolStore::from_nm_output(nm, &PathBuf::from("t.elf")).unwrap();
        let r = store.lookup_by_addr(0x1000).unwrap();
        store.get_mut(r).update_cov(0x1000, 0x1004, 42);

        let mut buf = Vec::new();
        dump(&store, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("cmd: qemu\nevents: time-ns\nfl=???\n"));
        assert!(text.contains("fn=main\n0 42\n"));
        assert!(!text.contains("fn=unknown"));
    }
}

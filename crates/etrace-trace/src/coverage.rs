//! The symbol-boundary-splitting coverage walk shared by all three trace
//! decoders (binary, ASCII-hex, simple). Mirrors the `while (sym && addr <
//! end)` loop duplicated in `etrace_process_exec`, `ht_process_exec` and
//! `handle_tb_enter_exec` in the original tool.

use tracing::warn;

use etrace_elf::{SymRef, SymbolStore};

/// Attributes `[start, end)` executing for `duration` onto the symbol(s) that
/// own it, splitting the range at symbol boundaries.
///
/// The first lookup falls back to the store's "unknown" sentinel so every
/// range is accounted for exactly once. Subsequent re-lookups during the
/// walk do *not* fall back to the sentinel: if `addr` lands in a gap between
/// symbols, the walk simply stops there, matching the original's behavior of
/// letting `sym_lookup_by_addr` return `NULL` and exiting the `while` loop.
pub fn update_range(store: &mut SymbolStore, start: u64, end: u64, duration: u32) {
    if start >= end {
        return;
    }

    let mut addr = start;
    let mut sym_ref = store.lookup_by_addr(addr).unwrap_or(SymRef::Unknown);

    loop {
        let sym = store.get(sym_ref);
        let sym_end = sym.addr.saturating_add(sym.size);
        let tend = if end > sym_end {
            warn!(sym = %sym.name, "fixup sym spans over to another symbol");
            sym_end
        } else {
            end
        };

        store
            .get_mut(sym_ref)
            .update_cov(addr, tend, u64::from(duration));
        addr = tend;

        if addr >= end {
            break;
        }
        match store.lookup_by_addr(addr) {
            Some(r) => sym_ref = r,
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn store() -> SymbolStore {
        let nm = b"\
0000000000001000 0000000000000010 T foo
0000000000001020 0000000000000010 T bar
";
        SymbolStore::from_nm_output(nm, &PathBuf::from("t.elf")).unwrap()
    }

    #[test]
    fn single_symbol_range_is_not_split() {
        let mut s = store();
        update_range(&mut s, 0x1000, 0x1010, 40);
        let sym = s.get(s.lookup_by_addr(0x1000).unwrap());
        assert_eq!(sym.total_time, 40);
    }

    #[test]
    fn range_spanning_a_gap_stops_at_the_gap() {
        let mut s = store();
        // foo ends at 0x1010; 0x1020 is bar. The gap between isn't owned by
        // anyone, so the walk must stop once it reaches 0x1010.
        update_range(&mut s, 0x1005, 0x1025, 100);
        let foo = s.get(s.lookup_by_addr(0x1005).unwrap());
        assert_eq!(foo.total_time, 100);
        let bar = s.get(s.lookup_by_addr(0x1021).unwrap());
        assert_eq!(bar.total_time, 0);
    }

    #[test]
    fn range_outside_any_symbol_goes_to_unknown() {
        let mut s = store();
        update_range(&mut s, 0x5000, 0x5004, 7);
        // Can't address the unknown sentinel directly from the test, but a
        // range entirely outside any symbol must not panic and must not
        // touch foo/bar.
        let foo = s.get(s.lookup_by_addr(0x1000).unwrap());
        assert_eq!(foo.total_time, 0);
    }
}

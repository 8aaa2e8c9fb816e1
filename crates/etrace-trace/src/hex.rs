//! ASCII-hex line-oriented trace format: one hex-encoded address per line,
//! each representing a 4-byte executed range starting at that address.
//! Mirrors `hextrace_show`/`ht_process_exec` in the original tool.

use std::io::{BufRead, Read};

use etrace_elf::SymbolStore;

use crate::coverage::update_range;
use crate::error::{Result, TraceError};
use crate::sink::Sink;

/// The seven input sub-formats: a plain hex value, or one whose width and
/// byte order must be corrected before use. Matches `enum trace_format`'s
/// `TRACE_ASCII_HEX*` variants; byte-order correction assumes a
/// little-endian host (as the original's `le16toh`/`be16toh` macros resolve
/// to on x86, the only host this tool has ever shipped on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexVariant {
    Raw,
    Le16,
    Le32,
    Le64,
    Be16,
    Be32,
    Be64,
}

impl HexVariant {
    fn apply(self, value: u64) -> u64 {
        match self {
            Self::Raw | Self::Le16 | Self::Le32 | Self::Le64 => value,
            Self::Be16 => u64::from((value as u16).swap_bytes()),
            Self::Be32 => u64::from((value as u32).swap_bytes()),
            Self::Be64 => value.swap_bytes(),
        }
    }
}

pub struct HexDecoder;

impl HexDecoder {
    /// Decodes one hex address per line from `reader`. The original resets
    /// its displayed timestamp to `0` on every line (a local variable that
    /// never survives between calls); that quirk is preserved verbatim.
    pub fn run<R: Read>(
        reader: R,
        variant: HexVariant,
        store: &mut SymbolStore,
        coverage: bool,
        mut sink: Option<&mut dyn Sink>,
    ) -> Result<()> {
        let buf = std::io::BufReader::new(reader);
        for line in buf.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let raw = u64::from_str_radix(trimmed.trim_start_matches("0x"), 16)
                .map_err(|_| TraceError::MalformedHexLine(line.clone()))?;
            let start = variant.apply(raw);
            let end = start + 4;

            let looked_up = store.lookup_by_addr(start);
            if let Some(sink) = sink.as_deref_mut() {
                let name = looked_up.map_or("", |r| store.get(r).name.as_str());
                sink.write_str(&format!("Trace 0 {start:x} - {end:x} {name}\n"))?;
            }
            if coverage {
                update_range(store, start, end, 1);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn store() -> SymbolStore {
        let nm = b"0000000000001000 0000000000000010 T main\n";
        SymbolStore::from_nm_output(nm, &PathBuf::from("t.elf")).unwrap()
    }

    #[test]
    fn raw_variant_decodes_straight_hex() {
        let mut s = store();
        let mut out = Vec::new();
        HexDecoder::run(b"1000\n".as_slice(), HexVariant::Raw, &mut s, true, Some(&mut out)).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Trace 0 1000 - 1004 main\n"
        );
        let sym = s.get(s.lookup_by_addr(0x1000).unwrap());
        assert_eq!(sym.total_time, 1);
    }

    #[test]
    fn be16_variant_byteswaps_the_16_bit_width() {
        // 0x0010 swapped as a 16-bit value becomes 0x1000.
        let mut s = store();
        let mut out = Vec::new();
        HexDecoder::run(b"10\n".as_slice(), HexVariant::Be16, &mut s, false, Some(&mut out)).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("1000"));
    }

    #[test]
    fn malformed_line_is_reported() {
        let mut s = store();
        let err = HexDecoder::run(b"not-hex\n".as_slice(), HexVariant::Raw, &mut s, false, None).unwrap_err();
        assert!(matches!(err, TraceError::MalformedHexLine(_)));
    }
}

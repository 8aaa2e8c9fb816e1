//! Disassembly of `TYPE_TB` packet bodies via an external `objdump`. The
//! original tool tries a direct libopcode/bfd binding first and only falls
//! back to shelling out to `objdump`; binding to `libopcode` directly has no
//! sane Rust equivalent, so here `objdump` is the only backend.

use std::io::Write as _;
use std::process::{Command, Stdio};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Result, TraceError};

/// Disassembles `len` bytes of raw guest code starting at `addr` for `machine`
/// (an objdump `-m` argument, e.g. `"riscv:rv64"`), returning the tool's
/// textual listing.
pub fn objdump_disassemble(
    objdump: &str,
    machine: &str,
    big_endian: bool,
    addr: u64,
    code: &[u8],
) -> Result<String> {
    let mut infile = NamedTempFile::new()?;
    infile.write_all(code)?;
    infile.flush()?;

    let adjust_vma = format!("--adjust-vma=0x{addr:x}");
    let endian_flag = if big_endian { "-EB" } else { "-EL" };

    debug!(objdump, machine, addr, len = code.len(), "disassemble TB");

    let output = Command::new(objdump)
        .args(["-D", "-b", "binary", "-m", machine, endian_flag, &adjust_vma])
        .arg(infile.path())
        .stdout(Stdio::piped())
        .output()
        .map_err(|source| TraceError::Spawn {
            cmd: objdump.to_string(),
            source,
        })?;

    // objdump's raw-binary disassembly starts with a fixed 7-line banner
    // (file format header + blank + section header + column header, with
    // blank lines in between); the original skips exactly 7 newlines before
    // emitting the rest verbatim.
    let text = String::from_utf8_lossy(&output.stdout);
    let mut rest = text.as_ref();
    for _ in 0..7 {
        match rest.find('\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => {
                rest = "";
                break;
            }
        }
    }
    Ok(rest.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_exactly_seven_header_lines() {
        let banner: String = (0..7).map(|i| format!("header{i}\n")).collect();
        let body = format!("{banner}   0:\tnop\n");
        let mut rest = body.as_str();
        for _ in 0..7 {
            let pos = rest.find('\n').unwrap();
            rest = &rest[pos + 1..];
        }
        assert_eq!(rest, "   0:\tnop\n");
    }
}

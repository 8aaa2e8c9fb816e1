use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::rc::Rc;

use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{ElfError, Result};
use crate::store::SymbolStore;
use crate::symbol::SrcLoc;

const INLINED_BY_PREFIX: &str = " (inlined by) ";

/// Drives `addr2line -a -i -p -e <elf>` over every instruction word of
/// every symbol in `store` and attaches the resulting locations to each
/// symbol's linemap. Mirrors `sym_build_linemap`.
///
/// `addr2line` is fed one hex address per word on stdin and, with `-p`,
/// answers with one line per address of the form `ADDR: file:line`,
/// followed by zero or more ` (inlined by) file:line` continuation lines
/// for addresses that were inlined.
pub fn build_linemap(store: &mut SymbolStore, addr2line_path: &str, elf_path: &Path) -> Result<()> {
    info!("Building linemap");

    let mut child = Command::new(addr2line_path)
        .arg("-a")
        .arg("-i")
        .arg("-p")
        .arg("-e")
        .arg(elf_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|source| ElfError::Spawn {
            cmd: addr2line_path.to_string(),
            source,
        })?;

    let mut tmp = NamedTempFile::new().map_err(ElfError::Io)?;
    let mut stdin = child.stdin.take().expect("piped stdin");
    let addrs: Vec<(u64, u64)> = store.iter().map(|s| (s.addr, s.size)).collect();
    for (addr, size) in &addrs {
        let mut a = *addr;
        while a < addr + size {
            writeln!(stdin, "{a:x}").map_err(ElfError::Io)?;
            a += 4;
        }
    }
    drop(stdin);

    std::io::copy(
        child.stdout.as_mut().expect("piped stdout"),
        tmp.as_file_mut(),
    )
    .map_err(ElfError::Io)?;

    let status = child.wait().map_err(ElfError::Io)?;
    if !status.success() {
        return Err(ElfError::ChildFailed {
            cmd: addr2line_path.to_string(),
            status: status.to_string(),
        });
    }

    tmp.as_file_mut().seek(SeekFrom::Start(0)).map_err(ElfError::Io)?;
    let mut contents = String::new();
    tmp.as_file_mut()
        .read_to_string(&mut contents)
        .map_err(ElfError::Io)?;

    apply_linemap_output(store, &contents)?;
    info!("done");
    Ok(())
}

fn apply_linemap_output(store: &mut SymbolStore, output: &str) -> Result<()> {
    let mut last_addr: Option<u64> = None;

    for line in output.lines() {
        let (addr, rest, inlined) = if let Some(stripped) = line.strip_prefix(INLINED_BY_PREFIX) {
            let addr = last_addr.ok_or_else(|| ElfError::MalformedLinemap(line.to_string()))?;
            (addr, stripped, true)
        } else {
            let (addr_s, rest) = line
                .split_once(": ")
                .ok_or_else(|| ElfError::MalformedLinemap(line.to_string()))?;
            let addr = u64::from_str_radix(addr_s.trim(), 16)
                .map_err(|_| ElfError::MalformedLinemap(line.to_string()))?;
            (addr, rest, false)
        };
        last_addr = Some(addr);

        let (filename, linenr_s) = rest
            .rsplit_once(':')
            .ok_or_else(|| ElfError::MalformedLinemap(line.to_string()))?;
        let linenr: u32 = linenr_s
            .trim()
            .split(|c: char| !c.is_ascii_digit())
            .next()
            .unwrap_or("")
            .parse()
            .unwrap_or(0);

        let Some(sym_ref) = store.lookup_by_addr(addr) else {
            continue;
        };
        let sym = store.get_mut(sym_ref);

        if sym.src_filename.is_none() {
            sym.src_filename = Some(Rc::from(crate::filename::sanitize(filename)));
        }
        if linenr >= sym.maxline {
            sym.maxline = linenr;
        }

        let offset = ((addr - sym.addr) / 4) as usize;
        let loc_filename: Rc<str> = match &sym.src_filename {
            Some(primary) if primary.as_ref() == filename => Rc::clone(primary),
            _ => Rc::from(crate::filename::sanitize(filename)),
        };
        sym.linemap_mut()[offset].push(SrcLoc {
            filename: loc_filename,
            linenr,
            inlined,
        });
    }

    Ok(())
}

//! QEMU "simple trace" mapping-table format: a fixed header, then a stream
//! of MAPPING records (event id -> name) and EVENT records (event id +
//! timestamp + raw u64 arguments), read from a file or a live socket.
//! Mirrors `qemu_simple_trace_show` in the original tool.
//!
//! The original hand-rolls a 256 MiB ring buffer around `read()`/`FIONREAD`
//! so it can batch small reads off a pipe/socket without blocking
//! indefinitely. `std::io::BufReader` gives the same batching for free, so
//! the decoder wraps its reader in one sized to match.

use std::collections::HashMap;
use std::io::{BufReader, Read};

use tracing::{debug, warn};

use etrace_elf::SymbolStore;

use crate::coverage::update_range;
use crate::error::{Result, TraceError};
use crate::sink::Sink;

const HEADER_EVENT_ID: u64 = u64::MAX;
const HEADER_MAGIC: u64 = 0xf2b1_77cb_0aa4_29b4;
const HEADER_VERSION: u64 = 4;
const DROPPED_EVENT_ID: u64 = u64::MAX - 1;

const RECORD_TYPE_MAPPING: u64 = 0;
const RECORD_TYPE_EVENT: u64 = 1;

const MAX_NAME_LEN: u32 = 4096;
const MAX_RECORD_LEN: u32 = 4096;
/// Fixed portion of an EVENT record: `event:u64, timestamp_ns:u64,
/// length:u32, pid:u32`.
const RECORD_HEADER_LEN: u32 = 24;

/// Read-ahead buffer size matching the original's manual ring buffer.
pub const READ_BUF_SIZE: usize = 256 * 1024 * 1024;

pub struct SimpleDecoder;

impl SimpleDecoder {
    pub fn run<R: Read>(
        reader: R,
        store: &mut SymbolStore,
        coverage: bool,
        mut sink: Option<&mut dyn Sink>,
    ) -> Result<()> {
        let mut reader = BufReader::with_capacity(READ_BUF_SIZE, reader);
        let mut events: HashMap<u64, String> = HashMap::new();
        let mut dropped = 0u64;

        read_header(&mut reader)?;

        loop {
            let Some(kind) = read_u64_or_eof(&mut reader)? else {
                break;
            };
            match kind {
                RECORD_TYPE_MAPPING => {
                    read_mapping(&mut reader, &mut events)?;
                }
                RECORD_TYPE_EVENT => {
                    read_event(&mut reader, &events, store, coverage, sink.as_deref_mut(), &mut dropped)?;
                }
                other => {
                    return Err(TraceError::MalformedSimpleRecord(format!(
                        "unknown record type {other}"
                    )));
                }
            }
        }

        if dropped > 0 {
            warn!(dropped, "events dropped by QEMU");
        }
        Ok(())
    }
}

fn read_u64_or_eof<R: Read>(reader: &mut R) -> Result<Option<u64>> {
    let mut buf = [0u8; 8];
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(TraceError::MalformedSimpleRecord(
                "unexpected end of file while reading trace".into(),
            ));
        }
        filled += n;
    }
    Ok(Some(u64::from_le_bytes(buf)))
}

fn read_header<R: Read>(reader: &mut R) -> Result<()> {
    let mut buf = [0u8; 24];
    reader.read_exact(&mut buf).map_err(|_| {
        TraceError::MalformedSimpleRecord("cannot read header".into())
    })?;
    let event_id = u64::from_le_bytes(buf[0..8].try_into().unwrap());
    let magic = u64::from_le_bytes(buf[8..16].try_into().unwrap());
    let version = u64::from_le_bytes(buf[16..24].try_into().unwrap());

    if event_id != HEADER_EVENT_ID || magic != HEADER_MAGIC {
        return Err(TraceError::MalformedSimpleRecord(
            "invalid QEMU simple trace file".into(),
        ));
    }
    if version != HEADER_VERSION {
        return Err(TraceError::MalformedSimpleRecord(format!(
            "Unsupported simple trace file version {version}"
        )));
    }
    debug!(version, "simple trace header");
    Ok(())
}

fn read_mapping<R: Read>(reader: &mut R, events: &mut HashMap<u64, String>) -> Result<()> {
    let id = read_u64_or_eof(reader)?
        .ok_or_else(|| TraceError::MalformedSimpleRecord("unexpected end of file".into()))?;

    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .map_err(|_| TraceError::MalformedSimpleRecord("unexpected end of file".into()))?;
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_NAME_LEN {
        return Err(TraceError::MalformedSimpleRecord(
            "trace name length too large in mapping".into(),
        ));
    }

    let mut name_buf = vec![0u8; len as usize];
    reader
        .read_exact(&mut name_buf)
        .map_err(|_| TraceError::MalformedSimpleRecord("unexpected end of file".into()))?;
    let name = String::from_utf8_lossy(&name_buf).into_owned();

    debug!(id, name = %name, "mapping");
    events.insert(id, name);
    Ok(())
}

fn read_event<R: Read>(
    reader: &mut R,
    events: &HashMap<u64, String>,
    store: &mut SymbolStore,
    coverage: bool,
    mut sink: Option<&mut dyn Sink>,
    dropped: &mut u64,
) -> Result<()> {
    let mut hdr = [0u8; RECORD_HEADER_LEN as usize];
    reader
        .read_exact(&mut hdr)
        .map_err(|_| TraceError::MalformedSimpleRecord("unexpected end of file".into()))?;
    let event = u64::from_le_bytes(hdr[0..8].try_into().unwrap());
    let _timestamp_ns = u64::from_le_bytes(hdr[8..16].try_into().unwrap());
    let length = u32::from_le_bytes(hdr[16..20].try_into().unwrap());
    let _pid = u32::from_le_bytes(hdr[20..24].try_into().unwrap());

    if length < RECORD_HEADER_LEN || length > MAX_RECORD_LEN {
        return Err(TraceError::MalformedSimpleRecord(format!(
            "bad record size: {length}"
        )));
    }

    let args_len = (length - RECORD_HEADER_LEN) as usize;
    let mut args_buf = vec![0u8; args_len];
    reader
        .read_exact(&mut args_buf)
        .map_err(|_| TraceError::MalformedSimpleRecord("unexpected end of file".into()))?;
    let args: Vec<u64> = args_buf
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
        .collect();

    if event == DROPPED_EVENT_ID {
        let n = args.first().copied().unwrap_or(0);
        warn!(n, "event dropped by QEMU");
        *dropped += n;
        return Ok(());
    }

    let Some(name) = events.get(&event) else {
        warn!(event, "encountered unknown event id, ignoring");
        return Ok(());
    };

    if name == "tb_enter_exec" {
        handle_tb_enter_exec(&args, store, coverage, sink.as_deref_mut())?;
    } else {
        debug!(name = %name, "ignoring trace event");
    }
    Ok(())
}

fn handle_tb_enter_exec(
    args: &[u64],
    store: &mut SymbolStore,
    coverage: bool,
    mut sink: Option<&mut dyn Sink>,
) -> Result<()> {
    let Some(&pc_start) = args.get(1) else {
        return Ok(());
    };
    let Some(&pc_end) = args.get(2) else {
        return Ok(());
    };

    if let Some(sink) = sink.as_deref_mut() {
        let name = store
            .lookup_by_addr(pc_start)
            .map_or("", |r| store.get(r).name.as_str());
        sink.write_str(&format!("Trace tb_enter_exec {pc_start:x} - {pc_end:x} {name}\n"))?;
    }

    if coverage {
        // The format carries no per-instruction duration; entries accrue
        // only to the entry-hit counters, never to time-weighted coverage.
        update_range(store, pc_start, pc_end, 0);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn store() -> SymbolStore {
        let nm = b"0000000000001000 0000000000000010 T main\n";
        SymbolStore::from_nm_output(nm, &PathBuf::from("t.elf")).unwrap()
    }

    fn header() -> Vec<u8> {
        let mut v = Vec::new();
        v.extend(HEADER_EVENT_ID.to_le_bytes());
        v.extend(HEADER_MAGIC.to_le_bytes());
        v.extend(HEADER_VERSION.to_le_bytes());
        v
    }

    fn mapping(id: u64, name: &str) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend(RECORD_TYPE_MAPPING.to_le_bytes());
        v.extend(id.to_le_bytes());
        v.extend((name.len() as u32).to_le_bytes());
        v.extend(name.as_bytes());
        v
    }

    fn event(id: u64, args: &[u64]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend(RECORD_TYPE_EVENT.to_le_bytes());
        let length = RECORD_HEADER_LEN as usize + args.len() * 8;
        v.extend(id.to_le_bytes()); // event
        v.extend(0u64.to_le_bytes()); // timestamp_ns
        v.extend((length as u32).to_le_bytes());
        v.extend(0u32.to_le_bytes()); // pid
        for a in args {
            v.extend(a.to_le_bytes());
        }
        v
    }

    #[test]
    fn decodes_tb_enter_exec_and_updates_coverage() {
        let mut stream = header();
        stream.extend(mapping(1, "tb_enter_exec"));
        stream.extend(event(1, &[0, 0x1000, 0x1008]));

        let mut s = store();
        let mut out = Vec::new();
        SimpleDecoder::run(stream.as_slice(), &mut s, true, Some(&mut out)).unwrap();

        let sym = s.get(s.lookup_by_addr(0x1000).unwrap());
        assert_eq!(sym.total_time, 0);
        let ent = sym.cov_ent.as_ref().unwrap();
        assert_eq!(ent[0], 1);
        assert_eq!(ent[1], 1);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut stream = vec![0u8; 24];
        let mut s = store();
        let err = SimpleDecoder::run(stream.as_mut_slice(), &mut s, false, None).unwrap_err();
        assert!(matches!(err, TraceError::MalformedSimpleRecord(_)));
    }

    #[test]
    fn unknown_event_id_is_ignored_not_fatal() {
        let mut stream = header();
        stream.extend(event(42, &[0, 0x1000, 0x1008]));
        let mut s = store();
        SimpleDecoder::run(stream.as_slice(), &mut s, true, None).unwrap();
    }
}

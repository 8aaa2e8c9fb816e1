//! Native framed binary trace decoder. One packet header (8 bytes, all
//! little-endian: `type`, `unit_id`, `len`) followed by `len` bytes of
//! type-specific payload, dispatched exactly like `etrace_show`'s
//! packet-type switch in the original tool.

use std::io::Read;

use tracing::warn;

use etrace_elf::SymbolStore;

use crate::coverage::update_range;
use crate::error::{Result, TraceError};
use crate::sink::{DisasTarget, Sink};
use crate::wire::{
    ArchData, ArchHalf, InfoData, ETRACE_MIN_VERSION_MAJOR, INFO_F_TB_CHAINING, MAX_PACKET_LEN,
    MEM_WRITE, TYPE_ARCH, TYPE_BARRIER, TYPE_EVENT_U64, TYPE_EXEC, TYPE_INFO, TYPE_MEM,
    TYPE_NOTE, TYPE_OLD_EVENT_U64, TYPE_TB,
};

/// Everything the binary decoder needs beyond the byte stream itself.
pub struct BinaryDecodeOptions<'a, 'd> {
    pub coverage: bool,
    pub sink: Option<&'a mut dyn Sink>,
    pub guest: Option<DisasTarget<'d>>,
    pub host: Option<DisasTarget<'d>>,
}

impl<'a, 'd> Default for BinaryDecodeOptions<'a, 'd> {
    fn default() -> Self {
        Self {
            coverage: false,
            sink: None,
            guest: None,
            host: None,
        }
    }
}

#[derive(Default)]
struct DecoderState {
    info: InfoData,
    arch: ArchData,
}

/// Decodes the framed binary format from `reader` until clean EOF, updating
/// `store`'s coverage counters (if `opts.coverage`) and writing decoded
/// lines/disassembly to `opts.sink`.
pub struct BinaryDecoder;

impl BinaryDecoder {
    pub fn run<R: Read>(
        reader: &mut R,
        store: &mut SymbolStore,
        opts: &mut BinaryDecodeOptions,
    ) -> Result<()> {
        let mut state = DecoderState::default();
        let mut unknown_pkg_warned = false;

        loop {
            let Some(hdr) = read_header(reader)? else {
                break;
            };
            if hdr.len > MAX_PACKET_LEN {
                return Err(TraceError::PacketTooLarge {
                    len: hdr.len,
                    max: MAX_PACKET_LEN,
                });
            }
            let mut body = vec![0u8; hdr.len as usize];
            reader.read_exact(&mut body)?;

            match hdr.kind {
                TYPE_INFO => state.info = process_info(&body)?,
                TYPE_ARCH => {
                    state.arch = process_arch(&body);
                    if let Some(sink) = opts.sink.as_deref_mut() {
                        sink.write_str(&format!(
                            "guest arch={} {}bit\n",
                            state.arch.guest.arch_id, state.arch.guest.arch_bits
                        ))?;
                        sink.write_str(&format!(
                            "host arch={} {}bit\n",
                            state.arch.host.arch_id, state.arch.host.arch_bits
                        ))?;
                    }
                }
                TYPE_EXEC => process_exec(
                    hdr.unit_id,
                    &body,
                    &state,
                    store,
                    opts.coverage,
                    opts.sink.as_deref_mut(),
                )?,
                TYPE_TB => process_tb(&body, &state, opts)?,
                TYPE_NOTE => {
                    if let Some(sink) = opts.sink.as_deref_mut() {
                        let text = String::from_utf8_lossy(&body[8..]);
                        sink.write_str(text.trim_end_matches('\0'))?;
                    }
                }
                TYPE_MEM => {
                    if let Some(sink) = opts.sink.as_deref_mut() {
                        sink.write_str(&format_mem(hdr.unit_id, &body))?;
                    }
                }
                TYPE_BARRIER => {
                    // No queueing/sorting of packets across units is
                    // implemented; barriers are a synchronization point the
                    // reader doesn't need.
                }
                TYPE_OLD_EVENT_U64 | TYPE_EVENT_U64 => {
                    if let Some(sink) = opts.sink.as_deref_mut() {
                        sink.write_str(&format_event(&body)?)?;
                    }
                }
                other => {
                    if !unknown_pkg_warned {
                        warn!(kind = other, "unknown etrace package type");
                        unknown_pkg_warned = true;
                    }
                }
            }
        }

        Ok(())
    }
}

struct RawHeader {
    kind: u16,
    unit_id: u16,
    len: u32,
}

fn read_header<R: Read>(reader: &mut R) -> Result<Option<RawHeader>> {
    let mut buf = [0u8; 8];
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(TraceError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated packet header",
            )));
        }
        filled += n;
    }
    Ok(Some(RawHeader {
        kind: u16::from_le_bytes([buf[0], buf[1]]),
        unit_id: u16::from_le_bytes([buf[2], buf[3]]),
        len: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
    }))
}

fn process_info(body: &[u8]) -> Result<InfoData> {
    if body.len() < 12 {
        return Err(TraceError::MalformedPacket("short INFO packet".into()));
    }
    let attr = u64::from_le_bytes(body[0..8].try_into().unwrap());
    let version_major = u16::from_le_bytes(body[8..10].try_into().unwrap());
    let version_minor = u16::from_le_bytes(body[10..12].try_into().unwrap());
    if version_major > ETRACE_MIN_VERSION_MAJOR {
        return Err(TraceError::UnsupportedVersion {
            major: version_major,
            minor: version_minor,
        });
    }
    Ok(InfoData {
        attr,
        version_major,
        version_minor,
    })
}

fn parse_arch_half(b: &[u8]) -> ArchHalf {
    ArchHalf {
        arch_id: u32::from_le_bytes(b[0..4].try_into().unwrap()),
        arch_bits: b[4],
        big_endian: b[5] != 0,
    }
}

fn process_arch(body: &[u8]) -> ArchData {
    // `struct { u32 arch_id; u8 arch_bits; u8 big_endian; }` pads to 8 bytes
    // under the host's natural alignment; guest and host halves are back to
    // back.
    ArchData {
        guest: parse_arch_half(&body[0..8]),
        host: parse_arch_half(&body[8..16]),
    }
}

#[allow(clippy::too_many_arguments)]
fn process_exec(
    unit_id: u16,
    body: &[u8],
    state: &DecoderState,
    store: &mut SymbolStore,
    coverage: bool,
    mut sink: Option<&mut dyn Sink>,
) -> Result<()> {
    if body.len() < 8 {
        return Err(TraceError::MalformedPacket("short EXEC packet".into()));
    }
    let start_time = u64::from_le_bytes(body[0..8].try_into().unwrap());
    let mut now = start_time;
    let entries = &body[8..];

    let ent_size = match state.arch.guest.arch_bits {
        32 => 12,
        64 => 24,
        other => return Err(TraceError::UnsupportedArchBits(other)),
    };

    for chunk in entries.chunks_exact(ent_size) {
        let (duration, start, end) = match state.arch.guest.arch_bits {
            32 => {
                let duration = u32::from_le_bytes(chunk[0..4].try_into().unwrap());
                let start = u32::from_le_bytes(chunk[4..8].try_into().unwrap()) as u64;
                let end = u32::from_le_bytes(chunk[8..12].try_into().unwrap()) as u64;
                (duration, start, end)
            }
            64 => {
                let duration = u32::from_le_bytes(chunk[0..4].try_into().unwrap());
                // 4 bytes padding before the two u64 fields.
                let start = u64::from_le_bytes(chunk[8..16].try_into().unwrap());
                let end = u64::from_le_bytes(chunk[16..24].try_into().unwrap());
                (duration, start, end)
            }
            other => return Err(TraceError::UnsupportedArchBits(other)),
        };

        let looked_up = store.lookup_by_addr(start);

        if let Some(sink) = sink.as_deref_mut() {
            sink.write_str(&format_exec_line(unit_id, now, start, end, looked_up, store))?;
        }

        if coverage {
            if state.info.attr & INFO_F_TB_CHAINING != 0 {
                return Err(TraceError::TbChainingCoverage);
            }
            update_range(store, start, end, duration);
        }

        now += u64::from(duration);
    }

    Ok(())
}

/// Builds one decoded EXEC line, truncating the symbol name so the whole
/// line stays within the original's fixed 80-byte `out[]` buffer (79 bytes of
/// content plus the trailing newline).
fn format_exec_line(
    unit_id: u16,
    now: u64,
    start: u64,
    end: u64,
    sym: Option<etrace_elf::SymRef>,
    store: &SymbolStore,
) -> String {
    const MAX_LEN: usize = 79;
    let mut line = format!("E{unit_id:x} {now} {start:x} {end:x}");
    if let Some(r) = sym {
        let name = &store.get(r).name;
        let budget = MAX_LEN.saturating_sub(line.len() + 1);
        let mut truncated = name.as_str();
        while truncated.len() > budget && !truncated.is_empty() {
            truncated = &truncated[..truncated.len() - 1];
        }
        if !truncated.is_empty() {
            line.push(' ');
            line.push_str(truncated);
        }
    }
    line.push('\n');
    line
}

fn process_tb(body: &[u8], state: &DecoderState, opts: &mut BinaryDecodeOptions) -> Result<()> {
    if opts.sink.is_none() {
        return Ok(());
    }
    if body.len() < 32 {
        return Err(TraceError::MalformedPacket("short TB packet".into()));
    }
    let vaddr = u64::from_le_bytes(body[0..8].try_into().unwrap());
    let paddr = u64::from_le_bytes(body[8..16].try_into().unwrap());
    let host_addr = u64::from_le_bytes(body[16..24].try_into().unwrap());
    let guest_code_len = u32::from_le_bytes(body[24..28].try_into().unwrap()) as usize;
    let host_code_len = u32::from_le_bytes(body[28..32].try_into().unwrap()) as usize;
    let data = &body[32..];
    let guest_code = &data[..guest_code_len.min(data.len())];
    let host_code = &data[guest_code_len.min(data.len())..];

    if let Some(guest) = &opts.guest {
        let text = guest
            .disassembler
            .disassemble(&guest.machine, state.arch.guest.big_endian, vaddr, guest_code)?;
        let sink = opts.sink.as_deref_mut().unwrap();
        sink.write_str(&format!("guest virt={vaddr:x} phys={paddr:x}\n"))?;
        sink.write_str(&text)?;
        sink.write_str("\n")?;
    }
    if let Some(host) = &opts.host {
        let text = host.disassembler.disassemble(
            &host.machine,
            state.arch.host.big_endian,
            host_addr,
            &host_code[..host_code_len.min(host_code.len())],
        )?;
        let sink = opts.sink.as_deref_mut().unwrap();
        sink.write_str("host\n")?;
        sink.write_str(&text)?;
        sink.write_str("\n")?;
    }
    Ok(())
}

fn format_mem(unit_id: u16, body: &[u8]) -> String {
    let time = u64::from_le_bytes(body[0..8].try_into().unwrap());
    let paddr = u64::from_le_bytes(body[16..24].try_into().unwrap());
    let value = u64::from_le_bytes(body[24..32].try_into().unwrap());
    let attr = u32::from_le_bytes(body[32..36].try_into().unwrap());
    let rw = if attr & MEM_WRITE != 0 { 'w' } else { 'r' };
    format!("M{unit_id} {time} {rw} {paddr:x} {value:x}\n")
}

/// `EVENT_U64`/`OLD_EVENT_U64` share one wire shape: `time:u64, unit_id:u32,
/// dev_name_len:u32, val:u64` followed by `dev_name_len` bytes of device name
/// and the remaining bytes (NUL-trimmed) as the event name.
fn format_event(body: &[u8]) -> Result<String> {
    if body.len() < 24 {
        return Err(TraceError::MalformedPacket("short EVENT_U64 packet".into()));
    }
    let time = u64::from_le_bytes(body[0..8].try_into().unwrap());
    let unit_id = u32::from_le_bytes(body[8..12].try_into().unwrap());
    let dev_name_len = u32::from_le_bytes(body[12..16].try_into().unwrap()) as usize;
    let val = u64::from_le_bytes(body[16..24].try_into().unwrap());
    let names = &body[24..];
    let dev_name_len = dev_name_len.min(names.len());
    let dev_name = String::from_utf8_lossy(&names[..dev_name_len]);
    let dev_name = dev_name.trim_end_matches('\0');
    let event_name = String::from_utf8_lossy(&names[dev_name_len..]);
    let event_name = event_name.trim_matches('\0');
    Ok(format!("EV {time} {unit_id} {dev_name}.{event_name} {val}\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn store() -> SymbolStore {
        let nm = b"0000000000001000 0000000000000010 T main\n";
        SymbolStore::from_nm_output(nm, &PathBuf::from("t.elf")).unwrap()
    }

    fn header(kind: u16, unit_id: u16, len: u32) -> Vec<u8> {
        let mut v = Vec::with_capacity(8);
        v.extend_from_slice(&kind.to_le_bytes());
        v.extend_from_slice(&unit_id.to_le_bytes());
        v.extend_from_slice(&len.to_le_bytes());
        v
    }

    fn arch_body(guest_bits: u8) -> Vec<u8> {
        let mut v = vec![0u8; 16];
        v[4] = guest_bits;
        v
    }

    #[test]
    fn decodes_info_then_exec_and_updates_coverage() {
        let mut stream = Vec::new();
        stream.extend(header(TYPE_INFO, 0, 12));
        stream.extend([0u8; 8]); // attr = 0
        stream.extend(0u16.to_le_bytes()); // version major
        stream.extend(0u16.to_le_bytes()); // version minor

        stream.extend(header(TYPE_ARCH, 0, 16));
        stream.extend(arch_body(32));

        let mut exec_body = Vec::new();
        exec_body.extend(0u64.to_le_bytes()); // start_time
        exec_body.extend(5u32.to_le_bytes()); // duration
        exec_body.extend(0x1000u32.to_le_bytes()); // start
        exec_body.extend(0x1004u32.to_le_bytes()); // end
        stream.extend(header(TYPE_EXEC, 0, exec_body.len() as u32));
        stream.extend(exec_body);

        let mut s = store();
        let mut reader = stream.as_slice();
        let mut opts = BinaryDecodeOptions {
            coverage: true,
            ..Default::default()
        };
        BinaryDecoder::run(&mut reader, &mut s, &mut opts).unwrap();

        let sym = s.get(s.lookup_by_addr(0x1000).unwrap());
        assert_eq!(sym.total_time, 5);
    }

    #[test]
    fn rejects_newer_major_version() {
        let mut stream = Vec::new();
        stream.extend(header(TYPE_INFO, 0, 12));
        stream.extend([0u8; 8]);
        stream.extend(99u16.to_le_bytes());
        stream.extend(0u16.to_le_bytes());

        let mut s = store();
        let mut reader = stream.as_slice();
        let mut opts = BinaryDecodeOptions::default();
        let err = BinaryDecoder::run(&mut reader, &mut s, &mut opts).unwrap_err();
        assert!(matches!(err, TraceError::UnsupportedVersion { major: 99, .. }));
    }

    #[test]
    fn tb_chaining_attr_fails_coverage_requests() {
        let mut stream = Vec::new();
        stream.extend(header(TYPE_INFO, 0, 12));
        stream.extend(INFO_F_TB_CHAINING.to_le_bytes());
        stream.extend(0u16.to_le_bytes());
        stream.extend(0u16.to_le_bytes());

        stream.extend(header(TYPE_ARCH, 0, 16));
        stream.extend(arch_body(32));

        let mut exec_body = Vec::new();
        exec_body.extend(0u64.to_le_bytes());
        exec_body.extend(1u32.to_le_bytes());
        exec_body.extend(0x1000u32.to_le_bytes());
        exec_body.extend(0x1004u32.to_le_bytes());
        stream.extend(header(TYPE_EXEC, 0, exec_body.len() as u32));
        stream.extend(exec_body);

        let mut s = store();
        let mut reader = stream.as_slice();
        let mut opts = BinaryDecodeOptions {
            coverage: true,
            ..Default::default()
        };
        let err = BinaryDecoder::run(&mut reader, &mut s, &mut opts).unwrap_err();
        assert!(matches!(err, TraceError::TbChainingCoverage));
    }

    #[test]
    fn unknown_packet_type_is_a_soft_warning_not_an_error() {
        let mut stream = header(0xffff, 0, 0);
        let mut s = store();
        let mut reader = stream.as_mut_slice();
        let mut opts = BinaryDecodeOptions::default();
        BinaryDecoder::run(&mut reader, &mut s, &mut opts).unwrap();
    }
}

//! Binary framed trace wire format: a 8-byte header (`type`, `unit_id`,
//! `len`) followed by `len` bytes of type-specific payload. Mirrors
//! `struct etrace_hdr`/`struct etrace_pkg` in the original tool.

/// Largest payload the decoder will accept for a single packet (2 MiB, the
/// original tool's `MAX_PKG`).
pub const MAX_PACKET_LEN: u32 = 2 * 1024 * 1024;

pub const TYPE_EXEC: u16 = 1;
pub const TYPE_TB: u16 = 2;
pub const TYPE_NOTE: u16 = 3;
pub const TYPE_MEM: u16 = 4;
pub const TYPE_ARCH: u16 = 5;
pub const TYPE_BARRIER: u16 = 6;
pub const TYPE_OLD_EVENT_U64: u16 = 7;
pub const TYPE_EVENT_U64: u16 = 8;
pub const TYPE_INFO: u16 = 0x4554;

pub const ETRACE_MIN_VERSION_MAJOR: u16 = 0;

pub const INFO_F_TB_CHAINING: u64 = 1 << 0;

#[derive(Debug, Clone, Copy, Default)]
pub struct InfoData {
    pub attr: u64,
    pub version_major: u16,
    pub version_minor: u16,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArchHalf {
    pub arch_id: u32,
    pub arch_bits: u8,
    pub big_endian: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArchData {
    pub guest: ArchHalf,
    pub host: ArchHalf,
}

pub const MEM_WRITE: u32 = 1 << 0;

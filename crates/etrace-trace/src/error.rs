use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("packet body of {len} bytes exceeds the {max} byte cap")]
    PacketTooLarge { len: u32, max: u32 },
    #[error("trace declares version {major}.{minor}, only 0.x is supported")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error("unsupported guest arch_bits: {0}")]
    UnsupportedArchBits(u8),
    #[error("coverage requested on a trace recorded with TB chaining; rerun with -no-tb-chain")]
    TbChainingCoverage,
    #[error("malformed ascii-hex trace line: {0:?}")]
    MalformedHexLine(String),
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
    #[error("malformed simple-trace record: {0}")]
    MalformedSimpleRecord(String),
    #[error("failed to spawn `{cmd}`: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, TraceError>;

//! Trace wire formats: the native framed binary format, the ASCII-hex
//! line format, and the QEMU simple-trace mapping-table format, plus the
//! symbol-boundary-splitting coverage walk shared by all three.

mod binary;
mod coverage;
mod disas;
mod error;
mod hex;
mod simple;
mod sink;
pub mod wire;

pub use binary::{BinaryDecodeOptions, BinaryDecoder};
pub use coverage::update_range;
pub use disas::objdump_disassemble;
pub use error::{Result, TraceError};
pub use hex::{HexDecoder, HexVariant};
pub use simple::SimpleDecoder;
pub use sink::{Disassembler, DisasTarget, ObjdumpDisassembler, Sink};

//! Decoded-output and disassembly collaborator traits shared by the three
//! wire decoders.

use std::io::{self, Write};

use crate::error::Result;

/// Destination for one decoded trace line. Blanket-implemented for anything
/// that is `io::Write`, so a plain `&mut File`/`Vec<u8>`/`Stdout` works
/// directly as a sink.
pub trait Sink {
    fn write_str(&mut self, s: &str) -> io::Result<()>;
}

impl<W: Write + ?Sized> Sink for W {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.write_all(s.as_bytes())
    }
}

/// Disassembles a run of raw instruction bytes for a TB packet. The only
/// production implementation shells out to `objdump` (see [`crate::disas`]);
/// the trait exists so the TB decode path stays testable without spawning a
/// real child process.
pub trait Disassembler {
    fn disassemble(&self, machine: &str, big_endian: bool, addr: u64, code: &[u8]) -> Result<String>;
}

pub struct ObjdumpDisassembler {
    pub objdump_path: String,
}

impl Disassembler for ObjdumpDisassembler {
    fn disassemble(&self, machine: &str, big_endian: bool, addr: u64, code: &[u8]) -> Result<String> {
        crate::disas::objdump_disassemble(&self.objdump_path, machine, big_endian, addr, code)
    }
}

/// A guest or host disassembly target: the `-m` machine name plus the
/// collaborator that turns bytes into text.
pub struct DisasTarget<'d> {
    pub machine: String,
    pub disassembler: &'d dyn Disassembler,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fake;
    impl Disassembler for Fake {
        fn disassemble(&self, _m: &str, _be: bool, addr: u64, code: &[u8]) -> Result<String> {
            Ok(format!("{addr:x}: {} bytes\n", code.len()))
        }
    }

    #[test]
    fn vec_u8_is_a_sink() {
        let mut buf: Vec<u8> = Vec::new();
        buf.write_str("hello\n").unwrap();
        assert_eq!(buf, b"hello\n");
    }

    #[test]
    fn fake_disassembler_is_usable_through_the_trait() {
        let d = Fake;
        let out = d.disassemble("riscv:rv64", false, 0x1000, &[0, 1, 2, 3]).unwrap();
        assert_eq!(out, "1000: 4 bytes\n");
    }
}

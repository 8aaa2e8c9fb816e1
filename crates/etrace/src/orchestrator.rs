//! Pipeline sequencing: build the symbol store, open the trace input
//! (a file or a TCP accept-loop under `--server`), decode it against the
//! chosen wire format, then emit the chosen coverage report. Mirrors how
//! `rvr::commands::run_command` sequences a single CLI invocation end to
//! end, generalized here into the multi-stage etrace pipeline.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use etrace_cov::{CovFormat, ExcludeFilter, FileTable, GcovSession};
use etrace_elf::SymbolStore;
use etrace_trace::{
    BinaryDecodeOptions, BinaryDecoder, DisasTarget, Disassembler, HexDecoder, HexVariant,
    ObjdumpDisassembler, Sink, SimpleDecoder,
};

use crate::cli::{Cli, CoverageFormatArg, TraceInFormatArg, TraceOutFormatArg};
use crate::error::{Error, Result};

/// The host/guest disassembly collaborators for one pipeline run, built
/// once from `--objdump`/`--guest-objdump` and reused across every decoded
/// connection or file.
struct Disassemblers {
    host: ObjdumpDisassembler,
    guest: ObjdumpDisassembler,
}

impl Disassemblers {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            host: ObjdumpDisassembler { objdump_path: cli.objdump.clone() },
            guest: ObjdumpDisassembler {
                objdump_path: cli.guest_objdump.clone().unwrap_or_else(|| cli.objdump.clone()),
            },
        }
    }

    fn host_target(&self, cli: &Cli) -> Option<DisasTarget<'_>> {
        cli.machine.as_ref().map(|m| DisasTarget {
            machine: m.clone(),
            disassembler: &self.host as &dyn Disassembler,
        })
    }

    fn guest_target(&self, cli: &Cli) -> Option<DisasTarget<'_>> {
        cli.guest_machine.as_ref().map(|m| DisasTarget {
            machine: m.clone(),
            disassembler: &self.guest as &dyn Disassembler,
        })
    }
}

/// Runs the whole pipeline for one CLI invocation.
pub fn run(cli: &Cli) -> Result<()> {
    let wants_coverage = cli.coverage_format != CoverageFormatArg::None;

    let mut store = SymbolStore::run_nm(&cli.nm, &cli.elf)?;
    info!(symbols = store.len(), elf = %cli.elf.display(), "loaded symbol table");

    if wants_coverage {
        etrace_elf::build_linemap(&mut store, &cli.addr2line, &cli.elf)?;
    }

    let disas = Disassemblers::from_cli(cli);
    let mut trace_out = open_trace_output(&cli.trace_output, cli.trace_out_format)?;

    match &cli.server {
        Some(addr) => run_server(cli, addr, &mut store, trace_out.as_deref_mut(), &disas)?,
        None => {
            let Some(path) = &cli.trace else {
                return Err(Error::Usage("--trace is required unless --server is given".into()));
            };
            let mut file = File::open(path)?;
            decode_one(cli, &mut file, &mut store, trace_out.as_deref_mut(), &disas)?;
        }
    }

    if let Some(out) = trace_out.as_mut() {
        out.flush()?;
    }

    if wants_coverage {
        emit_coverage(cli, &store)?;
    }

    Ok(())
}

fn open_trace_output(spec: &str, format: TraceOutFormatArg) -> Result<Option<Box<dyn Write>>> {
    if format == TraceOutFormatArg::None || spec == "none" {
        return Ok(None);
    }
    if format == TraceOutFormatArg::Vcd {
        return Err(Error::Usage("vcd trace output is not implemented".into()));
    }
    if spec == "-" {
        return Ok(Some(Box::new(std::io::stdout())));
    }
    Ok(Some(Box::new(BufWriter::new(File::create(spec)?))))
}

/// Accepts connections on `addr` until `SIGINT`, decoding each one in turn
/// and folding its coverage into the shared `store`. Mirrors the original
/// tool's server mode, which kept listening across successive guest runs
/// instead of exiting after the first client disconnected.
fn run_server(
    cli: &Cli,
    addr: &str,
    store: &mut SymbolStore,
    mut sink: Option<&mut dyn Write>,
    disas: &Disassemblers,
) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })
        .map_err(|e| Error::Usage(format!("failed to install SIGINT handler: {e}")))?;
    }

    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    info!(%addr, "listening for trace connections");

    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((mut stream, peer)) => {
                info!(%peer, "accepted trace connection");
                stream.set_nonblocking(false)?;
                decode_one(cli, &mut stream, store, sink.as_deref_mut(), disas)?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(std::time::Duration::from_millis(50));
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn decode_one<R: std::io::Read>(
    cli: &Cli,
    reader: &mut R,
    store: &mut SymbolStore,
    sink: Option<&mut dyn Write>,
    disas: &Disassemblers,
) -> Result<()> {
    let coverage = cli.coverage_format != CoverageFormatArg::None;
    let mut sink: Option<&mut dyn Sink> = sink.map(|w| w as &mut dyn Sink);

    match cli.trace_in_format {
        TraceInFormatArg::Etrace => {
            let mut opts = BinaryDecodeOptions {
                coverage,
                sink: sink.take(),
                guest: disas.guest_target(cli),
                host: disas.host_target(cli),
            };
            BinaryDecoder::run(reader, store, &mut opts)?;
        }
        TraceInFormatArg::Simple => {
            SimpleDecoder::run(reader, store, coverage, sink.take())?;
        }
        TraceInFormatArg::AsciiHex => HexDecoder::run(reader, HexVariant::Raw, store, coverage, sink.take())?,
        TraceInFormatArg::AsciiHexLe16 => HexDecoder::run(reader, HexVariant::Le16, store, coverage, sink.take())?,
        TraceInFormatArg::AsciiHexLe32 => HexDecoder::run(reader, HexVariant::Le32, store, coverage, sink.take())?,
        TraceInFormatArg::AsciiHexLe64 => HexDecoder::run(reader, HexVariant::Le64, store, coverage, sink.take())?,
        TraceInFormatArg::AsciiHexBe16 => HexDecoder::run(reader, HexVariant::Be16, store, coverage, sink.take())?,
        TraceInFormatArg::AsciiHexBe32 => HexDecoder::run(reader, HexVariant::Be32, store, coverage, sink.take())?,
        TraceInFormatArg::AsciiHexBe64 => HexDecoder::run(reader, HexVariant::Be64, store, coverage, sink.take())?,
    }
    Ok(())
}

fn emit_coverage(cli: &Cli, store: &SymbolStore) -> Result<()> {
    let format: CovFormat = cli.coverage_format.into();

    match format {
        CovFormat::None => {}
        CovFormat::Etrace => {
            let mut out = require_output_file(cli, "etrace")?;
            etrace_cov::raw::dump(store, &mut out)?;
        }
        CovFormat::Cachegrind => {
            let mut out = require_output_file(cli, "cachegrind")?;
            etrace_cov::cachegrind::dump(store, &mut out)?;
        }
        CovFormat::Lcov => {
            let mut out = require_output_file(cli, "lcov")?;
            let table = FileTable::build(store);
            let exclude = match &cli.exclude {
                Some(path) => ExcludeFilter::load(path)?,
                None => ExcludeFilter::empty(),
            };
            etrace_cov::lcov::emit(&table, &exclude, &mut out)?;
        }
        CovFormat::Qcov => {
            let Some(dir) = &cli.coverage_output else {
                return Err(Error::Usage("--coverage-output (a directory) is required for qcov".into()));
            };
            let table = FileTable::build(store);
            etrace_cov::qcov::emit(&table, Path::new(dir), cli.gcov_strip.as_deref(), cli.gcov_prefix.as_deref())?;
        }
        CovFormat::Gcov => {
            if cli.coverage_output.is_some() {
                warn!("--coverage-output is ignored for gcov; .gcda files are written next to each .gcno");
            }
            let mut session = GcovSession::new();
            session.emit_all(store, cli.gcov_strip.as_deref(), cli.gcov_prefix.as_deref())?;
        }
    }
    Ok(())
}

fn require_output_file(cli: &Cli, format: &str) -> Result<Box<dyn Write>> {
    match &cli.coverage_output {
        Some(path) if path == "-" => Ok(Box::new(std::io::stdout())),
        Some(path) => Ok(Box::new(BufWriter::new(File::create(path)?))),
        None => Err(Error::Usage(format!("--coverage-output is required for {format}"))),
    }
}

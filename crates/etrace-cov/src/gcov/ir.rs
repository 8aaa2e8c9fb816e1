//! Parsed GCNO record state, mirroring `struct gcov_record_ir` and its
//! `gcov_parse_*_record` builders.

use crate::error::{CovError, Result};
use crate::gcov::wire::{GCOV_VERSION_CFG_CSUM, Summary};

#[derive(Debug, Clone, Default)]
pub struct Function {
    pub ident: u32,
    pub csum: u32,
    pub cfg_csum: u32,
    pub name: String,
    pub source: String,
    pub lineno: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Blocks {
    pub flags: Vec<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct Arc {
    pub dest_block: u32,
    pub flags: u32,
}

#[derive(Debug, Clone)]
pub struct Arcs {
    pub block_no: u32,
    pub arcs: Vec<Arc>,
}

#[derive(Debug, Clone)]
pub struct LineEntry {
    pub lineno: u32,
    pub filename: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Lines {
    pub block_no: u32,
    pub lines: Vec<LineEntry>,
}

/// Per-function parse state accumulated across a `FUNCTION` record and the
/// `BLOCKS`/`ARCS`/`LINES` records that follow it, flushed once the function
/// is fully processed. Mirrors `gcov_record_ir`.
#[derive(Debug, Clone, Default)]
pub struct RecordIr {
    pub func: Function,
    pub blocks: Blocks,
    pub arcs: Vec<Arcs>,
    pub lines: Vec<Lines>,
}

/// Reads one gcov-encoded string: a word count followed by that many
/// 4-byte words holding the nul-terminated (and nul-padded) text. A word
/// count of 0 means an empty string. Returns the string and the new cursor.
fn read_string(words: &[u32], mut pos: usize) -> Result<(String, usize)> {
    let len = *words
        .get(pos)
        .ok_or_else(|| CovError::MalformedRecord("truncated string length".into()))?;
    pos += 1;
    if len == 0 {
        return Ok((String::new(), pos));
    }
    let len = len as usize;
    let bytes: Vec<u8> = words
        .get(pos..pos + len)
        .ok_or_else(|| CovError::MalformedRecord("truncated string body".into()))?
        .iter()
        .flat_map(|w| w.to_ne_bytes())
        .collect();
    let nul = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let s = String::from_utf8_lossy(&bytes[..nul]).into_owned();
    Ok((s, pos + len))
}

pub fn parse_func_record(words: &[u32], file_version: u32) -> Result<Function> {
    let mut pos = 0;
    let next = |pos: &mut usize| -> Result<u32> {
        let v = *words
            .get(*pos)
            .ok_or_else(|| CovError::MalformedRecord("truncated function record".into()))?;
        *pos += 1;
        Ok(v)
    };

    let ident = next(&mut pos)?;
    let csum = next(&mut pos)?;
    let cfg_csum = if file_version >= GCOV_VERSION_CFG_CSUM {
        next(&mut pos)?
    } else {
        0
    };

    let (name, p) = read_string(words, pos)?;
    pos = p;
    let (source, p) = read_string(words, pos)?;
    pos = p;
    let lineno = next(&mut pos)?;

    Ok(Function {
        ident,
        csum,
        cfg_csum,
        name,
        source,
        lineno,
    })
}

pub fn parse_block_record(words: &[u32]) -> Blocks {
    Blocks {
        flags: words.to_vec(),
    }
}

pub fn parse_arcs_record(words: &[u32]) -> Result<Arcs> {
    if words.is_empty() {
        return Err(CovError::MalformedRecord("empty arcs record".into()));
    }
    let block_no = words[0];
    let mut arcs = Vec::new();
    let mut pos = 1;
    while pos + 1 < words.len() + 1 && pos < words.len() {
        if pos + 1 >= words.len() {
            break;
        }
        arcs.push(Arc {
            dest_block: words[pos],
            flags: words[pos + 1],
        });
        pos += 2;
    }
    Ok(Arcs { block_no, arcs })
}

pub fn parse_lines_record(words: &[u32]) -> Result<Lines> {
    if words.is_empty() {
        return Err(CovError::MalformedRecord("empty lines record".into()));
    }
    let block_no = words[0];
    let mut pos = 1;
    let mut lines = Vec::new();
    let mut current_name: Option<String> = None;

    while pos < words.len() {
        let lineno = words[pos];
        pos += 1;
        if lineno == 0 {
            let (name, p) = read_string(words, pos)?;
            pos = p;
            if name.is_empty() {
                break;
            }
            current_name = Some(name);
            continue;
        }
        lines.push(LineEntry {
            lineno,
            filename: current_name.clone(),
        });
    }
    Ok(Lines { block_no, lines })
}

pub fn parse_summary(words: &[u32]) -> Summary {
    Summary::from_words(words)
}

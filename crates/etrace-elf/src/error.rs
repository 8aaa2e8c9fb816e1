use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building or querying the symbol store.
#[derive(Error, Debug)]
pub enum ElfError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to spawn `{cmd}`: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{cmd}` exited with status {status}")]
    ChildFailed { cmd: String, status: String },
    #[error("malformed nm output at byte offset {offset}")]
    MalformedNm { offset: usize },
    #[error("malformed addr2line output line: {0:?}")]
    MalformedLinemap(String),
    #[error("no symbols found in nm output for {0}")]
    NoSymbols(PathBuf),
}

pub type Result<T> = std::result::Result<T, ElfError>;

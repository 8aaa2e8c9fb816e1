use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CovError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed gcov record: {0}")]
    MalformedRecord(String),
    #[error("unexpected gcov tag {tag:#x}")]
    UnexpectedTag { tag: u32 },
    #[error("{0} has no usable source-file mapping (strip prefix doesn't match)")]
    UnmappableSourceFile(PathBuf),
    #[error("failed to open exclude file {path}: {source}")]
    ExcludeFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, CovError>;

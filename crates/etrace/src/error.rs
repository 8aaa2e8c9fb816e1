use thiserror::Error;

/// Top-level pipeline errors, composing the library crates' error types the
/// same way `rvr::Error` composes `rvr_elf::ElfError`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Elf(#[from] etrace_elf::ElfError),
    #[error(transparent)]
    Trace(#[from] etrace_trace::TraceError),
    #[error(transparent)]
    Cov(#[from] etrace_cov::CovError),
    #[error("usage error: {0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, Error>;

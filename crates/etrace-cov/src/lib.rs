//! Coverage emitters: the raw `etrace` dump, Cachegrind-style per-function
//! totals, QCOV annotated source, LCOV `.info` tracefiles, and the
//! GCNO -> GCDA (GCOV) reproduction. All consume an [`etrace_elf::SymbolStore`]
//! after a trace has been fully decoded; nothing here reads the trace stream
//! itself.

pub mod cachegrind;
mod error;
pub mod exclude;
pub mod file_table;
mod format;
pub mod gcov;
pub mod lcov;
pub mod pathmap;
pub mod qcov;
pub mod raw;

pub use error::{CovError, Result};
pub use exclude::ExcludeFilter;
pub use file_table::FileTable;
pub use format::CovFormat;
pub use gcov::GcovSession;

//! GCNO -> GCDA reproduction: the GCOV coverage-format emitter.
//!
//! `wire` carries the on-disk constants/structs (`cov-gcov.h` in the
//! original), `ir` parses one record's payload into the in-memory shape
//! `gcov_record_ir` accumulates, and `transform` drives the read-one-write-one
//! pass described in spec §4.6, including the fabricated trailing summaries
//! and the prologue counter convention.

pub mod ir;
mod transform;
pub mod wire;

pub use transform::GcovSession;

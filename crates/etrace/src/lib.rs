//! Trace decoder and coverage attribution pipeline for emulator execution
//! traces. The binary target (`main.rs`) is a thin CLI wrapper around
//! [`orchestrator::run`]; the library is split out so integration tests can
//! drive the pipeline without spawning a subprocess, the way `rvr`'s crate
//! exposes `commands`/`metrics` for its own binary to call into.

pub mod cli;
pub mod error;
pub mod orchestrator;

pub use error::{Error, Result};

//! Shared plumbing for Lumen crates: logging bootstrap and command-line arguments.

pub mod cli;
pub mod log;

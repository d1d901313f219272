//! Profile export
//!
//! This module provides functionality for writing assembled profiles to disk.
//! Currently supports the pprof format (`go tool pprof`, Parca, Pyroscope).

pub mod pprof;
pub mod proto;

pub use pprof::{encode_profile, read_profile, write_profile};

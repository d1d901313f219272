//! Command-line interface

pub mod args;

pub use args::{parse_address, Addr2FuncArgs, Args, Command, RecordArgs, ReportArgs};

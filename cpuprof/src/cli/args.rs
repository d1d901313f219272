//! CLI argument definitions

use clap::{Args as ClapArgs, Parser, Subcommand};
use cpuprof_common::DEFAULT_SAMPLE_FREQUENCY;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cpuprof",
    version,
    about = "Sample CPU stacks of a process with eBPF and write a pprof profile",
    after_help = "\
EXAMPLES:
    sudo cpuprof record my-app                       Auto-detect PID and binary
    sudo cpuprof record --pid 1234 --duration 30     Explicit PID, 30s profile
    cpuprof addr2func --path ./fib --addr 0x401126   Resolve one address
    cpuprof report cpu.pprof                         Summarize a profile"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Profile a running process and write a pprof file
    Record(RecordArgs),

    /// Resolve an address to the enclosing function name
    Addr2func(Addr2FuncArgs),

    /// Print the top functions of a pprof file
    Report(ReportArgs),
}

#[derive(ClapArgs)]
pub struct RecordArgs {
    /// Process name to profile (auto-detects PID and binary)
    #[arg(value_name = "PROCESS")]
    pub process: Option<String>,

    /// Process ID to profile (binary path auto-detected from /proc)
    #[arg(short, long)]
    pub pid: Option<u32>,

    /// Path to binary for symbol resolution (optional, auto-detected if omitted)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Stop after N seconds
    #[arg(short, long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    pub duration: u64,

    /// Where to write the profile
    #[arg(short, long, value_name = "FILE", default_value = "cpu.pprof")]
    pub output: PathBuf,

    /// Samples per second of CPU time
    #[arg(short, long, default_value_t = DEFAULT_SAMPLE_FREQUENCY,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub frequency: u64,

    /// Write raw addresses only
    #[arg(long)]
    pub no_symbolize: bool,

    /// Functions to list in the summary (0 = none)
    #[arg(long, default_value = "10")]
    pub top: usize,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(ClapArgs)]
pub struct Addr2FuncArgs {
    /// ELF executable with a symbol table
    #[arg(long)]
    pub path: PathBuf,

    /// Sampled instruction address (hex with 0x, or decimal)
    #[arg(long, value_parser = parse_address)]
    pub addr: u64,

    /// Start of the executable mapping in the process
    #[arg(long, value_parser = parse_address, default_value = "0x401000")]
    pub memory_start: u64,

    /// File offset of the executable mapping
    #[arg(long, value_parser = parse_address, default_value = "0x1000")]
    pub file_offset: u64,
}

#[derive(ClapArgs)]
pub struct ReportArgs {
    /// pprof file, gzip-compressed or raw
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Functions to list
    #[arg(long, default_value = "10")]
    pub top: usize,
}

/// Parse `0x`-prefixed hex or plain decimal
///
/// # Errors
/// Returns a message suitable for clap when the value is not a number
pub fn parse_address(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address {s:?}: {e}"))
}

//! # cpuprof - eBPF-based CPU Profiler
//!
//! cpuprof samples the call stacks of a running process at a fixed frequency
//! using a BPF program attached to perf events, and writes the result as a
//! pprof profile readable by `go tool pprof`, Parca or Pyroscope.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Target Process                            │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ CPU clock, N Hz per CPU
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     eBPF Program (Kernel)                       │
//! │  • Perf Event: do_sample                                        │
//! │  • STACK_TRACES: stack id → instruction pointers                │
//! │  • COUNTS: (pid, user stack, kernel stack) → samples            │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ maps read once sampling stops
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    cpuprof (This Crate)                         │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │  Profiling   │──▶│ Symbolization│──▶│    Export    │         │
//! │  │  (assembly)  │   │  (.symtab)   │   │ (pprof.gz)   │         │
//! │  └──────────────┘   └──────────────┘   └──────┬───────┘         │
//! │                                               ▼                 │
//! │                                        ┌──────────────┐         │
//! │                                        │   Analysis   │         │
//! │                                        │  (top-N)     │         │
//! │                                        └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`profiling`]: eBPF program management and profile assembly
//!   - `ebpf_setup`: Load the sampler and attach it to every online CPU
//!   - `sample_table`: Read-only views of the counts and stack trace maps
//!   - `profile_builder`: Turn counts and stacks into samples, locations, mappings
//!
//! - [`symbolization`]: Convert raw addresses to function names
//!   - Binary search over the ELF `.symtab`
//!   - Handles PIE (Position Independent Executable) address adjustment
//!
//! - [`export`]: gzip-compressed pprof encoding via `prost`
//!
//! - [`analysis`]: Flat and cumulative function totals of a profile
//!
//! - [`cli`]: Command-line argument parsing
//!
//! - [`domain`]: Core domain types (Pid, StackId, CpuId) and errors
//!
//! ## Typical Usage
//!
//! ```bash
//! # Profile a running process for 10 seconds
//! sudo ./cpuprof record --pid <PID> --output cpu.pprof
//!
//! # Inspect the result
//! ./cpuprof report cpu.pprof
//! go tool pprof -top cpu.pprof
//!
//! # Resolve a single address of a non-PIE binary
//! ./cpuprof addr2func --path ./fib --addr 0x401126
//! ```
//!
//! ## Key Concepts
//!
//! - **eBPF**: Linux kernel technology for safe, high-performance instrumentation
//! - **Perf Events**: Kernel timers that fire the sampler on each CPU
//! - **Stack Traces**: Call chain captured via kernel's `bpf_get_stackid()`
//! - **PIE/ASLR**: Position-independent executables require address relocation
//! - **pprof**: Protocol buffer profile format shared by Go and most profilers

// Expose modules for testing
pub mod analysis;
pub mod cli;
pub mod domain;
pub mod export;
pub mod preflight;
pub mod process_lookup;
pub mod profiling;
pub mod symbolization;

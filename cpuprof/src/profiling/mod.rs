//! Profiling core modules
//!
//! - Loading the sampler and attaching it to perf events
//! - Read-only views of the sampler's counts and stack trace maps
//! - Profile assembly from those maps
//! - CPU utilities and post-run diagnostics

pub mod cpu_utils;
pub mod diagnostics;
pub mod ebpf_setup;
pub mod profile;
pub mod profile_builder;
pub mod sample_table;

// Re-export common types
pub use cpu_utils::online_cpus;
pub use diagnostics::CaptureDiagnostics;
pub use ebpf_setup::{attach_sampler, init_ebpf_logger, load_ebpf_program, raise_memlock_rlimit};
pub use profile::{Profile, ProfileMeta};
pub use profile_builder::{build_profile, AssemblyReport, ProfileBuilder};
pub use sample_table::{decode_stack, CountsTable, StackTraceTable};

//! # eBPF Program Loading and Attachment
//!
//! Loads compiled eBPF bytecode and attaches the sampler to perf events.
//!
//! ## Functions
//!
//! - [`raise_memlock_rlimit()`] - Lift the locked memory limit for map allocation
//! - [`load_ebpf_program()`] - Load eBPF bytecode from embedded binary
//! - [`init_ebpf_logger()`] - Forward `aya-log` output from the kernel side
//! - [`attach_sampler()`] - Attach `do_sample` to a CPU clock on every online CPU
//!
//! ## Attachment Points
//!
//! - **Perf Event**: software `CPU_CLOCK`, frequency sampling, one event per
//!   online CPU restricted to the target process

use anyhow::{Context, Result};
use aya::{
    include_bytes_aligned,
    programs::{perf_event, PerfEvent},
    Ebpf,
};
use aya_log::EbpfLogger;
use cpuprof_common::SAMPLE_PROGRAM;
use log::{debug, info, warn};

use crate::domain::{Pid, ProfilerError};
use crate::profiling::online_cpus;

/// Remove the `RLIMIT_MEMLOCK` ceiling
///
/// Kernels before 5.11 charge BPF maps against locked memory, and the default
/// limit is too small for a 10240-entry counts map. Failure is logged, not fatal.
pub fn raise_memlock_rlimit() {
    let rlim = libc::rlimit { rlim_cur: libc::RLIM_INFINITY, rlim_max: libc::RLIM_INFINITY };
    // SAFETY: setrlimit only reads the struct we pass
    #[allow(unsafe_code)]
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        warn!("Failed to remove limit on locked memory (setrlimit returned {ret})");
    } else {
        debug!("RLIMIT_MEMLOCK set to infinity");
    }
}

/// Load the eBPF program binary
///
/// Always uses the release build because debug builds with recent Rust nightlies (1.94+)
/// pull in formatting code (`LowerHex`) that's incompatible with BPF. The release build
/// uses LTO to eliminate dead code. eBPF programs are small and compile fast in release.
///
/// # Errors
/// Returns an error if the eBPF program binary cannot be loaded
pub fn load_ebpf_program() -> Result<Ebpf, ProfilerError> {
    let bpf =
        Ebpf::load(include_bytes_aligned!("../../../target/bpfel-unknown-none/release/cpuprof"))?;
    Ok(bpf)
}

/// Initialize eBPF logger
pub fn init_ebpf_logger(bpf: &mut Ebpf) {
    if let Err(e) = EbpfLogger::init(bpf) {
        warn!("Failed to initialize eBPF logger: {e}");
    }
}

/// Attach the stack sampler to every online CPU
///
/// Samples `pid` at `frequency` Hz of CPU time. Returns the number of CPUs
/// the sampler was attached to.
///
/// # Errors
/// Returns an error if the program is missing, fails verification, or any
/// perf event cannot be opened
pub fn attach_sampler(bpf: &mut Ebpf, pid: Pid, frequency: u64) -> Result<usize> {
    let program: &mut PerfEvent = bpf
        .program_mut(SAMPLE_PROGRAM)
        .with_context(|| format!("{SAMPLE_PROGRAM} program not found"))?
        .try_into()?;
    program.load()?;

    let cpus = online_cpus()?;
    info!("Attaching perf_event sampler to {} CPUs at {frequency} Hz ({pid})", cpus.len());
    for cpu in &cpus {
        program
            .attach(
                perf_event::PerfTypeId::Software,
                perf_event::perf_sw_ids::PERF_COUNT_SW_CPU_CLOCK as u64,
                perf_event::PerfEventScope::OneProcessOneCpu { cpu: cpu.0, pid: pid.0 },
                perf_event::SamplePolicy::Frequency(frequency),
                false,
            )
            .with_context(|| format!("Failed to open perf event on {cpu}"))?;
    }
    info!("✓ Attached perf_event sampler to {} CPUs", cpus.len());

    Ok(cpus.len())
}

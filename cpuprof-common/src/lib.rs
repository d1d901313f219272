//! # Shared Data Structures (eBPF ↔ Userspace)
//!
//! Defines the map key layout and constants shared between the kernel-side
//! sampler and userspace. All types use `#[repr(C)]` so both sides agree on
//! the layout of the `COUNTS` map key.
//!
//! ## Maps
//!
//! - `COUNTS` - `StackCountKey` → number of times the key was sampled
//! - `STACK_TRACES` - stack id → `[u64; MAX_STACK_DEPTH]` instruction pointers

#![no_std]

/// Maximum number of stack frames captured per stack
///
/// Kernel eBPF programs are limited to 127 frames due to verifier constraints
/// (`perf_event_max_stack` default).
pub const MAX_STACK_DEPTH: usize = 127;

/// Maximum number of distinct stacks buffered in `STACK_TRACES`
pub const MAX_STACK_ADDRESSES: u32 = 1024;

/// Maximum number of distinct `(pid, user stack, kernel stack)` keys in `COUNTS`
pub const MAX_COUNT_ENTRIES: u32 = 10240;

/// Name of the counts map in the eBPF object
pub const COUNTS_MAP: &str = "COUNTS";

/// Name of the stack trace map in the eBPF object
pub const STACK_TRACES_MAP: &str = "STACK_TRACES";

/// Name of the `perf_event` program in the eBPF object
pub const SAMPLE_PROGRAM: &str = "do_sample";

/// Default sampling frequency in Hz
pub const DEFAULT_SAMPLE_FREQUENCY: u64 = 100;

/// Key of the `COUNTS` map
///
/// One entry exists per distinct combination observed by the sampler. The
/// value is incremented atomically every time the combination is sampled.
///
/// **Stack ids**:
/// - Non-negative: valid id in `STACK_TRACES`
/// - Negative: `bpf_get_stackid()` failed (e.g. `-EFAULT`, `-ENOMEM`), no
///   addresses were recorded and the id must not be looked up
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct StackCountKey {
    /// Process ID (TGID in Linux terms)
    pub pid: u32,

    /// User-space stack id
    pub user_stack_id: i32,

    /// Kernel-space stack id
    pub kernel_stack_id: i32,
}

#[cfg(feature = "user")]
use aya::Pod;

// Required to use StackCountKey as an aya HashMap key
#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for StackCountKey {}

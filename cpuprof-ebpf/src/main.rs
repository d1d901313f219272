//! # eBPF Kernel-Side Sampler
//!
//! A `perf_event` program attached to the software CPU clock of every online
//! CPU. Each interrupt captures the user and kernel stacks of the running
//! thread and counts how many times each `(pid, user stack, kernel stack)`
//! combination was seen.
//!
//! ## Maps (Shared with Userspace)
//!
//! - `STACK_TRACES` - Deduplicated stack traces by ID
//! - `COUNTS` - `StackCountKey` → sample count
//!
//! ## Build
//!
//! Always compiled in release mode (debug includes incompatible formatting code):
//! ```bash
//! cargo xtask build-ebpf --release
//! ```

#![no_std]
#![no_main]
#![allow(unused_unsafe)]

use core::sync::atomic::{AtomicU64, Ordering};

use aya_ebpf::{
    bindings::BPF_NOEXIST,
    helpers::bpf_get_current_pid_tgid,
    macros::{map, perf_event},
    maps::{HashMap, StackTrace},
    programs::PerfEventContext,
};
use aya_log_ebpf::debug;
use cpuprof_common::{StackCountKey, MAX_COUNT_ENTRIES, MAX_STACK_ADDRESSES};

/// Stack capture flag for `bpf_get_stackid`: capture the user-space stack
const BPF_F_USER_STACK: u64 = 0x100;

/// Stack trace map holding arrays of instruction pointers by stack id
///
/// e.g. `STACK_TRACES[1253] = [0xdeadbeef, 0x123abcde, 0, ...]`
#[map]
static STACK_TRACES: StackTrace = StackTrace::with_max_entries(MAX_STACK_ADDRESSES, 0);

/// How many times each stack combination has been seen
///
/// e.g. `COUNTS[{10342, 1253, 234}] = 45`
#[map]
static COUNTS: HashMap<StackCountKey, u64> = HashMap::with_max_entries(MAX_COUNT_ENTRIES, 0);

/// CPU sampling hook, fired by the per-CPU software clock
#[perf_event]
pub fn do_sample(ctx: PerfEventContext) -> u32 {
    match try_do_sample(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn try_do_sample(ctx: &PerfEventContext) -> Result<(), i64> {
    let pid_tgid = unsafe { bpf_get_current_pid_tgid() };
    let tgid = (pid_tgid >> 32) as u32;
    let tid = pid_tgid as u32;

    // Idle task
    if tid == 0 {
        return Ok(());
    }

    // Negative ids are kept in the key so userspace can count failed captures
    let user_stack_id =
        unsafe { STACK_TRACES.get_stackid(ctx, BPF_F_USER_STACK).unwrap_or_else(|e| e) } as i32;
    let kernel_stack_id = unsafe { STACK_TRACES.get_stackid(ctx, 0).unwrap_or_else(|e| e) } as i32;

    let key = StackCountKey { pid: tgid, user_stack_id, kernel_stack_id };

    let seen = match COUNTS.get_ptr_mut(&key) {
        Some(seen) => seen,
        None => {
            // Another CPU may have inserted the key in between, BPF_NOEXIST keeps its count
            let zero = 0u64;
            let _ = COUNTS.insert(&key, &zero, u64::from(BPF_NOEXIST));
            match COUNTS.get_ptr_mut(&key) {
                Some(seen) => seen,
                None => {
                    debug!(ctx, "counts map full, dropping sample for pid {}", tgid);
                    return Err(1);
                }
            }
        }
    };

    // SAFETY: the pointer comes from a live map entry and is suitably aligned for u64
    unsafe { AtomicU64::from_ptr(seen).fetch_add(1, Ordering::Relaxed) };

    Ok(())
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 4] = *b"GPL\0";

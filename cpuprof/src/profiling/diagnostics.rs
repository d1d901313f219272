//! Health of the sampler's maps after a run
//!
//! Stack ids recorded by the kernel carry a negative errno when capture
//! failed. Counting them per errno tells apart a process whose frames could
//! not be walked (`EFAULT`) from a stack map that ran out of room
//! (`ENOMEM`/`EEXIST` collisions).

use cpuprof_common::{StackCountKey, MAX_COUNT_ENTRIES};
use std::collections::BTreeMap;

use crate::domain::StackId;
use crate::profiling::sample_table::CountsTable;

/// Summary of the counts map
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CaptureDiagnostics {
    pub keys: usize,
    pub samples: u64,
    /// errno → samples whose user stack capture failed with it
    pub user_stack_errors: BTreeMap<i32, u64>,
    /// errno → samples whose kernel stack capture failed with it
    pub kernel_stack_errors: BTreeMap<i32, u64>,
    /// Entries that could not be read
    pub unreadable: usize,
}

impl CaptureDiagnostics {
    /// Scan every entry of `counts`
    pub fn collect<C: CountsTable + ?Sized>(counts: &C) -> Self {
        let mut diag = Self::default();
        for entry in counts.entries() {
            match entry {
                Ok((key, count)) => diag.record(&key, count),
                Err(_) => diag.unreadable += 1,
            }
        }
        diag
    }

    fn record(&mut self, key: &StackCountKey, count: u64) {
        self.keys += 1;
        self.samples = self.samples.saturating_add(count);
        if !StackId(key.user_stack_id).is_valid() {
            *self.user_stack_errors.entry(key.user_stack_id.saturating_neg()).or_insert(0) += count;
        }
        if !StackId(key.kernel_stack_id).is_valid() {
            *self.kernel_stack_errors.entry(key.kernel_stack_id.saturating_neg()).or_insert(0) += count;
        }
    }

    /// The counts map is full, so new stacks were dropped in the kernel
    #[must_use]
    pub fn counts_map_full(&self) -> bool {
        self.keys + self.unreadable >= MAX_COUNT_ENTRIES as usize
    }

    /// Print to stderr
    pub fn print(&self) {
        eprintln!("sampler: {} samples in {} stacks", self.samples, self.keys);
        for (errno, count) in &self.user_stack_errors {
            eprintln!("  user stack failed ({}): {count} samples", errno_name(*errno));
        }
        for (errno, count) in &self.kernel_stack_errors {
            eprintln!("  kernel stack failed ({}): {count} samples", errno_name(*errno));
        }
        if self.unreadable > 0 {
            eprintln!("  unreadable entries: {}", self.unreadable);
        }
        if self.counts_map_full() {
            eprintln!("  counts map full ({MAX_COUNT_ENTRIES} entries), later stacks were dropped");
        }
    }
}

fn errno_name(errno: i32) -> String {
    match errno {
        libc::EFAULT => "EFAULT".to_string(),
        libc::EEXIST => "EEXIST".to_string(),
        libc::ENOMEM => "ENOMEM".to_string(),
        libc::ENOENT => "ENOENT".to_string(),
        other => format!("errno {other}"),
    }
}

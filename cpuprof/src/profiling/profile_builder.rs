//! Profile assembly from the sampler's counts and stack trace tables
//!
//! Each distinct `(pid, user stack, kernel stack)` key becomes one
//! [`Sample`]. Addresses become [`Location`]s, created once per
//! `(pid, address)` and shared by every sample that revisits them.
//!
//! Failures on a single key (missing stack, failed capture, unmapped
//! address) are recorded in the [`AssemblyReport`] and never abort the
//! pass: a partial profile is more useful than none.

use cpuprof_common::StackCountKey;
use log::{debug, warn};
use std::collections::HashMap;

use crate::domain::{AssemblyWarning, Pid, StackId};
use crate::profiling::profile::{Location, Mapping, Profile, ProfileMeta, Sample};
use crate::profiling::sample_table::{decode_stack, CountsTable, StackTraceTable};
use crate::symbolization::MemoryMapping;

/// Key of the location deduplication table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LocationKey {
    pid: Pid,
    addr: u64,
}

/// A location whose mapping id is not yet known
#[derive(Debug, Clone, Copy)]
struct PendingLocation {
    address: u64,
    /// Index into the mapping list
    mapping: Option<usize>,
}

/// What happened during one assembly pass
#[derive(Debug, Default)]
pub struct AssemblyReport {
    /// Entries read from the counts table
    pub keys_seen: usize,
    pub samples_emitted: usize,
    pub warnings: Vec<AssemblyWarning>,
}

impl AssemblyReport {
    /// Keys that produced no sample
    #[must_use]
    pub fn keys_skipped(&self) -> usize {
        self.keys_seen - self.samples_emitted
    }

    fn record(&mut self, warning: AssemblyWarning) {
        warn!("{warning}");
        self.warnings.push(warning);
    }
}

/// Builds a [`Profile`] for one profiling pass
pub struct ProfileBuilder {
    meta: ProfileMeta,
    mappings: Vec<MemoryMapping>,
    locations: Vec<PendingLocation>,
    /// `(pid, addr)` → index into `locations`
    location_indices: HashMap<LocationKey, usize>,
    samples: Vec<Sample>,
    report: AssemblyReport,
}

impl ProfileBuilder {
    /// Start a pass over a process with the given executable mappings
    #[must_use]
    pub fn new(mappings: Vec<MemoryMapping>, meta: ProfileMeta) -> Self {
        Self {
            meta,
            mappings,
            locations: Vec::new(),
            location_indices: HashMap::new(),
            samples: Vec::new(),
            report: AssemblyReport::default(),
        }
    }

    /// Add every entry of `counts`
    pub fn add_samples<C, S>(&mut self, counts: &C, stacks: &S)
    where
        C: CountsTable + ?Sized,
        S: StackTraceTable + ?Sized,
    {
        for entry in counts.entries() {
            match entry {
                Ok((key, count)) => self.add_sample(key, count, stacks),
                Err(e) => self.report.record(AssemblyWarning::CountsIteration(e)),
            }
        }
    }

    /// Add one counts entry
    pub fn add_sample<S>(&mut self, key: StackCountKey, count: u64, stacks: &S)
    where
        S: StackTraceTable + ?Sized,
    {
        self.report.keys_seen += 1;

        let pid = Pid(key.pid);
        let user_stack_id = StackId(key.user_stack_id);
        let kernel_stack_id = StackId(key.kernel_stack_id);
        debug!("{pid} user={user_stack_id} kernel={kernel_stack_id} seen {count} times");

        if !user_stack_id.is_valid() {
            self.report
                .record(AssemblyWarning::UserStackMissing { pid, stack_id: user_stack_id });
            return;
        }

        let raw = match stacks.lookup(user_stack_id) {
            Ok(raw) => raw,
            Err(source) => {
                self.report.record(AssemblyWarning::UserStackLookup {
                    pid,
                    stack_id: user_stack_id,
                    source,
                });
                return;
            }
        };
        let user_frames = match decode_stack(&raw) {
            Ok(frames) => frames,
            Err(source) => {
                self.report.record(AssemblyWarning::UserStackDecode {
                    pid,
                    stack_id: user_stack_id,
                    source,
                });
                return;
            }
        };
        debug!("\t{user_stack_id} {user_frames:x?}");

        // Kernel frames are only reported; the sample keeps its user frames either way
        if kernel_stack_id.is_valid() {
            self.inspect_kernel_stack(pid, kernel_stack_id, stacks);
        }

        let location_ids = user_frames.iter().map(|&addr| self.location_id(pid, addr)).collect();

        self.samples.push(Sample {
            value: vec![i64::try_from(count).unwrap_or(i64::MAX)],
            location_ids,
        });
        self.report.samples_emitted += 1;
    }

    fn inspect_kernel_stack<S>(&mut self, pid: Pid, stack_id: StackId, stacks: &S)
    where
        S: StackTraceTable + ?Sized,
    {
        match stacks.lookup(stack_id) {
            Ok(raw) => match decode_stack(&raw) {
                Ok(frames) => debug!("\t{stack_id} {frames:x?}"),
                Err(source) => {
                    self.report.record(AssemblyWarning::KernelStackDecode { pid, stack_id, source });
                }
            },
            Err(source) => {
                self.report.record(AssemblyWarning::KernelStackLookup { pid, stack_id, source });
            }
        }
    }

    /// Id of the location for `(pid, addr)`, creating it on first sight
    fn location_id(&mut self, pid: Pid, addr: u64) -> u64 {
        let key = LocationKey { pid, addr };
        let index = if let Some(&index) = self.location_indices.get(&key) {
            index
        } else {
            let mapping = self.mapping_for_addr(addr);
            if mapping.is_none() {
                self.report.record(AssemblyWarning::UnmappedAddress { pid, addr });
            }
            let index = self.locations.len();
            self.locations.push(PendingLocation { address: addr, mapping });
            self.location_indices.insert(key, index);
            index
        };
        index as u64 + 1
    }

    /// First mapping, in list order, containing `addr`
    fn mapping_for_addr(&self, addr: u64) -> Option<usize> {
        self.mappings.iter().position(|m| m.contains(addr))
    }

    /// Assign mapping ids in list order and return the profile
    #[must_use]
    pub fn finish(self) -> (Profile, AssemblyReport) {
        let mut profile = Profile::new(&self.meta);

        // pprof requires mapping ids to start at 1
        profile.mappings = self
            .mappings
            .iter()
            .enumerate()
            .map(|(index, m)| Mapping::from_memory_mapping(index, m))
            .collect();

        profile.locations = self
            .locations
            .iter()
            .enumerate()
            .map(|(index, loc)| Location {
                id: index as u64 + 1,
                address: loc.address,
                mapping_id: loc.mapping.map(|m| profile.mappings[m].id),
                function_id: None,
            })
            .collect();

        profile.samples = self.samples;

        (profile, self.report)
    }
}

/// Assemble a profile from the sampler's tables in one pass
pub fn build_profile<C, S>(
    counts: &C,
    stacks: &S,
    mappings: Vec<MemoryMapping>,
    meta: ProfileMeta,
) -> (Profile, AssemblyReport)
where
    C: CountsTable + ?Sized,
    S: StackTraceTable + ?Sized,
{
    let mut builder = ProfileBuilder::new(mappings, meta);
    builder.add_samples(counts, stacks);
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn meta() -> ProfileMeta {
        ProfileMeta::cpu(0, Duration::from_secs(10), 100)
    }

    fn key(user_stack_id: i32, kernel_stack_id: i32) -> StackCountKey {
        StackCountKey { pid: 4242, user_stack_id, kernel_stack_id }
    }

    fn mapping(start: u64, limit: u64, file: &str) -> MemoryMapping {
        MemoryMapping { start, limit, offset: 0x1000, file: file.to_string() }
    }

    #[test]
    fn test_locations_are_shared_between_samples() {
        let stacks: HashMap<u32, Vec<u64>> = HashMap::from([
            (1u32, vec![0x40_1010, 0x40_1000, 0]),
            (2u32, vec![0x40_1020, 0x40_1000, 0]),
        ]);
        let mut builder =
            ProfileBuilder::new(vec![mapping(0x40_1000, 0x40_2000, "/bin/fib")], meta());
        builder.add_sample(key(1, -1), 3, &stacks);
        builder.add_sample(key(2, -1), 5, &stacks);
        let (profile, report) = builder.finish();

        assert_eq!(report.samples_emitted, 2);
        assert_eq!(profile.locations.len(), 3);
        assert_eq!(profile.samples[0].location_ids, vec![1, 2]);
        assert_eq!(profile.samples[1].location_ids, vec![3, 2]);
        assert_eq!(profile.samples[0].value, vec![3]);
        assert_eq!(profile.samples[1].value, vec![5]);
    }

    #[test]
    fn test_same_address_in_different_processes() {
        let stacks: HashMap<u32, Vec<u64>> = HashMap::from([(1u32, vec![0x40_1010])]);
        let mut builder = ProfileBuilder::new(Vec::new(), meta());
        for pid in [1, 2] {
            builder.add_sample(StackCountKey { pid, user_stack_id: 1, kernel_stack_id: -1 }, 1, &stacks);
        }
        let (profile, _) = builder.finish();

        assert_eq!(profile.locations.len(), 2);
    }

    #[test]
    fn test_negative_user_stack_is_skipped() {
        let stacks: HashMap<u32, Vec<u64>> = HashMap::new();
        let mut builder = ProfileBuilder::new(Vec::new(), meta());
        builder.add_sample(key(-14, 3), 9, &stacks);
        let (profile, report) = builder.finish();

        assert!(profile.samples.is_empty());
        assert_eq!(report.keys_skipped(), 1);
        assert!(matches!(
            report.warnings.as_slice(),
            [AssemblyWarning::UserStackMissing { stack_id: StackId(-14), .. }]
        ));
    }

    #[test]
    fn test_missing_user_stack_is_skipped() {
        let stacks: HashMap<u32, Vec<u64>> = HashMap::from([(1u32, vec![0x40_1010])]);
        let mut builder = ProfileBuilder::new(Vec::new(), meta());
        builder.add_sample(key(7, -1), 1, &stacks);
        builder.add_sample(key(1, -1), 1, &stacks);
        let (profile, report) = builder.finish();

        assert_eq!(profile.samples.len(), 1);
        assert!(matches!(report.warnings[0], AssemblyWarning::UserStackLookup { .. }));
    }

    #[test]
    fn test_kernel_stack_failure_keeps_sample() {
        let stacks: HashMap<u32, Vec<u64>> = HashMap::from([(1u32, vec![0x40_1010, 0])]);
        let mut builder = ProfileBuilder::new(Vec::new(), meta());
        builder.add_sample(key(1, 99), 2, &stacks);
        let (profile, report) = builder.finish();

        assert_eq!(profile.samples.len(), 1);
        assert_eq!(profile.samples[0].location_ids, vec![1]);
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, AssemblyWarning::KernelStackLookup { .. })));
    }

    #[test]
    fn test_kernel_frames_are_not_locations() {
        let stacks: HashMap<u32, Vec<u64>> = HashMap::from([
            (1u32, vec![0x40_1010, 0]),
            (2u32, vec![0xffff_ffff_8100_0000, 0]),
        ]);
        let mut builder = ProfileBuilder::new(Vec::new(), meta());
        builder.add_sample(key(1, 2), 1, &stacks);
        let (profile, _) = builder.finish();

        assert_eq!(profile.locations.len(), 1);
        assert_eq!(profile.locations[0].address, 0x40_1010);
    }

    #[test]
    fn test_unmapped_address_still_gets_location() {
        let stacks: HashMap<u32, Vec<u64>> = HashMap::from([(1u32, vec![0x40_1010, 0x7f00_0000_1000, 0])]);
        let mut builder =
            ProfileBuilder::new(vec![mapping(0x40_1000, 0x40_2000, "/bin/fib")], meta());
        builder.add_sample(key(1, -1), 1, &stacks);
        let (profile, report) = builder.finish();

        assert_eq!(profile.samples[0].location_ids, vec![1, 2]);
        assert_eq!(profile.locations[0].mapping_id, Some(1));
        assert_eq!(profile.locations[1].mapping_id, None);
        assert!(matches!(
            report.warnings.as_slice(),
            [AssemblyWarning::UnmappedAddress { addr: 0x7f00_0000_1000, .. }]
        ));
    }

    #[test]
    fn test_first_matching_mapping_wins() {
        let stacks: HashMap<u32, Vec<u64>> = HashMap::from([(1u32, vec![0x40_2000])]);
        let mappings = vec![
            mapping(0x40_1000, 0x40_2000, "/bin/a"),
            mapping(0x40_2000, 0x40_3000, "/bin/b"),
        ];
        let mut builder = ProfileBuilder::new(mappings, meta());
        builder.add_sample(key(1, -1), 1, &stacks);
        let (profile, _) = builder.finish();

        assert_eq!(profile.locations[0].mapping_id, Some(1));
    }

    #[test]
    fn test_mapping_ids_follow_list_order() {
        let mappings = vec![
            mapping(0x7f00_0000_0000, 0x7f00_0010_0000, "/lib/libc.so.6"),
            mapping(0x40_1000, 0x40_2000, "/bin/fib"),
            mapping(0x7ffd_0000_0000, 0x7ffd_0000_2000, "[vdso]"),
        ];
        let counts: Vec<(StackCountKey, u64)> = Vec::new();
        let stacks: HashMap<u32, Vec<u64>> = HashMap::new();
        let (profile, _) = build_profile(&counts, &stacks, mappings, meta());

        let ids: Vec<u64> = profile.mappings.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(profile.mappings[1].filename, "/bin/fib");
    }

    #[test]
    fn test_large_count_saturates() {
        let stacks: HashMap<u32, Vec<u64>> = HashMap::from([(1u32, vec![0x40_1010])]);
        let mut builder = ProfileBuilder::new(Vec::new(), meta());
        builder.add_sample(key(1, -1), u64::MAX, &stacks);
        let (profile, _) = builder.finish();

        assert_eq!(profile.samples[0].value, vec![i64::MAX]);
    }
}

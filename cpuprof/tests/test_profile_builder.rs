use cpuprof::domain::AssemblyWarning;
use cpuprof::profiling::{build_profile, ProfileMeta};
use cpuprof::symbolization::{
    parse_memory_maps_str, symbolize_with_image, ElfImage, LoadSegment, Symbol,
};
use cpuprof_common::StackCountKey;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

const MAPS: &str = "\
55d0c0a00000-55d0c0a01000 r--p 00000000 fd:01 1234 /tmp/fib
55d0c0a01000-55d0c0a02000 r-xp 00001000 fd:01 1234 /tmp/fib
55d0c0c03000-55d0c0c24000 rw-p 00000000 00:00 0 [heap]
7f3a1c028000-7f3a1c1bd000 r-xp 00028000 fd:01 5678 /usr/lib/libc.so.6
7ffd5b1f8000-7ffd5b1fa000 r-xp 00000000 00:00 0 [vdso]
";

fn fib_image() -> ElfImage {
    ElfImage {
        symbols: vec![
            Symbol::new("main", 0x1160),
            Symbol::new("fib", 0x1130),
            Symbol::new("_start", 0x1040),
            Symbol::new("_fini", 0x1180),
        ],
        segments: vec![
            LoadSegment { file_offset: 0, vaddr: 0 },
            LoadSegment { file_offset: 0x1000, vaddr: 0x1000 },
        ],
    }
}

fn key(pid: u32, user_stack_id: i32, kernel_stack_id: i32) -> StackCountKey {
    StackCountKey { pid, user_stack_id, kernel_stack_id }
}

#[test]
fn test_fib_profile_end_to_end() {
    let mappings = parse_memory_maps_str(MAPS).unwrap();
    assert_eq!(mappings.len(), 3);

    // fib recursion: fib <- fib <- main <- libc
    let stacks: HashMap<u32, Vec<u64>> = HashMap::from([
        (10, vec![0x55d0_c0a0_1140, 0x55d0_c0a0_1150, 0x55d0_c0a0_1170, 0x7f3a_1c02_9d90, 0]),
        (11, vec![0x55d0_c0a0_1170, 0x7f3a_1c02_9d90, 0]),
        (20, vec![0xffff_ffff_8100_1000, 0]),
    ]);
    let counts = vec![(key(4242, 10, -14), 90u64), (key(4242, 11, 20), 10), (key(4242, -14, 20), 3)];

    let meta = ProfileMeta::cpu(1_700_000_000_000_000_000, Duration::from_secs(10), 100);
    let (mut profile, report) = build_profile(&counts, &stacks, mappings, meta);

    assert_eq!(report.keys_seen, 3);
    assert_eq!(report.samples_emitted, 2);
    assert_eq!(profile.total_samples(), 100);
    // 0x...1170 and the libc frame are shared by both samples
    assert_eq!(profile.locations.len(), 4);

    let ids: Vec<u64> = profile.mappings.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(profile.locations.iter().all(|l| l.mapping_id.is_some()));

    let stats = symbolize_with_image(&mut profile, Path::new("/tmp/fib"), &fib_image());
    assert_eq!(stats.locations_symbolized, 3);

    let leaf = profile.location(profile.samples[0].location_ids[0]).unwrap();
    assert_eq!(profile.function(leaf.function_id.unwrap()).unwrap().name, "fib");
    let libc = profile.location(profile.samples[0].location_ids[3]).unwrap();
    assert_eq!(libc.function_id, None);
    assert_eq!(profile.mapping(libc.mapping_id.unwrap()).unwrap().filename, "/usr/lib/libc.so.6");
}

#[test]
fn test_frame_past_last_symbol_is_unsymbolized() {
    let mappings = parse_memory_maps_str(MAPS).unwrap();
    let stacks: HashMap<u32, Vec<u64>> =
        HashMap::from([(1, vec![0x55d0_c0a0_1140, 0x55d0_c0a0_1190, 0])]);
    let counts = vec![(key(4242, 1, -1), 4u64)];

    let meta = ProfileMeta::cpu(0, Duration::from_secs(1), 100);
    let (mut profile, _) = build_profile(&counts, &stacks, mappings, meta);

    let stats = symbolize_with_image(&mut profile, Path::new("/tmp/fib"), &fib_image());

    assert_eq!(stats.locations_symbolized, 1);
    assert_eq!(stats.locations_unknown, 1);
    let past_end = profile.location(profile.samples[0].location_ids[1]).unwrap();
    assert_eq!(past_end.address, 0x55d0_c0a0_1190);
    assert_eq!(past_end.function_id, None);
}

#[test]
fn test_failed_user_stack_yields_no_sample() {
    let stacks: HashMap<u32, Vec<u64>> = HashMap::new();
    let counts = vec![(key(1, -14, -14), 5u64)];

    let meta = ProfileMeta::cpu(0, Duration::from_secs(1), 100);
    let (profile, report) = build_profile(&counts, &stacks, Vec::new(), meta);

    assert!(profile.samples.is_empty());
    assert!(profile.locations.is_empty());
    assert_eq!(report.warnings.len(), 1);
    assert!(matches!(report.warnings[0], AssemblyWarning::UserStackMissing { .. }));
}

#[test]
fn test_profile_metadata() {
    let meta = ProfileMeta::cpu(42, Duration::from_millis(1500), 100);
    let counts: Vec<(StackCountKey, u64)> = Vec::new();
    let stacks: HashMap<u32, Vec<u64>> = HashMap::new();
    let (profile, _) = build_profile(&counts, &stacks, Vec::new(), meta);

    assert_eq!(profile.time_nanos, 42);
    assert_eq!(profile.duration_nanos, 1_500_000_000);
    assert_eq!(profile.period, 10_000_000);
    assert_eq!(profile.sample_type.len(), 1);
    assert_eq!(profile.sample_type[0].unit, "count");
    assert_eq!(profile.period_type.r#type, "cpu");
}

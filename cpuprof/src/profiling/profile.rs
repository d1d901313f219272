//! In-memory profile graph
//!
//! Shaped after the pprof `Profile` message: locations and mappings are
//! stored in arenas and referenced by their 1-based ids, so samples,
//! locations and mappings never hold references to each other.

use crate::symbolization::MemoryMapping;

/// Nanoseconds between samples at `frequency` Hz
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn period_for_frequency(frequency: u64) -> i64 {
    (1_000_000_000 / frequency.max(1)) as i64
}

/// Type and unit of a sample value or of the sampling period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueType {
    pub r#type: String,
    pub unit: String,
}

impl ValueType {
    pub fn new(r#type: impl Into<String>, unit: impl Into<String>) -> Self {
        Self { r#type: r#type.into(), unit: unit.into() }
    }
}

/// Collection metadata attached to a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileMeta {
    /// Collection time, nanoseconds past the UNIX epoch
    pub time_nanos: i64,
    pub duration_nanos: i64,
    /// Nanoseconds between samples
    pub period: i64,
}

impl ProfileMeta {
    /// Metadata for a CPU profile that started at `time_nanos`
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn cpu(time_nanos: i64, duration: std::time::Duration, frequency: u64) -> Self {
        Self {
            time_nanos,
            duration_nanos: duration.as_nanos() as i64,
            period: period_for_frequency(frequency),
        }
    }
}

/// A process mapping with its profile id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    /// 1-based, assigned in `/proc/<pid>/maps` order when assembly finishes
    pub id: u64,
    pub memory_start: u64,
    pub memory_limit: u64,
    pub file_offset: u64,
    pub filename: String,
    /// Set once any location in the mapping was symbolized
    pub has_functions: bool,
}

impl Mapping {
    pub(crate) fn from_memory_mapping(index: usize, mapping: &MemoryMapping) -> Self {
        Self {
            id: index as u64 + 1,
            memory_start: mapping.start,
            memory_limit: mapping.limit,
            file_offset: mapping.offset,
            filename: mapping.file.clone(),
            has_functions: false,
        }
    }
}

/// A unique `(pid, address)` seen in a stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// 1-based, equal to the location's index in [`Profile::locations`] plus one
    pub id: u64,
    pub address: u64,
    /// Id of the containing mapping, `None` if no mapping contained the address
    pub mapping_id: Option<u64>,
    /// Id of the enclosing function, filled in by symbolization
    pub function_id: Option<u64>,
}

/// A symbolized function name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub id: u64,
    pub name: String,
}

/// One distinct stack with how many times it was sampled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// `[count]`, matching [`Profile::sample_type`]
    pub value: Vec<i64>,
    /// Location ids, leaf first
    pub location_ids: Vec<u64>,
}

/// Assembled CPU profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub sample_type: Vec<ValueType>,
    pub period_type: ValueType,
    pub period: i64,
    pub time_nanos: i64,
    pub duration_nanos: i64,
    pub mappings: Vec<Mapping>,
    pub locations: Vec<Location>,
    pub functions: Vec<Function>,
    pub samples: Vec<Sample>,
}

impl Profile {
    /// Empty CPU profile: one `samples/count` value per sample, `cpu/nanoseconds` period
    #[must_use]
    pub fn new(meta: &ProfileMeta) -> Self {
        Self {
            // By convention the event count comes first and uses unit "count"
            sample_type: vec![ValueType::new("samples", "count")],
            period_type: ValueType::new("cpu", "nanoseconds"),
            period: meta.period,
            time_nanos: meta.time_nanos,
            duration_nanos: meta.duration_nanos,
            mappings: Vec::new(),
            locations: Vec::new(),
            functions: Vec::new(),
            samples: Vec::new(),
        }
    }

    #[must_use]
    pub fn location(&self, id: u64) -> Option<&Location> {
        let index = usize::try_from(id.checked_sub(1)?).ok()?;
        self.locations.get(index)
    }

    #[must_use]
    pub fn mapping(&self, id: u64) -> Option<&Mapping> {
        let index = usize::try_from(id.checked_sub(1)?).ok()?;
        self.mappings.get(index)
    }

    #[must_use]
    pub fn function(&self, id: u64) -> Option<&Function> {
        let index = usize::try_from(id.checked_sub(1)?).ok()?;
        self.functions.get(index)
    }

    /// Sum of all sample counts
    #[must_use]
    pub fn total_samples(&self) -> i64 {
        self.samples.iter().filter_map(|s| s.value.first()).sum()
    }
}

//! Hotspot analysis for pprof profiles.
//!
//! Aggregates samples by function name to find the functions that consume the
//! most CPU time. Works on the decoded pprof message so that profiles written
//! by earlier runs (or by other pprof producers) can be summarized as well.
//!
//! # Flat vs. cumulative
//!
//! ```text
//! sample: [leaf, caller, main] × 10
//!
//!           flat   cum
//! leaf        10    10
//! caller       0    10
//! main         0    10
//! ```
//!
//! A function appearing several times in one stack (recursion) is counted
//! once towards its cumulative total.

// Percentage calculations intentionally convert i64 to f64
#![allow(clippy::cast_precision_loss)]

use crate::export::proto;
use crate::symbolization::UNKNOWN_FUNCTION;
use std::collections::{HashMap, HashSet};

// =============================================================================
// FUNCTION HOTSPOT (OUTPUT TYPE)
// =============================================================================

/// A function with aggregated sample counts.
///
/// ```text
///       flat  flat%       cum  function
///        412  41.2%       998  fib::fib_naive
///         37   3.7%       998  fib::main
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionHotspot {
    /// Demangled function name, or `unknown` for unsymbolized frames.
    pub name: String,

    /// Samples with this function as the leaf frame.
    pub flat: i64,

    /// Samples with this function anywhere on the stack.
    pub cumulative: i64,

    /// `flat` as a percentage of all samples (0.0 - 100.0).
    pub percentage: f64,
}

// =============================================================================
// ANALYSIS
// =============================================================================

/// Rank the functions of `profile` by flat sample count.
///
/// Ties are broken by cumulative count, then by name, so the output is
/// deterministic. Returns at most `limit` entries.
#[must_use]
pub fn analyze_hotspots(profile: &proto::Profile, limit: usize) -> Vec<FunctionHotspot> {
    let names = function_names(profile);
    let locations: HashMap<u64, &proto::Location> =
        profile.location.iter().map(|loc| (loc.id, loc)).collect();

    let name_of = |location_id: u64| frame_name(&locations, &names, location_id);

    let mut flat: HashMap<&str, i64> = HashMap::new();
    let mut cumulative: HashMap<&str, i64> = HashMap::new();
    let mut total: i64 = 0;

    for sample in &profile.sample {
        let Some(&count) = sample.value.first() else {
            continue;
        };
        total = total.saturating_add(count);

        if let Some(&leaf) = sample.location_id.first() {
            let slot = flat.entry(name_of(leaf)).or_insert(0);
            *slot = slot.saturating_add(count);
        }

        let on_stack: HashSet<&str> = sample.location_id.iter().map(|&id| name_of(id)).collect();
        for name in on_stack {
            let slot = cumulative.entry(name).or_insert(0);
            *slot = slot.saturating_add(count);
        }
    }

    let mut hotspots: Vec<FunctionHotspot> = cumulative
        .into_iter()
        .map(|(name, cum)| {
            let flat = flat.get(name).copied().unwrap_or(0);
            FunctionHotspot {
                name: name.to_string(),
                flat,
                cumulative: cum,
                percentage: if total > 0 { flat as f64 / total as f64 * 100.0 } else { 0.0 },
            }
        })
        .collect();

    hotspots.sort_by(|a, b| {
        b.flat
            .cmp(&a.flat)
            .then_with(|| b.cumulative.cmp(&a.cumulative))
            .then_with(|| a.name.cmp(&b.name))
    });
    hotspots.truncate(limit);
    hotspots
}

/// Total of the first sample value across all samples.
#[must_use]
pub fn total_samples(profile: &proto::Profile) -> i64 {
    profile.sample.iter().filter_map(|s| s.value.first()).fold(0i64, |acc, &v| acc.saturating_add(v))
}

/// Name of the innermost function at `location_id`
fn frame_name<'a>(
    locations: &HashMap<u64, &'a proto::Location>,
    names: &HashMap<u64, &'a str>,
    location_id: u64,
) -> &'a str {
    locations
        .get(&location_id)
        .and_then(|loc| loc.line.first())
        .and_then(|line| names.get(&line.function_id).copied())
        .unwrap_or(UNKNOWN_FUNCTION)
}

fn string_at(profile: &proto::Profile, index: i64) -> Option<&str> {
    usize::try_from(index).ok().and_then(|i| profile.string_table.get(i)).map(String::as_str)
}

/// function id → name, resolved through the string table
fn function_names(profile: &proto::Profile) -> HashMap<u64, &str> {
    profile
        .function
        .iter()
        .filter_map(|f| {
            let name = string_at(profile, f.name)
                .filter(|n| !n.is_empty())
                .or_else(|| string_at(profile, f.system_name))?;
            Some((f.id, name))
        })
        .collect()
}

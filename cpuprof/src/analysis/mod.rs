//! Analysis logic for profiling data
//!
//! Pure summaries over pprof profiles, kept apart from the CLI that prints them.

pub mod hotspot_analyzer;

pub use hotspot_analyzer::{analyze_hotspots, total_samples, FunctionHotspot};

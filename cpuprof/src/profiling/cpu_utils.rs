//! CPU utility functions
//!
//! The sampler needs one perf event per CPU, so it reads the online set from /sys.

use anyhow::{Context, Result};
use std::fs;

use crate::domain::CpuId;

const ONLINE_CPUS: &str = "/sys/devices/system/cpu/online";

/// Get list of online CPU IDs from /sys/devices/system/cpu/online
///
/// # Errors
/// Returns an error if the file cannot be read or parsed
pub fn online_cpus() -> Result<Vec<CpuId>> {
    let content =
        fs::read_to_string(ONLINE_CPUS).with_context(|| format!("Failed to read {ONLINE_CPUS}"))?;
    parse_cpu_list(&content)
}

/// Parse a kernel CPU list such as `0-3` or `0-3,8-11,13`
///
/// # Errors
/// Returns an error on a malformed id or range
pub fn parse_cpu_list(list: &str) -> Result<Vec<CpuId>> {
    let mut cpus = Vec::new();

    for range in list.trim().split(',').filter(|r| !r.is_empty()) {
        if let Some((start, end)) = range.split_once('-') {
            let start: u32 = start.parse().with_context(|| format!("bad CPU range {range:?}"))?;
            let end: u32 = end.parse().with_context(|| format!("bad CPU range {range:?}"))?;
            cpus.extend((start..=end).map(CpuId));
        } else {
            let cpu: u32 = range.parse().with_context(|| format!("bad CPU id {range:?}"))?;
            cpus.push(CpuId(cpu));
        }
    }

    Ok(cpus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_list() {
        let ids = |list| parse_cpu_list(list).unwrap().into_iter().map(|c| c.0).collect::<Vec<_>>();

        assert_eq!(ids("0\n"), vec![0]);
        assert_eq!(ids("0-3"), vec![0, 1, 2, 3]);
        assert_eq!(ids("0-1,4,6-7\n"), vec![0, 1, 4, 6, 7]);
        assert!(ids("").is_empty());
    }

    #[test]
    fn test_parse_cpu_list_rejects_garbage() {
        assert!(parse_cpu_list("0-x").is_err());
        assert!(parse_cpu_list("cpu0").is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_online_cpus() {
        let cpus = online_cpus().expect("Failed to read online CPUs");
        assert!(!cpus.is_empty(), "Should have at least one CPU");
    }
}

//! Memory mapping utilities for process address space analysis
//!
//! This module parses `/proc/<pid>/maps` into the ordered list of executable
//! mappings that profile assembly attributes sampled addresses to.

use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::Path;

use crate::domain::{Pid, ProfilerError};

/// One executable mapping of a process's address space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMapping {
    /// `vm_start`
    pub start: u64,
    /// `vm_end`
    pub limit: u64,
    /// Offset of the mapping within `file`
    pub offset: u64,
    /// Backing file, empty for anonymous mappings
    pub file: String,
}

impl MemoryMapping {
    /// Check if an address falls within this mapping
    ///
    /// The limit is treated as inclusive, matching how pprof attributes
    /// addresses; an address equal to one mapping's limit and the next one's
    /// start goes to whichever comes first in the list.
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        self.start <= addr && addr <= self.limit
    }

    /// Whether the mapping is backed by `path`
    #[must_use]
    pub fn is_backed_by(&self, path: &Path) -> bool {
        !self.file.is_empty() && Path::new(&self.file) == path
    }
}

/// Read and parse `/proc/<pid>/maps`
///
/// # Errors
/// Returns an error if the maps file cannot be read or contains a malformed entry
pub fn parse_memory_maps(pid: Pid) -> Result<Vec<MemoryMapping>> {
    let maps_path = format!("/proc/{}/maps", pid.0);
    let maps =
        fs::read_to_string(&maps_path).context(ProfilerError::MemoryMapsParseFailed(pid))?;

    let mappings = parse_memory_maps_str(&maps)?;
    info!("Found {} executable mappings in {maps_path}", mappings.len());
    Ok(mappings)
}

/// Parse the contents of a maps file, keeping executable entries only
///
/// Each line has the form `start-end perms offset dev inode [pathname]`.
///
/// # Errors
/// Returns [`ProfilerError::MalformedMapEntry`] for lines that don't follow the format
pub fn parse_memory_maps_str(maps: &str) -> Result<Vec<MemoryMapping>, ProfilerError> {
    let mut mappings = Vec::new();

    for line in maps.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(mapping) = parse_map_entry(line)? {
            mappings.push(mapping);
        }
    }

    Ok(mappings)
}

fn parse_map_entry(line: &str) -> Result<Option<MemoryMapping>, ProfilerError> {
    let malformed = || ProfilerError::MalformedMapEntry(line.to_string());

    // Pathnames may contain spaces, so split off the first five fields only
    let mut parts = line.splitn(6, char::is_whitespace).filter(|p| !p.is_empty());
    let range = parts.next().ok_or_else(malformed)?;
    let perms = parts.next().ok_or_else(malformed)?;
    let offset = parts.next().ok_or_else(malformed)?;
    let _dev = parts.next().ok_or_else(malformed)?;
    let _inode = parts.next().ok_or_else(malformed)?;
    let file = parts.next().map(str::trim).unwrap_or_default();

    if !perms.contains('x') {
        return Ok(None);
    }

    let (start, limit) = range.split_once('-').ok_or_else(malformed)?;
    let start = u64::from_str_radix(start, 16).map_err(|_| malformed())?;
    let limit = u64::from_str_radix(limit, 16).map_err(|_| malformed())?;
    let offset = u64::from_str_radix(offset, 16).map_err(|_| malformed())?;

    Ok(Some(MemoryMapping { start, limit, offset, file: file.to_string() }))
}

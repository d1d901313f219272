//! Auto-detect process PID and binary path from process name.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::Pid;

/// Result of process lookup.
#[derive(Debug)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub exe_path: PathBuf,
    pub command: String,
}

/// How well a process matched the requested name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchKind {
    Substring,
    Exact,
}

/// Find a process by name.
///
/// Searches `/proc` for processes matching the given name, comparing
/// against the command name from `/proc/<pid>/stat` and the executable
/// basename from `/proc/<pid>/exe`. A single exact match wins over any
/// number of substring matches. The profiler itself is never a candidate.
///
/// # Errors
/// - No processes found
/// - Multiple processes found (ambiguous)
pub fn find_process_by_name(name: &str) -> Result<ProcessInfo> {
    let own_pid = std::process::id();
    let mut matches: Vec<(MatchKind, ProcessInfo)> = Vec::new();

    let proc_dir = fs::read_dir("/proc").context("Failed to read /proc")?;

    for entry in proc_dir.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };
        if pid == own_pid {
            continue;
        }

        // Kernel threads have no exe link
        let Ok(exe_path) = fs::read_link(format!("/proc/{pid}/exe")) else {
            continue;
        };
        let Ok(stat_content) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
            continue;
        };
        let Ok(command) = extract_comm(&stat_content) else {
            continue;
        };

        if let Some(kind) = match_kind(&command, &exe_path, name) {
            matches.push((kind, ProcessInfo { pid: Pid(pid), exe_path, command }));
        }
    }

    let exact = matches.iter().filter(|(kind, _)| *kind == MatchKind::Exact).count();
    if exact > 0 {
        matches.retain(|(kind, _)| *kind == MatchKind::Exact);
    }

    match matches.len() {
        0 => bail!(
            "No process matching '{name}' found.\n\
             Check running processes with: ps aux | grep {name}"
        ),
        1 => Ok(matches.remove(0).1),
        _ => {
            let list: Vec<String> = matches
                .iter()
                .map(|(_, m)| format!("  {} ({})", m.pid.0, m.command))
                .collect();
            bail!(
                "Multiple processes match '{name}':\n{}\n\n\
                 Specify PID explicitly: cpuprof record --pid <PID>",
                list.join("\n")
            )
        }
    }
}

/// Resolve binary path from PID via `/proc/<pid>/exe`.
///
/// # Errors
/// Returns error if the process doesn't exist or `/proc/<pid>/exe` is not readable.
pub fn resolve_exe_path(pid: Pid) -> Result<PathBuf> {
    let exe_link = format!("/proc/{}/exe", pid.0);
    fs::read_link(&exe_link).with_context(|| format!("Cannot read {exe_link}"))
}

/// Extract command name from `/proc/<pid>/stat`.
/// Format: "pid (comm) state ..."
fn extract_comm(stat_line: &str) -> Result<String> {
    let open = stat_line.find('(').context("Invalid stat format")?;
    let close = stat_line.rfind(')').context("Invalid stat format")?;
    if open >= close {
        bail!("Invalid stat format");
    }
    Ok(stat_line[open + 1..close].to_string())
}

fn match_kind(command: &str, exe_path: &Path, pattern: &str) -> Option<MatchKind> {
    let exe_basename = exe_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let pattern_basename =
        Path::new(pattern).file_name().and_then(|n| n.to_str()).unwrap_or(pattern);

    if command == pattern_basename || exe_basename == pattern_basename {
        Some(MatchKind::Exact)
    } else if command.contains(pattern) || exe_basename.contains(pattern) {
        Some(MatchKind::Substring)
    } else {
        None
    }
}

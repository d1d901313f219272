//! Structured error types for cpuprof
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::{Pid, StackId};
use thiserror::Error;

/// Construction-time failures of a symbol resolver
///
/// These are configuration errors: the resolver is never built, so no
/// address is resolved against a half-loaded executable.
#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("Failed to read executable {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse executable: {0}")]
    Parse(#[from] object::Error),

    #[error("Executable has no symbol table (.symtab); is it stripped?")]
    MissingSymbolTable,

    #[error("Loadable segment not found at offset 0x{file_offset:x}")]
    SegmentNotFound { file_offset: u64 },
}

/// Failure reading one of the sampler's tables
#[derive(Error, Debug)]
pub enum SampleTableError {
    #[error("Stack {0} not found in stack trace map")]
    StackNotFound(StackId),

    #[error(transparent)]
    Map(#[from] aya::maps::MapError),
}

/// Per-key soft failures during profile assembly
///
/// None of these abort the pass; the affected key is skipped or degraded.
#[derive(Error, Debug)]
pub enum AssemblyWarning {
    #[error("{pid}: user stack capture failed ({stack_id}), sample skipped")]
    UserStackMissing { pid: Pid, stack_id: StackId },

    #[error("{pid}: failed to look up user-space stack {stack_id}: {source}")]
    UserStackLookup {
        pid: Pid,
        stack_id: StackId,
        #[source]
        source: SampleTableError,
    },

    #[error("{pid}: failed to read user-space stack {stack_id}: {source}")]
    UserStackDecode {
        pid: Pid,
        stack_id: StackId,
        #[source]
        source: StackDecodeError,
    },

    #[error("{pid}: failed to look up kernel-space stack {stack_id}: {source}")]
    KernelStackLookup {
        pid: Pid,
        stack_id: StackId,
        #[source]
        source: SampleTableError,
    },

    #[error("{pid}: failed to read kernel-space stack {stack_id}: {source}")]
    KernelStackDecode {
        pid: Pid,
        stack_id: StackId,
        #[source]
        source: StackDecodeError,
    },

    #[error("{pid}: no process mapping for address 0x{addr:x}")]
    UnmappedAddress { pid: Pid, addr: u64 },

    #[error(transparent)]
    CountsIteration(SampleTableError),
}

/// A raw stack that cannot be interpreted as instruction pointers
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StackDecodeError {
    #[error("stack has {0} frames, more than the maximum depth {max}", max = cpuprof_common::MAX_STACK_DEPTH)]
    TooDeep(usize),
}

#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("Failed to read memory maps of {0}")]
    MemoryMapsParseFailed(Pid),

    #[error("Malformed memory map entry: {0}")]
    MalformedMapEntry(String),

    #[error("Failed to load eBPF program: {0}")]
    Aya(#[from] aya::EbpfError),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to encode profile: {0}")]
    Encode(#[from] prost::EncodeError),

    #[error("Failed to decode profile: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiler_error_display() {
        let err = ProfilerError::MemoryMapsParseFailed(Pid(1234));
        assert_eq!(err.to_string(), "Failed to read memory maps of PID:1234");
    }

    #[test]
    fn test_segment_not_found_display() {
        let err = ResolverError::SegmentNotFound { file_offset: 0x1000 };
        assert_eq!(err.to_string(), "Loadable segment not found at offset 0x1000");
    }

    #[test]
    fn test_user_stack_missing_display() {
        let warning = AssemblyWarning::UserStackMissing { pid: Pid(42), stack_id: StackId(-14) };
        assert!(warning.to_string().contains("stack#-14"));
        assert!(warning.to_string().contains("PID:42"));
    }

    #[test]
    fn test_decode_error_display() {
        assert!(StackDecodeError::TooDeep(200).to_string().contains("127"));
    }
}

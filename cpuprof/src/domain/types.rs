//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent common bugs like passing a stack id where a
//! PID is expected, and make function signatures more expressive.

use std::fmt;

/// Process ID
///
/// Represents a process ID (TGID) in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

/// CPU ID
///
/// Represents a CPU core ID (0, 1, 2, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuId(pub u32);

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CPU:{}", self.0)
    }
}

/// Stack trace ID from eBPF
///
/// Represents a stack trace ID stored in the `STACK_TRACES` map.
/// Negative values are the errno returned by `bpf_get_stackid()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackId(pub i32);

impl StackId {
    /// Returns true if this stack ID is valid (non-negative)
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// Convert to u32 for eBPF map lookup, `None` if the capture failed
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn map_key(self) -> Option<u32> {
        self.is_valid().then_some(self.0 as u32)
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stack#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Pid(1234).to_string(), "PID:1234");
        assert_eq!(CpuId(3).to_string(), "CPU:3");
    }

    #[test]
    fn test_stack_id_validity() {
        assert!(StackId(5).is_valid());
        assert!(StackId(0).is_valid());
        assert!(!StackId(-14).is_valid());
        assert_eq!(StackId(42).map_key(), Some(42));
        assert_eq!(StackId(-1).map_key(), None);
    }

    #[test]
    fn test_stack_id_display() {
        assert_eq!(StackId(-14).to_string(), "stack#-14");
    }
}

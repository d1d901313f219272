//! Read-only views of the sampler's tables
//!
//! Profile assembly only needs to iterate the counts table and look up
//! stacks by id. The traits here are implemented for the live aya maps and
//! for plain in-memory collections (tests, replays).

use aya::maps::{HashMap as BpfHashMap, MapData, MapError, StackTraceMap};
use cpuprof_common::{StackCountKey, MAX_STACK_DEPTH};
use std::borrow::Borrow;
use std::collections::HashMap;

use crate::domain::{SampleTableError, StackDecodeError, StackId};

/// `(key, count)` entries of the sampler's counts map
pub trait CountsTable {
    /// Iterate all entries; order is unspecified
    fn entries(&self)
        -> Box<dyn Iterator<Item = Result<(StackCountKey, u64), SampleTableError>> + '_>;
}

/// Stack id → raw instruction pointers
pub trait StackTraceTable {
    /// Raw addresses of a stack, most recent frame first, possibly zero padded
    ///
    /// # Errors
    /// Returns an error if the id is not present or the map cannot be read
    fn lookup(&self, stack_id: StackId) -> Result<Vec<u64>, SampleTableError>;
}

/// Truncate a raw stack at its first zero address
///
/// # Errors
/// Returns [`StackDecodeError::TooDeep`] if more than `MAX_STACK_DEPTH` frames precede the terminator
pub fn decode_stack(raw: &[u64]) -> Result<Vec<u64>, StackDecodeError> {
    let frames: Vec<u64> = raw.iter().copied().take_while(|&addr| addr != 0).collect();
    if frames.len() > MAX_STACK_DEPTH {
        return Err(StackDecodeError::TooDeep(frames.len()));
    }
    Ok(frames)
}

impl<T: Borrow<MapData>> CountsTable for BpfHashMap<T, StackCountKey, u64> {
    fn entries(
        &self,
    ) -> Box<dyn Iterator<Item = Result<(StackCountKey, u64), SampleTableError>> + '_> {
        Box::new(self.iter().map(|entry| entry.map_err(SampleTableError::from)))
    }
}

impl<T: Borrow<MapData>> StackTraceTable for StackTraceMap<T> {
    fn lookup(&self, stack_id: StackId) -> Result<Vec<u64>, SampleTableError> {
        let key = stack_id.map_key().ok_or(SampleTableError::StackNotFound(stack_id))?;
        match self.get(&key, 0) {
            Ok(trace) => Ok(trace.frames().iter().map(|frame| frame.ip).collect()),
            Err(MapError::KeyNotFound) => Err(SampleTableError::StackNotFound(stack_id)),
            Err(e) => Err(e.into()),
        }
    }
}

impl CountsTable for Vec<(StackCountKey, u64)> {
    fn entries(
        &self,
    ) -> Box<dyn Iterator<Item = Result<(StackCountKey, u64), SampleTableError>> + '_> {
        Box::new(self.iter().copied().map(Ok))
    }
}

impl StackTraceTable for HashMap<u32, Vec<u64>> {
    fn lookup(&self, stack_id: StackId) -> Result<Vec<u64>, SampleTableError> {
        stack_id
            .map_key()
            .and_then(|key| self.get(&key))
            .cloned()
            .ok_or(SampleTableError::StackNotFound(stack_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_truncates_at_first_zero() {
        let mut raw = [0u64; MAX_STACK_DEPTH];
        raw[0] = 0x40_1010;
        raw[1] = 0x40_1000;
        // Garbage after the terminator carries no meaning
        raw[3] = 0xdead_beef;

        assert_eq!(decode_stack(&raw), Ok(vec![0x40_1010, 0x40_1000]));
    }

    #[test]
    fn test_decode_full_and_empty() {
        let raw = [0x1000u64; MAX_STACK_DEPTH];
        assert_eq!(decode_stack(&raw).map(|f| f.len()), Ok(MAX_STACK_DEPTH));
        assert_eq!(decode_stack(&[]), Ok(vec![]));
        assert_eq!(decode_stack(&[0, 0x1000]), Ok(vec![]));
    }

    #[test]
    fn test_decode_too_deep() {
        let raw = vec![0x1000u64; MAX_STACK_DEPTH + 1];
        assert_eq!(decode_stack(&raw), Err(StackDecodeError::TooDeep(MAX_STACK_DEPTH + 1)));
    }

    #[test]
    fn test_in_memory_stack_lookup() {
        let stacks: HashMap<u32, Vec<u64>> = HashMap::from([(7u32, vec![0x1000, 0])]);

        assert_eq!(stacks.lookup(StackId(7)).unwrap(), vec![0x1000, 0]);
        assert!(matches!(stacks.lookup(StackId(8)), Err(SampleTableError::StackNotFound(_))));
        assert!(matches!(stacks.lookup(StackId(-14)), Err(SampleTableError::StackNotFound(_))));
    }

    #[test]
    fn test_in_memory_counts() {
        let key = StackCountKey { pid: 1, user_stack_id: 2, kernel_stack_id: -1 };
        let counts = vec![(key, 45u64)];
        let entries: Vec<_> = counts.entries().collect::<Result<_, _>>().unwrap();
        assert_eq!(entries, vec![(key, 45)]);
    }
}

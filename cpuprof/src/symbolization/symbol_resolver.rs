//! Address-to-function resolution from an ELF symbol table
//!
//! The resolver never looks at symbol sizes: the enclosing function of an
//! address is the closest symbol at or below it. Addresses in padding or in
//! stripped statics are therefore credited to the preceding symbol.

use log::debug;
use object::{Object, ObjectSegment, ObjectSymbol};
use std::fs;
use std::path::Path;

use crate::domain::ResolverError;

/// Name returned when an address cannot be attributed to any symbol
pub const UNKNOWN_FUNCTION: &str = "unknown";

/// A `.symtab` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub value: u64,
}

impl Symbol {
    pub fn new(name: impl Into<String>, value: u64) -> Self {
        Self { name: name.into(), value }
    }
}

/// A `PT_LOAD` program header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSegment {
    /// Offset of the segment within the ELF file
    pub file_offset: u64,
    /// Virtual address recorded in the program header
    pub vaddr: u64,
}

/// Where the chosen segment lives on disk and in the traced process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPlacement {
    pub file_offset: u64,
    pub memory_start: u64,
    /// Virtual address equals file offset, so the kernel picked a randomized base
    pub is_pie: bool,
}

/// Symbol table and loadable segments of one executable
///
/// Loaded once per executable and shared by every resolver built for its
/// mappings.
#[derive(Debug, Clone, Default)]
pub struct ElfImage {
    pub symbols: Vec<Symbol>,
    pub segments: Vec<LoadSegment>,
}

impl ElfImage {
    /// Read the symbol table and program headers of the ELF file at `path`
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or has no `.symtab`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ResolverError> {
        let path = path.as_ref();
        let data = fs::read(path)
            .map_err(|source| ResolverError::Io { path: path.display().to_string(), source })?;
        Self::parse(&data)
    }

    /// Parse an in-memory ELF file
    ///
    /// # Errors
    /// Returns an error if the data is not an object file or has no `.symtab`
    pub fn parse(data: &[u8]) -> Result<Self, ResolverError> {
        let obj = object::File::parse(data)?;

        if obj.symbol_table().is_none() {
            return Err(ResolverError::MissingSymbolTable);
        }

        let symbols = obj
            .symbols()
            .filter_map(|sym| {
                let name = sym.name().ok()?;
                Some(Symbol::new(name, sym.address()))
            })
            .collect();

        // object only yields PT_LOAD headers as segments
        let segments = obj
            .segments()
            .map(|seg| LoadSegment { file_offset: seg.file_range().0, vaddr: seg.address() })
            .collect();

        Ok(Self { symbols, segments })
    }
}

/// Resolves sampled instruction addresses of one executable mapping to
/// function names
///
/// Immutable after construction; resolution is a pure function of the
/// resolver and the address.
#[derive(Debug, Clone)]
pub struct SymbolResolver {
    /// Symbols sorted by value, ties kept in table order
    symbols: Vec<Symbol>,
    placement: SegmentPlacement,
}

impl SymbolResolver {
    /// Build a resolver from an unsorted symbol table
    ///
    /// `file_offset` names the loadable segment (e.g. `0x1000`) and
    /// `memory_start` is where it was mapped in the process (e.g. `0x401000`).
    ///
    /// # Errors
    /// Returns [`ResolverError::SegmentNotFound`] if no loadable segment starts at `file_offset`
    pub fn new(
        mut symbols: Vec<Symbol>,
        segments: &[LoadSegment],
        file_offset: u64,
        memory_start: u64,
    ) -> Result<Self, ResolverError> {
        // sort_by_key is stable
        symbols.sort_by_key(|sym| sym.value);

        let segment = segments
            .iter()
            .find(|seg| seg.file_offset == file_offset)
            .ok_or(ResolverError::SegmentNotFound { file_offset })?;

        // A PIE's headers look like
        //   LOAD 0x001000 0x0000000000001000 ...
        // while /proc/<pid>/maps shows a random high vm_start.
        let is_pie = segment.vaddr == segment.file_offset;
        debug!(
            "Segment at offset 0x{file_offset:x} (vaddr 0x{:x}) mapped at 0x{memory_start:x}, pie={is_pie}",
            segment.vaddr
        );

        Ok(Self {
            symbols,
            placement: SegmentPlacement {
                file_offset: segment.file_offset,
                memory_start,
                is_pie,
            },
        })
    }

    /// Build a resolver for one mapping of an already loaded executable
    ///
    /// # Errors
    /// Returns [`ResolverError::SegmentNotFound`] if no loadable segment starts at `file_offset`
    pub fn from_image(
        image: &ElfImage,
        file_offset: u64,
        memory_start: u64,
    ) -> Result<Self, ResolverError> {
        Self::new(image.symbols.clone(), &image.segments, file_offset, memory_start)
    }

    /// Read `path` and build a resolver for the segment at `file_offset`
    ///
    /// # Errors
    /// Returns an error if the executable cannot be read, has no symbol table,
    /// or has no loadable segment at `file_offset`
    pub fn open<P: AsRef<Path>>(
        path: P,
        file_offset: u64,
        memory_start: u64,
    ) -> Result<Self, ResolverError> {
        let image = ElfImage::open(path)?;
        Self::new(image.symbols, &image.segments, file_offset, memory_start)
    }

    #[must_use]
    pub fn placement(&self) -> SegmentPlacement {
        self.placement
    }

    #[must_use]
    pub fn is_pie(&self) -> bool {
        self.placement.is_pie
    }

    /// Name of the function enclosing `addr`, or [`UNKNOWN_FUNCTION`]
    #[must_use]
    pub fn resolve(&self, addr: u64) -> &str {
        if addr == 0 {
            return UNKNOWN_FUNCTION;
        }

        let addr = if self.placement.is_pie {
            if addr < self.placement.memory_start {
                return UNKNOWN_FUNCTION;
            }
            // Undo the load bias: distance into the segment plus its file offset
            self.placement.file_offset + (addr - self.placement.memory_start)
        } else {
            addr
        };

        let i = self.symbols.partition_point(|sym| sym.value < addr);
        let Some(found) = self.symbols.get(i) else {
            return UNKNOWN_FUNCTION;
        };
        if found.value == addr {
            return &found.name;
        }

        // symbols[i] is the first symbol past addr:
        //
        //   0x401120 frame_dummy
        //   0x401126 fibNaive    <- enclosing
        //   0x40112c ?           <- addr
        //   0x40115a main        <- symbols[i]
        match i.checked_sub(1).map(|prev| &self.symbols[prev]) {
            Some(prev) if prev.value > 0 => &prev.name,
            _ => UNKNOWN_FUNCTION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fib_symbols() -> Vec<Symbol> {
        vec![Symbol::new("fib", 0x1010), Symbol::new("main", 0x1000)]
    }

    fn pie_segments() -> Vec<LoadSegment> {
        vec![
            LoadSegment { file_offset: 0, vaddr: 0 },
            LoadSegment { file_offset: 0x1000, vaddr: 0x1000 },
        ]
    }

    #[test]
    fn test_pie_translation() {
        let resolver = SymbolResolver::new(fib_symbols(), &pie_segments(), 0x1000, 0x40_1000)
            .expect("segment exists");

        assert!(resolver.is_pie());
        assert_eq!(resolver.resolve(0x40_1010), "fib");
        assert_eq!(resolver.resolve(0x40_1000), "main");
        assert_eq!(resolver.resolve(0x40_1008), "main");
        // 0x1020 is past the last symbol
        assert_eq!(resolver.resolve(0x40_1020), UNKNOWN_FUNCTION);
    }

    #[test]
    fn test_pie_below_memory_start() {
        let resolver = SymbolResolver::new(fib_symbols(), &pie_segments(), 0x1000, 0x40_1000)
            .expect("segment exists");

        for addr in [1, 0x1010, 0x40_0fff] {
            assert_eq!(resolver.resolve(addr), UNKNOWN_FUNCTION, "addr 0x{addr:x}");
        }
    }

    #[test]
    fn test_zero_address() {
        let resolver = SymbolResolver::new(fib_symbols(), &pie_segments(), 0x1000, 0)
            .expect("segment exists");
        assert_eq!(resolver.resolve(0), UNKNOWN_FUNCTION);

        let segments = [LoadSegment { file_offset: 0x1000, vaddr: 0x40_1000 }];
        let resolver =
            SymbolResolver::new(vec![Symbol::new("start", 0)], &segments, 0x1000, 0x40_1000)
                .expect("segment exists");
        assert_eq!(resolver.resolve(0), UNKNOWN_FUNCTION);
    }

    #[test]
    fn test_non_pie_uses_absolute_addresses() {
        let symbols = vec![
            Symbol::new("main", 0x40_115a),
            Symbol::new("frame_dummy", 0x40_1120),
            Symbol::new("fibNaive", 0x40_1126),
        ];
        let segments = [LoadSegment { file_offset: 0x1000, vaddr: 0x40_1000 }];
        let resolver =
            SymbolResolver::new(symbols, &segments, 0x1000, 0x40_1000).expect("segment exists");

        assert!(!resolver.is_pie());
        assert_eq!(resolver.resolve(0x40_112c), "fibNaive");
        assert_eq!(resolver.resolve(0x40_115a), "main");
        assert_eq!(resolver.resolve(0x40_1121), "frame_dummy");
        assert_eq!(resolver.resolve(123), UNKNOWN_FUNCTION);
    }

    #[test]
    fn test_preceding_zero_symbol_is_ignored() {
        let symbols = vec![Symbol::new("crtstuff.c", 0), Symbol::new("_init", 0x2000)];
        let segments = [LoadSegment { file_offset: 0x1000, vaddr: 0x40_1000 }];
        let resolver =
            SymbolResolver::new(symbols, &segments, 0x1000, 0x40_1000).expect("segment exists");

        assert_eq!(resolver.resolve(0x1000), UNKNOWN_FUNCTION);
        assert_eq!(resolver.resolve(0x2000), "_init");
    }

    #[test]
    fn test_ties_keep_table_order() {
        let symbols = vec![
            Symbol::new("later", 0x3000),
            Symbol::new("alias_a", 0x2000),
            Symbol::new("alias_b", 0x2000),
        ];
        let segments = [LoadSegment { file_offset: 0, vaddr: 0x40_0000 }];
        let resolver = SymbolResolver::new(symbols, &segments, 0, 0).expect("segment exists");

        assert_eq!(resolver.resolve(0x2000), "alias_a");
        // Preceding symbol of a gap is the last of the tied entries
        assert_eq!(resolver.resolve(0x2800), "alias_b");
    }

    #[test]
    fn test_segment_not_found() {
        let err = SymbolResolver::new(fib_symbols(), &pie_segments(), 0x2000, 0x40_1000)
            .expect_err("no segment at 0x2000");
        assert!(matches!(err, ResolverError::SegmentNotFound { file_offset: 0x2000 }));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let resolver = SymbolResolver::new(fib_symbols(), &pie_segments(), 0x1000, 0x40_1000)
            .expect("segment exists");
        for addr in [0, 0x40_1004, 0x40_1010, 0x40_1fff] {
            assert_eq!(resolver.resolve(addr), resolver.resolve(addr));
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(ElfImage::parse(b"not an elf"), Err(ResolverError::Parse(_))));
    }
}

//! # Symbol Resolution and Address Translation
//!
//! This module converts raw instruction pointers captured by the eBPF
//! sampler into function names using the executable's `.symtab`.
//!
//! ## PIE (Position Independent Executable)
//!
//! Symbol values of a PIE are file-relative, while sampled addresses are
//! relative to wherever ASLR placed the binary. A PIE is recognised by its
//! code segment having a virtual address equal to its file offset:
//!
//! ```text
//! Type   Offset   VirtAddr           FileSiz  MemSiz   Flg
//! LOAD   0x001000 0x0000000000001000 0x0001ed 0x0001ed R E
//! ```
//!
//! For such a binary the sampled address is translated back:
//!
//! ```text
//! symtab address = file_offset + (sampled address - vm_start)
//! ```
//!
//! where `vm_start` and `file_offset` come from the mapping's line in
//! `/proc/<pid>/maps`. Non-PIE binaries are loaded at their link address
//! and need no translation.
//!
//! ## Module Structure
//!
//! - **`symbol_resolver`**: symbol table loading and address → name lookup
//! - **`memory_maps`**: `/proc/<pid>/maps` parsing
//! - **`symbolizer`**: attaches function names to an assembled profile
//!
//! ## Example
//!
//! ```rust,ignore
//! let resolver = SymbolResolver::open("/tmp/fib-pie", 0x1000, 0x5645_f7a0_1000)?;
//! assert_eq!(resolver.resolve(0x5645_f7a0_1149), "fibNaive");
//! ```
//!
//! ## Limitations
//!
//! - **Requires `.symtab`**: stripped binaries cannot be symbolized
//! - **No symbol sizes**: addresses in gaps are credited to the preceding symbol
//! - **Main executable only**: shared libraries are not symbolized

pub mod memory_maps;
pub mod symbol_resolver;
pub mod symbolizer;

pub use memory_maps::{parse_memory_maps, parse_memory_maps_str, MemoryMapping};
pub use symbol_resolver::{
    ElfImage, LoadSegment, SegmentPlacement, Symbol, SymbolResolver, UNKNOWN_FUNCTION,
};
pub use symbolizer::{symbolize_profile, symbolize_with_image, SymbolizeStats};

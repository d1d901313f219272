//! Symbolization pass over an assembled profile
//!
//! Only mappings backed by the profiled executable are resolved; shared
//! libraries keep bare addresses.

use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::domain::ResolverError;
use crate::profiling::profile::{Function, Profile};
use crate::symbolization::symbol_resolver::{ElfImage, SymbolResolver, UNKNOWN_FUNCTION};

/// Counters from one symbolization pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SymbolizeStats {
    /// Mappings of the executable a resolver was built for
    pub mappings_resolved: usize,
    pub locations_symbolized: usize,
    pub locations_unknown: usize,
}

/// Attach function names to the locations of `profile` that fall in mappings
/// of `executable`
///
/// Shared libraries are left alone. Mappings of the executable whose file
/// offset names no loadable segment are skipped.
///
/// # Errors
/// Returns an error if the executable cannot be read or has no symbol table
pub fn symbolize_profile(
    profile: &mut Profile,
    executable: &Path,
) -> Result<SymbolizeStats, ResolverError> {
    let image = ElfImage::open(executable)?;
    Ok(symbolize_with_image(profile, executable, &image))
}

/// Same as [`symbolize_profile`] with an already loaded executable
pub fn symbolize_with_image(
    profile: &mut Profile,
    executable: &Path,
    image: &ElfImage,
) -> SymbolizeStats {
    let mut stats = SymbolizeStats::default();

    // mapping id → resolver
    let mut resolvers: HashMap<u64, SymbolResolver> = HashMap::new();
    for mapping in profile.mappings.iter().filter(|m| Path::new(&m.filename) == executable) {
        match SymbolResolver::from_image(image, mapping.file_offset, mapping.memory_start) {
            Ok(resolver) => {
                resolvers.insert(mapping.id, resolver);
            }
            Err(e) => debug!("Not symbolizing mapping {} of {}: {e}", mapping.id, mapping.filename),
        }
    }
    stats.mappings_resolved = resolvers.len();

    let mut function_ids: HashMap<String, u64> =
        profile.functions.iter().map(|f| (f.name.clone(), f.id)).collect();
    let mut symbolized_mappings: HashSet<u64> = HashSet::new();

    for location in &mut profile.locations {
        let Some((mapping_id, resolver)) =
            location.mapping_id.and_then(|id| resolvers.get(&id).map(|r| (id, r)))
        else {
            continue;
        };

        let name = resolver.resolve(location.address);
        if name == UNKNOWN_FUNCTION {
            stats.locations_unknown += 1;
            continue;
        }

        let id = *function_ids.entry(name.to_string()).or_insert_with(|| {
            let id = profile.functions.len() as u64 + 1;
            profile.functions.push(Function { id, name: name.to_string() });
            id
        });
        location.function_id = Some(id);
        symbolized_mappings.insert(mapping_id);
        stats.locations_symbolized += 1;
    }

    for mapping in &mut profile.mappings {
        mapping.has_functions = symbolized_mappings.contains(&mapping.id);
    }

    info!(
        "Symbolized {} locations ({} unknown) across {} mappings of {}",
        stats.locations_symbolized,
        stats.locations_unknown,
        stats.mappings_resolved,
        executable.display()
    );

    stats
}

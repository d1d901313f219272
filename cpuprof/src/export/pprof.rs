//! pprof encoding of an assembled [`Profile`]
//!
//! Profiles are written the way `go tool pprof` expects to read them: a
//! gzip-compressed `perftools.profiles.Profile` message.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use prost::Message;
use rustc_demangle::demangle;
use std::collections::HashMap;
use std::io::{Read, Write};

use crate::domain::ExportError;
use crate::export::proto;
use crate::profiling::profile::{Profile, ValueType};

/// Interned strings of a profile
///
/// pprof replaces every string by its index in a shared table whose first
/// entry is always "".
struct StringTable {
    strings: HashMap<String, i64>,
    table: Vec<String>,
}

impl StringTable {
    fn new() -> Self {
        let mut st = Self { strings: HashMap::new(), table: Vec::new() };
        st.intern("");
        st
    }

    /// Index of `string`, inserting it on first use
    #[allow(clippy::cast_possible_wrap)]
    fn intern(&mut self, string: &str) -> i64 {
        if let Some(&index) = self.strings.get(string) {
            return index;
        }
        let index = self.table.len() as i64;
        self.table.push(string.to_string());
        self.strings.insert(string.to_string(), index);
        index
    }

    fn value_type(&mut self, vt: &ValueType) -> proto::ValueType {
        proto::ValueType { r#type: self.intern(&vt.r#type), unit: self.intern(&vt.unit) }
    }

    fn finish(self) -> Vec<String> {
        self.table
    }
}

/// Convert a profile into its pprof message
#[must_use]
pub fn encode_profile(profile: &Profile) -> proto::Profile {
    let mut st = StringTable::new();

    let sample_type = profile.sample_type.iter().map(|vt| st.value_type(vt)).collect();
    let period_type = Some(st.value_type(&profile.period_type));

    let mapping = profile
        .mappings
        .iter()
        .map(|m| proto::Mapping {
            id: m.id,
            memory_start: m.memory_start,
            memory_limit: m.memory_limit,
            file_offset: m.file_offset,
            filename: st.intern(&m.filename),
            has_functions: m.has_functions,
            ..Default::default()
        })
        .collect();

    let location = profile
        .locations
        .iter()
        .map(|loc| proto::Location {
            id: loc.id,
            mapping_id: loc.mapping_id.unwrap_or(0),
            address: loc.address,
            line: loc
                .function_id
                .map(|function_id| proto::Line { function_id, line: 0 })
                .into_iter()
                .collect(),
            is_folded: false,
        })
        .collect();

    let function = profile
        .functions
        .iter()
        .map(|f| proto::Function {
            id: f.id,
            name: st.intern(&format!("{:#}", demangle(&f.name))),
            system_name: st.intern(&f.name),
            ..Default::default()
        })
        .collect();

    let sample = profile
        .samples
        .iter()
        .map(|s| proto::Sample {
            location_id: s.location_ids.clone(),
            value: s.value.clone(),
            label: Vec::new(),
        })
        .collect();

    proto::Profile {
        sample_type,
        sample,
        mapping,
        location,
        function,
        string_table: st.finish(),
        time_nanos: profile.time_nanos,
        duration_nanos: profile.duration_nanos,
        period_type,
        period: profile.period,
        ..Default::default()
    }
}

/// Write `profile` as a gzip-compressed pprof message
///
/// # Errors
/// Returns an error if encoding or writing fails
pub fn write_profile<W: Write>(profile: &Profile, writer: W) -> Result<(), ExportError> {
    let message = encode_profile(profile);
    let mut buf = Vec::with_capacity(message.encoded_len());
    message.encode(&mut buf)?;

    let mut encoder = GzEncoder::new(writer, Compression::default());
    encoder.write_all(&buf)?;
    encoder.finish()?;
    Ok(())
}

/// Read a pprof file, gzip-compressed or not
///
/// # Errors
/// Returns an error if reading, decompressing or decoding fails
pub fn read_profile<R: Read>(mut reader: R) -> Result<proto::Profile, ExportError> {
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;

    // gzip magic
    if raw.starts_with(&[0x1f, 0x8b]) {
        let mut decoded = Vec::new();
        GzDecoder::new(raw.as_slice()).read_to_end(&mut decoded)?;
        raw = decoded;
    }

    Ok(proto::Profile::decode(raw.as_slice())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiling::profile::{Function, Location, Mapping, ProfileMeta, Sample};
    use std::time::Duration;

    fn sample_profile() -> Profile {
        let mut profile =
            Profile::new(&ProfileMeta::cpu(1_700_000_000_000_000_000, Duration::from_secs(10), 100));
        profile.mappings = vec![Mapping {
            id: 1,
            memory_start: 0x40_1000,
            memory_limit: 0x40_2000,
            file_offset: 0x1000,
            filename: "/tmp/fib".to_string(),
            has_functions: true,
        }];
        profile.functions = vec![Function { id: 1, name: "_ZN3fib4main17h0123456789abcdefE".into() }];
        profile.locations = vec![
            Location { id: 1, address: 0x40_1010, mapping_id: Some(1), function_id: Some(1) },
            Location { id: 2, address: 0x7f00_0000_0000, mapping_id: None, function_id: None },
        ];
        profile.samples = vec![Sample { value: vec![45], location_ids: vec![1, 2] }];
        profile
    }

    #[test]
    fn test_string_table_starts_empty() {
        let encoded = encode_profile(&sample_profile());
        assert_eq!(encoded.string_table[0], "");

        let st = &encoded.string_table;
        let sample_type = &encoded.sample_type[0];
        assert_eq!(st[sample_type.r#type as usize], "samples");
        assert_eq!(st[sample_type.unit as usize], "count");
        let period_type = encoded.period_type.as_ref().unwrap();
        assert_eq!(st[period_type.r#type as usize], "cpu");
        assert_eq!(st[period_type.unit as usize], "nanoseconds");
    }

    #[test]
    fn test_encode_ids_and_names() {
        let encoded = encode_profile(&sample_profile());
        let st = &encoded.string_table;

        assert_eq!(encoded.mapping[0].id, 1);
        assert_eq!(st[encoded.mapping[0].filename as usize], "/tmp/fib");
        assert_eq!(encoded.location[0].mapping_id, 1);
        assert_eq!(encoded.location[1].mapping_id, 0);
        assert_eq!(encoded.location[0].line[0].function_id, 1);
        assert!(encoded.location[1].line.is_empty());
        assert_eq!(st[encoded.function[0].name as usize], "fib::main");
        assert_eq!(
            st[encoded.function[0].system_name as usize],
            "_ZN3fib4main17h0123456789abcdefE"
        );
        assert_eq!(encoded.period, 10_000_000);
        assert_eq!(encoded.duration_nanos, 10_000_000_000);
    }

    #[test]
    fn test_strings_are_interned_once() {
        let mut st = StringTable::new();
        assert_eq!(st.intern(""), 0);
        assert_eq!(st.intern("a"), 1);
        assert_eq!(st.intern("b"), 2);
        assert_eq!(st.intern("a"), 1);
        assert_eq!(st.finish(), vec!["", "a", "b"]);
    }

    #[test]
    fn test_written_profile_is_gzip() {
        let mut buf = Vec::new();
        write_profile(&sample_profile(), &mut buf).unwrap();
        assert_eq!(&buf[..2], &[0x1f, 0x8b]);

        let decoded = read_profile(buf.as_slice()).unwrap();
        assert_eq!(decoded, encode_profile(&sample_profile()));
    }

    #[test]
    fn test_read_uncompressed_profile() {
        let encoded = encode_profile(&sample_profile()).encode_to_vec();
        let decoded = read_profile(encoded.as_slice()).unwrap();
        assert_eq!(decoded.sample[0].value, vec![45]);
    }
}

//! Shared on-disk layout constants.
//!
//! File names, section names and property names used by writers, readers and
//! tests.

/// Suffix of the artifact holding one structure: `<prefix>.<structure><suffix>`.
pub const ARTIFACT_SUFFIX: &str = ".docmeta";

/// Suffix appended to the artifact path while the builder is still writing it.
pub const STAGING_SUFFIX: &str = ".tmp";

/// Suffix the previous artifact is moved to while a rebuild is being published.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Suffix of the flat property store: `<prefix><suffix>`.
pub const PROPERTIES_SUFFIX: &str = ".properties";

/// Magic bytes at both ends of an artifact.
pub const ARTIFACT_MAGIC: &[u8; 8] = b"DOCMETA1";

/// Current artifact format version, stored in the resolution.
pub const ARTIFACT_VERSION: u32 = 1;

/// Sections start on this boundary so IPC buffers decode without copying.
pub const SECTION_ALIGNMENT: u64 = 64;

/// Structure name used when the caller does not supply one.
pub const DEFAULT_STRUCTURE_NAME: &str = "meta";

/// Suffix naming the sequential input stream registered next to a structure.
pub const INPUT_STREAM_SUFFIX: &str = "-inputstream";

const FORWARD_SECTION_PREFIX: &str = "forward-";
const REVERSE_SECTION_PREFIX: &str = "reverse-";

pub fn forward_section_name(key: &str) -> String {
    format!("{FORWARD_SECTION_PREFIX}{key}")
}

pub fn reverse_section_name(key: &str) -> String {
    format!("{REVERSE_SECTION_PREFIX}{key}")
}

/// Property holding the comma-joined ordered key list.
pub fn key_names_property(structure: &str) -> String {
    format!("index.{structure}.key-names")
}

/// Property holding the comma-joined reverse-enabled key subset.
pub fn reverse_key_names_property(structure: &str) -> String {
    format!("index.{structure}.reverse-key-names")
}

/// Property holding comma-joined compression flags, parallel to key names.
pub fn key_compress_property(structure: &str) -> String {
    format!("index.{structure}.key-compress")
}

/// Property holding comma-joined sortedness flags, parallel to key names.
pub fn value_sorted_property(structure: &str) -> String {
    format!("index.{structure}.value-sorted")
}

/// Property holding the registered kind of a structure.
pub fn structure_kind_property(structure: &str) -> String {
    format!("index.{structure}.kind")
}

pub fn input_stream_name(structure: &str) -> String {
    format!("{structure}{INPUT_STREAM_SUFFIX}")
}

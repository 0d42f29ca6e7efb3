use indexmap::IndexMap;

use crate::{
    error::{MetaIndexError, MetaResult},
    index::IndexDirectory,
    layout::{
        key_compress_property, key_names_property, reverse_key_names_property,
        value_sorted_property,
    },
};

/// Finalized description of a structure: key order, per-key compression and
/// sortedness, and the reverse-enabled subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaSchema {
    pub keys: Vec<String>,
    pub compress: Vec<bool>,
    pub sorted: Vec<bool>,
    pub reverse_keys: Vec<String>,
}

impl MetaSchema {
    /// Checks that the per-key vectors line up and that every reverse key is
    /// also a forward key.
    pub fn validate(&self) -> MetaResult<()> {
        if self.keys.is_empty() {
            return Err(MetaIndexError::Configuration(
                "a structure needs at least one key".to_string(),
            ));
        }
        let mut seen = IndexMap::with_capacity(self.keys.len());
        for (i, key) in self.keys.iter().enumerate() {
            // Key lists are stored comma-joined and trimmed when read back.
            if key.is_empty() || key.contains(',') || key.trim() != key {
                return Err(MetaIndexError::Configuration(format!(
                    "invalid key name {key:?}"
                )));
            }
            if seen.insert(key.as_str(), i).is_some() {
                return Err(MetaIndexError::Configuration(format!(
                    "key {key} is declared more than once"
                )));
            }
        }
        if self.compress.len() != self.keys.len() || self.sorted.len() != self.keys.len() {
            return Err(MetaIndexError::Configuration(format!(
                "expected {} compression and sortedness flags, got {} and {}",
                self.keys.len(),
                self.compress.len(),
                self.sorted.len()
            )));
        }
        let mut seen_reverse = IndexMap::with_capacity(self.reverse_keys.len());
        for reverse_key in &self.reverse_keys {
            if !seen.contains_key(reverse_key.as_str()) {
                return Err(MetaIndexError::Configuration(format!(
                    "{reverse_key} is a reverse meta key, but not forward meta key"
                )));
            }
            if seen_reverse.insert(reverse_key.as_str(), ()).is_some() {
                return Err(MetaIndexError::Configuration(format!(
                    "reverse key {reverse_key} is declared more than once"
                )));
            }
        }
        Ok(())
    }

    /// Maps each key name to its column position.
    pub fn positions(&self) -> IndexMap<String, usize> {
        self.keys
            .iter()
            .enumerate()
            .map(|(i, key)| (key.clone(), i))
            .collect()
    }

    pub fn is_reverse(&self, key: &str) -> bool {
        self.reverse_keys.iter().any(|k| k == key)
    }

    /// Flat properties describing this schema under `structure`.
    pub fn to_properties(&self, structure: &str) -> Vec<(String, String)> {
        vec![
            (key_names_property(structure), self.keys.join(",")),
            (
                reverse_key_names_property(structure),
                self.reverse_keys.join(","),
            ),
            (key_compress_property(structure), join_flags(&self.compress)),
            (value_sorted_property(structure), join_flags(&self.sorted)),
        ]
    }

    /// Reads the schema of `structure` back from the index properties.
    ///
    /// # Errors
    /// Returns `StructureNotFound` if no key names are recorded, and a
    /// property error if any flag list is malformed or inconsistent.
    pub fn from_properties(index: &IndexDirectory, structure: &str) -> MetaResult<Self> {
        let key_names = key_names_property(structure);
        let keys = match index.property(&key_names) {
            Some(value) => split_list(&value),
            None => return Err(MetaIndexError::StructureNotFound(structure.to_string())),
        };

        let compress_property = key_compress_property(structure);
        let compress = parse_flags(
            &compress_property,
            &index.property_or(&compress_property, ""),
        )?;
        let sorted_property = value_sorted_property(structure);
        let sorted = parse_flags(&sorted_property, &index.property_or(&sorted_property, ""))?;
        let reverse_keys = split_list(&index.property_or(&reverse_key_names_property(structure), ""));

        let schema = Self {
            keys,
            compress,
            sorted,
            reverse_keys,
        };
        schema.validate().map_err(|err| MetaIndexError::Properties {
            key: key_names,
            reason: err.to_string(),
        })?;
        Ok(schema)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn join_flags(flags: &[bool]) -> String {
    flags
        .iter()
        .map(|flag| flag.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_flags(property: &str, value: &str) -> MetaResult<Vec<bool>> {
    split_list(value)
        .iter()
        .map(|item| match item.to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(MetaIndexError::Properties {
                key: property.to_string(),
                reason: format!("{item:?} is not a boolean"),
            }),
        })
        .collect()
}

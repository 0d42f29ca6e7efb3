//! Known structure kinds and the properties that register them.

use std::{fmt, str::FromStr};

use crate::{
    layout::{input_stream_name, structure_kind_property},
    reader::MetaIndex,
    stream::MetaIndexInputStream,
};

/// Kind of structure registered under a name in an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructureKind {
    /// Random-access forward/reverse metadata store.
    MetaIndex,
    /// Sequential iterator over every document's full tuple.
    MetaIndexInputStream,
}

impl StructureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructureKind::MetaIndex => "meta-index",
            StructureKind::MetaIndexInputStream => "meta-index-inputstream",
        }
    }
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StructureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meta-index" => Ok(StructureKind::MetaIndex),
            "meta-index-inputstream" => Ok(StructureKind::MetaIndexInputStream),
            other => Err(format!("unknown structure kind: {other}")),
        }
    }
}

/// An opened structure.
#[derive(Debug)]
pub enum Structure {
    MetaIndex(MetaIndex),
    InputStream(MetaIndexInputStream),
}

/// Properties registering `structure` and its input stream.
pub fn registration_properties(structure: &str) -> Vec<(String, String)> {
    vec![
        (
            structure_kind_property(structure),
            StructureKind::MetaIndex.as_str().to_string(),
        ),
        (
            structure_kind_property(&input_stream_name(structure)),
            StructureKind::MetaIndexInputStream.as_str().to_string(),
        ),
    ]
}

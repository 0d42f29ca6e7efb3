//! Value -> document id lookup strategies.
//!
//! A reverse-enabled key is served either by an explicit hash map persisted at
//! build time, or by binary search over its forward column when the build
//! observed that the column is sorted.

use std::{collections::HashMap, fs::File, sync::Arc};

use arrow::{
    array::{Array, StringArray, UInt32Array},
    buffer::Buffer,
    ipc::writer::FileWriter,
    record_batch::RecordBatch,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use indexmap::IndexMap;

use crate::{
    artifact::read_ipc_file,
    error::{MetaIndexError, MetaResult},
    forward::ForwardColumn,
    DocId,
};

const VALUE_FIELD: &str = "value";
const DOC_FIELD: &str = "doc";

fn reverse_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(VALUE_FIELD, DataType::Utf8, false),
        Field::new(DOC_FIELD, DataType::UInt32, false),
    ]))
}

#[derive(Debug, Clone)]
pub enum ReverseIndex {
    /// Explicit map persisted by the builder.
    Hash(HashMap<String, DocId>),
    /// No map; the forward column is known to be non-decreasing.
    BinarySearch,
}

impl ReverseIndex {
    /// Loads the explicit map stored in a reverse section.
    pub fn from_section(key: &str, section: &Buffer) -> MetaResult<Self> {
        let (schema, batches) = read_ipc_file(section)?;
        if schema.fields().len() != 2 {
            return Err(MetaIndexError::Corrupt(format!(
                "reverse section for key {key} must hold two columns"
            )));
        }

        let capacity = batches.iter().map(|batch| batch.num_rows()).sum();
        let mut map = HashMap::with_capacity(capacity);
        for batch in &batches {
            let values = batch
                .column(0)
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| {
                    MetaIndexError::Corrupt(format!("reverse values for key {key} are not utf8"))
                })?;
            let docs = batch
                .column(1)
                .as_any()
                .downcast_ref::<UInt32Array>()
                .ok_or_else(|| {
                    MetaIndexError::Corrupt(format!("reverse ids for key {key} are not uint32"))
                })?;
            for row in 0..batch.num_rows() {
                map.insert(values.value(row).to_string(), docs.value(row));
            }
        }
        Ok(ReverseIndex::Hash(map))
    }

    pub fn strategy(&self) -> &'static str {
        match self {
            ReverseIndex::Hash(_) => "hash",
            ReverseIndex::BinarySearch => "binary-search",
        }
    }

    /// Resolves `value` to a document id, `None` when it does not occur.
    pub fn lookup(&self, column: &ForwardColumn, value: &str) -> MetaResult<Option<DocId>> {
        match self {
            ReverseIndex::Hash(map) => Ok(map.get(value).copied()),
            ReverseIndex::BinarySearch => binary_search(column, value),
        }
    }
}

/// Binary search over a column whose values are non-decreasing.
///
/// With duplicate values any matching id may be returned.
pub fn binary_search(column: &ForwardColumn, value: &str) -> MetaResult<Option<DocId>> {
    let mut low: i64 = 0;
    let mut high: i64 = column.len() as i64 - 1;
    while low <= high {
        let mid = low + (high - low) / 2;
        let found = column.get(mid as DocId)?;
        match value.cmp(found.as_str()) {
            std::cmp::Ordering::Equal => return Ok(Some(mid as DocId)),
            std::cmp::Ordering::Greater => low = mid + 1,
            std::cmp::Ordering::Less => high = mid - 1,
        }
    }
    Ok(None)
}

/// Builds the value -> id map of a column, scanning from id 0 upward.
///
/// A later document overwrites an earlier one holding the same value.
pub fn build_reverse_map(column: &ForwardColumn) -> MetaResult<IndexMap<String, DocId>> {
    let mut map = IndexMap::with_capacity(column.len());
    for (id, value) in column.iter().enumerate() {
        let id = DocId::try_from(id)
            .map_err(|_| MetaIndexError::DocumentLimit(column.key().to_string()))?;
        map.insert(value?, id);
    }
    Ok(map)
}

/// Writes a reverse map to a temporary Arrow IPC file, `block_rows` entries
/// per record batch.
pub fn write_reverse_section(
    map: &IndexMap<String, DocId>,
    block_rows: usize,
) -> MetaResult<File> {
    let schema = reverse_schema();
    let mut writer = FileWriter::try_new(tempfile::tempfile()?, &schema)?;

    let entries: Vec<(&String, &DocId)> = map.iter().collect();
    for chunk in entries.chunks(block_rows.max(1)) {
        let values = StringArray::from_iter_values(chunk.iter().map(|(value, _)| value.as_str()));
        let docs = UInt32Array::from_iter_values(chunk.iter().map(|(_, doc)| **doc));
        let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(values), Arc::new(docs)])?;
        writer.write(&batch)?;
    }

    writer.finish()?;
    Ok(writer.into_inner()?)
}

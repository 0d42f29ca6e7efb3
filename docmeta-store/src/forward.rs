use std::{
    fs::File,
    io::{Seek, SeekFrom},
    sync::Arc,
};

use arrow::{
    array::{Array, BinaryArray, BinaryBuilder},
    buffer::Buffer,
    ipc::writer::FileWriter,
    record_batch::RecordBatch,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};

use crate::{
    artifact::{map_file, read_ipc_file},
    error::{MetaIndexError, MetaResult},
    serializer::ValueSerializer,
    DocId,
};

const VALUE_FIELD: &str = "value";

fn forward_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![Field::new(
        VALUE_FIELD,
        DataType::Binary,
        false,
    )]))
}

/// Append-only writer for one key's column.
///
/// Encoded values are buffered until `block_rows` are pending, then written as
/// one record batch to a temporary Arrow IPC file.
pub struct ForwardColumnWriter {
    key: String,
    schema: SchemaRef,
    writer: FileWriter<File>,
    builder: BinaryBuilder,
    serializer: Arc<dyn ValueSerializer>,
    block_rows: usize,
    pending_rows: usize,
    len: usize,
}

impl ForwardColumnWriter {
    /// Creates a writer backed by a fresh temporary file.
    ///
    /// # Errors
    /// Returns an error if `block_rows` is zero, the temp file cannot be
    /// created or the IPC writer fails to initialize.
    pub fn new(
        key: impl Into<String>,
        serializer: Arc<dyn ValueSerializer>,
        block_rows: usize,
    ) -> MetaResult<Self> {
        if block_rows == 0 {
            return Err(MetaIndexError::Configuration(
                "block_rows must be greater than 0".to_string(),
            ));
        }
        let schema = forward_schema();
        let writer = FileWriter::try_new(tempfile::tempfile()?, &schema)?;
        Ok(Self {
            key: key.into(),
            schema,
            writer,
            builder: BinaryBuilder::new(),
            serializer,
            block_rows,
            pending_rows: 0,
            len: 0,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Appends a value and returns the id it was stored under.
    pub fn append(&mut self, value: &str) -> MetaResult<DocId> {
        let id = DocId::try_from(self.len)
            .map_err(|_| MetaIndexError::DocumentLimit(self.key.clone()))?;
        self.builder.append_value(self.serializer.encode(value));
        self.pending_rows += 1;
        self.len += 1;

        if self.pending_rows >= self.block_rows {
            self.flush_block()?;
        }
        Ok(id)
    }

    fn flush_block(&mut self) -> MetaResult<()> {
        let array = self.builder.finish();
        let batch = RecordBatch::try_new(self.schema.clone(), vec![Arc::new(array)])?;
        self.writer.write(&batch)?;
        tracing::debug!(
            "Flushed block of {} values for key {}",
            self.pending_rows,
            self.key
        );
        self.pending_rows = 0;
        Ok(())
    }

    /// Flushes the last partial block and finalizes the IPC file.
    pub fn finish(mut self) -> MetaResult<SealedColumn> {
        if self.pending_rows > 0 {
            self.flush_block()?;
        }
        self.writer.finish()?;
        let mut file = self.writer.into_inner()?;
        file.seek(SeekFrom::Start(0))?;

        Ok(SealedColumn {
            key: self.key,
            file,
            len: self.len,
            serializer: self.serializer,
        })
    }
}

/// A finished column whose IPC file still lives in a temporary file.
pub struct SealedColumn {
    pub key: String,
    pub file: File,
    pub len: usize,
    pub serializer: Arc<dyn ValueSerializer>,
}

impl SealedColumn {
    /// Maps the temporary file so the column can be read back.
    pub fn open(&self) -> MetaResult<ForwardColumn> {
        let column = ForwardColumn::try_new(
            self.key.clone(),
            &map_file(&self.file)?,
            self.serializer.clone(),
        )?;
        if column.len() != self.len {
            return Err(MetaIndexError::Corrupt(format!(
                "sealed column {} holds {} values, expected {}",
                self.key,
                column.len(),
                self.len
            )));
        }
        Ok(column)
    }
}

/// Read-only, block-indexed column of one key's values.
///
/// Blocks are decoded once when the column is opened; values are decoded on
/// access through the key's serializer.
#[derive(Debug, Clone)]
pub struct ForwardColumn {
    key: String,
    blocks: Vec<BinaryArray>,
    /// First document id of each block.
    block_starts: Vec<usize>,
    len: usize,
    serializer: Arc<dyn ValueSerializer>,
}

impl ForwardColumn {
    /// Decodes the IPC section of a forward column.
    ///
    /// # Errors
    /// Returns a corruption error if the section does not hold a single
    /// non-null binary column.
    pub fn try_new(
        key: impl Into<String>,
        section: &Buffer,
        serializer: Arc<dyn ValueSerializer>,
    ) -> MetaResult<Self> {
        let key = key.into();
        let (schema, batches) = read_ipc_file(section)?;
        if schema.fields().len() != 1 || schema.field(0).data_type() != &DataType::Binary {
            return Err(MetaIndexError::Corrupt(format!(
                "forward section for key {key} does not hold a single binary column"
            )));
        }

        let mut blocks = Vec::with_capacity(batches.len());
        let mut block_starts = Vec::with_capacity(batches.len());
        let mut len = 0;
        for batch in batches {
            let array = batch
                .column(0)
                .as_any()
                .downcast_ref::<BinaryArray>()
                .ok_or_else(|| {
                    MetaIndexError::Corrupt(format!("forward column {key} is not binary"))
                })?
                .clone();
            if array.null_count() > 0 {
                return Err(MetaIndexError::Corrupt(format!(
                    "forward column {key} contains nulls"
                )));
            }
            if array.is_empty() {
                continue;
            }
            block_starts.push(len);
            len += array.len();
            blocks.push(array);
        }

        Ok(Self {
            key,
            blocks,
            block_starts,
            len,
            serializer,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the value stored for document `id`.
    ///
    /// # Errors
    /// Returns `OutOfRange` when `id >= len()`.
    pub fn get(&self, id: DocId) -> MetaResult<String> {
        let index = id as usize;
        if index >= self.len {
            return Err(MetaIndexError::OutOfRange {
                id,
                size: self.len,
            });
        }
        let block = self.block_starts.partition_point(|start| *start <= index) - 1;
        let row = index - self.block_starts[block];
        self.serializer.decode(self.blocks[block].value(row))
    }

    /// Decodes every value from id 0 upward.
    pub fn iter(&self) -> impl Iterator<Item = MetaResult<String>> + '_ {
        self.blocks.iter().flat_map(move |block| {
            block
                .iter()
                .map(move |value| self.serializer.decode(value.unwrap_or_default()))
        })
    }
}

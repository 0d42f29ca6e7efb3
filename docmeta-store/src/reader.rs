use std::{path::Path, sync::Arc};

use indexmap::IndexMap;

use crate::{
    artifact::Artifact,
    error::{MetaIndexError, MetaResult},
    forward::ForwardColumn,
    index::IndexDirectory,
    layout::{forward_section_name, reverse_section_name},
    reverse::ReverseIndex,
    schema::MetaSchema,
    serializer::serializer_for,
    stream::MetaIndexInputStream,
    DocId,
};

/// Immutable state shared by a reader and the input streams it hands out.
#[derive(Debug)]
pub(crate) struct MetaIndexInner {
    pub(crate) schema: MetaSchema,
    positions: IndexMap<String, usize>,
    pub(crate) columns: Vec<ForwardColumn>,
    reverse: Vec<Option<ReverseIndex>>,
    pub(crate) num_documents: usize,
}

impl MetaIndexInner {
    fn position(&self, key: &str) -> MetaResult<usize> {
        self.positions
            .get(key)
            .copied()
            .ok_or_else(|| MetaIndexError::KeyNotFound(key.to_string()))
    }

    /// Full tuple of document `id`, in schema key order.
    pub(crate) fn tuple(&self, id: DocId) -> MetaResult<Vec<String>> {
        self.columns.iter().map(|column| column.get(id)).collect()
    }
}

/// Read-only view of a finalized metadata structure.
///
/// All forward blocks are decoded over a shared read-only mapping of the
/// artifact when the reader is opened, so lookups never touch the file again.
#[derive(Debug)]
pub struct MetaIndex {
    structure: String,
    inner: Option<Arc<MetaIndexInner>>,
}

impl MetaIndex {
    /// Opens `structure` from the schema recorded in `index`.
    ///
    /// # Errors
    /// Returns `StructureNotFound` when no schema is recorded, an IO error
    /// when the artifact cannot be mapped, and a corruption error when the
    /// artifact disagrees with the schema.
    pub fn open(index: &IndexDirectory, structure: &str) -> MetaResult<Self> {
        let schema = MetaSchema::from_properties(index, structure)?;
        Self::open_with_schema(structure, schema, index.artifact_path(structure))
    }

    /// Opens the artifact at `path`, interpreting it with `schema`.
    pub fn open_with_schema(
        structure: &str,
        schema: MetaSchema,
        path: impl AsRef<Path>,
    ) -> MetaResult<Self> {
        schema.validate()?;
        let artifact = Artifact::open(path)?;
        let num_documents = usize::try_from(artifact.num_documents())
            .map_err(|_| MetaIndexError::DocumentLimit(structure.to_string()))?;

        let mut columns = Vec::with_capacity(schema.keys.len());
        for (key, compress) in schema.keys.iter().zip(&schema.compress) {
            let section = artifact.section(&forward_section_name(key)).ok_or_else(|| {
                MetaIndexError::Corrupt(format!(
                    "{} has no forward section for key {key}",
                    artifact.path().display()
                ))
            })?;
            let column = ForwardColumn::try_new(key.clone(), &section, serializer_for(*compress))?;
            if column.len() != num_documents {
                return Err(MetaIndexError::Corrupt(format!(
                    "forward column {key} holds {} values, expected {num_documents}",
                    column.len()
                )));
            }
            columns.push(column);
        }

        let mut reverse = Vec::with_capacity(schema.keys.len());
        for (key, sorted) in schema.keys.iter().zip(&schema.sorted) {
            let strategy = if !schema.is_reverse(key) {
                None
            } else if let Some(section) = artifact.section(&reverse_section_name(key)) {
                Some(ReverseIndex::from_section(key, &section)?)
            } else if *sorted {
                Some(ReverseIndex::BinarySearch)
            } else {
                None
            };
            reverse.push(strategy);
        }

        tracing::info!(
            "Opened structure {} with {} documents, keys {:?}",
            structure,
            num_documents,
            schema.keys
        );
        for (key, strategy) in schema.keys.iter().zip(&reverse) {
            if let Some(strategy) = strategy {
                tracing::debug!("Reverse lookups on {} use {}", key, strategy.strategy());
            }
        }

        Ok(Self {
            structure: structure.to_string(),
            inner: Some(Arc::new(MetaIndexInner {
                positions: schema.positions(),
                schema,
                columns,
                reverse,
                num_documents,
            })),
        })
    }

    fn inner(&self) -> MetaResult<&Arc<MetaIndexInner>> {
        self.inner
            .as_ref()
            .ok_or_else(|| MetaIndexError::ReaderClosed(self.structure.clone()))
    }

    pub fn structure(&self) -> &str {
        &self.structure
    }

    /// Number of documents in the structure.
    pub fn size(&self) -> MetaResult<usize> {
        Ok(self.inner()?.num_documents)
    }

    /// Declared keys in schema order.
    pub fn get_keys(&self) -> MetaResult<Vec<String>> {
        Ok(self.inner()?.schema.keys.clone())
    }

    pub fn get_reverse_keys(&self) -> MetaResult<Vec<String>> {
        Ok(self.inner()?.schema.reverse_keys.clone())
    }

    /// Returns the value of `key` for document `id`.
    ///
    /// # Errors
    /// `KeyNotFound` for an undeclared key, `OutOfRange` for `id >= size()`.
    pub fn get_item(&self, key: &str, id: DocId) -> MetaResult<String> {
        let inner = self.inner()?;
        inner.columns[inner.position(key)?].get(id)
    }

    /// Returns every value of document `id`, in key order.
    pub fn get_all_items(&self, id: DocId) -> MetaResult<Vec<String>> {
        self.inner()?.tuple(id)
    }

    /// Returns the value of `key` for each of `ids`, in the order given.
    pub fn get_items(&self, key: &str, ids: &[DocId]) -> MetaResult<Vec<String>> {
        let inner = self.inner()?;
        let column = &inner.columns[inner.position(key)?];
        ids.iter().map(|id| column.get(*id)).collect()
    }

    /// Returns the value of each of `keys` for document `id`.
    pub fn get_items_for_keys<K: AsRef<str>>(&self, keys: &[K], id: DocId) -> MetaResult<Vec<String>> {
        let inner = self.inner()?;
        keys.iter()
            .map(|key| inner.columns[inner.position(key.as_ref())?].get(id))
            .collect()
    }

    /// Returns one row per document, each holding the values of `keys`.
    pub fn get_items_matrix<K: AsRef<str>>(
        &self,
        keys: &[K],
        ids: &[DocId],
    ) -> MetaResult<Vec<Vec<String>>> {
        let inner = self.inner()?;
        let columns = keys
            .iter()
            .map(|key| Ok(&inner.columns[inner.position(key.as_ref())?]))
            .collect::<MetaResult<Vec<&ForwardColumn>>>()?;
        ids.iter()
            .map(|id| {
                columns
                    .iter()
                    .map(|column| column.get(*id))
                    .collect::<MetaResult<Vec<String>>>()
            })
            .collect()
    }

    /// Resolves `value` of `key` to a document id.
    ///
    /// Returns `Ok(None)` when no document holds the value.
    ///
    /// # Errors
    /// `KeyNotFound` for an undeclared key, `UnsupportedOperation` when the
    /// key has no reverse lookup.
    pub fn get_document(&self, key: &str, value: &str) -> MetaResult<Option<DocId>> {
        let inner = self.inner()?;
        let position = inner.position(key)?;
        match &inner.reverse[position] {
            Some(strategy) => strategy.lookup(&inner.columns[position], value),
            None => Err(MetaIndexError::UnsupportedOperation(format!(
                "{key} in structure {}",
                self.structure
            ))),
        }
    }

    /// Name of the reverse lookup strategy attached to `key`, if any.
    pub fn reverse_strategy(&self, key: &str) -> MetaResult<Option<&'static str>> {
        let inner = self.inner()?;
        Ok(inner.reverse[inner.position(key)?]
            .as_ref()
            .map(ReverseIndex::strategy))
    }

    /// Sequential iterator over every document's tuple.
    ///
    /// The stream keeps the mapped artifact alive on its own and is unaffected
    /// by closing this reader.
    pub fn input_stream(&self) -> MetaResult<MetaIndexInputStream> {
        Ok(MetaIndexInputStream::new(self.inner()?.clone()))
    }

    /// Releases this handle's reference to the artifact. Later calls fail
    /// with `ReaderClosed`; closing twice is a no-op.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            tracing::debug!("Closed reader for structure {}", self.structure);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        builder::{BuilderOptions, MetaIndexBuilder},
        error::MetaIndexError,
        index::IndexDirectory,
    };

    use super::MetaIndex;

    fn build(
        index: &Arc<IndexDirectory>,
        keys: &[&str],
        reverse: &[&str],
        docs: &[&[&str]],
        skip_sorted: bool,
    ) -> anyhow::Result<MetaIndex> {
        let options = BuilderOptions {
            block_rows: 3,
            reverse_build_threads: 2,
            compressed_keys: Vec::new(),
            skip_sorted_reverse_maps: skip_sorted,
        };
        let mut builder = MetaIndexBuilder::with_options(index.clone(), "meta", keys, reverse, options)?;
        for doc in docs {
            builder.write_document_entry(*doc)?;
        }
        builder.close()?;
        Ok(MetaIndex::open(index, "meta")?)
    }

    #[test]
    fn lookups_without_reverse_keys_are_unsupported() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let index = IndexDirectory::create(dir.path(), "data")?;
        let meta = build(&index, &["docno"], &[], &[&["a"], &["b"], &["c"], &["d"]], true)?;

        assert_eq!(meta.size()?, 4);
        assert_eq!(meta.get_item("docno", 2)?, "c");
        assert!(matches!(
            meta.get_document("docno", "c"),
            Err(MetaIndexError::UnsupportedOperation(_))
        ));
        assert_eq!(meta.reverse_strategy("docno")?, None);
        Ok(())
    }

    #[test]
    fn unknown_keys_and_ids_fail() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let index = IndexDirectory::create(dir.path(), "data")?;
        let meta = build(&index, &["docno"], &["docno"], &[&["a"], &["b"]], false)?;

        assert!(matches!(
            meta.get_item("title", 0),
            Err(MetaIndexError::KeyNotFound(_))
        ));
        assert!(matches!(
            meta.get_document("title", "a"),
            Err(MetaIndexError::KeyNotFound(_))
        ));
        assert!(matches!(
            meta.get_item("docno", 2),
            Err(MetaIndexError::OutOfRange { id: 2, size: 2 })
        ));
        Ok(())
    }

    #[test]
    fn batch_reads_follow_requested_order() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let index = IndexDirectory::create(dir.path(), "data")?;
        let docs: &[&[&str]] = &[
            &["d0", "u0", "t0"],
            &["d1", "u1", "t1"],
            &["d2", "u2", "t2"],
            &["d3", "u3", "t3"],
        ];
        let meta = build(&index, &["docno", "url", "title"], &[], docs, false)?;

        assert_eq!(meta.get_items("url", &[3, 0, 3])?, vec!["u3", "u0", "u3"]);
        assert_eq!(
            meta.get_items_for_keys(&["title", "docno"], 1)?,
            vec!["t1", "d1"]
        );
        assert_eq!(
            meta.get_items_matrix(&["docno", "title"], &[2, 0])?,
            vec![vec!["d2", "t2"], vec!["d0", "t0"]]
        );
        assert!(meta.get_items("url", &[0, 9]).is_err());
        assert_eq!(meta.get_keys()?, vec!["docno", "url", "title"]);
        Ok(())
    }

    #[test]
    fn sorted_reverse_key_without_map_uses_binary_search() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let index = IndexDirectory::create(dir.path(), "data")?;
        let docs: &[&[&str]] = &[&["doc1"], &["doc20"], &["doc3"], &["doc4"]];
        let meta = build(&index, &["docno"], &["docno"], docs, true)?;

        assert_eq!(meta.reverse_strategy("docno")?, Some("binary-search"));
        assert_eq!(meta.get_document("docno", "doc3")?, Some(2));
        assert_eq!(meta.get_document("docno", "doc0")?, None);
        Ok(())
    }

    #[test]
    fn unsorted_reverse_key_keeps_its_map() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let index = IndexDirectory::create(dir.path(), "data")?;
        let docs: &[&[&str]] = &[&["b"], &["a"], &["c"]];
        let meta = build(&index, &["docno"], &["docno"], docs, true)?;

        assert_eq!(meta.reverse_strategy("docno")?, Some("hash"));
        assert_eq!(meta.get_document("docno", "a")?, Some(1));
        Ok(())
    }

    #[test]
    fn closed_reader_rejects_every_operation() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let index = IndexDirectory::create(dir.path(), "data")?;
        let mut meta = build(&index, &["docno"], &["docno"], &[&["a"]], false)?;
        let stream = meta.input_stream()?;

        meta.close();
        meta.close();
        assert!(meta.is_closed());
        assert!(matches!(meta.size(), Err(MetaIndexError::ReaderClosed(_))));
        assert!(matches!(
            meta.get_item("docno", 0),
            Err(MetaIndexError::ReaderClosed(_))
        ));
        assert!(matches!(
            meta.get_document("docno", "a"),
            Err(MetaIndexError::ReaderClosed(_))
        ));
        assert!(meta.input_stream().is_err());

        let rows: Vec<Vec<String>> = stream.collect::<Result<_, _>>()?;
        assert_eq!(rows, vec![vec!["a".to_string()]]);
        Ok(())
    }

    #[test]
    fn truncated_artifact_is_corrupt() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let index = IndexDirectory::create(dir.path(), "data")?;
        build(&index, &["docno"], &[], &[&["a"], &["b"]], false)?;

        let path = index.artifact_path("meta");
        let bytes = std::fs::read(&path)?;
        std::fs::write(&path, &bytes[..bytes.len() - 4])?;
        assert!(matches!(
            MetaIndex::open(&index, "meta"),
            Err(MetaIndexError::Corrupt(_))
        ));
        Ok(())
    }

    #[test]
    fn missing_artifact_is_an_io_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let index = IndexDirectory::create(dir.path(), "data")?;
        build(&index, &["docno"], &[], &[&["a"]], false)?;
        std::fs::remove_file(index.artifact_path("meta"))?;

        assert!(matches!(
            MetaIndex::open(&index, "meta"),
            Err(MetaIndexError::Io(_))
        ));
        Ok(())
    }
}

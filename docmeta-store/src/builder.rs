use std::{collections::HashMap, fs, io, path::Path, sync::Arc};

use rayon::prelude::*;

use crate::{
    artifact::ArtifactWriter,
    error::{MetaIndexError, MetaResult},
    forward::{ForwardColumn, ForwardColumnWriter, SealedColumn},
    index::IndexDirectory,
    layout::{forward_section_name, reverse_section_name, DEFAULT_STRUCTURE_NAME},
    registry::registration_properties,
    reverse::{build_reverse_map, write_reverse_section},
    schema::MetaSchema,
    serializer::serializer_for,
    DocId,
};

/// Tunables for a single build.
#[derive(Debug, Clone)]
pub struct BuilderOptions {
    /// Documents per forward store block.
    pub block_rows: usize,
    /// Upper bound on threads used to build reverse maps.
    pub reverse_build_threads: usize,
    /// Keys whose values are LZ4-compressed on disk.
    pub compressed_keys: Vec<String>,
    /// Serve sorted reverse keys by binary search instead of persisting a map.
    pub skip_sorted_reverse_maps: bool,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            block_rows: docmeta_config::CONFIG.block_rows,
            reverse_build_threads: docmeta_config::CONFIG.reverse_build_threads,
            compressed_keys: Vec::new(),
            skip_sorted_reverse_maps: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    Open,
    Closing,
    Closed,
}

/// Sequential writer of one metadata structure.
///
/// Every write appends one value per declared key. `close` derives the reverse
/// maps, publishes the artifact and registers the structure; only then can it
/// be opened by a [`crate::MetaIndex`].
pub struct MetaIndexBuilder {
    index: Arc<IndexDirectory>,
    structure: String,
    keys: Vec<String>,
    reverse_keys: Vec<String>,
    compress: Vec<bool>,
    columns: Vec<ForwardColumnWriter>,
    last_values: Vec<Option<String>>,
    sorted: Vec<bool>,
    num_documents: usize,
    options: BuilderOptions,
    state: BuilderState,
}

impl MetaIndexBuilder {
    pub fn new<K: AsRef<str>, R: AsRef<str>>(
        index: Arc<IndexDirectory>,
        structure: &str,
        keys: &[K],
        reverse_keys: &[R],
    ) -> MetaResult<Self> {
        Self::with_options(index, structure, keys, reverse_keys, BuilderOptions::default())
    }

    /// Builds the structure registered as `meta`.
    pub fn new_default<K: AsRef<str>, R: AsRef<str>>(
        index: Arc<IndexDirectory>,
        keys: &[K],
        reverse_keys: &[R],
    ) -> MetaResult<Self> {
        Self::new(index, DEFAULT_STRUCTURE_NAME, keys, reverse_keys)
    }

    /// Creates a builder, validating the key configuration before anything is
    /// written.
    ///
    /// # Errors
    /// Returns a configuration error when a reverse or compressed key is not a
    /// declared key, when keys are duplicated or empty, or when an option is 0.
    pub fn with_options<K: AsRef<str>, R: AsRef<str>>(
        index: Arc<IndexDirectory>,
        structure: &str,
        keys: &[K],
        reverse_keys: &[R],
        options: BuilderOptions,
    ) -> MetaResult<Self> {
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        let reverse_keys: Vec<String> =
            reverse_keys.iter().map(|k| k.as_ref().to_string()).collect();

        if structure.is_empty() {
            return Err(MetaIndexError::Configuration(
                "structure name must not be empty".to_string(),
            ));
        }
        if options.reverse_build_threads == 0 {
            return Err(MetaIndexError::Configuration(
                "reverse_build_threads must be greater than 0".to_string(),
            ));
        }
        for compressed in &options.compressed_keys {
            if !keys.contains(compressed) {
                return Err(MetaIndexError::Configuration(format!(
                    "{compressed} is a compressed meta key, but not forward meta key"
                )));
            }
        }
        let compress: Vec<bool> = keys
            .iter()
            .map(|k| options.compressed_keys.contains(k))
            .collect();

        MetaSchema {
            keys: keys.clone(),
            compress: compress.clone(),
            sorted: vec![true; keys.len()],
            reverse_keys: reverse_keys.clone(),
        }
        .validate()?;

        let columns = keys
            .iter()
            .zip(&compress)
            .map(|(key, compress)| {
                ForwardColumnWriter::new(key.clone(), serializer_for(*compress), options.block_rows)
            })
            .collect::<MetaResult<Vec<_>>>()?;

        tracing::debug!(
            "Building structure {} with keys {:?} (reverse: {:?})",
            structure,
            keys,
            reverse_keys
        );

        Ok(Self {
            index,
            structure: structure.to_string(),
            last_values: vec![None; keys.len()],
            sorted: vec![true; keys.len()],
            keys,
            reverse_keys,
            compress,
            columns,
            num_documents: 0,
            options,
            state: BuilderState::Open,
        })
    }

    pub fn structure(&self) -> &str {
        &self.structure
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    pub fn num_documents(&self) -> usize {
        self.num_documents
    }

    /// Sortedness observed so far, parallel to [`MetaIndexBuilder::keys`].
    pub fn sorted_flags(&self) -> &[bool] {
        &self.sorted
    }

    /// Appends one document given one value per declared key, in key order.
    ///
    /// # Errors
    /// Returns `ArityMismatch` when the number of values differs from the
    /// number of keys, and `BuilderClosed` once the builder left `Open`.
    pub fn write_document_entry<S: AsRef<str>>(&mut self, values: &[S]) -> MetaResult<DocId> {
        self.ensure_open()?;
        if values.len() != self.keys.len() {
            return Err(MetaIndexError::ArityMismatch {
                expected: self.keys.len(),
                actual: values.len(),
            });
        }
        let values: Vec<&str> = values.iter().map(|value| value.as_ref()).collect();
        self.append_tuple(&values)
    }

    /// Appends one document from a sparse key -> value mapping.
    ///
    /// Keys missing from `data` are stored as the empty string; entries for
    /// undeclared keys are ignored.
    pub fn write_document_entry_map(&mut self, data: &HashMap<String, String>) -> MetaResult<DocId> {
        self.ensure_open()?;
        let values: Vec<&str> = self
            .keys
            .iter()
            .map(|key| data.get(key).map(String::as_str).unwrap_or(""))
            .collect();
        self.append_tuple(&values)
    }

    fn ensure_open(&self) -> MetaResult<()> {
        match self.state {
            BuilderState::Open => Ok(()),
            _ => Err(MetaIndexError::BuilderClosed(self.structure.clone())),
        }
    }

    fn append_tuple(&mut self, values: &[&str]) -> MetaResult<DocId> {
        let mut id = None;
        for (ki, value) in values.iter().enumerate() {
            match self.columns[ki].append(value) {
                Ok(appended) => id = Some(appended),
                Err(err) => {
                    // Columns may now disagree in length; nothing more can be written.
                    self.state = BuilderState::Closed;
                    return Err(err);
                }
            }

            match &mut self.last_values[ki] {
                Some(last) => {
                    if *value < last.as_str() {
                        self.sorted[ki] = false;
                    }
                    last.clear();
                    last.push_str(value);
                }
                slot => *slot = Some(value.to_string()),
            }
        }
        self.num_documents += 1;
        id.ok_or_else(|| MetaIndexError::Configuration("structure has no keys".to_string()))
    }

    /// Finalizes the structure: builds reverse maps, publishes the artifact,
    /// then persists the schema and registers the structure.
    ///
    /// Any failure leaves nothing published or registered. The builder is
    /// `Closed` afterwards either way; closing again returns `BuilderClosed`.
    pub fn close(&mut self) -> MetaResult<()> {
        self.ensure_open()?;
        self.state = BuilderState::Closing;

        let columns = std::mem::take(&mut self.columns);
        let artifact_path = self.index.artifact_path(&self.structure);
        let staging_path = self.index.staging_path(&self.structure);

        let result = self.finalize(columns, &artifact_path, &staging_path);
        self.state = BuilderState::Closed;

        if let Err(err) = &result {
            tracing::warn!(
                "Failed to finalize structure {}: {}. Discarding partial output.",
                self.structure,
                err
            );
            remove_if_exists(&staging_path);
        }
        result
    }

    fn finalize(
        &self,
        columns: Vec<ForwardColumnWriter>,
        artifact_path: &Path,
        staging_path: &Path,
    ) -> MetaResult<()> {
        let mut sealed = columns
            .into_iter()
            .map(ForwardColumnWriter::finish)
            .collect::<MetaResult<Vec<SealedColumn>>>()?;
        let forward = sealed
            .iter()
            .map(SealedColumn::open)
            .collect::<MetaResult<Vec<ForwardColumn>>>()?;

        let map_keys: Vec<usize> = self
            .reverse_keys
            .iter()
            .filter_map(|key| self.keys.iter().position(|k| k == key))
            .filter(|ki| !(self.options.skip_sorted_reverse_maps && self.sorted[*ki]))
            .collect();

        let threads = self.options.reverse_build_threads.min(map_keys.len()).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("docmeta-reverse-{i}"))
            .build()?;
        let block_rows = self.options.block_rows;
        let mut reverse_sections = pool.install(|| {
            map_keys
                .par_iter()
                .map(|&ki| {
                    let column = &forward[ki];
                    let map = build_reverse_map(column)?;
                    tracing::debug!(
                        "Built reverse map for key {} ({} distinct values)",
                        column.key(),
                        map.len()
                    );
                    Ok((ki, write_reverse_section(&map, block_rows)?))
                })
                .collect::<MetaResult<Vec<_>>>()
        })?;

        let mut writer = ArtifactWriter::create(staging_path)?;
        for column in sealed.iter_mut() {
            writer.append_section(&forward_section_name(&column.key), &mut column.file)?;
        }
        for (ki, file) in reverse_sections.iter_mut() {
            writer.append_section(&reverse_section_name(&self.keys[*ki]), file)?;
        }
        writer.finish(self.num_documents as u64)?;
        drop(forward);
        self.publish(staging_path, artifact_path)?;

        tracing::info!(
            "Finalized structure {} with {} documents ({} reverse maps)",
            self.structure,
            self.num_documents,
            reverse_sections.len()
        );
        Ok(())
    }

    /// Moves the staged artifact into place and registers it. An artifact it
    /// replaces is kept aside until the registration is committed and put
    /// back if the commit fails.
    fn publish(&self, staging_path: &Path, artifact_path: &Path) -> MetaResult<()> {
        let backup_path = self.index.backup_path(&self.structure);
        remove_if_exists(&backup_path);
        let replaced = match fs::rename(artifact_path, &backup_path) {
            Ok(()) => true,
            Err(err) if err.kind() == io::ErrorKind::NotFound => false,
            Err(err) => return Err(err.into()),
        };

        if let Err(err) = fs::rename(staging_path, artifact_path) {
            if replaced {
                restore(&backup_path, artifact_path);
            }
            return Err(err.into());
        }

        let schema = MetaSchema {
            keys: self.keys.clone(),
            compress: self.compress.clone(),
            sorted: self.sorted.clone(),
            reverse_keys: self.reverse_keys.clone(),
        };
        let mut updates = schema.to_properties(&self.structure);
        updates.extend(registration_properties(&self.structure));
        if let Err(err) = self.index.commit(updates) {
            remove_if_exists(artifact_path);
            if replaced {
                restore(&backup_path, artifact_path);
            }
            return Err(err);
        }

        if replaced {
            remove_if_exists(&backup_path);
        }
        Ok(())
    }
}

fn restore(backup_path: &Path, artifact_path: &Path) {
    match fs::rename(backup_path, artifact_path) {
        Ok(()) => tracing::debug!("Restored previous artifact {}", artifact_path.display()),
        Err(err) => tracing::error!(
            "Failed to restore previous artifact {} from {}: {}",
            artifact_path.display(),
            backup_path.display(),
            err
        ),
    }
}

fn remove_if_exists(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {}", path.display(), err);
        }
    }
}

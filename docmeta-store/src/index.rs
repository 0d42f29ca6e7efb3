//! Index directory: the flat property store and structure registry that
//! metadata structures live in.

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::RwLock;

use crate::{
    error::{MetaIndexError, MetaResult},
    layout::{
        input_stream_name, structure_kind_property, ARTIFACT_SUFFIX, BACKUP_SUFFIX,
        INPUT_STREAM_SUFFIX, PROPERTIES_SUFFIX, STAGING_SUFFIX,
    },
    reader::MetaIndex,
    registry::{Structure, StructureKind},
    stream::MetaIndexInputStream,
};

/// A directory holding `<prefix>.properties` and one artifact per structure.
///
/// Shared between builders and readers through an `Arc`; properties are only
/// persisted by [`IndexDirectory::flush`] and [`IndexDirectory::commit`].
#[derive(Debug)]
pub struct IndexDirectory {
    path: PathBuf,
    prefix: String,
    properties: RwLock<BTreeMap<String, String>>,
}

impl IndexDirectory {
    /// Creates an empty index, creating the directory if needed.
    pub fn create(path: impl AsRef<Path>, prefix: &str) -> MetaResult<Arc<Self>> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        let index = Arc::new(Self {
            path,
            prefix: prefix.to_string(),
            properties: RwLock::new(BTreeMap::new()),
        });
        index.flush()?;
        Ok(index)
    }

    /// Opens an existing index by loading its property file.
    ///
    /// # Errors
    /// Returns an IO error if the property file cannot be read.
    pub fn open(path: impl AsRef<Path>, prefix: &str) -> MetaResult<Arc<Self>> {
        let path = path.as_ref().to_path_buf();
        let properties_path = path.join(format!("{prefix}{PROPERTIES_SUFFIX}"));
        let contents = fs::read_to_string(&properties_path)?;
        let properties = parse_properties(&contents)?;
        tracing::debug!(
            "Loaded {} properties from {}",
            properties.len(),
            properties_path.display()
        );
        Ok(Arc::new(Self {
            path,
            prefix: prefix.to_string(),
            properties: RwLock::new(properties),
        }))
    }

    /// Opens the index if its property file exists, otherwise creates it.
    pub fn open_or_create(path: impl AsRef<Path>, prefix: &str) -> MetaResult<Arc<Self>> {
        let path = path.as_ref();
        if path.join(format!("{prefix}{PROPERTIES_SUFFIX}")).exists() {
            Self::open(path, prefix)
        } else {
            Self::create(path, prefix)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn properties_path(&self) -> PathBuf {
        self.path.join(format!("{}{PROPERTIES_SUFFIX}", self.prefix))
    }

    /// Path of the artifact backing `structure`.
    pub fn artifact_path(&self, structure: &str) -> PathBuf {
        self.path
            .join(format!("{}.{structure}{ARTIFACT_SUFFIX}", self.prefix))
    }

    /// Path the builder writes to before publishing the artifact.
    pub fn staging_path(&self, structure: &str) -> PathBuf {
        self.path.join(format!(
            "{}.{structure}{ARTIFACT_SUFFIX}{STAGING_SUFFIX}",
            self.prefix
        ))
    }

    /// Path the previous artifact is kept at until a rebuild is registered.
    pub fn backup_path(&self, structure: &str) -> PathBuf {
        self.path.join(format!(
            "{}.{structure}{ARTIFACT_SUFFIX}{BACKUP_SUFFIX}",
            self.prefix
        ))
    }

    pub fn property(&self, key: &str) -> Option<String> {
        self.properties.read().get(key).cloned()
    }

    pub fn property_or(&self, key: &str, default: &str) -> String {
        self.property(key).unwrap_or_else(|| default.to_string())
    }

    /// Sets a property in memory. Call [`IndexDirectory::flush`] to persist it.
    pub fn set_property(&self, key: &str, value: &str) {
        self.properties
            .write()
            .insert(key.to_string(), value.to_string());
    }

    /// Writes all properties to `<prefix>.properties`, replacing it atomically.
    pub fn flush(&self) -> MetaResult<()> {
        let properties = self.properties.read();
        write_properties(&self.properties_path(), &properties)
    }

    /// Applies `updates` and persists them; on failure the previous values are
    /// restored so nothing half-written stays visible.
    pub fn commit(&self, updates: Vec<(String, String)>) -> MetaResult<()> {
        let mut properties = self.properties.write();
        let previous: Vec<(String, Option<String>)> = updates
            .iter()
            .map(|(key, value)| (key.clone(), properties.insert(key.clone(), value.clone())))
            .collect();

        if let Err(err) = write_properties(&self.properties_path(), &properties) {
            for (key, old) in previous.into_iter().rev() {
                match old {
                    Some(value) => properties.insert(key, value),
                    None => properties.remove(&key),
                };
            }
            return Err(err);
        }
        Ok(())
    }

    /// Registers `name` in memory; persisted on the next flush or commit.
    pub fn add_structure(&self, name: &str, kind: StructureKind) {
        self.set_property(&structure_kind_property(name), kind.as_str());
    }

    pub fn has_structure(&self, name: &str) -> bool {
        self.property(&structure_kind_property(name)).is_some()
    }

    pub fn has_input_stream(&self, structure: &str) -> bool {
        self.has_structure(&input_stream_name(structure))
    }

    /// Returns the registered kind of `name`.
    pub fn structure_kind(&self, name: &str) -> MetaResult<StructureKind> {
        let property = structure_kind_property(name);
        let value = self
            .property(&property)
            .ok_or_else(|| MetaIndexError::StructureNotFound(name.to_string()))?;
        value.parse().map_err(|reason| MetaIndexError::Properties {
            key: property,
            reason,
        })
    }

    /// Opens whatever is registered under `name`.
    pub fn open_structure(&self, name: &str) -> MetaResult<Structure> {
        match self.structure_kind(name)? {
            StructureKind::MetaIndex => Ok(Structure::MetaIndex(MetaIndex::open(self, name)?)),
            StructureKind::MetaIndexInputStream => {
                let base = name.strip_suffix(INPUT_STREAM_SUFFIX).unwrap_or(name);
                let meta = MetaIndex::open(self, base)?;
                Ok(Structure::InputStream(meta.input_stream()?))
            }
        }
    }

    /// Opens the metadata structure registered under `name`.
    pub fn open_meta_index(&self, name: &str) -> MetaResult<MetaIndex> {
        match self.open_structure(name)? {
            Structure::MetaIndex(meta) => Ok(meta),
            Structure::InputStream(_) => Err(MetaIndexError::Configuration(format!(
                "structure {name} is an input stream, not a meta index"
            ))),
        }
    }

    /// Opens the sequential input stream registered for `structure`.
    pub fn open_input_stream(&self, structure: &str) -> MetaResult<MetaIndexInputStream> {
        match self.open_structure(&input_stream_name(structure))? {
            Structure::InputStream(stream) => Ok(stream),
            Structure::MetaIndex(_) => Err(MetaIndexError::Configuration(format!(
                "structure {structure} has no registered input stream"
            ))),
        }
    }
}

fn write_properties(path: &Path, properties: &BTreeMap<String, String>) -> MetaResult<()> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(STAGING_SUFFIX);
    let staging = PathBuf::from(staging);
    let mut file = fs::File::create(&staging)?;
    for (key, value) in properties {
        writeln!(file, "{}={}", escape(key, true), escape(value, false))?;
    }
    file.sync_all()?;
    fs::rename(&staging, path)?;
    Ok(())
}

fn parse_properties(contents: &str) -> MetaResult<BTreeMap<String, String>> {
    let mut properties = BTreeMap::new();
    for (number, line) in contents.lines().enumerate() {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let split = find_separator(line).ok_or_else(|| MetaIndexError::Properties {
            key: format!("line {}", number + 1),
            reason: "missing '=' separator".to_string(),
        })?;
        properties.insert(unescape(&line[..split]), unescape(&line[split + 1..]));
    }
    Ok(properties)
}

/// Byte index of the first unescaped `=`.
fn find_separator(line: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '=' => return Some(i),
            _ => {}
        }
    }
    None
}

fn escape(text: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '=' if is_key => out.push_str("\\="),
            '#' if is_key && out.is_empty() => out.push_str("\\#"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

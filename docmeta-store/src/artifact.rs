//! Single-file artifact holding every section of a structure.
//!
//! The artifact stores multiple logical objects (forward columns, reverse
//! maps) inside one blob. Each object is a complete Arrow IPC file starting on
//! a [`SECTION_ALIGNMENT`] boundary. A JSON resolution at the end of the blob
//! maps a section name to the byte offset + size of that section.

use std::{
    fs::File,
    io::{BufWriter, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    ptr::NonNull,
    sync::Arc,
};

use arrow::{
    buffer::Buffer,
    ipc::{
        convert::fb_to_schema,
        reader::{read_footer_length, FileDecoder},
        root_as_footer, Block,
    },
    record_batch::RecordBatch,
};
use arrow_schema::SchemaRef;
use indexmap::IndexMap;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::{
    error::{MetaIndexError, MetaResult},
    layout::{ARTIFACT_MAGIC, ARTIFACT_VERSION, SECTION_ALIGNMENT},
};

/// JSON envelope stored at the end of an artifact.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ArtifactResolution {
    pub version: u32,
    pub num_documents: u64,
    /// Mapping from section name -> slice information in the blob.
    pub sections: IndexMap<String, ResolvedSlice>,
}

/// Byte slice inside the artifact blob.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedSlice {
    pub offset: u64,
    pub size: u64,
}

/// Memory-maps a file read-only and exposes it as an Arrow [`Buffer`].
///
/// The mapping lives as long as any buffer (or slice of it) that refers to it.
pub fn map_file(file: &File) -> MetaResult<Buffer> {
    // SAFETY: artifacts and sealed builder sections are never modified once
    // they are mapped.
    let mmap = unsafe { Mmap::map(file)? };
    let Some(ptr) = NonNull::new(mmap.as_ptr() as *mut u8) else {
        return Ok(Buffer::from_vec(Vec::<u8>::new()));
    };
    let len = mmap.len();
    // SAFETY: `ptr` and `len` describe the mapping, which the buffer owns
    // through the `Arc` and never writes to.
    Ok(unsafe { Buffer::from_custom_allocation(ptr, len, Arc::new(mmap)) })
}

/// Decodes a complete Arrow IPC file held in `buffer`.
///
/// Record batches are decoded against the buffer itself, so aligned column
/// data is not copied.
pub fn read_ipc_file(buffer: &Buffer) -> MetaResult<(SchemaRef, Vec<RecordBatch>)> {
    let size = buffer.len();
    if size < 10 {
        return Err(MetaIndexError::Corrupt(
            "IPC section too small for footer".to_string(),
        ));
    }
    let trailer_start = size - 10;

    // The 10-byte IPC trailer holds the footer length and magic.
    let trailer: [u8; 10] = buffer.as_slice()[trailer_start..]
        .try_into()
        .map_err(|_| MetaIndexError::Corrupt("invalid IPC trailer length".to_string()))?;
    let footer_len = read_footer_length(trailer)?;
    let footer_start = trailer_start
        .checked_sub(footer_len)
        .ok_or_else(|| MetaIndexError::Corrupt("IPC footer length underflow".to_string()))?;

    let footer = root_as_footer(&buffer.as_slice()[footer_start..trailer_start])
        .map_err(|err| MetaIndexError::Corrupt(format!("failed to parse IPC footer: {err}")))?;
    let schema: SchemaRef = Arc::new(fb_to_schema(
        footer
            .schema()
            .ok_or_else(|| MetaIndexError::Corrupt("missing IPC schema".to_string()))?,
    ));

    let mut decoder = FileDecoder::new(schema.clone(), footer.version());
    let dictionary_blocks: Vec<Block> = footer
        .dictionaries()
        .map(|b| b.iter().copied().collect())
        .unwrap_or_default();
    for block in &dictionary_blocks {
        let data = block_buffer(buffer, block)?;
        decoder.read_dictionary(block, &data)?;
    }

    let batch_blocks: Vec<Block> = footer
        .recordBatches()
        .map(|b| b.iter().copied().collect())
        .unwrap_or_default();
    let mut batches = Vec::with_capacity(batch_blocks.len());
    for block in &batch_blocks {
        let data = block_buffer(buffer, block)?;
        if let Some(batch) = decoder.read_record_batch(block, &data)? {
            batches.push(batch);
        }
    }

    Ok((schema, batches))
}

fn block_buffer(buffer: &Buffer, block: &Block) -> MetaResult<Buffer> {
    let offset = usize::try_from(block.offset())
        .map_err(|_| MetaIndexError::Corrupt("negative IPC block offset".to_string()))?;
    let len = usize::try_from(block.metaDataLength())
        .ok()
        .zip(usize::try_from(block.bodyLength()).ok())
        .map(|(meta, body)| meta + body)
        .ok_or_else(|| MetaIndexError::Corrupt("negative IPC block length".to_string()))?;
    if offset + len > buffer.len() {
        return Err(MetaIndexError::Corrupt(format!(
            "IPC block {offset}..{} exceeds section of {} bytes",
            offset + len,
            buffer.len()
        )));
    }
    Ok(buffer.slice_with_length(offset, len))
}

/// Streams sections into a new artifact file.
pub struct ArtifactWriter {
    path: PathBuf,
    file: BufWriter<File>,
    position: u64,
    resolution: ArtifactResolution,
}

impl ArtifactWriter {
    /// Creates (or truncates) the artifact at `path` and writes the header.
    pub fn create(path: impl Into<PathBuf>) -> MetaResult<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        let mut writer = Self {
            path,
            file: BufWriter::new(file),
            position: 0,
            resolution: ArtifactResolution {
                version: ARTIFACT_VERSION,
                ..Default::default()
            },
        };
        writer.write_all(ARTIFACT_MAGIC)?;
        writer.pad_to_alignment()?;
        Ok(writer)
    }

    /// Copies the full contents of `source` into the blob as section `name`.
    ///
    /// # Errors
    /// Returns a configuration error when the name was already used.
    pub fn append_section(&mut self, name: &str, source: &mut File) -> MetaResult<ResolvedSlice> {
        if self.resolution.sections.contains_key(name) {
            return Err(MetaIndexError::Configuration(format!(
                "duplicate artifact section {name}"
            )));
        }
        source.seek(SeekFrom::Start(0))?;
        let offset = self.position;
        let size = std::io::copy(source, &mut self.file)?;
        self.position += size;

        let slice = ResolvedSlice { offset, size };
        self.resolution.sections.insert(name.to_string(), slice);
        tracing::debug!("Appended section {} ({} bytes at {})", name, size, offset);

        self.pad_to_alignment()?;
        Ok(slice)
    }

    /// Writes the resolution trailer and syncs the file to disk.
    pub fn finish(mut self, num_documents: u64) -> MetaResult<PathBuf> {
        self.resolution.num_documents = num_documents;
        let json = serde_json::to_vec(&self.resolution)?;
        self.write_all(&json)?;
        self.write_all(&(json.len() as u64).to_le_bytes())?;
        self.write_all(ARTIFACT_MAGIC)?;

        let file = self.file.into_inner().map_err(|err| err.into_error())?;
        file.sync_all()?;
        Ok(self.path)
    }

    fn write_all(&mut self, bytes: &[u8]) -> MetaResult<()> {
        self.file.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn pad_to_alignment(&mut self) -> MetaResult<()> {
        let remainder = self.position % SECTION_ALIGNMENT;
        if remainder != 0 {
            let padding = vec![0u8; (SECTION_ALIGNMENT - remainder) as usize];
            self.write_all(&padding)?;
        }
        Ok(())
    }
}

/// Read-only view over a finished artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    path: PathBuf,
    buffer: Buffer,
    resolution: ArtifactResolution,
}

impl Artifact {
    /// Maps the artifact at `path` and validates its trailer.
    ///
    /// # Errors
    /// Returns an IO error when the file cannot be opened or mapped, and a
    /// corruption error when the magic, resolution or any slice is invalid.
    pub fn open(path: impl AsRef<Path>) -> MetaResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let buffer = map_file(&file)?;
        let bytes = buffer.as_slice();

        let magic_len = ARTIFACT_MAGIC.len();
        if bytes.len() < magic_len * 2 + 8 {
            return Err(MetaIndexError::Corrupt(format!(
                "{} is too small to be an artifact",
                path.display()
            )));
        }
        if &bytes[..magic_len] != ARTIFACT_MAGIC
            || &bytes[bytes.len() - magic_len..] != ARTIFACT_MAGIC
        {
            return Err(MetaIndexError::Corrupt(format!(
                "{} is missing the artifact magic",
                path.display()
            )));
        }

        let len_end = bytes.len() - magic_len;
        let len_start = len_end - 8;
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&bytes[len_start..len_end]);
        let json_len = usize::try_from(u64::from_le_bytes(len_bytes))
            .ok()
            .filter(|len| *len <= len_start - magic_len)
            .ok_or_else(|| MetaIndexError::Corrupt("resolution length out of bounds".to_string()))?;
        let resolution: ArtifactResolution =
            serde_json::from_slice(&bytes[len_start - json_len..len_start])?;

        if resolution.version != ARTIFACT_VERSION {
            return Err(MetaIndexError::Corrupt(format!(
                "unsupported artifact version {}",
                resolution.version
            )));
        }
        let data_end = (len_start - json_len) as u64;
        for (name, slice) in &resolution.sections {
            if slice.offset.checked_add(slice.size).map_or(true, |end| end > data_end) {
                return Err(MetaIndexError::Corrupt(format!(
                    "section {name} exceeds artifact bounds"
                )));
            }
        }

        Ok(Self {
            path,
            buffer,
            resolution,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_documents(&self) -> u64 {
        self.resolution.num_documents
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.resolution.sections.contains_key(name)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.resolution.sections.keys().map(String::as_str)
    }

    /// Returns the bytes of section `name`, sharing the underlying mapping.
    pub fn section(&self, name: &str) -> Option<Buffer> {
        self.resolution
            .sections
            .get(name)
            .map(|slice| self.buffer.slice_with_length(slice.offset as usize, slice.size as usize))
    }
}

use std::{path::PathBuf, sync::Arc};

use docmeta_store::{IndexDirectory, MetaIndex};

pub mod build;
pub mod dump;
pub mod get;
pub mod info;
pub mod lookup;

/// The structure a command operates on.
#[derive(Debug, Clone)]
pub struct Target {
    pub index: PathBuf,
    pub prefix: String,
    pub structure: String,
}

impl Target {
    pub fn open_index(&self) -> anyhow::Result<Arc<IndexDirectory>> {
        IndexDirectory::open(&self.index, &self.prefix).map_err(|e| {
            anyhow::anyhow!(
                "Failed to open index {} with prefix {}: {}",
                self.index.display(),
                self.prefix,
                e
            )
        })
    }

    pub fn open_meta(&self) -> anyhow::Result<MetaIndex> {
        let index = self.open_index()?;
        index
            .open_meta_index(&self.structure)
            .map_err(|e| anyhow::anyhow!("Failed to open structure {}: {}", self.structure, e))
    }
}

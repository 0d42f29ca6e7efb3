use std::path::Path;

use docmeta_store::{BuilderOptions, IndexDirectory, MetaIndexBuilder};

use super::Target;

#[derive(Debug, Clone, Default)]
pub struct BuildArgs {
    pub keys: Vec<String>,
    pub reverse_keys: Vec<String>,
    pub compressed_keys: Vec<String>,
    pub skip_sorted_reverse_maps: bool,
    pub delimiter: u8,
}

pub fn build(target: &Target, file_path: &Path, args: BuildArgs) -> anyhow::Result<()> {
    let written = build_from_csv(target, file_path, args)?;
    println!("Wrote {} documents to structure {}", written, target.structure);
    Ok(())
}

/// Builds `target` from a CSV file whose header row names the columns.
/// Returns the number of documents written.
pub fn build_from_csv(target: &Target, file_path: &Path, args: BuildArgs) -> anyhow::Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(args.delimiter)
        .has_headers(true)
        .from_path(file_path)
        .map_err(|e| anyhow::anyhow!("Failed to open CSV file {}: {}", file_path.display(), e))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| anyhow::anyhow!("Failed to read CSV header: {}", e))?
        .iter()
        .map(str::to_string)
        .collect();
    let keys = if args.keys.is_empty() {
        headers.clone()
    } else {
        args.keys
    };
    let columns = keys
        .iter()
        .map(|key| {
            headers
                .iter()
                .position(|header| header == key)
                .ok_or_else(|| anyhow::anyhow!("Key {} is not a column of {}", key, file_path.display()))
        })
        .collect::<anyhow::Result<Vec<usize>>>()?;

    let index = IndexDirectory::open_or_create(&target.index, &target.prefix)?;
    let options = BuilderOptions {
        compressed_keys: args.compressed_keys,
        skip_sorted_reverse_maps: args.skip_sorted_reverse_maps,
        ..Default::default()
    };
    let mut builder =
        MetaIndexBuilder::with_options(index, &target.structure, &keys, &args.reverse_keys, options)?;

    for (line, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| anyhow::anyhow!("Failed to read CSV record {}: {}", line + 1, e))?;
        let values: Vec<&str> = columns
            .iter()
            .map(|column| record.get(*column).unwrap_or(""))
            .collect();
        builder.write_document_entry(&values)?;
    }
    let written = builder.num_documents();
    builder.close()?;

    tracing::info!(
        "Built structure {} from {} ({} documents)",
        target.structure,
        file_path.display(),
        written
    );
    Ok(written)
}

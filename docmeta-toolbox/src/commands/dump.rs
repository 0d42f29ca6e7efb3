use std::io::Write;

use super::Target;

/// Writes a header row followed by every document, in id order, as CSV.
pub fn dump(target: &Target, limit: Option<usize>, out: impl Write) -> anyhow::Result<()> {
    let index = target.open_index()?;
    let stream = index
        .open_input_stream(&target.structure)
        .map_err(|e| anyhow::anyhow!("Failed to open input stream for {}: {}", target.structure, e))?;

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out);
    writer.write_record(stream.keys())?;
    for tuple in stream.take(limit.unwrap_or(usize::MAX)) {
        writer.write_record(&tuple?)?;
    }
    writer.flush()?;
    Ok(())
}

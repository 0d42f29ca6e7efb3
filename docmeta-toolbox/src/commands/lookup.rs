use std::io::Write;

use super::Target;

pub fn lookup(target: &Target, key: &str, value: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let meta = target.open_meta()?;
    match meta.get_document(key, value)? {
        Some(id) => writeln!(out, "{id}")?,
        None => {
            tracing::warn!("No document has {}={}", key, value);
            writeln!(out, "-1")?
        }
    }
    Ok(())
}

use std::io::Write;

use super::Target;

/// Prints `key=value` for each requested key of document `id`, or for every
/// key when `keys` is empty.
pub fn get(target: &Target, id: u32, keys: &[String], out: &mut impl Write) -> anyhow::Result<()> {
    let meta = target.open_meta()?;
    let keys = if keys.is_empty() {
        meta.get_keys()?
    } else {
        keys.to_vec()
    };
    let values = meta.get_items_for_keys(&keys, id)?;
    for (key, value) in keys.iter().zip(values) {
        writeln!(out, "{key}={value}")?;
    }
    Ok(())
}

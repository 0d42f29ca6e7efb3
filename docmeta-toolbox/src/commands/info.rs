use std::io::Write;

use super::Target;

pub fn info(target: &Target, out: &mut impl Write) -> anyhow::Result<()> {
    let meta = target.open_meta()?;
    writeln!(out, "structure: {}", meta.structure())?;
    writeln!(out, "documents: {}", meta.size()?)?;
    for key in meta.get_keys()? {
        let strategy = meta.reverse_strategy(&key)?.unwrap_or("none");
        writeln!(out, "key: {key} (reverse: {strategy})")?;
    }
    Ok(())
}

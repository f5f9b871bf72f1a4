use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Fresh, uniquely named file beside `dest`, removed again unless persisted.
///
/// The name is `<file name>.<random><suffix>`, so concurrent writers of one
/// destination never share a staging file.
pub(crate) fn staging_file(dest: &Path, suffix: &str) -> io::Result<NamedTempFile> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let name = dest.file_name().unwrap_or_default().to_string_lossy();
    tempfile::Builder::new()
        .prefix(&format!("{name}."))
        .suffix(suffix)
        .tempfile_in(parent)
}

/// Write `content` beside `path`, then rename over it.
///
/// Readers see either the old file or the complete new one.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut tmp = staging_file(path, ".tmp")?;
    tmp.write_all(content)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

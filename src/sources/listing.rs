use anyhow::Result;
use glob::glob;
use std::path::{Path, PathBuf};

/// Lists the Parquet files directly under `dir`, sorted ascending by path so
/// runs over the same directory are reproducible.
///
/// A directory with no matching files yields an empty list, not an error.
pub fn list_parquet_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = dir.join("*.parquet");

    let mut paths = Vec::new();
    for entry in glob(&pattern.to_string_lossy())? {
        paths.push(entry?);
    }

    paths.sort();
    paths.dedup();

    Ok(paths)
}

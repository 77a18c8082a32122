//! File utility functions for listing and filtering image files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Raster extensions accepted by the upload layer.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Returns the lowercase extension of `path`, if any.
pub fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
}

/// True when `name` ends in one of `extensions` (case-insensitive).
pub fn has_extension(name: &str, extensions: &[&str]) -> bool {
    lowercase_extension(Path::new(name))
        .map(|ext| extensions.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Returns paths to all files in a directory matching the given extensions,
/// sorted by file name. Extensions are matched case-insensitively.
pub fn files_with_extensions(dir: &Path, extensions: &[&str]) -> io::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| has_extension(n, extensions))
        })
        .collect();
    files.sort();
    Ok(files)
}

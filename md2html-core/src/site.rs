use std::fs;
use std::io;
use std::path::Path;

pub const MARKDOWN_EXTENSIONS: [&str; 4] = ["md", "markdown", "mdown", "mkd"];

pub fn is_markdown_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| MARKDOWN_EXTENSIONS.contains(&ext.as_str()))
}

/// Turn a path segment or file stem into a display title:
/// `getting_started-guide` becomes `getting started guide`.
pub fn format_segment_title(segment: &str) -> String {
    let cleaned = segment.replace(['_', '-'], " ");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        segment.to_string()
    } else {
        cleaned.to_string()
    }
}

pub fn ensure_directory(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

/// Copy a static asset, creating parent directories as needed.
pub fn copy_static_resource(source: &Path, destination: &Path) -> io::Result<()> {
    if let Some(parent) = destination.parent() {
        ensure_directory(parent)?;
    }
    fs::copy(source, destination)?;
    Ok(())
}

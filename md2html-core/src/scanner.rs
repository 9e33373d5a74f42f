use std::cell::OnceCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::site::is_markdown_file;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid path: {}", .0.display())]
    InvalidPath(PathBuf),
}

/// A Markdown file found under the source directory.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    path: PathBuf,
    relative_path: PathBuf,
    text: OnceCell<String>,
}

impl SourceDocument {
    pub fn new(path: PathBuf, relative_path: PathBuf) -> Self {
        Self {
            path,
            relative_path,
            text: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    /// Relative path components with the extension dropped from the last one.
    pub fn segments(&self) -> Vec<String> {
        let stem = self.relative_path.with_extension("");
        stem.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect()
    }

    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File contents, read on first access.
    pub fn text(&self) -> io::Result<&str> {
        if let Some(text) = self.text.get() {
            return Ok(text);
        }
        let text = fs::read_to_string(&self.path)?;
        Ok(self.text.get_or_init(|| text))
    }
}

pub struct SiteScanner {
    source_dir: PathBuf,
}

impl SiteScanner {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            source_dir: path.as_ref().to_path_buf(),
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Every path under the source directory, files and directories alike,
    /// in a stable name-sorted walk order.
    pub fn scan(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.source_dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.into_path()),
                Err(err) => {
                    tracing::warn!("Skipping unreadable entry: {err}");
                    None
                }
            })
            .collect()
    }

    /// Markdown files accepted by `keep`, sorted by path.
    pub fn markdown_documents<F>(&self, keep: F) -> Result<Vec<SourceDocument>, ScanError>
    where
        F: Fn(&Path) -> bool,
    {
        let mut documents = Vec::new();
        for path in self.scan() {
            if !path.is_file() || !is_markdown_file(&path) || !keep(&path) {
                continue;
            }
            documents.push(self.document(path)?);
        }
        Ok(documents)
    }

    pub fn document(&self, path: PathBuf) -> Result<SourceDocument, ScanError> {
        let relative_path = self.relative(&path)?.to_path_buf();
        Ok(SourceDocument::new(path, relative_path))
    }

    pub fn relative<'a>(&self, path: &'a Path) -> Result<&'a Path, ScanError> {
        path.strip_prefix(&self.source_dir)
            .map_err(|_| ScanError::InvalidPath(path.to_path_buf()))
    }
}

use crate::errors::SourceError;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Source files of the debugged project, loaded on first use.
#[derive(Debug, Default)]
pub struct SourceFiles {
    files: FxHashMap<PathBuf, Option<Vec<String>>>,
}

impl SourceFiles {
    /// Registers every file below `root` with the given extension (without
    /// reading it) so that paths reported by the debugger can be resolved.
    pub fn discover(&mut self, root: &Path, extension: &str) {
        let entries = WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(error) => {
                    warn!("Skipping unreadable entry while discovering sources: {error}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_some_and(|it| it == extension));
        for entry in entries {
            self.register(entry.path());
        }
        debug!("Discovered {} source files below {}.", self.files.len(), root.display());
    }

    pub fn register(&mut self, path: &Path) {
        self.files.entry(path.to_path_buf()).or_insert(None);
    }

    pub fn is_known(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// Reads the file unless it was read before.
    pub async fn load(&mut self, path: &Path) -> Result<&[String], SourceError> {
        let slot = self.files.entry(path.to_path_buf()).or_insert(None);
        if slot.is_none() {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|source| SourceError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                })?;
            *slot = Some(text.lines().map(str::to_string).collect());
        }
        Ok(slot.as_deref().unwrap_or_default())
    }

    pub fn lines(&self, path: &Path) -> Option<&[String]> {
        self.files.get(path)?.as_deref()
    }

    /// Finds the known file whose path ends with `reported`, which the
    /// debugger prints relative to the project.
    pub fn resolve(&self, reported: &str) -> Option<PathBuf> {
        let reported = PathBuf::from(reported.trim().replace('\\', "/"));
        self.files
            .keys()
            .filter(|path| {
                let normalized = PathBuf::from(path.to_string_lossy().replace('\\', "/"));
                normalized.ends_with(&reported)
            })
            .min_by_key(|path| path.as_os_str().len())
            .cloned()
    }

    /// `resolve`, falling back to the path as reported.
    pub fn resolve_or_reported(&self, reported: &str) -> PathBuf {
        self.resolve(reported)
            .unwrap_or_else(|| PathBuf::from(reported.trim()))
    }
}

/// Columns at which a word starts on `line`.
pub fn word_start_columns(line: &str) -> Vec<u32> {
    let mut columns = vec![];
    let mut saw_space = true;
    for (column, character) in line.chars().enumerate() {
        if character == ' ' {
            saw_space = true;
        } else if saw_space {
            columns.push(column as u32);
            saw_space = false;
        }
    }
    columns
}

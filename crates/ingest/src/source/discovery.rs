use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::IngestError;
use crate::source::RawUnit;

/// Lists the raw units currently present for a source.
pub trait UnitDiscovery: Send {
    /// Every unit visible right now, in any order. Must not block waiting
    /// for new input.
    fn list(&self) -> Result<Vec<RawUnit>, IngestError>;
}

/// Recursive directory listing filtered by file extension.
///
/// Hidden files and names starting with `_` are skipped, so writers can
/// stage files as `.name.csv` or `_name.csv` and rename them into place.
pub struct DirectoryDiscovery {
    root: PathBuf,
    extension: String,
}

impl DirectoryDiscovery {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn accepts(&self, path: &Path) -> bool {
        let visible = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| !n.starts_with('.') && !n.starts_with('_'));
        let ext_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension));
        visible && ext_ok
    }
}

impl UnitDiscovery for DirectoryDiscovery {
    fn list(&self) -> Result<Vec<RawUnit>, IngestError> {
        if !self.root.is_dir() {
            debug!(root = %self.root.display(), "Landing directory does not exist yet");
            return Ok(Vec::new());
        }

        let mut units = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = entry.map_err(|e| IngestError::Io(e.into()))?;
            if !entry.file_type().is_file() || !self.accepts(entry.path()) {
                continue;
            }
            let meta = entry.metadata().map_err(|e| IngestError::Io(e.into()))?;
            units.push(RawUnit {
                id: entry.path().display().to_string(),
                path: entry.path().to_path_buf(),
                size: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        Ok(units)
    }
}

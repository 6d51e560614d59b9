//! Staging area between mail collection and decoding.
//!
//! Accepted attachments are held in memory in arrival order. The filesystem
//! functions at the bottom persist and reload that queue for the binary.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::StagingError;

/// An accepted attachment: original filename plus raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Ordered collection of staged attachments.
#[derive(Debug, Clone, Default)]
pub struct StagingArea {
    files: Vec<StagedFile>,
}

impl StagingArea {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a file. A filename already present is overwritten in place.
    pub fn stage(&mut self, filename: impl Into<String>, bytes: Vec<u8>) {
        let filename = filename.into();
        if let Some(existing) = self.files.iter_mut().find(|f| f.filename == filename) {
            debug!(filename = %filename, "Overwriting previously staged file");
            existing.bytes = bytes;
        } else {
            self.files.push(StagedFile { filename, bytes });
        }
    }

    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

// ── Filesystem adapter ──────────────────────────────────────────────

/// Create the staging and output directories if missing.
pub fn prepare(dirs: &[&Path]) -> Result<(), StagingError> {
    for dir in dirs {
        std::fs::create_dir_all(dir).map_err(|source| StagingError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
        debug!(dir = %dir.display(), "Directory ready");
    }
    Ok(())
}

/// Resolve a staged filename inside `dir`, refusing anything but a bare name.
fn staged_path(dir: &Path, filename: &str) -> Result<PathBuf, StagingError> {
    let name = Path::new(filename)
        .file_name()
        .filter(|n| n.len() == filename.len())
        .ok_or_else(|| StagingError::InvalidName(filename.to_string()))?;
    Ok(dir.join(name))
}

/// Write every staged file verbatim into `dir`, overwriting existing files.
pub fn persist(area: &StagingArea, dir: &Path) -> Result<(), StagingError> {
    for file in area.files() {
        let path = staged_path(dir, &file.filename)?;
        std::fs::write(&path, &file.bytes).map_err(|source| StagingError::Write {
            path: path.clone(),
            source,
        })?;
        info!("Saved attachment: '{}'", file.filename);
    }
    Ok(())
}

/// Load all regular files in `dir` into a staging area, sorted by filename.
pub fn load(dir: &Path) -> Result<StagingArea, StagingError> {
    let read_err = |source| StagingError::Read {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        if !entry.file_type().map_err(read_err)?.is_file() {
            continue;
        }
        let filename = entry.file_name().to_string_lossy().into_owned();
        let bytes = std::fs::read(entry.path()).map_err(|source| StagingError::Read {
            path: entry.path(),
            source,
        })?;
        entries.push((filename, bytes));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut area = StagingArea::new();
    for (filename, bytes) in entries {
        area.stage(filename, bytes);
    }
    Ok(area)
}

/// Remove the staging directory and everything in it.
pub fn clear(dir: &Path) -> Result<(), StagingError> {
    if !dir.exists() {
        debug!(dir = %dir.display(), "Staging directory does not exist");
        return Ok(());
    }
    std::fs::remove_dir_all(dir).map_err(|source| StagingError::Write {
        path: dir.to_path_buf(),
        source,
    })?;
    debug!(dir = %dir.display(), "Staging directory removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_preserves_order() {
        let mut area = StagingArea::new();
        area.stage("b.xlsx", vec![1]);
        area.stage("a.xlsx", vec![2]);
        let names: Vec<_> = area.files().iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, ["b.xlsx", "a.xlsx"]);
    }

    #[test]
    fn stage_same_name_overwrites_in_place() {
        let mut area = StagingArea::new();
        area.stage("a.xlsx", vec![1]);
        area.stage("b.xlsx", vec![2]);
        area.stage("a.xlsx", vec![3, 3]);
        assert_eq!(area.len(), 2);
        assert_eq!(area.files()[0].bytes, vec![3, 3]);
    }

    #[test]
    fn persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut area = StagingArea::new();
        area.stage("z.xlsx", b"zz".to_vec());
        area.stage("a.xlsx", b"aa".to_vec());
        persist(&area, dir.path()).unwrap();

        let loaded = load(dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.files()[0].filename, "a.xlsx");
        assert_eq!(loaded.files()[1].bytes, b"zz");
    }

    #[test]
    fn persist_rejects_path_components() {
        let dir = tempfile::tempdir().unwrap();
        let mut area = StagingArea::new();
        area.stage("../escape.xlsx", vec![0]);
        let err = persist(&area, dir.path()).unwrap_err();
        assert!(matches!(err, StagingError::InvalidName(_)));
    }

    #[test]
    fn prepare_and_clear() {
        let root = tempfile::tempdir().unwrap();
        let staging = root.path().join(".attachments");
        let output = root.path().join("qr_codes");
        prepare(&[staging.as_path(), output.as_path()]).unwrap();
        assert!(staging.is_dir() && output.is_dir());

        std::fs::write(staging.join("x.xlsx"), b"x").unwrap();
        clear(&staging).unwrap();
        assert!(!staging.exists());
        assert!(output.exists());
        clear(&staging).unwrap();
    }
}

// src/engine/io.rs
//
// Artifact storage: flat directories of named files, written atomically.
//
// Every write goes to a NamedTempFile in the target directory and is renamed
// into place, so readers never observe a partial file. Writes belonging to one
// operation are staged in an ArtifactBatch and only become visible together.

use crate::engine::firewall::is_flat_name;
use crate::error::{ImageLabError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// A directory of artifacts addressed by flat file names.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Use `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| ImageLabError::file_write_failed(dir.display().to_string(), e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve `name` inside the store. Names that could escape the directory
    /// are reported as not found.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        if !is_flat_name(name) {
            return Err(ImageLabError::not_found(name.to_string()));
        }
        Ok(self.dir.join(name))
    }

    /// Path of an existing artifact.
    pub fn path(&self, name: &str) -> Result<PathBuf> {
        let path = self.resolve(name)?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(ImageLabError::not_found(name.to_string()))
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_ok()
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path(name)?;
        std::fs::read(&path)
            .map_err(|e| ImageLabError::file_read_failed(path.display().to_string(), e))
    }

    /// Atomically write a single artifact.
    pub fn write(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let mut batch = self.batch();
        batch.stage(name, bytes)?;
        batch.commit()?;
        self.resolve(name)
    }

    /// Best-effort removal; a missing file is not an error.
    pub fn remove(&self, name: &str) {
        if let Ok(path) = self.resolve(name) {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove artifact");
                }
            }
        }
    }

    pub fn batch(&self) -> ArtifactBatch<'_> {
        ArtifactBatch {
            store: self,
            staged: Vec::new(),
        }
    }
}

/// Artifacts written to temporary files, published together by `commit`.
///
/// Dropping a batch without committing discards everything staged.
#[derive(Debug)]
pub struct ArtifactBatch<'a> {
    store: &'a ArtifactStore,
    staged: Vec<(String, NamedTempFile)>,
}

impl ArtifactBatch<'_> {
    /// Write `bytes` to a temporary file destined for `name`.
    pub fn stage(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let target = self.store.resolve(name)?;
        // same directory as the target so the final rename never crosses filesystems
        let mut temp_file = NamedTempFile::new_in(self.store.dir()).map_err(|e| {
            ImageLabError::file_write_failed(self.store.dir().display().to_string(), e)
        })?;
        temp_file
            .write_all(bytes)
            .and_then(|_| temp_file.as_file_mut().sync_all())
            .map_err(|e| ImageLabError::file_write_failed(target.display().to_string(), e))?;
        self.staged.push((name.to_string(), temp_file));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Rename every staged file into place. If any rename fails, files this
    /// batch already published are removed and the rest are discarded.
    pub fn commit(mut self) -> Result<Vec<String>> {
        let staged = std::mem::take(&mut self.staged);
        let mut committed: Vec<String> = Vec::with_capacity(staged.len());
        for (name, temp_file) in staged {
            let target = self.store.resolve(&name)?;
            if let Err(e) = temp_file.persist(&target) {
                warn!(
                    artifact = %name,
                    rolled_back = committed.len(),
                    error = %e.error,
                    "artifact commit failed, rolling back"
                );
                for done in &committed {
                    self.store.remove(done);
                }
                return Err(ImageLabError::file_write_failed(
                    target.display().to_string(),
                    e.error,
                ));
            }
            committed.push(name);
        }
        debug!(count = committed.len(), "artifacts committed");
        Ok(committed)
    }
}

impl Drop for ArtifactBatch<'_> {
    fn drop(&mut self) {
        if !self.staged.is_empty() {
            warn!(count = self.staged.len(), "discarding staged artifacts");
        }
    }
}

//! On-disk layout of persisted index generations.
//!
//! ```text
//! <dir>/
//!   CURRENT                      # id of the live generation
//!   generations/<id>.sqlite      # one file per generation (+ -wal/-shm)
//! ```
//!
//! `CURRENT` is replaced by writing a temp file and renaming it over the
//! old one, so a reader sees either the old or the new id, never a partial
//! write.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const CURRENT: &str = "CURRENT";
const CURRENT_TMP: &str = "CURRENT.tmp";
const GENERATIONS: &str = "generations";
const EXTENSION: &str = "sqlite";

#[derive(Debug, Clone)]
pub struct GenerationDir {
    root: PathBuf,
}

impl GenerationDir {
    /// Create the directory layout if needed and remove generation files
    /// not named by `CURRENT` (left behind by interrupted builds).
    pub fn open(root: &Path) -> Result<Self> {
        let dir = Self {
            root: root.to_path_buf(),
        };
        std::fs::create_dir_all(dir.generations_dir())
            .with_context(|| format!("Failed to create {}", dir.generations_dir().display()))?;
        dir.remove_orphans()?;
        Ok(dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generations_dir(&self) -> PathBuf {
        self.root.join(GENERATIONS)
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.generations_dir().join(format!("{}.{}", id, EXTENSION))
    }

    /// The id named by `CURRENT`, if any.
    pub fn current_id(&self) -> Result<Option<String>> {
        let path = self.root.join(CURRENT);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let id = content.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    /// Point `CURRENT` at `id`.
    pub fn set_current(&self, id: &str) -> Result<()> {
        let tmp = self.root.join(CURRENT_TMP);
        std::fs::write(&tmp, id).with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, self.root.join(CURRENT))
            .with_context(|| "Failed to replace CURRENT")?;
        Ok(())
    }

    /// Delete a generation's database file and its WAL side files.
    pub fn remove(&self, id: &str) -> Result<()> {
        let main = self.path_for(id);
        for path in [
            main.clone(),
            side_file(&main, "-wal"),
            side_file(&main, "-shm"),
        ] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to remove {}", path.display()))
                }
            }
        }
        Ok(())
    }

    /// Ids of every generation file present on disk, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(self.generations_dir())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn remove_orphans(&self) -> Result<()> {
        let current = self.current_id()?;
        let live_prefix = current.as_ref().map(|id| format!("{}.{}", id, EXTENSION));

        for entry in std::fs::read_dir(self.generations_dir())? {
            let path = entry?.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if live_prefix.as_deref().is_some_and(|p| name.starts_with(p)) {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::info!(file = %path.display(), "Removed orphaned generation file"),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Failed to remove orphaned generation file")
                }
            }
        }

        let _ = std::fs::remove_file(self.root.join(CURRENT_TMP));
        Ok(())
    }
}

fn side_file(main: &Path, suffix: &str) -> PathBuf {
    let mut name = main.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

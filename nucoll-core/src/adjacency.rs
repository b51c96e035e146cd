//! Per-node friend lists under `fdat/`.
//!
//! One file per node, `fdat/<id>.f`, holding one target ID per line. A file
//! that exists is a complete record: writes land in a temporary file that is
//! renamed into place once flushed.

use crate::error::{Result, StoreError};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ADJACENCY_DIR: &str = "fdat";
pub const ADJACENCY_EXT: &str = "f";

#[derive(Debug, Clone)]
pub struct AdjacencyStore {
    dir: PathBuf,
}

impl AdjacencyStore {
    /// A store rooted at `<root>/fdat`. The directory is created on first write.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            dir: root.as_ref().join(ADJACENCY_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("{}.{}", id, ADJACENCY_EXT))
    }

    pub fn exists(&self, id: u64) -> bool {
        self.path(id).is_file()
    }

    /// Replace the record for `id` with `targets`, in order.
    pub fn write(&self, id: u64, targets: &[u64]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;

        let path = self.path(id);
        let tmp = self.dir.join(format!("{}.{}.tmp", id, ADJACENCY_EXT));

        let file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        let mut writer = BufWriter::new(file);
        for target in targets {
            writeln!(writer, "{}", target).map_err(|e| StoreError::io(&tmp, e))?;
        }
        writer.flush().map_err(|e| StoreError::io(&tmp, e))?;
        drop(writer);

        fs::rename(&tmp, &path).map_err(|e| StoreError::io(&path, e))?;
        debug!("wrote {} targets to {}", targets.len(), path.display());
        Ok(path)
    }

    /// The record for `id`, or `None` when it was never fetched.
    pub fn read(&self, id: u64) -> Result<Option<Vec<u64>>> {
        let path = self.path(id);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let mut targets = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| StoreError::io(&path, e))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let target = trimmed.parse().map_err(|_| StoreError::Format {
                path: path.clone(),
                line: index as u64 + 1,
                message: format!("'{}' is not a numeric ID", trimmed),
            })?;
            targets.push(target);
        }
        Ok(Some(targets))
    }
}

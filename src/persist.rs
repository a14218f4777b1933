// 💾 Atomic Save - write-to-temp-then-rename
// The target file is never observed half-written

use crate::error::PersistenceError;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Durable replacement of a file's full contents.
///
/// Implementations must leave `path` untouched when they return an error.
pub trait AtomicWriter: Send + Sync {
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<(), PersistenceError>;
}

/// Filesystem writer: temp file in the target's directory, flush, fsync,
/// rename over the target, then fsync the directory where supported.
///
/// `NamedTempFile` removes the temp file on drop, so every early return
/// below also cleans up.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsAtomicWriter;

impl AtomicWriter for FsAtomicWriter {
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
        let io_err = |stage: &'static str, p: &Path| {
            let p = p.to_path_buf();
            move |source: std::io::Error| PersistenceError::Io {
                stage,
                path: p,
                source,
            }
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp = NamedTempFile::new_in(dir).map_err(io_err("create temp file in", dir))?;
        temp.write_all(contents)
            .map_err(io_err("write", temp.path()))?;
        temp.flush().map_err(io_err("flush", temp.path()))?;
        temp.as_file()
            .sync_all()
            .map_err(io_err("sync", temp.path()))?;

        temp.persist(path)
            .map_err(|e| PersistenceError::Io {
                stage: "rename temp file over",
                path: path.to_path_buf(),
                source: e.error,
            })?;

        sync_dir(dir);
        tracing::debug!(path = %path.display(), bytes = contents.len(), "atomic write complete");
        Ok(())
    }
}

/// Make the rename itself durable. Best effort: not every platform lets
/// a directory be opened for syncing.
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Ok(handle) = std::fs::File::open(dir) {
            if let Err(e) = handle.sync_all() {
                tracing::warn!(dir = %dir.display(), error = %e, "directory sync failed");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
}

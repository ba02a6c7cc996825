use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Single-writer-per-file discipline for receive targets.
///
/// Cheap to clone; clones share the same set of active paths.
#[derive(Debug, Clone, Default)]
pub struct WriterRegistry {
    active: Arc<Mutex<HashSet<PathBuf>>>,
}

impl WriterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `path` for writing. Returns `None` if another session holds it.
    pub fn try_acquire(&self, path: &Path) -> Option<WriterGuard> {
        let key = normalize(path);
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(key.clone()) {
            return None;
        }
        Some(WriterGuard {
            active: Arc::clone(&self.active),
            path: key,
        })
    }

    pub fn is_active(&self, path: &Path) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&normalize(path))
    }
}

/// Resolves symlinks so two spellings of one file share a key.
///
/// The file may not exist yet; then only its parent directory is resolved.
fn normalize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    if let Ok(resolved) = std::fs::canonicalize(&absolute) {
        return resolved;
    }
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => match std::fs::canonicalize(parent) {
            Ok(dir) => dir.join(name),
            Err(_) => absolute,
        },
        _ => absolute,
    }
}

/// Held for the duration of a receive; releases the path on drop.
#[derive(Debug)]
pub struct WriterGuard {
    active: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_writer_is_rejected() {
        let registry = WriterRegistry::new();
        let path = Path::new("/var/ota/firmware.bin");

        let guard = registry.try_acquire(path).unwrap();
        assert!(registry.is_active(path));
        assert!(registry.try_acquire(path).is_none());

        drop(guard);
        assert!(!registry.is_active(path));
        assert!(registry.try_acquire(path).is_some());
    }

    #[test]
    fn distinct_paths_do_not_conflict() {
        let registry = WriterRegistry::new();
        let _a = registry.try_acquire(Path::new("/var/ota/a.bin")).unwrap();
        let _b = registry.try_acquire(Path::new("/var/ota/b.bin")).unwrap();
    }

    #[test]
    fn clones_share_state() {
        let registry = WriterRegistry::new();
        let other = registry.clone();
        let _guard = registry.try_acquire(Path::new("fw.bin")).unwrap();
        assert!(other.try_acquire(Path::new("fw.bin")).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directory_is_the_same_writer() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir(&real).unwrap();
        let alias = dir.path().join("alias");
        std::os::unix::fs::symlink(&real, &alias).unwrap();

        let registry = WriterRegistry::new();
        let _guard = registry.try_acquire(&real.join("fw.bin")).unwrap();
        assert!(registry.try_acquire(&alias.join("fw.bin")).is_none());
        assert!(registry.is_active(&alias.join("fw.bin")));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_file_is_the_same_writer() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("fw.bin");
        std::fs::write(&target, b"partial").unwrap();
        let link = dir.path().join("current.bin");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let registry = WriterRegistry::new();
        let _guard = registry.try_acquire(&link).unwrap();
        assert!(registry.try_acquire(&target).is_none());
    }
}

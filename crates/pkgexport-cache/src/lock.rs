use crate::CacheError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Exclusive advisory lock on one cached repository, released on drop.
#[derive(Debug)]
pub struct RepoLock {
    lock_file: File,
}

impl RepoLock {
    pub fn acquire(lock_path: &Path) -> Result<Self, CacheError> {
        let file = open_lock_file(lock_path)?;
        file.lock_exclusive().map_err(|source| CacheError::Lock {
            path: lock_path.to_path_buf(),
            source,
        })?;
        Ok(Self { lock_file: file })
    }

    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CacheError> {
        let file = open_lock_file(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }
}

fn open_lock_file(lock_path: &Path) -> Result<File, CacheError> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)
        .map_err(|source| CacheError::Lock {
            path: lock_path.to_path_buf(),
            source,
        })
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("test.lock");

        {
            let _lock = RepoLock::acquire(&lock_path).unwrap();
            assert!(lock_path.exists());
        }
    }

    #[test]
    fn try_acquire_returns_none_when_held() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("test.lock");

        let _lock = RepoLock::acquire(&lock_path).unwrap();
        let result = RepoLock::try_acquire(&lock_path).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("nested/test.lock");

        {
            let _lock = RepoLock::acquire(&lock_path).unwrap();
        }

        let lock2 = RepoLock::try_acquire(&lock_path).unwrap();
        assert!(lock2.is_some());
    }
}

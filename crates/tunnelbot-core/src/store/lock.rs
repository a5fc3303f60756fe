// Cross-process advisory lock on a sidecar `<store>.lock` file.
//
// The store file itself is replaced by rename on every save, so a lock on
// its inode would not outlive the first write. The sidecar is never
// replaced; holding an exclusive lock on it serializes every writer that
// follows the same protocol, in this process or another.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::CoreError;

pub(crate) struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block (on a blocking-pool thread) until the exclusive lock is held.
    pub(crate) async fn acquire(target: &Path) -> Result<Self, CoreError> {
        let path = lock_path_for(target);
        let lock_path = path.clone();

        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&lock_path)?;
            file.lock()?;
            Ok(file)
        })
        .await
        .map_err(|e| CoreError::io(&path, std::io::Error::other(e)))?
        .map_err(|e| CoreError::io(&path, e))?;

        trace!(lock = %path.display(), "store lock acquired");
        Ok(Self { file, path })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock as well; unlocking first
        // just makes the release independent of descriptor lifetime.
        let _ = self.file.unlock();
        trace!(lock = %self.path.display(), "store lock released");
    }
}

pub(crate) fn lock_path_for(target: &Path) -> PathBuf {
    let mut name: OsString = target
        .file_name()
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| OsString::from("store"));
    name.push(".lock");
    target.with_file_name(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;

    #[test]
    fn sidecar_sits_next_to_store() {
        assert_eq!(
            lock_path_for(Path::new("/etc/trusttunnel/credentials.toml")),
            PathBuf::from("/etc/trusttunnel/credentials.toml.lock")
        );
    }

    #[tokio::test]
    async fn second_acquirer_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("credentials.toml");

        let first = FileLock::acquire(&target).await.unwrap();
        let acquired = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&acquired);
        let target2 = target.clone();
        let waiter = tokio::spawn(async move {
            let _second = FileLock::acquire(&target2).await.unwrap();
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!acquired.load(Ordering::SeqCst), "lock was not exclusive");

        drop(first);
        waiter.await.unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nope").join("credentials.toml");
        let err = FileLock::acquire(&target).await.err().unwrap();
        assert!(matches!(err, CoreError::StoreIo { .. }));
    }
}

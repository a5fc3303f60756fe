// Generic load/save/lock for a TOML document holding one array of tables.

use std::io::Write as _;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::debug;

use super::lock::FileLock;
use crate::error::CoreError;

/// A record kept in a store file as one `[[TABLE]]` entry.
pub trait StoreRecord: Serialize + DeserializeOwned + Send + 'static {
    /// Array-of-tables key, e.g. `client` for `[[client]]`.
    const TABLE: &'static str;

    /// Shape check applied to every record on load.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Typed view over one store file.
///
/// Clones share the in-process lock, so every handle to the same file
/// created from one `StructuredStore` serializes with the others. Other
/// processes are serialized through the sidecar lock file.
pub struct StructuredStore<R> {
    path: PathBuf,
    guard: Arc<Mutex<()>>,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for StructuredStore<R> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            guard: Arc::clone(&self.guard),
            _record: PhantomData,
        }
    }
}

impl<R> std::fmt::Debug for StructuredStore<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl<R: StoreRecord> StructuredStore<R> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Arc::new(Mutex::new(())),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record in file order. A missing file is an empty store.
    pub async fn load(&self) -> Result<Vec<R>, CoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => decode(&self.path, &text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                Err(CoreError::corrupt(&self.path, "file is not valid UTF-8"))
            }
            Err(e) => Err(CoreError::io(&self.path, e)),
        }
    }

    /// Replace the file contents atomically. Readers see either the old
    /// document or the new one, never a mix.
    pub async fn save(&self, records: &[R]) -> Result<(), CoreError> {
        let text = encode(&self.path, records)?;
        write_atomic(self.path.clone(), text.into_bytes()).await?;
        debug!(store = %self.path.display(), records = records.len(), "store saved");
        Ok(())
    }

    /// Load, apply `mutate`, save, all under an exclusive lock.
    ///
    /// If `mutate` fails nothing is written and its error is returned.
    pub async fn with_lock<T, F>(&self, mutate: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut Vec<R>) -> Result<T, CoreError>,
    {
        let _local = self.guard.lock().await;
        let _file = FileLock::acquire(&self.path).await?;

        let mut records = self.load().await?;
        let out = mutate(&mut records)?;
        self.save(&records).await?;
        Ok(out)
    }
}

fn decode<R: StoreRecord>(path: &Path, text: &str) -> Result<Vec<R>, CoreError> {
    let doc: toml::Table =
        toml::from_str(text).map_err(|e| CoreError::corrupt(path, e.message().trim()))?;

    let Some(value) = doc.get(R::TABLE) else {
        return Ok(Vec::new());
    };
    let toml::Value::Array(items) = value else {
        return Err(CoreError::corrupt(
            path,
            format!("`{}` must be an array of tables", R::TABLE),
        ));
    };

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let position = idx + 1;
            let record: R = item.clone().try_into().map_err(|e: toml::de::Error| {
                CoreError::corrupt(
                    path,
                    format!("{} #{position}: {}", R::TABLE, e.message().trim()),
                )
            })?;
            record.validate().map_err(|reason| {
                CoreError::corrupt(path, format!("{} #{position}: {reason}", R::TABLE))
            })?;
            Ok(record)
        })
        .collect()
}

fn encode<R: StoreRecord>(path: &Path, records: &[R]) -> Result<String, CoreError> {
    if records.is_empty() {
        return Ok(String::new());
    }

    let items = records
        .iter()
        .map(toml::Value::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CoreError::corrupt(path, format!("cannot serialize record: {e}")))?;

    let mut doc = toml::Table::new();
    doc.insert(R::TABLE.to_owned(), toml::Value::Array(items));
    toml::to_string(&doc)
        .map_err(|e| CoreError::corrupt(path, format!("cannot serialize document: {e}")))
}

/// Write `contents` to a temp file beside `path`, fsync, then rename over it.
/// An existing file's permissions carry over to the replacement.
pub(crate) async fn write_atomic(path: PathBuf, contents: Vec<u8>) -> Result<(), CoreError> {
    let target = path.clone();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".tunnelbot-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        tmp.write_all(&contents)?;
        tmp.as_file().sync_all()?;

        if let Ok(meta) = std::fs::metadata(&target) {
            tmp.as_file().set_permissions(meta.permissions())?;
        }

        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| CoreError::io(&path, std::io::Error::other(e)))?
    .map_err(|e| CoreError::io(&path, e))
}

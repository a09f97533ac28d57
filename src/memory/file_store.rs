use async_trait::async_trait;
use serde_json::Value;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use super::DocumentStore;
use crate::error::StoreError;

/// Document store backed by one JSON file per document, laid out as
/// `<base_dir>/<collection>/<key>.json`.
///
/// Each write lands in a fresh temp file next to its target and is renamed
/// into place, so concurrent writers (in this process or another) never
/// share a scratch file and a reader only ever sees a whole document.
pub struct JsonFileStore {
    base_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        JsonFileStore {
            base_dir: base_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn document_file(&self, collection: &str, key: &str) -> Result<PathBuf, StoreError> {
        for part in [collection, key] {
            if part.is_empty() || part.starts_with('.') || part.contains(['/', '\\']) {
                return Err(StoreError::Malformed {
                    collection: collection.to_string(),
                    key: key.to_string(),
                    reason: format!("{part:?} is not a valid path segment"),
                });
            }
        }
        Ok(self.base_dir.join(collection).join(format!("{key}.json")))
    }

    async fn load_document(&self, path: &Path) -> Result<Option<Value>, StoreError> {
        let data = match tokio::fs::read_to_string(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&data)?))
    }
}

fn write_atomically(path: &Path, contents: &str) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            ErrorKind::InvalidInput,
            format!("path {} has no parent directory", path.display()),
        )
    })?;
    std::fs::create_dir_all(parent)?;
    let tmp = NamedTempFile::new_in(parent)?;
    std::fs::write(tmp.path(), contents)?;
    tmp.persist(path)?;
    Ok(())
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.document_file(collection, key)?;
        self.load_document(&path).await
    }

    async fn set(
        &self,
        collection: &str,
        key: &str,
        fields: Value,
        merge: bool,
    ) -> Result<(), StoreError> {
        let path = self.document_file(collection, key)?;
        let _guard = self.write_lock.lock().await;
        let existing = if merge {
            self.load_document(&path).await?
        } else {
            None
        };
        let doc = match (existing, fields) {
            (Some(Value::Object(mut existing)), Value::Object(update)) => {
                existing.extend(update);
                Value::Object(existing)
            }
            (_, fields) => fields,
        };
        let data = serde_json::to_string_pretty(&doc)?;
        tokio::task::spawn_blocking(move || write_atomically(&path, &data))
            .await
            .map_err(io::Error::other)??;
        Ok(())
    }
}

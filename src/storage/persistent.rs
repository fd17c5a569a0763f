use super::{StorageAdapter, StorageMode};
use crate::{error::StorageError, BoxFuture};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::debug;

/// File-backed adapter: one file per key under a data directory.
///
/// Writes go to a temporary sibling first and are renamed into place so a
/// crash never leaves a half-written session blob behind.
#[derive(Clone, Debug)]
pub struct PersistentStorage {
    dir: PathBuf,
}

impl PersistentStorage {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }
}

/// Keys are provider-chosen; keep only filename-safe characters.
fn file_stem(key: &str) -> String {
    let stem: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.trim_matches('.').is_empty() {
        "_".to_string()
    } else {
        stem
    }
}

impl StorageAdapter for PersistentStorage {
    fn mode(&self) -> StorageMode {
        StorageMode::Persistent
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StorageError>> {
        Box::pin(async move {
            match fs::read_to_string(self.path_for(key)).await {
                Ok(value) => Ok(Some(value)),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
                Err(err) => Err(err.into()),
            }
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            fs::create_dir_all(&self.dir).await?;
            let path = self.path_for(key);
            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, value).await?;
            fs::rename(&tmp, &path).await?;
            debug!(path = %path.display(), "persisted storage entry");
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            match fs::remove_file(self.path_for(key)).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err.into()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use uuid::Uuid;

    fn temp_dir(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("compendium-storage-{label}-{}", Uuid::new_v4()))
    }

    #[test]
    fn file_stem_replaces_unsafe_characters() {
        assert_eq!(file_stem("sb-abc-auth-token"), "sb-abc-auth-token");
        assert_eq!(file_stem("../etc/passwd"), ".._etc_passwd");
        assert_eq!(file_stem(".."), "_");
        assert_eq!(file_stem(""), "_");
    }

    #[tokio::test]
    async fn values_survive_a_new_adapter_instance() -> Result<()> {
        let dir = temp_dir("reload");
        let storage = PersistentStorage::new(&dir);
        assert_eq!(storage.get("token").await?, None);

        storage.set("token", "{\"a\":1}").await?;

        let reopened = PersistentStorage::new(&dir);
        assert_eq!(reopened.get("token").await?.as_deref(), Some("{\"a\":1}"));

        reopened.remove("token").await?;
        reopened.remove("token").await?;
        assert_eq!(storage.get("token").await?, None);

        let _ = std::fs::remove_dir_all(dir);
        Ok(())
    }

    #[tokio::test]
    async fn set_fails_when_data_dir_is_a_file() -> Result<()> {
        let dir = temp_dir("not-a-dir");
        std::fs::create_dir_all(&dir)?;
        let file = dir.join("plain-file");
        std::fs::write(&file, "x")?;

        // A regular file where the data directory should be.
        let storage = PersistentStorage::new(&file);
        assert!(storage.set("token", "v").await.is_err());

        let _ = std::fs::remove_dir_all(dir);
        Ok(())
    }
}

use super::{StorageAdapter, StorageMode};
use crate::{error::StorageError, BoxFuture};
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

/// In-memory adapter; contents are gone once the instance is dropped.
///
/// [`VolatileStorage::with_mode`] lets an in-memory map stand in for the
/// persistent adapter, which is how tests simulate a page reload: the same
/// instance is handed to a fresh session store.
#[derive(Debug)]
pub struct VolatileStorage {
    mode: StorageMode,
    entries: Mutex<HashMap<String, String>>,
}

impl VolatileStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::with_mode(StorageMode::Volatile)
    }

    #[must_use]
    pub fn with_mode(mode: StorageMode) -> Self {
        Self {
            mode,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Drops every entry, as the browser does when the tab closes.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn read(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

impl Default for VolatileStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageAdapter for VolatileStorage {
    fn mode(&self) -> StorageMode {
        self.mode
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StorageError>> {
        Box::pin(async move { Ok(self.read(key)) })
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(key);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[tokio::test]
    async fn set_get_remove() -> Result<()> {
        let storage = VolatileStorage::new();
        assert_eq!(storage.get("k").await?, None);

        storage.set("k", "v").await?;
        assert_eq!(storage.get("k").await?.as_deref(), Some("v"));

        storage.remove("k").await?;
        storage.remove("k").await?;
        assert_eq!(storage.get("k").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn clear_forgets_everything() -> Result<()> {
        let storage = VolatileStorage::new();
        storage.set("a", "1").await?;
        storage.set("b", "2").await?;
        storage.clear();
        assert_eq!(storage.get("a").await?, None);
        assert_eq!(storage.get("b").await?, None);
        Ok(())
    }
}

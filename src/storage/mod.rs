//! Key/value storage the auth provider persists its session blob into.
//!
//! Two durability modes exist. [`StorageMode::Persistent`] survives a restart
//! (files under the data directory); [`StorageMode::Volatile`] lives only as
//! long as the adapter instance. A provider client is bound to exactly one
//! adapter for its whole life: switching modes means building a new client.

mod persistent;
mod volatile;

pub use persistent::PersistentStorage;
pub use volatile::VolatileStorage;

use crate::{error::StorageError, BoxFuture};
use std::{fmt, sync::Arc};

/// Durability of a storage adapter.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum StorageMode {
    Persistent,
    Volatile,
}

impl StorageMode {
    /// Mode implied by the "remember me" choice on the login form.
    #[must_use]
    pub const fn from_remember_me(remember_me: bool) -> Self {
        if remember_me {
            Self::Persistent
        } else {
            Self::Volatile
        }
    }

    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Persistent => Self::Volatile,
            Self::Volatile => Self::Persistent,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::Volatile => "volatile",
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability over a string key/value store.
pub trait StorageAdapter: Send + Sync {
    fn mode(&self) -> StorageMode;

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StorageError>>;

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Removing a missing key is not an error.
    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StorageError>>;
}

/// The two adapters a session store can bind a client to.
#[derive(Clone)]
pub struct StorageSet {
    persistent: Arc<dyn StorageAdapter>,
    volatile: Arc<dyn StorageAdapter>,
}

impl StorageSet {
    #[must_use]
    pub fn new(persistent: Arc<dyn StorageAdapter>, volatile: Arc<dyn StorageAdapter>) -> Self {
        Self {
            persistent,
            volatile,
        }
    }

    #[must_use]
    pub fn adapter(&self, mode: StorageMode) -> Arc<dyn StorageAdapter> {
        match mode {
            StorageMode::Persistent => Arc::clone(&self.persistent),
            StorageMode::Volatile => Arc::clone(&self.volatile),
        }
    }
}

impl fmt::Debug for StorageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSet")
            .field("persistent", &self.persistent.mode())
            .field("volatile", &self.volatile.mode())
            .finish()
    }
}

//! Cold-start storage probe.
//!
//! Decides which adapter the first real client binds to without creating that
//! client early: binding to the wrong adapter first would either lose a valid
//! session or quietly change its durability. Probe clients are throwaway and
//! never get an event handler.

use crate::{
    error::InitializationError,
    provider::ProviderFactory,
    storage::{StorageMode, StorageSet},
};
use tracing::{debug, info, warn};

/// Result of the probe.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProbeOutcome {
    pub mode: StorageMode,
    /// Whether a stored session was found in `mode`.
    pub found: bool,
}

/// Checks the persistent adapter, then the volatile one. Falls back to
/// persistent when neither holds a session. Step failures count as "nothing
/// here" and are logged; the probe itself never fails.
pub async fn select_storage_mode(
    factory: &dyn ProviderFactory,
    storages: &StorageSet,
) -> ProbeOutcome {
    for mode in [StorageMode::Persistent, StorageMode::Volatile] {
        match probe_step(factory, storages, mode).await {
            Ok(true) => {
                info!(%mode, "stored session found");
                return ProbeOutcome { mode, found: true };
            }
            Ok(false) => debug!(%mode, "no stored session"),
            Err(err) => warn!(%mode, "session probe failed, treating as empty: {err}"),
        }
    }

    ProbeOutcome {
        mode: StorageMode::Persistent,
        found: false,
    }
}

async fn probe_step(
    factory: &dyn ProviderFactory,
    storages: &StorageSet,
    mode: StorageMode,
) -> Result<bool, InitializationError> {
    let probe = factory.connect_ephemeral(storages.adapter(mode));
    let session = probe.get_session().await?;
    Ok(session.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{ProviderError, StorageError},
        provider::{
            memory::{FailPoint, MemoryBackend, MemoryProviderFactory},
            Credentials,
        },
        storage::{StorageAdapter, VolatileStorage},
        BoxFuture,
    };
    use anyhow::Result;
    use std::{io, sync::Arc};

    /// Disk that cannot be read.
    struct UnreadableStorage;

    impl StorageAdapter for UnreadableStorage {
        fn mode(&self) -> StorageMode {
            StorageMode::Persistent
        }

        fn get<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<Option<String>, StorageError>> {
            Box::pin(async { Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied").into()) })
        }

        fn set<'a>(&'a self, _key: &'a str, _value: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
            Box::pin(async { Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied").into()) })
        }

        fn remove<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn storages() -> StorageSet {
        StorageSet::new(
            Arc::new(VolatileStorage::with_mode(StorageMode::Persistent)),
            Arc::new(VolatileStorage::new()),
        )
    }

    async fn seed_session(
        factory: &MemoryProviderFactory,
        storages: &StorageSet,
        mode: StorageMode,
        email: &str,
    ) -> Result<()> {
        let client = factory.connect(storages.adapter(mode));
        client
            .sign_in_with_password(&Credentials::new(email, "password1"))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn empty_storage_defaults_to_persistent() {
        let backend = MemoryBackend::new();
        let factory = MemoryProviderFactory::new(backend);
        let outcome = select_storage_mode(&factory, &storages()).await;

        assert_eq!(
            outcome,
            ProbeOutcome {
                mode: StorageMode::Persistent,
                found: false
            }
        );
        assert_eq!(factory.connections(), 2);
    }

    #[tokio::test]
    async fn persistent_session_wins_without_checking_volatile() -> Result<()> {
        let backend = MemoryBackend::new();
        backend.register("dev@example.com", "password1");
        let factory = MemoryProviderFactory::new(Arc::clone(&backend));
        let storages = storages();
        seed_session(&factory, &storages, StorageMode::Persistent, "dev@example.com").await?;
        let seeded = factory.connections();

        let outcome = select_storage_mode(&factory, &storages).await;
        assert_eq!(outcome.mode, StorageMode::Persistent);
        assert!(outcome.found);
        assert_eq!(factory.connections() - seeded, 1);
        Ok(())
    }

    #[tokio::test]
    async fn volatile_session_is_selected() -> Result<()> {
        let backend = MemoryBackend::new();
        backend.register("dev@example.com", "password1");
        let factory = MemoryProviderFactory::new(Arc::clone(&backend));
        let storages = storages();
        seed_session(&factory, &storages, StorageMode::Volatile, "dev@example.com").await?;

        let outcome = select_storage_mode(&factory, &storages).await;
        assert_eq!(
            outcome,
            ProbeOutcome {
                mode: StorageMode::Volatile,
                found: true
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn failing_step_is_treated_as_empty() -> Result<()> {
        let backend = MemoryBackend::new();
        backend.register("dev@example.com", "password1");
        let factory = MemoryProviderFactory::new(Arc::clone(&backend));
        let storages = storages();
        seed_session(&factory, &storages, StorageMode::Volatile, "dev@example.com").await?;

        backend.fail_next(FailPoint::GetSession, ProviderError::new("storage locked"));
        let outcome = select_storage_mode(&factory, &storages).await;
        assert_eq!(outcome.mode, StorageMode::Volatile);
        assert!(outcome.found);
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_adapter_is_treated_as_empty() -> Result<()> {
        let backend = MemoryBackend::new();
        backend.register("dev@example.com", "password1");
        let factory = MemoryProviderFactory::new(Arc::clone(&backend));
        let storages = StorageSet::new(
            Arc::new(UnreadableStorage),
            Arc::new(VolatileStorage::new()),
        );
        seed_session(&factory, &storages, StorageMode::Volatile, "dev@example.com").await?;

        let outcome = select_storage_mode(&factory, &storages).await;
        assert_eq!(
            outcome,
            ProbeOutcome {
                mode: StorageMode::Volatile,
                found: true
            }
        );
        Ok(())
    }
}

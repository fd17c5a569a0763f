//! Auth provider client seam.
//!
//! An [`AuthProvider`] is bound to one [`StorageAdapter`] for its whole life and
//! owns the session blob stored there; nothing else reads or writes that blob.
//! It pushes [`AuthEvent`]s, in order, to the single handler registered with
//! [`AuthProvider::on_event`]. A [`ProviderFactory`] builds clients so the
//! session store can tear one down and bind a new one to the other adapter.

pub mod http;
pub mod memory;
mod types;

pub use types::{
    AuthEvent, AuthEventKind, Credentials, EventHandler, Identity, Session, SignInOptions,
};

use crate::{
    error::{ProviderError, StorageError},
    storage::{StorageAdapter, StorageMode},
    BoxFuture,
};
use secrecy::SecretString;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Client surface the session store needs from the hosted auth provider.
pub trait AuthProvider: Send + Sync {
    /// Durability of the adapter this client is bound to.
    fn storage_mode(&self) -> StorageMode;

    fn sign_up<'a>(&'a self, credentials: &'a Credentials)
        -> BoxFuture<'a, Result<(), ProviderError>>;

    fn sign_in_with_password<'a>(
        &'a self,
        credentials: &'a Credentials,
    ) -> BoxFuture<'a, Result<(), ProviderError>>;

    /// Sends an out-of-band recovery link pointing at `redirect_to`.
    fn reset_password_for_email<'a>(
        &'a self,
        email: &'a str,
        redirect_to: &'a str,
    ) -> BoxFuture<'a, Result<(), ProviderError>>;

    /// Changes the password of the current session's user. The provider
    /// treats the caller as authenticated afterwards.
    fn update_user<'a>(&'a self, password: &'a SecretString)
        -> BoxFuture<'a, Result<(), ProviderError>>;

    fn sign_out(&self) -> BoxFuture<'_, Result<(), ProviderError>>;

    /// Reads the stored session from the bound adapter. An expired access
    /// token is exchanged for a new one first; the refreshed session is
    /// written back and announced as [`AuthEventKind::SessionUpdated`]. A
    /// session whose refresh fails reads as absent.
    fn get_session(&self) -> BoxFuture<'_, Result<Option<Session>, ProviderError>>;

    /// Consumes a recovery redirect link: stores its session and emits
    /// [`AuthEventKind::RecoveryStarted`].
    fn exchange_recovery_link<'a>(&'a self, link: &'a str)
        -> BoxFuture<'a, Result<(), ProviderError>>;

    /// Drops the stored blob without emitting any event.
    fn discard_stored_session(&self) -> BoxFuture<'_, Result<(), ProviderError>>;

    /// Registers the event handler, replacing (and detaching) any previous one.
    fn on_event(&self, handler: EventHandler);

    /// Removes the handler; later events go nowhere.
    fn detach(&self);
}

/// Builds provider clients bound to a given adapter. Never fails: anything
/// fallible (HTTP client setup) happens when the factory itself is built.
pub trait ProviderFactory: Send + Sync {
    fn connect(&self, storage: Arc<dyn StorageAdapter>) -> Arc<dyn AuthProvider>;

    /// Client for a single probe or purge call. It never gets a handler and
    /// is dropped right after use.
    fn connect_ephemeral(&self, storage: Arc<dyn StorageAdapter>) -> Arc<dyn AuthProvider> {
        self.connect(storage)
    }
}

impl From<StorageError> for ProviderError {
    fn from(err: StorageError) -> Self {
        ProviderError::new(err.to_string()).with_code("storage_error")
    }
}

/// Single-handler slot shared by the provider implementations.
#[derive(Default)]
pub(crate) struct HandlerSlot {
    handler: Mutex<Option<EventHandler>>,
}

impl HandlerSlot {
    pub(crate) fn set(&self, handler: EventHandler) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    pub(crate) fn clear(&self) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Calls the handler outside the lock so it may re-enter the provider.
    pub(crate) fn emit(&self, event: AuthEvent) {
        let handler = self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }
}

/// Reads and decodes the session blob. A blob that no longer decodes is
/// removed and reported as absent.
pub(crate) async fn read_session_blob(
    storage: &dyn StorageAdapter,
    key: &str,
) -> Result<Option<Session>, ProviderError> {
    let Some(raw) = storage.get(key).await? else {
        return Ok(None);
    };
    match serde_json::from_str::<Session>(&raw) {
        Ok(session) => Ok(Some(session)),
        Err(err) => {
            warn!(mode = %storage.mode(), "discarding undecodable session blob: {err}");
            storage.remove(key).await?;
            Ok(None)
        }
    }
}

/// Settles the refresh of an expired stored session. A new session is written
/// back and announced. A refresh token the server rejected drops the blob; a
/// failure without a response keeps it for the next attempt. Either failure
/// reads as "no session".
pub(crate) async fn settle_refresh(
    storage: &dyn StorageAdapter,
    key: &str,
    handler: &HandlerSlot,
    refreshed: Result<Session, ProviderError>,
) -> Result<Option<Session>, ProviderError> {
    match refreshed {
        Ok(session) => {
            write_session_blob(storage, key, &session).await?;
            debug!(mode = %storage.mode(), "session refreshed");
            handler.emit(AuthEvent::session_updated(Some(session.clone())));
            Ok(Some(session))
        }
        Err(err) => {
            warn!(
                mode = %storage.mode(),
                code = err.code.as_deref().unwrap_or("none"),
                status = err.status,
                "session refresh failed: {}",
                err.message
            );
            if err.status.is_some_and(|status| (400..500).contains(&status)) {
                storage.remove(key).await?;
            }
            Ok(None)
        }
    }
}

pub(crate) async fn write_session_blob(
    storage: &dyn StorageAdapter,
    key: &str,
    session: &Session,
) -> Result<(), ProviderError> {
    let raw = serde_json::to_string(session).map_err(StorageError::from)?;
    storage.set(key, &raw).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::VolatileStorage;
    use anyhow::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn session() -> Session {
        Session {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            token_type: "bearer".to_string(),
            expires_at: None,
            user: Identity {
                id: Uuid::new_v4(),
                email: "dev@example.com".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn blob_round_trip_and_corrupt_blob_is_dropped() -> Result<()> {
        let storage = VolatileStorage::new();
        assert_eq!(read_session_blob(&storage, "key").await?, None);

        let stored = session();
        write_session_blob(&storage, "key", &stored).await?;
        assert_eq!(read_session_blob(&storage, "key").await?, Some(stored));

        storage.set("key", "not json").await?;
        assert_eq!(read_session_blob(&storage, "key").await?, None);
        assert_eq!(storage.get("key").await?, None);
        Ok(())
    }

    #[test]
    fn handler_slot_replaces_and_clears() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let slot = HandlerSlot::default();

        let counter = Arc::clone(&first);
        slot.set(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        slot.emit(AuthEvent::signed_out());

        let counter = Arc::clone(&second);
        slot.set(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        slot.emit(AuthEvent::signed_out());

        slot.clear();
        slot.emit(AuthEvent::signed_out());

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn storage_errors_become_provider_errors() {
        let err: ProviderError =
            StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk gone")).into();
        assert_eq!(err.code.as_deref(), Some("storage_error"));
        assert!(err.message.contains("disk gone"));
    }
}

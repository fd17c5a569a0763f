//! The authoritative session context and its action surface.
//!
//! One [`SessionStore`] is built per application and handed to whatever needs
//! auth state; there is no global. It owns the live provider client, keeps it
//! bound to the right storage adapter and routes every provider event through
//! the reducer.

use super::{cell::SessionCell, probe, state::SessionState};
use crate::{
    config::AuthConfig,
    error::ProviderError,
    profile::{Profile, ProfileLoader, ProfileRepository},
    provider::{
        AuthEvent, AuthProvider, Credentials, Identity, ProviderFactory, Session, SignInOptions,
    },
    storage::{StorageMode, StorageSet},
};
use secrecy::SecretString;
use std::sync::Arc;
use tokio::{
    sync::{watch, OnceCell, RwLock},
    task::JoinHandle,
};
use tracing::{debug, error, info, instrument, warn};

struct ActiveClient {
    client: Arc<dyn AuthProvider>,
    generation: u64,
}

/// Raises `is_loading` for as long as it lives, on every exit path.
struct LoadingGuard<'a> {
    cell: &'a SessionCell,
}

impl<'a> LoadingGuard<'a> {
    fn new(cell: &'a SessionCell) -> Self {
        cell.begin_action();
        Self { cell }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.cell.end_action();
    }
}

pub struct SessionStore {
    config: AuthConfig,
    factory: Arc<dyn ProviderFactory>,
    storages: StorageSet,
    cell: Arc<SessionCell>,
    active: RwLock<Option<ActiveClient>>,
    init: OnceCell<()>,
    loader: JoinHandle<()>,
}

impl SessionStore {
    /// Builds the store and starts its profile loader. Must be called from
    /// within a Tokio runtime. No client exists until [`Self::initialize`].
    #[must_use]
    pub fn new(
        config: AuthConfig,
        factory: Arc<dyn ProviderFactory>,
        storages: StorageSet,
        profiles: Arc<dyn ProfileRepository>,
    ) -> Self {
        let (cell, changes) = SessionCell::new();
        let cell = Arc::new(cell);
        let loader = ProfileLoader::new(Arc::clone(&cell), profiles).spawn(changes);

        Self {
            config,
            factory,
            storages,
            cell,
            active: RwLock::new(None),
            init: OnceCell::new(),
            loader,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Runs the storage probe and installs the first real client. Memoized:
    /// concurrent and later callers all wait on the same single run.
    pub async fn initialize(&self) {
        self.init
            .get_or_init(|| async {
                let outcome = probe::select_storage_mode(self.factory.as_ref(), &self.storages).await;
                let mut active = self.active.write().await;
                self.install(&mut active, outcome.mode).await;
                info!(mode = %outcome.mode, restored = outcome.found, "session store initialized");
            })
            .await;
    }

    /// Tears down the current client (if any) and binds a fresh one to `mode`.
    /// The new client's stored session goes through the reducer as its
    /// initial session.
    async fn install(
        &self,
        slot: &mut Option<ActiveClient>,
        mode: StorageMode,
    ) -> Arc<dyn AuthProvider> {
        if let Some(previous) = slot.take() {
            previous.client.detach();
            debug!(generation = previous.generation, "retired provider client");
        }

        let generation = self.cell.next_generation();
        let client = self.factory.connect(self.storages.adapter(mode));
        let cell = Arc::clone(&self.cell);
        client.on_event(Arc::new(move |event| cell.dispatch(generation, event)));

        let stored = match client.get_session().await {
            Ok(session) => session,
            Err(err) => {
                warn!(%mode, "failed to read stored session: {err}");
                None
            }
        };
        self.cell
            .dispatch(generation, AuthEvent::session_updated(stored));

        *slot = Some(ActiveClient {
            client: Arc::clone(&client),
            generation,
        });
        client
    }

    async fn client(&self) -> Result<Arc<dyn AuthProvider>, ProviderError> {
        self.initialize().await;
        self.active
            .read()
            .await
            .as_ref()
            .map(|active| Arc::clone(&active.client))
            .ok_or_else(|| {
                ProviderError::new("auth client is not initialized")
                    .with_code("client_not_initialized")
            })
    }

    /// Registers a new account. Does not sign in.
    #[instrument(skip_all)]
    pub async fn sign_up(&self, credentials: &Credentials) -> Result<(), ProviderError> {
        let _loading = LoadingGuard::new(&self.cell);
        let client = self.client().await?;
        client.sign_up(credentials).await.inspect_err(log_failure)
    }

    /// Signs in after binding the client to the adapter `remember_me` implies.
    #[instrument(skip_all, fields(remember_me = options.remember_me))]
    pub async fn sign_in_with_email(
        &self,
        credentials: &Credentials,
        options: SignInOptions,
    ) -> Result<(), ProviderError> {
        let _loading = LoadingGuard::new(&self.cell);
        self.initialize().await;
        let mode = StorageMode::from_remember_me(options.remember_me);

        // Held across switch and sign-in so no other action sees a half-built client.
        let result = {
            let mut active = self.active.write().await;
            let current_mode = active.as_ref().map(|current| current.client.storage_mode());
            let bound = active
                .as_ref()
                .filter(|current| current.client.storage_mode() == mode)
                .map(|current| Arc::clone(&current.client));
            let client = match bound {
                Some(client) => client,
                None => {
                    info!(%mode, "switching session storage");
                    self.install(&mut active, mode).await
                }
            };
            let result = client.sign_in_with_password(credentials).await;

            // A failed sign-in must not leave the live client on an adapter
            // that holds nothing while the previous one still holds a session.
            if result.is_err() {
                if let Some(previous) = current_mode.filter(|previous| *previous != mode) {
                    info!(mode = %previous, "restoring session storage after failed sign-in");
                    self.install(&mut active, previous).await;
                }
            }
            result
        };

        match result {
            Ok(()) => {
                self.purge_mode(mode.other()).await;
                Ok(())
            }
            Err(err) => {
                log_failure(&err);
                Err(err)
            }
        }
    }

    /// Drops whatever session the `mode` adapter still holds so a later cold
    /// start cannot bring it back. Best effort.
    async fn purge_mode(&self, mode: StorageMode) {
        let client = self.factory.connect_ephemeral(self.storages.adapter(mode));
        if let Err(err) = client.discard_stored_session().await {
            warn!(%mode, "failed to discard stale session: {err}");
        }
    }

    /// Mails a recovery link pointing at the configured reset page.
    #[instrument(skip_all)]
    pub async fn send_password_reset_email(&self, email: &str) -> Result<(), ProviderError> {
        let _loading = LoadingGuard::new(&self.cell);
        let client = self.client().await?;
        let redirect_to = self.config.reset_redirect_url();
        client
            .reset_password_for_email(email, &redirect_to)
            .await
            .inspect_err(log_failure)
    }

    /// Changes the password. The provider treats the caller as signed in
    /// afterwards; recovery callers should [`Self::sign_out`] right away.
    #[instrument(skip_all)]
    pub async fn update_password(&self, new_password: &SecretString) -> Result<(), ProviderError> {
        let _loading = LoadingGuard::new(&self.cell);
        let client = self.client().await?;
        client
            .update_user(new_password)
            .await
            .inspect_err(log_failure)
    }

    #[instrument(skip_all)]
    pub async fn sign_out(&self) -> Result<(), ProviderError> {
        let _loading = LoadingGuard::new(&self.cell);
        let client = self.client().await?;
        client.sign_out().await.inspect_err(log_failure)?;
        self.cell.reset_signed_out();
        self.purge_mode(client.storage_mode().other()).await;
        Ok(())
    }

    /// Consumes a password-recovery redirect link, entering the recovery flow.
    #[instrument(skip_all)]
    pub async fn open_recovery_link(&self, link: &str) -> Result<(), ProviderError> {
        let _loading = LoadingGuard::new(&self.cell);
        let client = self.client().await?;
        client
            .exchange_recovery_link(link)
            .await
            .inspect_err(log_failure)
    }

    /// Session stored in the adapter the live client is bound to. An expired
    /// access token is refreshed first.
    pub async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        self.client().await?.get_session().await
    }

    /// Adapter mode of the live client, if one is installed yet.
    pub async fn storage_mode(&self) -> Option<StorageMode> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|active| active.client.storage_mode())
    }

    /// Waits until the state reports initialized. Does not start
    /// initialization by itself.
    pub async fn wait_until_initialized(&self) {
        let mut rx = self.cell.subscribe();
        // The sender lives in `self.cell`, so the channel cannot close here.
        let _ = rx.wait_for(|state| state.is_initialized).await;
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.cell.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.cell.snapshot()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.snapshot().is_authenticated()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.snapshot().is_initialized
    }

    #[must_use]
    pub fn in_recovery_flow(&self) -> bool {
        self.snapshot().in_recovery_flow
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.snapshot().is_loading
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.snapshot().is_admin()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.snapshot().identity
    }

    #[must_use]
    pub fn profile(&self) -> Option<Profile> {
        self.snapshot().profile
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.loader.abort();
        if let Some(active) = self.active.get_mut().take() {
            active.client.detach();
        }
    }
}

fn log_failure(err: &ProviderError) {
    error!(
        code = err.code.as_deref().unwrap_or("none"),
        status = err.status,
        "auth provider call failed: {}",
        err.message
    );
}

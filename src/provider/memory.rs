//! In-process stand-in for the hosted backend.
//!
//! [`MemoryBackend`] keeps accounts, profile rows and mailed recovery links;
//! [`MemoryProvider`] is a client bound to one storage adapter, behaving like
//! the real provider: it writes its session blob into that adapter and pushes
//! events to its handler synchronously, in call order. Used by the test suite
//! and by `--offline` CLI runs.

use super::{
    read_session_blob, settle_refresh, types::unix_now, write_session_blob, AuthEvent,
    AuthProvider, Credentials, EventHandler, HandlerSlot, Identity, ProviderFactory, Session,
};
use crate::{
    error::{ProfileLoadError, ProviderError},
    profile::{Profile, ProfileRepository, UserRole},
    storage::{StorageAdapter, StorageMode},
    BoxFuture,
};
use secrecy::{ExposeSecret, SecretString};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};
use tracing::debug;
use ulid::Ulid;
use url::Url;
use uuid::Uuid;

/// Storage key used when none is configured.
pub const DEFAULT_STORAGE_KEY: &str = "compendium-auth-token";

const SESSION_TTL_SECONDS: u64 = 60 * 60;
const MIN_PASSWORD_LENGTH: usize = 6;

/// Operations that can be told to fail once.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FailPoint {
    SignUp,
    SignIn,
    ResetPassword,
    UpdateUser,
    SignOut,
    GetSession,
    RefreshSession,
    FetchProfile,
}

#[derive(Clone, Debug)]
struct Account {
    id: Uuid,
    email: String,
    password: String,
}

#[derive(Default)]
struct BackendState {
    accounts: HashMap<String, Account>,
    profiles: HashMap<Uuid, Profile>,
    /// Recovery token -> normalized email.
    recovery_tokens: HashMap<String, String>,
    /// Live refresh token -> normalized email. Each token works once.
    refresh_tokens: HashMap<String, String>,
    /// Normalized email -> last link mailed.
    mailbox: HashMap<String, String>,
    failures: HashMap<FailPoint, ProviderError>,
}

/// Accounts, profile rows and outgoing mail of the simulated backend.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<BackendState>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a confirmed account with a developer profile row.
    pub fn register(&self, email: &str, password: &str) -> Identity {
        let mut state = self.lock();
        let account = create_account(&mut state, email, password);
        Identity {
            id: account.id,
            email: account.email,
        }
    }

    pub fn set_profile(&self, profile: Profile) {
        self.lock().profiles.insert(profile.id, profile);
    }

    pub fn remove_profile(&self, id: Uuid) {
        self.lock().profiles.remove(&id);
    }

    /// Makes the next call at `point` fail with `error`.
    pub fn fail_next(&self, point: FailPoint, error: ProviderError) {
        self.lock().failures.insert(point, error);
    }

    /// Last recovery link mailed to `email`, as the user would click it.
    #[must_use]
    pub fn last_recovery_link(&self, email: &str) -> Option<String> {
        self.lock().mailbox.get(&normalize_email(email)).cloned()
    }

    #[must_use]
    pub fn password_matches(&self, email: &str, password: &str) -> bool {
        self.lock()
            .accounts
            .get(&normalize_email(email))
            .is_some_and(|account| account.password == password)
    }

    fn take_failure(&self, point: FailPoint) -> Result<(), ProviderError> {
        match self.lock().failures.remove(&point) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn issue_session(&self, account: &Account) -> Session {
        mint_session(&mut self.lock(), account)
    }

    /// Trades a refresh token for a new session, retiring the old token.
    fn refresh(&self, refresh_token: &str) -> Result<Session, ProviderError> {
        self.take_failure(FailPoint::RefreshSession)?;
        let mut state = self.lock();
        let email = state.refresh_tokens.remove(refresh_token);
        let account = email
            .and_then(|email| state.accounts.get(&email).cloned())
            .ok_or_else(|| {
                ProviderError::new("Invalid Refresh Token: Refresh Token Not Found")
                    .with_code("refresh_token_not_found")
                    .with_status(400)
            })?;
        Ok(mint_session(&mut state, &account))
    }

    fn revoke(&self, refresh_token: &str) {
        self.lock().refresh_tokens.remove(refresh_token);
    }
}

fn create_account(state: &mut BackendState, email: &str, password: &str) -> Account {
    let account = Account {
        id: Uuid::new_v4(),
        email: email.trim().to_string(),
        password: password.to_string(),
    };
    let username = account
        .email
        .split('@')
        .next()
        .filter(|local| !local.is_empty())
        .map(ToString::to_string);
    state.profiles.insert(
        account.id,
        Profile {
            id: account.id,
            username,
            role: UserRole::Developer,
        },
    );
    state
        .accounts
        .insert(normalize_email(email), account.clone());
    account
}

fn mint_session(state: &mut BackendState, account: &Account) -> Session {
    let session = Session {
        access_token: Ulid::new().to_string(),
        refresh_token: Ulid::new().to_string(),
        token_type: "bearer".to_string(),
        expires_at: Some(unix_now() + SESSION_TTL_SECONDS),
        user: Identity {
            id: account.id,
            email: account.email.clone(),
        },
    };
    state
        .refresh_tokens
        .insert(session.refresh_token.clone(), normalize_email(&account.email));
    session
}

fn check_password_strength(password: &str) -> Result<(), ProviderError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ProviderError::new(format!(
            "Password should be at least {MIN_PASSWORD_LENGTH} characters."
        ))
        .with_code("weak_password")
        .with_status(422));
    }
    Ok(())
}

impl ProfileRepository for MemoryBackend {
    fn fetch_by_id<'a>(
        &'a self,
        id: Uuid,
        _access_token: &'a str,
    ) -> BoxFuture<'a, Result<Profile, ProfileLoadError>> {
        Box::pin(async move {
            self.take_failure(FailPoint::FetchProfile)
                .map_err(|err| ProfileLoadError::Request(err.message))?;
            self.lock()
                .profiles
                .get(&id)
                .cloned()
                .ok_or(ProfileLoadError::NotFound(id))
        })
    }
}

/// Client of a [`MemoryBackend`] bound to one storage adapter.
pub struct MemoryProvider {
    backend: Arc<MemoryBackend>,
    storage: Arc<dyn StorageAdapter>,
    storage_key: String,
    handler: HandlerSlot,
}

impl MemoryProvider {
    #[must_use]
    pub fn new(
        backend: Arc<MemoryBackend>,
        storage: Arc<dyn StorageAdapter>,
        storage_key: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            storage,
            storage_key: storage_key.into(),
            handler: HandlerSlot::default(),
        }
    }

    /// Pushes an arbitrary event, as the provider would on its own schedule
    /// (token refresh, sign-out from another tab).
    pub fn emit(&self, event: AuthEvent) {
        self.handler.emit(event);
    }

    async fn store_and_emit(&self, session: Session, event: AuthEvent) -> Result<(), ProviderError> {
        write_session_blob(self.storage.as_ref(), &self.storage_key, &session).await?;
        self.handler.emit(event);
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        let Some(session) = read_session_blob(self.storage.as_ref(), &self.storage_key).await?
        else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }
        let refreshed = self.backend.refresh(&session.refresh_token);
        settle_refresh(
            self.storage.as_ref(),
            &self.storage_key,
            &self.handler,
            refreshed,
        )
        .await
    }
}

impl AuthProvider for MemoryProvider {
    fn storage_mode(&self) -> StorageMode {
        self.storage.mode()
    }

    fn sign_up<'a>(
        &'a self,
        credentials: &'a Credentials,
    ) -> BoxFuture<'a, Result<(), ProviderError>> {
        Box::pin(async move {
            self.backend.take_failure(FailPoint::SignUp)?;
            let password = credentials.password.expose_secret();
            check_password_strength(password)?;

            let mut state = self.backend.lock();
            let key = normalize_email(&credentials.email);
            if state.accounts.contains_key(&key) {
                return Err(ProviderError::new("User already registered")
                    .with_code("user_already_exists")
                    .with_status(422));
            }
            let account = create_account(&mut state, &credentials.email, password);
            debug!(user_id = %account.id, "account created");
            Ok(())
        })
    }

    fn sign_in_with_password<'a>(
        &'a self,
        credentials: &'a Credentials,
    ) -> BoxFuture<'a, Result<(), ProviderError>> {
        Box::pin(async move {
            self.backend.take_failure(FailPoint::SignIn)?;
            let account = self
                .backend
                .lock()
                .accounts
                .get(&normalize_email(&credentials.email))
                .filter(|account| account.password == credentials.password.expose_secret())
                .cloned()
                .ok_or_else(|| {
                    ProviderError::new("Invalid login credentials")
                        .with_code("invalid_credentials")
                        .with_status(400)
                })?;

            let session = self.backend.issue_session(&account);
            self.store_and_emit(session.clone(), AuthEvent::signed_in(session))
                .await
        })
    }

    fn reset_password_for_email<'a>(
        &'a self,
        email: &'a str,
        redirect_to: &'a str,
    ) -> BoxFuture<'a, Result<(), ProviderError>> {
        Box::pin(async move {
            self.backend.take_failure(FailPoint::ResetPassword)?;
            let mut state = self.backend.lock();
            let key = normalize_email(email);
            // Unknown addresses succeed silently so account existence never leaks.
            if state.accounts.contains_key(&key) {
                let token = Ulid::new().to_string();
                let link = format!(
                    "{redirect_to}#access_token={token}&refresh_token={token}&expires_in={SESSION_TTL_SECONDS}&token_type=bearer&type=recovery"
                );
                state.recovery_tokens.insert(token, key.clone());
                state.mailbox.insert(key, link);
            }
            Ok(())
        })
    }

    fn update_user<'a>(
        &'a self,
        password: &'a SecretString,
    ) -> BoxFuture<'a, Result<(), ProviderError>> {
        Box::pin(async move {
            self.backend.take_failure(FailPoint::UpdateUser)?;
            let session = self.current_session().await?.ok_or_else(|| {
                ProviderError::new("Auth session missing!")
                    .with_code("session_not_found")
                    .with_status(401)
            })?;
            let password = password.expose_secret();
            check_password_strength(password)?;

            let account = {
                let mut state = self.backend.lock();
                let account = state
                    .accounts
                    .get_mut(&normalize_email(&session.user.email))
                    .ok_or_else(|| {
                        ProviderError::new("User not found")
                            .with_code("user_not_found")
                            .with_status(404)
                    })?;
                if account.password == password {
                    return Err(ProviderError::new(
                        "New password should be different from the old password.",
                    )
                    .with_code("same_password")
                    .with_status(422));
                }
                account.password = password.to_string();
                account.clone()
            };

            let refreshed = self.backend.issue_session(&account);
            self.store_and_emit(
                refreshed.clone(),
                AuthEvent::identity_refreshed(Some(refreshed)),
            )
            .await
        })
    }

    fn sign_out(&self) -> BoxFuture<'_, Result<(), ProviderError>> {
        Box::pin(async move {
            self.backend.take_failure(FailPoint::SignOut)?;
            if let Some(session) =
                read_session_blob(self.storage.as_ref(), &self.storage_key).await?
            {
                self.backend.revoke(&session.refresh_token);
            }
            self.storage.remove(&self.storage_key).await?;
            self.handler.emit(AuthEvent::signed_out());
            Ok(())
        })
    }

    fn get_session(&self) -> BoxFuture<'_, Result<Option<Session>, ProviderError>> {
        Box::pin(async move {
            self.backend.take_failure(FailPoint::GetSession)?;
            self.current_session().await
        })
    }

    fn exchange_recovery_link<'a>(
        &'a self,
        link: &'a str,
    ) -> BoxFuture<'a, Result<(), ProviderError>> {
        Box::pin(async move {
            let invalid = || {
                ProviderError::new("Email link is invalid or has expired")
                    .with_code("otp_expired")
                    .with_status(403)
            };
            let url = Url::parse(link).map_err(|_| invalid())?;
            let fragment = url.fragment().ok_or_else(invalid)?;
            let params: HashMap<String, String> =
                url::form_urlencoded::parse(fragment.as_bytes())
                    .into_owned()
                    .collect();
            if params.get("type").map(String::as_str) != Some("recovery") {
                return Err(invalid());
            }
            let token = params.get("access_token").ok_or_else(invalid)?;

            let account = {
                let mut state = self.backend.lock();
                let email = state.recovery_tokens.remove(token).ok_or_else(invalid)?;
                state.accounts.get(&email).cloned().ok_or_else(invalid)?
            };

            let session = self.backend.issue_session(&account);
            self.store_and_emit(session.clone(), AuthEvent::recovery_started(session))
                .await
        })
    }

    fn discard_stored_session(&self) -> BoxFuture<'_, Result<(), ProviderError>> {
        Box::pin(async move {
            self.storage.remove(&self.storage_key).await?;
            Ok(())
        })
    }

    fn on_event(&self, handler: EventHandler) {
        self.handler.set(handler);
    }

    fn detach(&self) {
        self.handler.clear();
    }
}

/// Builds [`MemoryProvider`]s and remembers the last one per adapter mode so
/// tests can push events through the live client.
pub struct MemoryProviderFactory {
    backend: Arc<MemoryBackend>,
    storage_key: String,
    connections: AtomicUsize,
    last: Mutex<HashMap<StorageMode, Arc<MemoryProvider>>>,
}

impl MemoryProviderFactory {
    #[must_use]
    pub fn new(backend: Arc<MemoryBackend>) -> Self {
        Self::with_storage_key(backend, DEFAULT_STORAGE_KEY)
    }

    #[must_use]
    pub fn with_storage_key(backend: Arc<MemoryBackend>, storage_key: impl Into<String>) -> Self {
        Self {
            backend,
            storage_key: storage_key.into(),
            connections: AtomicUsize::new(0),
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Number of clients built so far, ephemeral ones included.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Most recent client bound to an adapter of `mode` through
    /// [`ProviderFactory::connect`]. Probe and purge clients never show up here.
    #[must_use]
    pub fn last_client(&self, mode: StorageMode) -> Option<Arc<MemoryProvider>> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&mode)
            .cloned()
    }
}

impl MemoryProviderFactory {
    fn build(&self, storage: Arc<dyn StorageAdapter>) -> Arc<MemoryProvider> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        Arc::new(MemoryProvider::new(
            Arc::clone(&self.backend),
            storage,
            self.storage_key.clone(),
        ))
    }
}

impl ProviderFactory for MemoryProviderFactory {
    fn connect(&self, storage: Arc<dyn StorageAdapter>) -> Arc<dyn AuthProvider> {
        let mode = storage.mode();
        let client = self.build(storage);
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(mode, Arc::clone(&client));
        client
    }

    /// Counted, but never recorded as the last client of its mode.
    fn connect_ephemeral(&self, storage: Arc<dyn StorageAdapter>) -> Arc<dyn AuthProvider> {
        self.build(storage)
    }
}

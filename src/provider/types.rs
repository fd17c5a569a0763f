//! Values exchanged with the auth provider.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use uuid::Uuid;

/// The authenticated principal.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    #[serde(default)]
    pub email: String,
}

/// Credential bundle issued by the provider.
///
/// The session core treats it as opaque apart from [`Session::user`]; only the
/// provider reads or writes the token fields.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<u64>,
    pub user: Identity,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.user
    }

    #[must_use]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

/// Email and password as typed into the login form.
#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::from(password.into()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SignInOptions {
    pub remember_me: bool,
}

/// Kinds of provider push events the session reacts to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AuthEventKind {
    /// A password-recovery link was opened.
    RecoveryStarted,
    /// The user record changed (password or email update).
    IdentityRefreshed,
    SignedIn,
    SignedOut,
    /// Initial session, token refresh and anything else.
    SessionUpdated,
}

impl AuthEventKind {
    /// Maps the provider's event names.
    #[must_use]
    pub fn from_wire(name: &str) -> Self {
        match name {
            "PASSWORD_RECOVERY" => Self::RecoveryStarted,
            "USER_UPDATED" => Self::IdentityRefreshed,
            "SIGNED_IN" => Self::SignedIn,
            "SIGNED_OUT" => Self::SignedOut,
            _ => Self::SessionUpdated,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RecoveryStarted => "RECOVERY_STARTED",
            Self::IdentityRefreshed => "IDENTITY_REFRESHED",
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::SessionUpdated => "SESSION_UPDATED",
        }
    }
}

impl fmt::Display for AuthEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    #[must_use]
    pub fn new(kind: AuthEventKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }

    #[must_use]
    pub fn signed_in(session: Session) -> Self {
        Self::new(AuthEventKind::SignedIn, Some(session))
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self::new(AuthEventKind::SignedOut, None)
    }

    #[must_use]
    pub fn recovery_started(session: Session) -> Self {
        Self::new(AuthEventKind::RecoveryStarted, Some(session))
    }

    #[must_use]
    pub fn identity_refreshed(session: Option<Session>) -> Self {
        Self::new(AuthEventKind::IdentityRefreshed, session)
    }

    #[must_use]
    pub fn session_updated(session: Option<Session>) -> Self {
        Self::new(AuthEventKind::SessionUpdated, session)
    }
}

/// Receiver of provider events. Deliberately synchronous: the handler must
/// finish its state writes before the provider delivers the next event.
pub type EventHandler = Arc<dyn Fn(AuthEvent) + Send + Sync>;

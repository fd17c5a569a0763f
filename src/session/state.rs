//! Session state record.

use crate::{
    profile::Profile,
    provider::{Identity, Session},
};
use uuid::Uuid;

/// Coarse phase derived from the state fields.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthPhase {
    Uninitialized,
    Unauthenticated,
    Authenticated,
    RecoveryPending,
}

/// The single authoritative session record.
///
/// `identity` is present iff `session` is, and `profile` is absent whenever
/// `identity` is. `is_initialized` only ever goes from false to true.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SessionState {
    pub session: Option<Session>,
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    pub is_initialized: bool,
    pub in_recovery_flow: bool,
    pub is_loading: bool,
    /// User actions currently in flight; `is_loading` mirrors `> 0`.
    pub(crate) pending_actions: usize,
}

impl SessionState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn identity_id(&self) -> Option<Uuid> {
        self.identity.as_ref().map(|identity| identity.id)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.profile.as_ref().is_some_and(Profile::is_admin)
    }

    #[must_use]
    pub fn phase(&self) -> AuthPhase {
        if !self.is_initialized {
            AuthPhase::Uninitialized
        } else if self.in_recovery_flow {
            AuthPhase::RecoveryPending
        } else if self.is_authenticated() {
            AuthPhase::Authenticated
        } else {
            AuthPhase::Unauthenticated
        }
    }

    /// Takes session and identity from a provider payload. The profile is
    /// dropped whenever the identity it belongs to goes away or changes.
    pub(crate) fn adopt(&mut self, session: Option<Session>) {
        let identity = session.as_ref().map(|session| session.user.clone());
        if identity.as_ref().map(|identity| identity.id) != self.identity_id() {
            self.profile = None;
        }
        self.identity = identity;
        self.session = session;
    }

    /// Back to the initial state, except that initialization stays done and
    /// in-flight actions keep their loading flag.
    pub(crate) fn reset_signed_out(&mut self) {
        let pending_actions = self.pending_actions;
        *self = Self {
            is_initialized: true,
            is_loading: pending_actions > 0,
            pending_actions,
            ..Self::default()
        };
    }

    pub(crate) fn begin_action(&mut self) {
        self.pending_actions += 1;
        self.is_loading = true;
    }

    pub(crate) fn end_action(&mut self) {
        self.pending_actions = self.pending_actions.saturating_sub(1);
        self.is_loading = self.pending_actions > 0;
    }
}

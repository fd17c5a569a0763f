//! Shared state cell: the watch channel every writer goes through.
//!
//! Writers are the reducer (via [`SessionCell::dispatch`]), the profile loader
//! and the store's action methods. Each write is one closure run under the
//! channel's lock, so writes never interleave on a field.

use super::{reducer, state::SessionState};
use crate::{error::ProfileLoadError, profile::Profile, provider::AuthEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error};
use uuid::Uuid;

/// New identity plus the bearer token its profile is fetched with.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct IdentityChange {
    pub(crate) id: Uuid,
    pub(crate) access_token: String,
}

/// Identity changes published to the profile loader, in write order.
/// `None` means the identity went away.
pub(crate) type IdentityChanges = mpsc::UnboundedReceiver<Option<IdentityChange>>;

pub(crate) struct SessionCell {
    state: watch::Sender<SessionState>,
    generation: AtomicU64,
    identity_tx: mpsc::UnboundedSender<Option<IdentityChange>>,
}

impl SessionCell {
    pub(crate) fn new() -> (Self, IdentityChanges) {
        let (state, _) = watch::channel(SessionState::default());
        let (identity_tx, identity_rx) = mpsc::unbounded_channel();
        (
            Self {
                state,
                generation: AtomicU64::new(0),
                identity_tx,
            },
            identity_rx,
        )
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub(crate) fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Starts a new client generation; events tagged with older ones are dropped.
    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Event handler body: one synchronous reducer step.
    pub(crate) fn dispatch(&self, generation: u64, event: AuthEvent) {
        let kind = event.kind;
        self.state.send_if_modified(|state| {
            let current = self.generation.load(Ordering::Acquire);
            if current != generation {
                debug!(%kind, generation, current, "dropping event from retired client");
                return false;
            }
            let before = state.identity_id();
            let effect = reducer::reduce(state, event);
            debug!(%kind, ?effect, phase = ?state.phase(), "auth event applied");
            self.publish_identity(before, state);
            true
        });
    }

    /// Explicit reset after a confirmed sign-out; same result as the event.
    pub(crate) fn reset_signed_out(&self) {
        self.state.send_modify(|state| {
            let before = state.identity_id();
            state.reset_signed_out();
            self.publish_identity(before, state);
        });
    }

    pub(crate) fn begin_action(&self) {
        self.state.send_modify(SessionState::begin_action);
    }

    pub(crate) fn end_action(&self) {
        self.state.send_modify(SessionState::end_action);
    }

    /// Writes a fetched profile unless the identity moved on meanwhile.
    pub(crate) fn store_profile(&self, id: Uuid, result: Result<Profile, ProfileLoadError>) {
        self.state.send_if_modified(|state| {
            if state.identity_id() != Some(id) {
                debug!(user_id = %id, "discarding stale profile result");
                return false;
            }
            match result {
                Ok(profile) => state.profile = Some(profile),
                Err(err) => {
                    error!(user_id = %id, "error loading user profile: {err}");
                    state.profile = None;
                }
            }
            true
        });
    }

    pub(crate) fn clear_profile(&self) {
        self.state.send_if_modified(|state| state.profile.take().is_some());
    }

    fn publish_identity(&self, before: Option<Uuid>, state: &SessionState) {
        if before == state.identity_id() {
            return;
        }
        let change = state.session.as_ref().map(|session| IdentityChange {
            id: session.user.id,
            access_token: session.access_token.clone(),
        });
        // The loader going away only means nobody wants profiles anymore.
        let _ = self.identity_tx.send(change);
    }
}

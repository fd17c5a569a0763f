//! Maps provider events to session state transitions.
//!
//! [`reduce`] is synchronous and must stay that way: the provider delivers
//! events one at a time on a single channel, and a handler that suspended
//! mid-transition would let the next event (say, a sign-out during a password
//! update) land between its two halves. Anything asynchronous that follows an
//! event is the profile loader's job.

use super::state::SessionState;
use crate::provider::{AuthEvent, AuthEventKind};

/// What a single event did to the state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Effect {
    /// Recovery flag raised; payload ignored.
    RecoveryFlagged,
    /// Identity refresh that closed a recovery flow; payload discarded.
    Suppressed,
    /// Session and identity taken from the payload.
    Adopted,
    /// Signed out; state back to initial.
    Reset,
}

pub fn reduce(state: &mut SessionState, event: AuthEvent) -> Effect {
    match event.kind {
        AuthEventKind::RecoveryStarted => {
            state.in_recovery_flow = true;
            state.is_initialized = true;
            Effect::RecoveryFlagged
        }
        AuthEventKind::IdentityRefreshed if state.in_recovery_flow => {
            state.in_recovery_flow = false;
            Effect::Suppressed
        }
        AuthEventKind::SignedIn => {
            state.in_recovery_flow = false;
            state.adopt(event.session);
            state.is_initialized = true;
            Effect::Adopted
        }
        AuthEventKind::SignedOut => {
            state.reset_signed_out();
            Effect::Reset
        }
        AuthEventKind::IdentityRefreshed | AuthEventKind::SessionUpdated => {
            state.adopt(event.session);
            state.is_initialized = true;
            Effect::Adopted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        profile::{Profile, UserRole},
        provider::{Identity, Session},
        session::AuthPhase,
    };
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use uuid::Uuid;

    fn session(id: Uuid) -> Session {
        Session {
            access_token: format!("access-{id}"),
            refresh_token: format!("refresh-{id}"),
            token_type: "bearer".to_string(),
            expires_at: None,
            user: Identity {
                id,
                email: format!("{id}@example.com"),
            },
        }
    }

    fn with_profile(state: &mut SessionState) {
        if let Some(id) = state.identity_id() {
            state.profile = Some(Profile {
                id,
                username: Some("dev".to_string()),
                role: UserRole::Developer,
            });
        }
    }

    fn random_event(rng: &mut StdRng, ids: &[Uuid]) -> AuthEvent {
        let payload = if rng.gen_bool(0.7) {
            Some(session(ids[rng.gen_range(0..ids.len())]))
        } else {
            None
        };
        let kind = match rng.gen_range(0..5) {
            0 => AuthEventKind::RecoveryStarted,
            1 => AuthEventKind::IdentityRefreshed,
            2 => AuthEventKind::SignedIn,
            3 => AuthEventKind::SignedOut,
            _ => AuthEventKind::SessionUpdated,
        };
        AuthEvent::new(kind, payload)
    }

    #[test]
    fn signed_in_adopts_payload() {
        let id = Uuid::new_v4();
        let mut state = SessionState::default();
        let effect = reduce(&mut state, AuthEvent::signed_in(session(id)));

        assert_eq!(effect, Effect::Adopted);
        assert_eq!(state.identity_id(), Some(id));
        assert!(state.is_initialized);
        assert_eq!(state.phase(), AuthPhase::Authenticated);
    }

    #[test]
    fn session_updated_without_identity_clears_profile() {
        let mut state = SessionState::default();
        reduce(&mut state, AuthEvent::signed_in(session(Uuid::new_v4())));
        with_profile(&mut state);

        reduce(&mut state, AuthEvent::session_updated(None));
        assert_eq!(state.session, None);
        assert_eq!(state.identity, None);
        assert_eq!(state.profile, None);
        assert_eq!(state.phase(), AuthPhase::Unauthenticated);
    }

    #[test]
    fn recovery_then_identity_refresh_keeps_pre_recovery_session() {
        let before = session(Uuid::new_v4());
        let mut state = SessionState::default();
        reduce(&mut state, AuthEvent::signed_in(before.clone()));

        let effect = reduce(
            &mut state,
            AuthEvent::recovery_started(session(Uuid::new_v4())),
        );
        assert_eq!(effect, Effect::RecoveryFlagged);
        assert_eq!(state.phase(), AuthPhase::RecoveryPending);
        assert_eq!(state.session.as_ref(), Some(&before));

        let effect = reduce(
            &mut state,
            AuthEvent::identity_refreshed(Some(session(Uuid::new_v4()))),
        );
        assert_eq!(effect, Effect::Suppressed);
        assert!(!state.in_recovery_flow);
        assert_eq!(state.session.as_ref(), Some(&before));
        assert_eq!(state.identity.as_ref(), Some(&before.user));
    }

    #[test]
    fn recovery_start_initializes() {
        let mut state = SessionState::default();
        reduce(
            &mut state,
            AuthEvent::recovery_started(session(Uuid::new_v4())),
        );
        assert!(state.is_initialized);
        assert!(state.in_recovery_flow);
        assert_eq!(state.session, None);
    }

    #[test]
    fn identity_refresh_outside_recovery_is_adopted() {
        let id = Uuid::new_v4();
        let mut state = SessionState::default();
        let effect = reduce(&mut state, AuthEvent::identity_refreshed(Some(session(id))));
        assert_eq!(effect, Effect::Adopted);
        assert_eq!(state.identity_id(), Some(id));
    }

    #[test]
    fn second_identity_refresh_after_recovery_is_adopted() {
        let mut state = SessionState::default();
        reduce(
            &mut state,
            AuthEvent::recovery_started(session(Uuid::new_v4())),
        );
        reduce(&mut state, AuthEvent::identity_refreshed(None));

        let id = Uuid::new_v4();
        let effect = reduce(&mut state, AuthEvent::identity_refreshed(Some(session(id))));
        assert_eq!(effect, Effect::Adopted);
        assert_eq!(state.identity_id(), Some(id));
    }

    #[test]
    fn signed_in_and_signed_out_end_recovery() {
        let mut state = SessionState::default();
        reduce(
            &mut state,
            AuthEvent::recovery_started(session(Uuid::new_v4())),
        );
        reduce(&mut state, AuthEvent::signed_in(session(Uuid::new_v4())));
        assert!(!state.in_recovery_flow);

        reduce(
            &mut state,
            AuthEvent::recovery_started(session(Uuid::new_v4())),
        );
        let effect = reduce(&mut state, AuthEvent::signed_out());
        assert_eq!(effect, Effect::Reset);
        assert_eq!(
            state,
            SessionState {
                is_initialized: true,
                ..SessionState::default()
            }
        );
    }

    #[test]
    fn random_sequences_never_leave_profile_without_identity() {
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut state = SessionState::default();
            for _ in 0..50 {
                let event = random_event(&mut rng, &ids);
                reduce(&mut state, event);
                assert!(
                    state.identity.is_some() || state.profile.is_none(),
                    "seed {seed}: profile without identity"
                );
                assert_eq!(
                    state.identity.is_some(),
                    state.session.is_some(),
                    "seed {seed}: identity and session disagree"
                );
                // The loader would eventually fill this in.
                if rng.gen_bool(0.5) {
                    with_profile(&mut state);
                }
            }
        }
    }

    #[test]
    fn random_sequences_initialize_at_most_once() {
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut state = SessionState::default();
            let mut flips = 0;
            for _ in 0..50 {
                let was_initialized = state.is_initialized;
                reduce(&mut state, random_event(&mut rng, &ids));
                assert!(
                    !was_initialized || state.is_initialized,
                    "seed {seed}: is_initialized reverted"
                );
                if !was_initialized && state.is_initialized {
                    flips += 1;
                }
            }
            assert!(flips <= 1, "seed {seed}: flipped {flips} times");
            assert!(state.is_initialized, "seed {seed}: never initialized");
        }
    }
}

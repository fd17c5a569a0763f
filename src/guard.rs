//! Route guards over the session store.
//!
//! Both guards block until initialization has finished, so a cold start with
//! a restored session is never bounced to the login page. They are UX only;
//! real access control lives on the backend.

use crate::session::{SessionState, SessionStore};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GuardDecision {
    Allow,
    Redirect(String),
}

/// Which side of the login wall a route sits on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RouteAccess {
    /// Needs a signed-in user; everyone else goes to the login route.
    Protected,
    /// Login and sign-up pages; signed-in users go home.
    GuestOnly,
}

/// Decision for an initialized state. `None` while still uninitialized.
#[must_use]
pub fn decide(
    state: &SessionState,
    access: RouteAccess,
    login_route: &str,
    home_route: &str,
) -> Option<GuardDecision> {
    if !state.is_initialized {
        return None;
    }
    let decision = match (access, state.is_authenticated()) {
        (RouteAccess::Protected, true) | (RouteAccess::GuestOnly, false) => GuardDecision::Allow,
        (RouteAccess::Protected, false) => GuardDecision::Redirect(login_route.to_string()),
        (RouteAccess::GuestOnly, true) => GuardDecision::Redirect(home_route.to_string()),
    };
    Some(decision)
}

async fn guard(store: &SessionStore, access: RouteAccess) -> GuardDecision {
    store.initialize().await;
    store.wait_until_initialized().await;
    let config = store.config();
    decide(
        &store.snapshot(),
        access,
        config.login_route(),
        config.home_route(),
    )
    .unwrap_or_else(|| GuardDecision::Redirect(config.login_route().to_string()))
}

pub async fn require_auth(store: &SessionStore) -> GuardDecision {
    guard(store, RouteAccess::Protected).await
}

pub async fn guest_only(store: &SessionStore) -> GuardDecision {
    guard(store, RouteAccess::GuestOnly).await
}

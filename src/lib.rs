//! # Compendium (catalog client session core)
//!
//! `compendium` is the client side of a moderated UI component catalog. Users
//! author snippets, submit them for review, and browse approved entries. This
//! crate holds the part of the client that everything else leans on: keeping a
//! single authoritative session state in sync with a hosted auth provider.
//!
//! ## Session synchronization
//!
//! Three asynchronous sources feed the session:
//!
//! - **Cold start:** the [`session::probe`] looks for a stored session in the
//!   persistent adapter, then the volatile one, and binds the first real
//!   provider client to whichever holds it (persistent by default).
//! - **Provider push events:** one handler per live client maps each event to a
//!   synchronous state transition in [`session::reducer`]. The handler never
//!   awaits; follow-up work (profile fetch) runs in [`profile::loader`].
//! - **User actions:** [`session::SessionStore`] exposes sign-up, sign-in,
//!   password reset/update and sign-out. Signing in with a different
//!   "remember me" choice tears the client down and rebuilds it on the other
//!   storage adapter before authenticating.
//!
//! ## Recovery flow
//!
//! A password-recovery link yields `RecoveryStarted`. The identity refresh that
//! the provider emits after the password update is swallowed so the UI does not
//! treat the recovering user as freshly signed in; callers sign out right after.

pub mod cli;
pub mod config;
pub mod error;
pub mod guard;
pub mod profile;
pub mod provider;
pub mod session;
pub mod storage;

use std::{future::Future, pin::Pin};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Boxed future used at every async trait seam so the traits stay object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

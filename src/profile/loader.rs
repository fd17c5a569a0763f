//! Loads the profile row whenever the authenticated identity changes.
//!
//! Runs as its own task, fed by the identity changes the session cell
//! publishes, so no fetch ever runs inside the provider's event handler. Each
//! change gets its own fetch; a result is written only if the identity is
//! still the one it was fetched for.

use super::ProfileRepository;
use crate::session::cell::{IdentityChange, IdentityChanges, SessionCell};
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, Instrument};

pub struct ProfileLoader {
    cell: Arc<SessionCell>,
    repository: Arc<dyn ProfileRepository>,
}

impl ProfileLoader {
    pub(crate) fn new(cell: Arc<SessionCell>, repository: Arc<dyn ProfileRepository>) -> Self {
        Self { cell, repository }
    }

    /// Spawns the loader task. The owning store aborts it on drop, which also
    /// cancels every fetch still in flight.
    pub(crate) fn spawn(self, mut changes: IdentityChanges) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut fetches = JoinSet::new();
            loop {
                tokio::select! {
                    change = changes.recv() => match change {
                        Some(None) => self.cell.clear_profile(),
                        Some(Some(change)) => self.fetch(&mut fetches, change),
                        None => break,
                    },
                    Some(joined) = fetches.join_next(), if !fetches.is_empty() => {
                        if let Err(err) = joined {
                            if err.is_panic() {
                                error!("profile fetch panicked: {err}");
                            }
                        }
                    }
                }
            }
            debug!("profile loader stopped");
        })
    }

    fn fetch(&self, fetches: &mut JoinSet<()>, change: IdentityChange) {
        let cell = Arc::clone(&self.cell);
        let repository = Arc::clone(&self.repository);
        let span = tracing::info_span!("profile.fetch", user_id = %change.id);
        fetches.spawn(
            async move {
                let result = repository
                    .fetch_by_id(change.id, &change.access_token)
                    .await;
                cell.store_profile(change.id, result);
            }
            .instrument(span),
        );
    }
}

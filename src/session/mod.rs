//! Session synchronization: state record, event reducer, cold-start probe and
//! the store that ties them to the live provider client.

pub(crate) mod cell;
pub mod probe;
pub mod reducer;
mod state;
mod store;

pub use state::{AuthPhase, SessionState};
pub use store::SessionStore;

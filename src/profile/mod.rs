//! Application-level profile records and their repository seam.

pub mod loader;

pub use loader::ProfileLoader;

use crate::{error::ProfileLoadError, BoxFuture};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog role stored on the profile row.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum UserRole {
    /// Authors components and submits them for review.
    #[serde(rename = "Sviluppatore", alias = "Developer")]
    Developer,
    /// Reviews submissions.
    Admin,
}

/// Profile row keyed by the identity id.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    #[serde(default)]
    pub username: Option<String>,
    pub role: UserRole,
}

impl Profile {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Source of profile rows.
///
/// `access_token` is the bearer token of the session the identity came from,
/// so row-level security on the hosted table applies to the request.
pub trait ProfileRepository: Send + Sync {
    fn fetch_by_id<'a>(
        &'a self,
        id: Uuid,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<Profile, ProfileLoadError>>;
}

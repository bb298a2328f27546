use anyhow::Result;
use serde::{Deserialize, Serialize};

/// One game as reported by the external platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalGameEntry {
    /// Platform id of the game (Steam app id).
    pub id: String,
    pub name: String,
    /// Icon reference, empty when the platform has none.
    pub icon: String,
}

/// Source of a user's external game library.
pub trait ExternalLibraryFetcher: Send + Sync {
    /// Returns every game owned by the account `handle`. An account without
    /// games yields an empty list.
    fn fetch_library(&self, handle: &str) -> Result<Vec<ExternalGameEntry>>;
}

use serde::Serialize;

/// An account as seen by the background jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: usize,
    pub handle: String,
    /// Steam id of the linked external library, if any.
    pub steamid: Option<String>,
    pub website: Option<String>,
    pub avatar_hash: Option<String>,
}

/// Fields needed to create an account.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub handle: String,
    pub steamid: Option<String>,
    pub website: Option<String>,
    pub avatar_hash: Option<String>,
}

impl NewUser {
    pub fn new(handle: &str) -> Self {
        Self {
            handle: handle.to_string(),
            ..Default::default()
        }
    }
}

/// A user's game library. Its games are a set of catalog game ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    pub id: usize,
    pub user_id: usize,
}

/// Result of adding a game to a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    AlreadyPresent,
}

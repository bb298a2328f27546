//! Game catalog models.

use serde::{Deserialize, Serialize};

/// A catalog game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: usize,
    pub name: String,
    /// Unique, derived from the name with [`super::slugify`].
    pub slug: String,
    /// Steam app id, if the game is known to Steam.
    pub steamid: Option<String>,
    pub icon: Option<String>,
}

/// Fields of a game that doesn't exist yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewGame {
    pub name: String,
    pub slug: String,
    pub steamid: Option<String>,
    pub icon: Option<String>,
}

/// Result of looking games up by external id.
///
/// The external id column carries no uniqueness constraint, so more than one
/// game can share an id if the catalog data is inconsistent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExternalIdMatch {
    None,
    One(Game),
    Many(usize),
}

/// Result of inserting a game.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(Game),
    /// A game with the same slug is already in the catalog.
    AlreadyExists,
}

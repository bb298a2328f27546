//! GameCatalog trait definition.

use super::models::{CreateOutcome, ExternalIdMatch, Game, NewGame};
use anyhow::Result;

/// Lookups and writes on the game catalog needed by library sync.
pub trait GameCatalog: Send + Sync {
    /// Find the games whose external (Steam) id is `external_id`.
    fn find_by_external_id(&self, external_id: &str) -> Result<ExternalIdMatch>;

    /// Find the game with the given slug.
    fn find_by_slug(&self, slug: &str) -> Result<Option<Game>>;

    /// Insert a new game. A slug conflict is reported as
    /// [`CreateOutcome::AlreadyExists`] rather than as an error.
    fn create_game(&self, game: &NewGame) -> Result<CreateOutcome>;

    /// Persist the fields of an existing game.
    fn update_game(&self, game: &Game) -> Result<()>;
}

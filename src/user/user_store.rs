use super::user_models::{AddOutcome, Library, NewUser, User};
use crate::catalog_store::Game;
use anyhow::Result;

pub trait AccountStore: Send + Sync {
    /// Creates a new user, together with its empty library, and returns the user id.
    fn create_user(&self, user: &NewUser) -> Result<usize>;

    /// Returns the user with the given id.
    /// Returns Ok(None) if the user does not exist.
    /// Returns Err if there is a database error.
    fn get_user(&self, user_id: usize) -> Result<Option<User>>;

    /// Deletes the given users and everything they own.
    /// Ids that don't exist are ignored.
    /// Returns the number of users actually deleted.
    fn delete_users(&self, user_ids: &[usize]) -> Result<usize>;
}

pub trait LibraryStore: Send + Sync {
    /// Returns the library owned by the given user.
    /// Returns Ok(None) if the user has no library.
    fn get_library(&self, user_id: usize) -> Result<Option<Library>>;

    /// Adds a game to a library. Adding a game that is already there is not an error.
    fn add_game(&self, library: &Library, game: &Game) -> Result<AddOutcome>;

    /// Returns the ids of all games in a library, in ascending order.
    fn get_library_game_ids(&self, library: &Library) -> Result<Vec<usize>>;
}

pub trait FullUserStore: AccountStore + LibraryStore {}

impl<T: AccountStore + LibraryStore> FullUserStore for T {}

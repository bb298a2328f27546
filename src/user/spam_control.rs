//! Spam account heuristics.
//!
//! A [`SpamClassifier`] supplies candidate sets of accounts; deciding what to do
//! with them is up to the caller.

use super::sqlite_user_store::SqliteUserStore;
use super::user_models::User;
use anyhow::Result;
use std::sync::Arc;

pub trait SpamClassifier: Send + Sync {
    /// Accounts that have a website set but never added a game.
    fn no_games_with_website(&self) -> Result<Vec<User>>;

    /// Accounts using an avatar known to be used by spammers.
    fn spam_avatar_users(&self) -> Result<Vec<User>>;
}

pub struct SqliteSpamClassifier {
    store: Arc<SqliteUserStore>,
    spam_avatar_hashes: Vec<String>,
}

impl SqliteSpamClassifier {
    pub fn new(store: Arc<SqliteUserStore>, spam_avatar_hashes: Vec<String>) -> Self {
        Self {
            store,
            spam_avatar_hashes,
        }
    }
}

impl SpamClassifier for SqliteSpamClassifier {
    fn no_games_with_website(&self) -> Result<Vec<User>> {
        self.store.get_users_without_games_with_website()
    }

    fn spam_avatar_users(&self) -> Result<Vec<User>> {
        self.store.get_users_with_avatar_hashes(&self.spam_avatar_hashes)
    }
}

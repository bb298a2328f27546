mod sqlite_user_store;
pub mod spam_control;
pub mod user_models;
mod user_store;

pub use spam_control::{SpamClassifier, SqliteSpamClassifier};
pub use sqlite_user_store::{SqliteUserStore, USER_VERSIONED_SCHEMAS};
pub use user_models::{AddOutcome, Library, NewUser, User};
pub use user_store::{AccountStore, FullUserStore, LibraryStore};

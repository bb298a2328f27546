//! Accounts Worker Library
//!
//! Background jobs for the user account subsystem: Steam library sync, the
//! daily moderator digest, and the spam account sweep.

pub mod background_jobs;
pub mod catalog_store;
pub mod config;
pub mod library_sync;
pub mod mail;
pub mod server_store;
pub mod sqlite_persistence;
pub mod steam;
pub mod user;

#[cfg(test)]
mod test_fakes;

// Re-export commonly used types for convenience
pub use catalog_store::{GameCatalog, SqliteGameCatalog};
pub use server_store::{ServerStore, SqliteServerStore};
pub use user::{FullUserStore, SqliteUserStore};

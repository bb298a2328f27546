//! Reconciles a user's external game library into their local library.

mod fetcher;
mod resolver;

pub use fetcher::{ExternalGameEntry, ExternalLibraryFetcher};
pub use resolver::{GameRecordResolver, Resolution, SkipReason};

use crate::catalog_store::GameCatalog;
use crate::user::{AddOutcome, FullUserStore};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("User {0} not found")]
    UserNotFound(usize),
    #[error("User {0} has no game library")]
    LibraryNotFound(usize),
    #[error("Failed to fetch external library: {0:#}")]
    Fetch(anyhow::Error),
    #[error("Store error: {0:#}")]
    Store(anyhow::Error),
    #[error("Sync cancelled")]
    Cancelled,
}

/// What a sync did, entry by entry.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Entries returned by the external platform.
    pub entries: usize,
    /// Games newly added to the library.
    pub added: usize,
    pub already_present: usize,
    /// Catalog games created for unknown entries.
    pub created: usize,
    /// Catalog games whose external id was filled in.
    pub linked: usize,
    pub skipped: usize,
    /// Entries dropped because of a store error.
    pub failed: usize,
}

pub struct LibrarySyncer<'a> {
    users: &'a dyn FullUserStore,
    catalog: &'a dyn GameCatalog,
    fetcher: &'a dyn ExternalLibraryFetcher,
}

impl<'a> LibrarySyncer<'a> {
    pub fn new(
        users: &'a dyn FullUserStore,
        catalog: &'a dyn GameCatalog,
        fetcher: &'a dyn ExternalLibraryFetcher,
    ) -> Self {
        Self {
            users,
            catalog,
            fetcher,
        }
    }

    /// Adds every game of the user's external library to their local library.
    ///
    /// Entries are handled one at a time and nothing is rolled back: a failure
    /// on one entry is logged and the sync moves on to the next. `cancel` is
    /// checked between entries.
    pub fn sync(
        &self,
        user_id: usize,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let user = self
            .users
            .get_user(user_id)
            .map_err(SyncError::Store)?
            .ok_or(SyncError::UserNotFound(user_id))?;
        let library = self
            .users
            .get_library(user_id)
            .map_err(SyncError::Store)?
            .ok_or(SyncError::LibraryNotFound(user_id))?;

        let mut report = SyncReport::default();

        let Some(steamid) = user.steamid.as_deref().filter(|s| !s.is_empty()) else {
            info!("User {} has no linked steam account", user.handle);
            return Ok(report);
        };

        let entries = self
            .fetcher
            .fetch_library(steamid)
            .map_err(SyncError::Fetch)?;
        if entries.is_empty() {
            info!("Steam user {} has no steam games", user.handle);
            return Ok(report);
        }
        report.entries = entries.len();

        let resolver = GameRecordResolver::new(self.catalog);
        for entry in &entries {
            if cancel.is_cancelled() {
                warn!(
                    "Library sync for {} cancelled after {} of {} entries",
                    user.handle,
                    report.added + report.already_present + report.skipped + report.failed,
                    report.entries
                );
                return Err(SyncError::Cancelled);
            }

            info!("Adding {} to {}'s library", entry.name, user.handle);
            let resolution = match resolver.resolve(entry) {
                Ok(resolution) => resolution,
                Err(e) => {
                    error!("Failed to resolve game {} ({}): {:#}", entry.name, entry.id, e);
                    report.failed += 1;
                    continue;
                }
            };

            match &resolution {
                Resolution::Created(_) => report.created += 1,
                Resolution::Linked(_) => report.linked += 1,
                Resolution::Skipped(_) => report.skipped += 1,
                Resolution::Matched(_) | Resolution::SlugMatched(_) => {}
            }
            let Some(game) = resolution.game() else {
                continue;
            };

            match self.users.add_game(&library, game) {
                Ok(AddOutcome::Inserted) => report.added += 1,
                Ok(AddOutcome::AlreadyPresent) => report.already_present += 1,
                Err(e) => {
                    error!(
                        "Failed to add game {} to {}'s library: {:#}",
                        game.slug, user.handle, e
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            "Synced {}'s library: {} entries, {} added, {} created, {} skipped, {} failed",
            user.handle,
            report.entries,
            report.added,
            report.created,
            report.skipped,
            report.failed
        );
        Ok(report)
    }
}

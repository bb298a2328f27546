//! Maps external game entries onto catalog games.

use super::fetcher::ExternalGameEntry;
use crate::catalog_store::{
    external_id_slug, slugify, CreateOutcome, ExternalIdMatch, Game, GameCatalog, NewGame,
};
use anyhow::{bail, Result};
use tracing::{error, info};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    MissingIcon,
    /// The external id is shared by this many catalog games.
    DuplicateExternalId(usize),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The only game with the entry's external id.
    Matched(Game),
    /// Found by slug, external id was missing and has been filled in.
    Linked(Game),
    /// Found by slug, already had a different external id. Returned unchanged.
    SlugMatched(Game),
    Created(Game),
    Skipped(SkipReason),
}

impl Resolution {
    /// The game to add to the library, if any.
    pub fn game(&self) -> Option<&Game> {
        match self {
            Resolution::Matched(game)
            | Resolution::Linked(game)
            | Resolution::SlugMatched(game)
            | Resolution::Created(game) => Some(game),
            Resolution::Skipped(_) => None,
        }
    }
}

pub struct GameRecordResolver<'a> {
    catalog: &'a dyn GameCatalog,
}

impl<'a> GameRecordResolver<'a> {
    pub fn new(catalog: &'a dyn GameCatalog) -> Self {
        Self { catalog }
    }

    pub fn resolve(&self, entry: &ExternalGameEntry) -> Result<Resolution> {
        if entry.icon.is_empty() {
            info!("Game {} has no icon", entry.name);
            return Ok(Resolution::Skipped(SkipReason::MissingIcon));
        }

        match self.catalog.find_by_external_id(&entry.id)? {
            ExternalIdMatch::One(game) => return Ok(Resolution::Matched(game)),
            ExternalIdMatch::Many(count) => {
                error!("Multiple games with appid '{}' ({} records)", entry.id, count);
                return Ok(Resolution::Skipped(SkipReason::DuplicateExternalId(count)));
            }
            ExternalIdMatch::None => info!("No game with steam id {}", entry.id),
        }

        // A name with no slug can't be matched to anything, so it gets its own
        // slug derived from the external id.
        let slug = match slugify(&entry.name) {
            slug if slug.is_empty() => {
                let slug = external_id_slug(&entry.id);
                info!("Game {} has no slug, using {}", entry.name, slug);
                slug
            }
            slug => {
                if let Some(mut game) = self.catalog.find_by_slug(&slug)? {
                    if game.steamid.as_deref().map_or(true, str::is_empty) {
                        game.steamid = Some(entry.id.clone());
                        self.catalog.update_game(&game)?;
                        return Ok(Resolution::Linked(game));
                    }
                    return Ok(Resolution::SlugMatched(game));
                }
                slug
            }
        };

        let new_game = NewGame {
            name: entry.name.clone(),
            slug,
            steamid: Some(entry.id.clone()),
            icon: Some(entry.icon.clone()),
        };
        match self.catalog.create_game(&new_game)? {
            CreateOutcome::Created(game) => {
                info!("Creating game {}", game.slug);
                Ok(Resolution::Created(game))
            }
            // Someone else inserted the same slug between our lookup and insert.
            CreateOutcome::AlreadyExists => match self.catalog.find_by_slug(&new_game.slug)? {
                Some(game) => Ok(Resolution::Matched(game)),
                None => bail!(
                    "Game {} reported as existing but can't be found",
                    new_game.slug
                ),
            },
        }
    }
}

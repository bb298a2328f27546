//! SQLite-backed game catalog.

use super::models::{CreateOutcome, ExternalIdMatch, Game, NewGame};
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::trait_def::GameCatalog;
use crate::sqlite_persistence::{is_unique_violation, open_versioned};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

const GAME_COLUMNS: &str = "id, name, slug, steamid, icon";

pub struct SqliteGameCatalog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGameCatalog {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let mut conn = Connection::open(path).context("Failed to open catalog database")?;
        open_versioned(&mut conn, is_new_db, CATALOG_VERSIONED_SCHEMAS, "catalog")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let game_count: i64 = conn.query_row("SELECT COUNT(*) FROM game", [], |r| r.get(0))?;
        info!("Opened game catalog: {} games", game_count);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("catalog database connection mutex poisoned"))
    }

    fn row_to_game(row: &rusqlite::Row) -> rusqlite::Result<Game> {
        Ok(Game {
            id: row.get::<_, i64>(0)? as usize,
            name: row.get(1)?,
            slug: row.get(2)?,
            steamid: row.get(3)?,
            icon: row.get(4)?,
        })
    }
}

impl GameCatalog for SqliteGameCatalog {
    fn find_by_external_id(&self, external_id: &str) -> Result<ExternalIdMatch> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM game WHERE steamid = ?1 ORDER BY id",
            GAME_COLUMNS
        ))?;
        let mut games = stmt
            .query_map(params![external_id], Self::row_to_game)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(match games.len() {
            0 => ExternalIdMatch::None,
            1 => ExternalIdMatch::One(games.remove(0)),
            n => ExternalIdMatch::Many(n),
        })
    }

    fn find_by_slug(&self, slug: &str) -> Result<Option<Game>> {
        let conn = self.lock_conn()?;
        let game = conn
            .query_row(
                &format!("SELECT {} FROM game WHERE slug = ?1", GAME_COLUMNS),
                params![slug],
                Self::row_to_game,
            )
            .optional()?;
        Ok(game)
    }

    fn create_game(&self, game: &NewGame) -> Result<CreateOutcome> {
        let conn = self.lock_conn()?;
        let inserted = conn.execute(
            "INSERT INTO game (name, slug, steamid, icon) VALUES (?1, ?2, ?3, ?4)",
            params![game.name, game.slug, game.steamid, game.icon],
        );
        match inserted {
            Ok(_) => Ok(CreateOutcome::Created(Game {
                id: conn.last_insert_rowid() as usize,
                name: game.name.clone(),
                slug: game.slug.clone(),
                steamid: game.steamid.clone(),
                icon: game.icon.clone(),
            })),
            Err(e) if is_unique_violation(&e) => Ok(CreateOutcome::AlreadyExists),
            Err(e) => Err(e).with_context(|| format!("Failed to create game {}", game.slug)),
        }
    }

    fn update_game(&self, game: &Game) -> Result<()> {
        let conn = self.lock_conn()?;
        let updated = conn.execute(
            "UPDATE game SET name = ?1, slug = ?2, steamid = ?3, icon = ?4 WHERE id = ?5",
            params![game.name, game.slug, game.steamid, game.icon, game.id as i64],
        )?;
        if updated == 0 {
            anyhow::bail!("Game {} does not exist", game.id);
        }
        Ok(())
    }
}

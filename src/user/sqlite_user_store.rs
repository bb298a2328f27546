use super::user_models::{AddOutcome, Library, NewUser, User};
use super::user_store::{AccountStore, LibraryStore};
use crate::catalog_store::Game;
use crate::sqlite_column;
use crate::sqlite_persistence::{
    is_unique_violation, open_versioned, Column, ForeignKey, ForeignKeyOnChange, SqlType, Table,
    VersionedSchema, DEFAULT_TIMESTAMP,
};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

const USER_COLUMNS: &str = "id, handle, steamid, website, avatar_hash";

/// V 1
const USER_TABLE_V_1: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("handle", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("steamid", &SqlType::Text),
        sqlite_column!("website", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[],
    indices: &[("idx_user_handle", "handle")],
};

const USER_FK: ForeignKey = ForeignKey {
    foreign_table: "user",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const GAME_LIBRARY_TABLE_V_1: Table = Table {
    name: "game_library",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            is_unique = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[],
    indices: &[],
};

const GAME_LIBRARY_FK: ForeignKey = ForeignKey {
    foreign_table: "game_library",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

/// game_id refers to catalog.db, which lives in a separate file, so it has no foreign key.
const GAME_LIBRARY_GAME_TABLE_V_1: Table = Table {
    name: "game_library_game",
    columns: &[
        sqlite_column!(
            "library_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&GAME_LIBRARY_FK)
        ),
        sqlite_column!("game_id", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[&["library_id", "game_id"]],
    indices: &[("idx_game_library_game_game_id", "game_id")],
};

/// V 2
const USER_TABLE_V_2: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("handle", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("steamid", &SqlType::Text),
        sqlite_column!("website", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("avatar_hash", &SqlType::Text),
    ],
    unique_constraints: &[],
    indices: &[
        ("idx_user_handle", "handle"),
        ("idx_user_avatar_hash", "avatar_hash"),
    ],
};

fn migrate_v1_to_v2(conn: &Connection) -> Result<()> {
    conn.execute("ALTER TABLE user ADD COLUMN avatar_hash TEXT", [])?;
    conn.execute("CREATE INDEX idx_user_avatar_hash ON user(avatar_hash)", [])?;
    Ok(())
}

pub const USER_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[
            USER_TABLE_V_1,
            GAME_LIBRARY_TABLE_V_1,
            GAME_LIBRARY_GAME_TABLE_V_1,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[
            USER_TABLE_V_2,
            GAME_LIBRARY_TABLE_V_1,
            GAME_LIBRARY_GAME_TABLE_V_1,
        ],
        migration: Some(migrate_v1_to_v2),
    },
];

pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let mut conn = Connection::open(path).context("Failed to open user database")?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;
        open_versioned(&mut conn, is_new_db, USER_VERSIONED_SCHEMAS, "user")?;

        Ok(SqliteUserStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("user database connection mutex poisoned"))
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let id: i64 = row.get("id")?;
        Ok(User {
            id: id as usize,
            handle: row.get("handle")?,
            steamid: row.get("steamid")?,
            website: row.get("website")?,
            avatar_hash: row.get("avatar_hash")?,
        })
    }

    /// Users that have a website set but no game in their library.
    pub fn get_users_without_games_with_website(&self) -> Result<Vec<User>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT u.id, u.handle, u.steamid, u.website, u.avatar_hash
             FROM user u
             LEFT JOIN game_library l ON l.user_id = u.id
             WHERE u.website IS NOT NULL AND TRIM(u.website) != ''
               AND NOT EXISTS (
                   SELECT 1 FROM game_library_game g WHERE g.library_id = l.id
               )
             ORDER BY u.id",
        )?;
        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Users whose avatar hash is one of `hashes`.
    pub fn get_users_with_avatar_hashes(&self, hashes: &[String]) -> Result<Vec<User>> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock_conn()?;
        let placeholders = vec!["?"; hashes.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM user WHERE avatar_hash IN ({}) ORDER BY id",
            USER_COLUMNS, placeholders
        ))?;
        let users = stmt
            .query_map(params_from_iter(hashes.iter()), Self::row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }
}

impl AccountStore for SqliteUserStore {
    fn create_user(&self, user: &NewUser) -> Result<usize> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO user (handle, steamid, website, avatar_hash) VALUES (?1, ?2, ?3, ?4)",
            params![user.handle, user.steamid, user.website, user.avatar_hash],
        )
        .with_context(|| format!("Failed to create user {}", user.handle))?;
        let user_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO game_library (user_id) VALUES (?1)",
            params![user_id],
        )?;
        tx.commit()?;
        Ok(user_id as usize)
    }

    fn get_user(&self, user_id: usize) -> Result<Option<User>> {
        let conn = self.lock_conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM user WHERE id = ?1", USER_COLUMNS),
                params![user_id as i64],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn delete_users(&self, user_ids: &[usize]) -> Result<usize> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM user WHERE id = ?1")?;
            for user_id in user_ids {
                deleted += stmt.execute(params![*user_id as i64])?;
            }
        }
        tx.commit()?;
        debug!(
            "Deleted {} users out of {} requested",
            deleted,
            user_ids.len()
        );
        Ok(deleted)
    }
}

impl LibraryStore for SqliteUserStore {
    fn get_library(&self, user_id: usize) -> Result<Option<Library>> {
        let conn = self.lock_conn()?;
        let library = conn
            .query_row(
                "SELECT id, user_id FROM game_library WHERE user_id = ?1",
                params![user_id as i64],
                |row| {
                    Ok(Library {
                        id: row.get::<_, i64>(0)? as usize,
                        user_id: row.get::<_, i64>(1)? as usize,
                    })
                },
            )
            .optional()?;
        Ok(library)
    }

    fn add_game(&self, library: &Library, game: &Game) -> Result<AddOutcome> {
        let conn = self.lock_conn()?;
        match conn.execute(
            "INSERT INTO game_library_game (library_id, game_id) VALUES (?1, ?2)",
            params![library.id as i64, game.id as i64],
        ) {
            Ok(_) => Ok(AddOutcome::Inserted),
            Err(e) if is_unique_violation(&e) => Ok(AddOutcome::AlreadyPresent),
            Err(e) => Err(e).with_context(|| {
                format!(
                    "Failed to add game {} to library {}",
                    game.id, library.id
                )
            }),
        }
    }

    fn get_library_game_ids(&self, library: &Library) -> Result<Vec<usize>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT game_id FROM game_library_game WHERE library_id = ?1 ORDER BY game_id",
        )?;
        let ids = stmt
            .query_map(params![library.id as i64], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(|id| id as usize))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_persistence::read_schema_version;
    use tempfile::TempDir;

    fn create_tmp_store() -> (SqliteUserStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteUserStore::new(temp_dir.path().join("user.db")).unwrap();
        (store, temp_dir)
    }

    fn game(id: usize) -> Game {
        Game {
            id,
            name: format!("Game {}", id),
            slug: format!("game-{}", id),
            steamid: None,
            icon: None,
        }
    }

    #[test]
    fn test_create_and_get_user() {
        let (store, _dir) = create_tmp_store();

        let user_id = store
            .create_user(&NewUser {
                handle: "gordon".to_string(),
                steamid: Some("76561197960287930".to_string()),
                website: None,
                avatar_hash: None,
            })
            .unwrap();

        let user = store.get_user(user_id).unwrap().unwrap();
        assert_eq!(user.handle, "gordon");
        assert_eq!(user.steamid.as_deref(), Some("76561197960287930"));
        assert!(store.get_user(user_id + 100).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_handle_fails() {
        let (store, _dir) = create_tmp_store();
        store.create_user(&NewUser::new("alyx")).unwrap();
        assert!(store.create_user(&NewUser::new("alyx")).is_err());
    }

    #[test]
    fn test_create_user_creates_library() {
        let (store, _dir) = create_tmp_store();
        let user_id = store.create_user(&NewUser::new("barney")).unwrap();

        let library = store.get_library(user_id).unwrap().unwrap();
        assert_eq!(library.user_id, user_id);
        assert!(store.get_library_game_ids(&library).unwrap().is_empty());
    }

    #[test]
    fn test_add_game_twice_is_already_present() {
        let (store, _dir) = create_tmp_store();
        let user_id = store.create_user(&NewUser::new("eli")).unwrap();
        let library = store.get_library(user_id).unwrap().unwrap();

        assert_eq!(
            store.add_game(&library, &game(7)).unwrap(),
            AddOutcome::Inserted
        );
        assert_eq!(
            store.add_game(&library, &game(7)).unwrap(),
            AddOutcome::AlreadyPresent
        );
        assert_eq!(
            store.add_game(&library, &game(3)).unwrap(),
            AddOutcome::Inserted
        );

        assert_eq!(store.get_library_game_ids(&library).unwrap(), vec![3, 7]);
    }

    #[test]
    fn test_delete_users_ignores_missing_ids() {
        let (store, _dir) = create_tmp_store();
        let a = store.create_user(&NewUser::new("a")).unwrap();
        let b = store.create_user(&NewUser::new("b")).unwrap();

        assert_eq!(store.delete_users(&[a, 9999]).unwrap(), 1);
        assert_eq!(store.delete_users(&[a]).unwrap(), 0);
        assert!(store.get_user(a).unwrap().is_none());
        assert!(store.get_user(b).unwrap().is_some());
    }

    #[test]
    fn test_delete_user_cascades_to_library() {
        let (store, _dir) = create_tmp_store();
        let user_id = store.create_user(&NewUser::new("kleiner")).unwrap();
        let library = store.get_library(user_id).unwrap().unwrap();
        store.add_game(&library, &game(1)).unwrap();

        store.delete_users(&[user_id]).unwrap();

        assert!(store.get_library(user_id).unwrap().is_none());
        assert!(store.get_library_game_ids(&library).unwrap().is_empty());
    }

    #[test]
    fn test_users_without_games_with_website() {
        let (store, _dir) = create_tmp_store();
        let spammer = store
            .create_user(&NewUser {
                website: Some("http://cheap-pills.example".to_string()),
                ..NewUser::new("spammer")
            })
            .unwrap();
        let gamer = store
            .create_user(&NewUser {
                website: Some("http://my-blog.example".to_string()),
                ..NewUser::new("gamer")
            })
            .unwrap();
        store
            .create_user(&NewUser {
                website: Some("  ".to_string()),
                ..NewUser::new("blank")
            })
            .unwrap();
        store.create_user(&NewUser::new("quiet")).unwrap();

        let library = store.get_library(gamer).unwrap().unwrap();
        store.add_game(&library, &game(1)).unwrap();

        let users = store.get_users_without_games_with_website().unwrap();
        assert_eq!(
            users.iter().map(|u| u.id).collect::<Vec<_>>(),
            vec![spammer]
        );
    }

    #[test]
    fn test_users_with_avatar_hashes() {
        let (store, _dir) = create_tmp_store();
        let flagged = store
            .create_user(&NewUser {
                avatar_hash: Some("deadbeef".to_string()),
                ..NewUser::new("flagged")
            })
            .unwrap();
        store
            .create_user(&NewUser {
                avatar_hash: Some("cafebabe".to_string()),
                ..NewUser::new("fine")
            })
            .unwrap();

        let users = store
            .get_users_with_avatar_hashes(&["deadbeef".to_string(), "0000".to_string()])
            .unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, flagged);
        assert!(store.get_users_with_avatar_hashes(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_migrates_v1_database() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("user.db");
        {
            let conn = Connection::open(&path).unwrap();
            USER_VERSIONED_SCHEMAS[0].create(&conn).unwrap();
            conn.execute("INSERT INTO user (handle) VALUES ('old')", [])
                .unwrap();
        }

        let store = SqliteUserStore::new(&path).unwrap();
        {
            let conn = store.conn.lock().unwrap();
            assert_eq!(read_schema_version(&conn).unwrap(), 2);
        }
        let user = store.get_user(1).unwrap().unwrap();
        assert_eq!(user.handle, "old");
        assert!(user.avatar_hash.is_none());
    }
}

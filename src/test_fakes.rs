//! In-memory collaborators for unit tests.

use crate::catalog_store::{CreateOutcome, ExternalIdMatch, Game, GameCatalog, NewGame};
use crate::library_sync::{ExternalGameEntry, ExternalLibraryFetcher};
use crate::mail::ModDigestMailer;
use crate::server_store::{ActionLog, ActionLogEntry};
use crate::user::{AccountStore, AddOutcome, Library, LibraryStore, NewUser, SpamClassifier, User};
use anyhow::{anyhow, bail, Result};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeCatalog {
    games: Mutex<Vec<Game>>,
    race: Mutex<Option<NewGame>>,
    hidden_conflict: AtomicBool,
    fail: AtomicBool,
    lookups: AtomicUsize,
    creates: AtomicUsize,
    updates: AtomicUsize,
}

impl FakeCatalog {
    pub fn insert(&self, slug: &str, steamid: Option<&str>) -> Game {
        let mut games = self.games.lock().unwrap();
        let game = Game {
            id: games.len() + 1,
            name: slug.to_string(),
            slug: slug.to_string(),
            steamid: steamid.map(str::to_string),
            icon: Some(format!("{}.jpg", slug)),
        };
        games.push(game.clone());
        game
    }

    /// The next `create_game` for `slug` finds it already inserted by someone else.
    pub fn race_on_create(&self, slug: &str, steamid: Option<&str>) {
        *self.race.lock().unwrap() = Some(NewGame {
            name: slug.to_string(),
            slug: slug.to_string(),
            steamid: steamid.map(str::to_string),
            icon: None,
        });
    }

    /// Every `create_game` reports a conflict, but the conflicting game is never visible.
    pub fn hide_conflicting_game(&self) {
        self.hidden_conflict.store(true, Ordering::SeqCst);
    }

    pub fn fail_lookups(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn games(&self) -> Vec<Game> {
        self.games.lock().unwrap().clone()
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.creates() + self.updates.load(Ordering::SeqCst)
    }

    fn lookup(&self) -> Result<()> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            bail!("catalog unavailable");
        }
        Ok(())
    }
}

impl GameCatalog for FakeCatalog {
    fn find_by_external_id(&self, external_id: &str) -> Result<ExternalIdMatch> {
        self.lookup()?;
        let mut found: Vec<Game> = self
            .games
            .lock()
            .unwrap()
            .iter()
            .filter(|g| g.steamid.as_deref() == Some(external_id))
            .cloned()
            .collect();
        Ok(match found.len() {
            0 => ExternalIdMatch::None,
            1 => ExternalIdMatch::One(found.remove(0)),
            n => ExternalIdMatch::Many(n),
        })
    }

    fn find_by_slug(&self, slug: &str) -> Result<Option<Game>> {
        self.lookup()?;
        Ok(self
            .games
            .lock()
            .unwrap()
            .iter()
            .find(|g| g.slug == slug)
            .cloned())
    }

    fn create_game(&self, game: &NewGame) -> Result<CreateOutcome> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.hidden_conflict.load(Ordering::SeqCst) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        let race = self.race.lock().unwrap().take();
        if let Some(racer) = race.filter(|r| r.slug == game.slug) {
            self.insert(&racer.slug, racer.steamid.as_deref());
        }

        let mut games = self.games.lock().unwrap();
        if games.iter().any(|g| g.slug == game.slug) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        let created = Game {
            id: games.len() + 1,
            name: game.name.clone(),
            slug: game.slug.clone(),
            steamid: game.steamid.clone(),
            icon: game.icon.clone(),
        };
        games.push(created.clone());
        Ok(CreateOutcome::Created(created))
    }

    fn update_game(&self, game: &Game) -> Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut games = self.games.lock().unwrap();
        let existing = games
            .iter_mut()
            .find(|g| g.id == game.id)
            .ok_or_else(|| anyhow!("no game {}", game.id))?;
        *existing = game.clone();
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeUserStore {
    users: Mutex<Vec<User>>,
    libraries: Mutex<HashMap<usize, (Library, BTreeSet<usize>)>>,
    fail_adds: AtomicBool,
}

impl FakeUserStore {
    pub fn add_user(&self, handle: &str, steamid: Option<&str>) -> usize {
        let user_id = self.add_user_without_library(handle, steamid);
        self.libraries.lock().unwrap().insert(
            user_id,
            (
                Library {
                    id: user_id + 1000,
                    user_id,
                },
                BTreeSet::new(),
            ),
        );
        user_id
    }

    pub fn add_user_without_library(&self, handle: &str, steamid: Option<&str>) -> usize {
        let mut users = self.users.lock().unwrap();
        let user_id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        users.push(User {
            id: user_id,
            handle: handle.to_string(),
            steamid: steamid.map(str::to_string),
            website: None,
            avatar_hash: None,
        });
        user_id
    }

    pub fn fail_adds(&self) {
        self.fail_adds.store(true, Ordering::SeqCst);
    }

    pub fn library_games(&self, user_id: usize) -> Vec<usize> {
        self.libraries
            .lock()
            .unwrap()
            .get(&user_id)
            .map(|(_, games)| games.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn user_ids(&self) -> Vec<usize> {
        self.users.lock().unwrap().iter().map(|u| u.id).collect()
    }
}

impl AccountStore for FakeUserStore {
    fn create_user(&self, user: &NewUser) -> Result<usize> {
        Ok(self.add_user(&user.handle, user.steamid.as_deref()))
    }

    fn get_user(&self, user_id: usize) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == user_id)
            .cloned())
    }

    fn delete_users(&self, user_ids: &[usize]) -> Result<usize> {
        let mut users = self.users.lock().unwrap();
        let before = users.len();
        users.retain(|u| !user_ids.contains(&u.id));
        let mut libraries = self.libraries.lock().unwrap();
        for user_id in user_ids {
            libraries.remove(user_id);
        }
        Ok(before - users.len())
    }
}

impl LibraryStore for FakeUserStore {
    fn get_library(&self, user_id: usize) -> Result<Option<Library>> {
        Ok(self
            .libraries
            .lock()
            .unwrap()
            .get(&user_id)
            .map(|(library, _)| library.clone()))
    }

    fn add_game(&self, library: &Library, game: &Game) -> Result<AddOutcome> {
        if self.fail_adds.load(Ordering::SeqCst) {
            bail!("library store unavailable");
        }
        let mut libraries = self.libraries.lock().unwrap();
        let (_, games) = libraries
            .get_mut(&library.user_id)
            .ok_or_else(|| anyhow!("no library {}", library.id))?;
        Ok(if games.insert(game.id) {
            AddOutcome::Inserted
        } else {
            AddOutcome::AlreadyPresent
        })
    }

    fn get_library_game_ids(&self, library: &Library) -> Result<Vec<usize>> {
        Ok(self.library_games(library.user_id))
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    libraries: Mutex<HashMap<String, Vec<ExternalGameEntry>>>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn set_library(&self, handle: &str, entries: Vec<ExternalGameEntry>) {
        self.libraries
            .lock()
            .unwrap()
            .insert(handle.to_string(), entries);
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExternalLibraryFetcher for FakeFetcher {
    fn fetch_library(&self, handle: &str) -> Result<Vec<ExternalGameEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            bail!("steam is down");
        }
        Ok(self
            .libraries
            .lock()
            .unwrap()
            .get(handle)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeMailer {
    fail: AtomicBool,
    sent: AtomicUsize,
}

impl FakeMailer {
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

impl ModDigestMailer for FakeMailer {
    fn send_daily_mod_digest(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("smtp relay refused the message");
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Classifier returning fixed candidate sets.
pub struct FakeSpamClassifier {
    pub website_spammers: Vec<User>,
    pub avatar_spammers: Vec<User>,
}

impl SpamClassifier for FakeSpamClassifier {
    fn no_games_with_website(&self) -> Result<Vec<User>> {
        Ok(self.website_spammers.clone())
    }

    fn spam_avatar_users(&self) -> Result<Vec<User>> {
        Ok(self.avatar_spammers.clone())
    }
}

#[derive(Default)]
pub struct FakeActionLog {
    pub records: Mutex<Vec<(String, i64)>>,
}

impl ActionLog for FakeActionLog {
    fn record(&self, name: &str, value: i64) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .push((name.to_string(), value));
        Ok(())
    }

    fn get_action_log(&self, name: &str, limit: usize) -> Result<Vec<ActionLogEntry>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|(n, _)| n == name)
            .take(limit)
            .enumerate()
            .map(|(i, (n, v))| ActionLogEntry {
                id: i as i64,
                name: n.clone(),
                value: *v,
                created: 0,
            })
            .collect())
    }
}
